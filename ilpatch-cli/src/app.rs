use std::path::PathBuf;

use clap::Parser;

/// ilpatch - fixes slow menus and adds dialogue skipping to The Underground Man
#[derive(Debug, Parser)]
#[command(name = "ilpatch", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    /// Path to the game's Assembly-CSharp.dll module image.
    #[arg(value_name = "FILE")]
    pub path: Option<PathBuf>,

    /// Run every patch and encode the result, but leave the file unchanged.
    #[arg(long)]
    pub dry_run: bool,

    /// List the built-in patches and exit.
    #[arg(long, conflicts_with_all = ["path", "dry_run"])]
    pub list: bool,
}

/// Options shared across all modes.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Emit output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}
