mod app;
mod commands;
mod output;

use std::process::ExitCode;

use clap::Parser;
use log::warn;

use crate::app::Cli;

const USAGE_HINT: &str = "Pass the path of the game's 'Assembly-CSharp.dll' module image \
     (CILM, not PE) as the first argument.";

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Show ilpatch info+ on stderr unless --json; --verbose enables debug; RUST_LOG overrides
    if !cli.global.json {
        let level = if cli.global.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        env_logger::Builder::new()
            .filter_module("ilpatch", level)
            .parse_default_env()
            .target(env_logger::Target::Stderr)
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(false)
            .init();
    }

    if let Err(err) = ctrlc::set_handler(|| {
        eprintln!("\nCancelled.");
        std::process::exit(130);
    }) {
        warn!("Unable to install Ctrl+C handler: {err}");
    }

    let result = if cli.list {
        commands::list::run(&cli.global)
    } else if let Some(path) = &cli.path {
        commands::patch::run(path, cli.dry_run, &cli.global)
    } else {
        eprintln!("{USAGE_HINT}");
        return ExitCode::FAILURE;
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
