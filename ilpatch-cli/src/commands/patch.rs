use std::path::Path;

use anyhow::{bail, Context};
use ilpatch::{
    patch::{PatchReport, PatchSession},
    patches::{default_patch_set, REFERENCE_MODULES},
};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    output::{print_output, Align, TabWriter},
};

pub const SUCCESS: &str = "Success! Don't forget to run patcher again when game updates.";

#[derive(Debug, Serialize)]
struct AppliedPatch {
    name: String,
    method: String,
    replaced: usize,
    inserted: usize,
}

#[derive(Debug, Serialize)]
struct PatchOutput {
    target: String,
    module: String,
    sha1_before: String,
    sha1_after: String,
    written: bool,
    patches: Vec<AppliedPatch>,
}

impl From<PatchReport> for PatchOutput {
    fn from(report: PatchReport) -> Self {
        PatchOutput {
            target: report.target.display().to_string(),
            module: report.module,
            sha1_before: report.sha1_before,
            sha1_after: report.sha1_after,
            written: report.written,
            patches: report
                .outcomes
                .into_iter()
                .map(|outcome| AppliedPatch {
                    name: outcome.name,
                    method: outcome.method,
                    replaced: outcome.replaced,
                    inserted: outcome.inserted,
                })
                .collect(),
        }
    }
}

pub fn run(path: &Path, dry_run: bool, opts: &GlobalOptions) -> anyhow::Result<()> {
    if !path.is_file() {
        bail!("Invalid file provided.");
    }

    let set = default_patch_set()?;
    let mut session = PatchSession::open(path, REFERENCE_MODULES)
        .with_context(|| format!("Error opening '{}'", path.display()))?;
    session.apply(&set).context("Patching error")?;

    let report = if dry_run {
        session.dry_run().context("Patching error")?
    } else {
        session.commit().with_context(|| {
            format!("Unable to save patched game assembly to {}", path.display())
        })?
    };

    print_output(&PatchOutput::from(report), opts, |out| {
        let mut tw = TabWriter::new(vec![
            ("Patch", Align::Left),
            ("Method", Align::Left),
            ("Replaced", Align::Right),
            ("Inserted", Align::Right),
        ])
        .indent("  ");
        for patch in &out.patches {
            tw.row(vec![
                patch.name.clone(),
                patch.method.clone(),
                patch.replaced.to_string(),
                patch.inserted.to_string(),
            ]);
        }
        println!("{} ({})", out.target, out.module);
        tw.print();
        println!("  sha1 {} -> {}", out.sha1_before, out.sha1_after);

        if out.written {
            println!("{SUCCESS}");
        } else {
            println!("Dry run complete, {} left unchanged.", out.target);
        }
    })
}
