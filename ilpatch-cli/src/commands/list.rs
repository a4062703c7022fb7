use ilpatch::{patch::Patch, patches::default_patch_set};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    output::{print_output, Align, TabWriter},
};

#[derive(Debug, Serialize)]
struct PatchEntry {
    name: String,
    description: String,
}

pub fn run(opts: &GlobalOptions) -> anyhow::Result<()> {
    let set = default_patch_set()?;
    let entries: Vec<PatchEntry> = set
        .iter()
        .map(|patch| PatchEntry {
            name: Patch::name(patch).to_string(),
            description: Patch::description(patch).to_string(),
        })
        .collect();

    print_output(&entries, opts, |entries| {
        let mut tw = TabWriter::new(vec![("Patch", Align::Left), ("Description", Align::Left)]);
        for entry in entries {
            tw.row(vec![entry.name.clone(), entry.description.clone()]);
        }
        tw.print();
    })
}
