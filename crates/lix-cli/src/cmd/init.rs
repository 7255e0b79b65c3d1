use std::path::Path;

use anyhow::Result;
use lix_core::Lix;
use lix_core::config::{CONFIG_FILE, DB_FILE, lix_dir};
use serde::Serialize;

use crate::output::{OutputMode, render};

#[derive(Debug, Serialize)]
struct InitReport {
    config: String,
    database: String,
    branch: String,
}

/// Execute `lix init`. Creates `.lix/config.toml` and `.lix/lix.db` under
/// `project_root`; running it again on an existing lix leaves it intact.
///
/// # Errors
///
/// Returns an error if the directory or database cannot be created.
pub fn run_init(project_root: &Path, output: OutputMode) -> Result<()> {
    let lix = Lix::init(project_root)?;
    let dir = lix_dir(project_root);
    let report = InitReport {
        config: dir.join(CONFIG_FILE).display().to_string(),
        database: dir.join(DB_FILE).display().to_string(),
        branch: lix.branches()?.into_iter().next().map(|b| b.name).unwrap_or_default(),
    };

    render(output, &report, |r, w| {
        writeln!(w, "✓ Initialized lix in {}", project_root.display())?;
        writeln!(w)?;
        writeln!(w, "  Config:   {}", r.config)?;
        writeln!(w, "  Database: {}", r.database)?;
        writeln!(w, "  Branch:   {}", r.branch)
    })
}
