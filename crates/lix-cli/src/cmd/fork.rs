use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::output::{OutputMode, render};

#[derive(Args, Debug)]
pub struct ForkArgs {
    /// Directory to create the copy in. Must not already hold history.
    pub dest: PathBuf,
}

#[derive(Debug, Serialize)]
struct ForkReport {
    dest: String,
    commits: usize,
    changes: usize,
}

/// Execute `lix fork`: copy every commit, change, snapshot, and branch into
/// a new lix at `dest`, keeping ids so the two can later be compared.
///
/// # Errors
///
/// Returns an error if `dest` already has history or the copy fails.
pub fn run_fork(args: &ForkArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let lix = super::open_lix(project_root, None)?;
    let dest = if args.dest.is_absolute() {
        args.dest.clone()
    } else {
        project_root.join(&args.dest)
    };
    let (_, copied) = lix.fork_to(&dest)?;
    let report = ForkReport {
        dest: dest.display().to_string(),
        commits: copied.commits_copied,
        changes: copied.changes_copied,
    };
    render(output, &report, |r, w| {
        writeln!(
            w,
            "✓ Forked {} commits ({} changes) into {}",
            r.commits, r.changes, r.dest
        )
    })
}
