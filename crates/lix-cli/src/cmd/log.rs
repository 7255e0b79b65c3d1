//! `lix log`: commits on the active branch, newest first.

use std::path::Path;

use anyhow::Result;
use clap::Args;
use lix_core::CommitId;
use lix_core::clock::format_us;

use super::open_lix;
use crate::output::{OutputMode, pretty_kv, pretty_rule, render_mode};

#[derive(Args, Debug)]
pub struct LogArgs {
    /// Maximum number of commits to show.
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

/// Execute `lix log`.
///
/// # Errors
///
/// Returns an error if the lix cannot be opened or read.
pub fn run_log(args: &LogArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let lix = open_lix(project_root, None)?;
    let mut commits = lix.log()?;
    if let Some(limit) = args.limit {
        commits.truncate(limit);
    }

    render_mode(
        output,
        &commits,
        |commits, w| {
            for c in commits {
                writeln!(
                    w,
                    "{}\t{}\t{}\t{}",
                    c.id,
                    format_us(c.created_at_us),
                    c.author,
                    c.description
                )?;
            }
            Ok(())
        },
        |commits, w| {
            if commits.is_empty() {
                return writeln!(w, "No commits yet.");
            }
            for c in commits {
                writeln!(w, "commit {}", c.id)?;
                pretty_kv(w, "Author", &c.author)?;
                pretty_kv(w, "Date", format_us(c.created_at_us))?;
                if c.parent_ids.len() > 1 {
                    let parents: Vec<&str> = c.parent_ids.iter().map(CommitId::as_str).collect();
                    pretty_kv(w, "Merge", parents.join(" "))?;
                }
                if !c.description.is_empty() {
                    writeln!(w)?;
                    writeln!(w, "    {}", c.description)?;
                }
                pretty_rule(w)?;
            }
            Ok(())
        },
    )
}
