//! `lix branch`: list, create, switch, and find where two branches meet.

use std::path::Path;

use anyhow::Result;
use clap::{Args, Subcommand};
use lix_core::{Branch, CommitId, History};
use serde::Serialize;

use super::open_lix;
use crate::output::{OutputMode, render};

#[derive(Args, Debug)]
pub struct BranchArgs {
    #[command(subcommand)]
    pub command: BranchCommand,
}

#[derive(Subcommand, Debug)]
pub enum BranchCommand {
    /// List branches; the active one is marked with `*`.
    List,

    /// Create a branch at the active head, or at `--from`.
    Create {
        name: String,

        /// Commit the new branch points at.
        #[arg(long)]
        from: Option<String>,
    },

    /// Make a branch active.
    Switch { name: String },

    /// Latest commit both branches contain.
    MergeBase { a: String, b: String },
}

#[derive(Debug, Serialize)]
struct BranchRow {
    name: String,
    head: Option<CommitId>,
    active: bool,
}

#[derive(Debug, Serialize)]
struct MergeBaseReport<'a> {
    a: &'a str,
    b: &'a str,
    merge_base: Option<CommitId>,
}

fn head_label(head: Option<&CommitId>) -> &str {
    head.map_or("(empty)", CommitId::as_str)
}

/// Execute `lix branch <command>`.
///
/// # Errors
///
/// Returns an error for unknown branches or commits, or a taken name.
pub fn run_branch(
    args: &BranchArgs,
    author: Option<&str>,
    output: OutputMode,
    project_root: &Path,
) -> Result<()> {
    let mut lix = open_lix(project_root, author)?;
    match &args.command {
        BranchCommand::List => {
            let active = lix.history().active_branch()?.name;
            let rows: Vec<BranchRow> = lix
                .branches()?
                .into_iter()
                .map(|b| BranchRow {
                    active: b.name == active,
                    name: b.name,
                    head: b.head,
                })
                .collect();
            render(output, &rows, |rows, w| {
                for r in rows {
                    let marker = if r.active { "*" } else { " " };
                    writeln!(w, "{marker} {}\t{}", r.name, head_label(r.head.as_ref()))?;
                }
                Ok(())
            })
        }
        BranchCommand::Create { name, from } => {
            let from = from.as_deref().map(CommitId::new);
            let branch = lix.create_branch(name, from.as_ref())?;
            render_branch(output, "Created", &branch)
        }
        BranchCommand::Switch { name } => {
            let branch = lix.switch_branch(name)?;
            render_branch(output, "Switched to", &branch)
        }
        BranchCommand::MergeBase { a, b } => {
            let report = MergeBaseReport {
                a,
                b,
                merge_base: lix.merge_base(a, b)?,
            };
            render(output, &report, |r, w| {
                writeln!(w, "{}", r.merge_base.as_ref().map_or("(none)", CommitId::as_str))
            })
        }
    }
}

fn render_branch(output: OutputMode, verb: &str, branch: &Branch) -> Result<()> {
    render(output, branch, |b, w| {
        writeln!(w, "✓ {verb} branch {} at {}", b.name, head_label(b.head.as_ref()))
    })
}
