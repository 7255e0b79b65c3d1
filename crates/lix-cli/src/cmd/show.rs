//! `lix show`: one commit and the before/after content of its changes.

use std::path::Path;

use anyhow::Result;
use clap::Args;
use lix_core::clock::format_us;
use lix_core::{Commit, CommitId, EntityDiff, History, LixError, RecordKind};
use serde::Serialize;
use serde_json::Value;

use super::open_lix;
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Commit id.
    pub commit_id: String,
}

#[derive(Debug, Serialize)]
struct CommitDetail {
    commit: Commit,
    changes: Vec<EntityDiff>,
}

fn describe(value: Option<&Value>) -> String {
    value.map_or_else(|| "(none)".to_string(), Value::to_string)
}

/// Execute `lix show`.
///
/// # Errors
///
/// Returns [`LixError::NotFound`] for an unknown commit.
pub fn run_show(args: &ShowArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let lix = open_lix(project_root, None)?;
    let id = CommitId::new(args.commit_id.as_str());
    let commit = lix
        .history()
        .commit(&id)?
        .ok_or_else(|| LixError::NotFound {
            kind: RecordKind::Commit,
            id: args.commit_id.clone(),
        })?;
    let detail = CommitDetail {
        changes: lix.diff(&id)?,
        commit,
    };

    render_mode(
        output,
        &detail,
        |d, w| {
            for diff in &d.changes {
                writeln!(
                    w,
                    "{}\t{}\t{}\t{}",
                    diff.change.entity_type,
                    diff.change.entity_id,
                    describe(diff.before.as_ref()),
                    describe(diff.after.as_ref())
                )?;
            }
            Ok(())
        },
        |d, w| {
            pretty_section(w, &format!("commit {}", d.commit.id))?;
            pretty_kv(w, "Author", &d.commit.author)?;
            pretty_kv(w, "Date", format_us(d.commit.created_at_us))?;
            if !d.commit.description.is_empty() {
                pretty_kv(w, "Message", &d.commit.description)?;
            }
            for diff in &d.changes {
                writeln!(w)?;
                writeln!(w, "{}/{}", diff.change.entity_type, diff.change.entity_id)?;
                writeln!(w, "  - {}", describe(diff.before.as_ref()))?;
                writeln!(w, "  + {}", describe(diff.after.as_ref()))?;
            }
            Ok(())
        },
    )
}
