use std::path::Path;

use anyhow::Result;
use clap::Args;
use lix_core::clock::format_us;
use lix_core::resolve::content_of;
use serde::Serialize;
use serde_json::Value;

use super::open_lix;
use crate::output::{OutputMode, render_mode};

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Entity id.
    pub entity_id: String,
}

#[derive(Debug, Serialize)]
struct HistoryRow {
    change_id: String,
    commit_id: String,
    author: String,
    created_at_us: i64,
    content: Option<Value>,
}

/// Execute `lix history`: every change to one entity on the active branch,
/// newest first.
///
/// # Errors
///
/// Returns an error if the lix cannot be opened or a snapshot is missing.
pub fn run_history(args: &HistoryArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let lix = open_lix(project_root, None)?;
    let rows = lix
        .entity_history(&args.entity_id)?
        .into_iter()
        .map(|change| {
            Ok(HistoryRow {
                content: content_of(lix.history(), &change)?,
                change_id: change.id.to_string(),
                commit_id: change.commit_id.to_string(),
                author: change.author,
                created_at_us: change.created_at_us,
            })
        })
        .collect::<lix_core::Result<Vec<_>>>()?;

    render_mode(
        output,
        &rows,
        |rows, w| {
            for r in rows {
                let content = r
                    .content
                    .as_ref()
                    .map_or_else(|| "(deleted)".to_string(), Value::to_string);
                writeln!(w, "{}\t{}\t{}\t{content}", r.change_id, format_us(r.created_at_us), r.author)?;
            }
            Ok(())
        },
        |rows, w| {
            if rows.is_empty() {
                return writeln!(w, "No changes to {}.", args.entity_id);
            }
            for r in rows {
                let content = r
                    .content
                    .as_ref()
                    .map_or_else(|| "(deleted)".to_string(), Value::to_string);
                writeln!(w, "{}  {}  {}", format_us(r.created_at_us), r.author, r.change_id)?;
                writeln!(w, "    {content}")?;
            }
            Ok(())
        },
    )
}
