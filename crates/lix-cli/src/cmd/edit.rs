//! `lix set` and `lix delete`: one-change commits on the active branch.

use std::path::Path;

use anyhow::Result;
use clap::Args;
use lix_core::{CommitOutcome, Edit};
use serde_json::Value;

use super::open_lix;
use crate::output::{OutputMode, pretty_kv, render_mode};

#[derive(Args, Debug)]
pub struct SetArgs {
    /// Entity type, e.g. `variant`.
    pub entity_type: String,

    /// Entity id.
    pub entity_id: String,

    /// New content. Parsed as JSON; anything that is not valid JSON is
    /// stored as a string.
    pub content: String,

    /// Commit description.
    #[arg(short, long, default_value = "")]
    pub message: String,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    pub entity_type: String,

    pub entity_id: String,

    /// Commit description.
    #[arg(short, long, default_value = "")]
    pub message: String,
}

/// Interpret a command-line value as JSON, falling back to a plain string.
pub fn parse_content(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Execute `lix set`.
///
/// # Errors
///
/// Returns an error if the lix cannot be opened or the commit fails.
pub fn run_set(
    args: &SetArgs,
    author: Option<&str>,
    output: OutputMode,
    project_root: &Path,
) -> Result<()> {
    let mut lix = open_lix(project_root, author)?;
    let edit = Edit::set(&args.entity_type, &args.entity_id, parse_content(&args.content));
    let outcome = lix.commit(&args.message, vec![edit])?;
    render_outcome(output, &outcome)
}

/// Execute `lix delete`.
///
/// # Errors
///
/// Returns an error if the lix cannot be opened or the commit fails.
pub fn run_delete(
    args: &DeleteArgs,
    author: Option<&str>,
    output: OutputMode,
    project_root: &Path,
) -> Result<()> {
    let mut lix = open_lix(project_root, author)?;
    let outcome = lix.commit(&args.message, vec![Edit::delete(&args.entity_type, &args.entity_id)])?;
    render_outcome(output, &outcome)
}

fn render_outcome(output: OutputMode, outcome: &CommitOutcome) -> Result<()> {
    for (name, error) in &outcome.export.failed {
        eprintln!("warning: exporter {name} failed: {error}");
    }
    render_mode(
        output,
        outcome,
        |o, w| writeln!(w, "{}", o.commit.id),
        |o, w| {
            writeln!(w, "✓ Committed {}", o.commit.id)?;
            pretty_kv(w, "Author", &o.commit.author)?;
            for change in &o.changes {
                let verb = if change.is_tombstone() { "delete" } else { "set" };
                pretty_kv(w, verb, format!("{}/{}", change.entity_type, change.entity_id))?;
            }
            Ok(())
        },
    )
}
