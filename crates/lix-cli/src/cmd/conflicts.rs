//! `lix conflicts`: detect, list, and resolve conflicts against a fork.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Subcommand};
use lix_core::db::SqliteHistory;
use lix_core::{ChangeId, Conflict, ConflictReport, LixError};
use serde::Serialize;

use super::open_lix;
use crate::output::{OutputMode, pretty_kv, render, render_mode};

#[derive(Args, Debug)]
pub struct ConflictsArgs {
    #[command(subcommand)]
    pub command: ConflictsCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConflictsCommand {
    /// Compare another lix (the source) against this one (the target).
    Detect {
        /// Project directory of the source lix.
        #[arg(long)]
        source: PathBuf,

        /// Store the detected conflicts in this lix.
        #[arg(long)]
        record: bool,
    },

    /// Conflicts recorded in this lix.
    List,

    /// Mark a recorded conflict resolved by an existing change.
    Resolve {
        change_id: String,
        conflicting_change_id: String,
        resolved_change_id: String,
    },
}

#[derive(Debug, Serialize)]
struct DetectOutput {
    #[serde(flatten)]
    report: ConflictReport,
    recorded: Option<usize>,
}

fn write_conflict(w: &mut dyn std::io::Write, c: &Conflict) -> std::io::Result<()> {
    let resolved = c.resolved_change_id.as_ref().map_or("-", ChangeId::as_str);
    writeln!(w, "{}\t{}\t{resolved}", c.change_id, c.conflicting_change_id)
}

/// Execute `lix conflicts <command>`.
///
/// # Errors
///
/// Returns an error if either lix cannot be opened, a read fails, or the
/// conflict to resolve is not recorded.
pub fn run_conflicts(args: &ConflictsArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let mut lix = open_lix(project_root, None)?;
    match &args.command {
        ConflictsCommand::Detect { source, record } => {
            let source_root = if source.is_absolute() {
                source.clone()
            } else {
                project_root.join(source)
            };
            let source_db = lix_core::config::lix_dir(&source_root).join(lix_core::config::DB_FILE);
            if !source_db.exists() {
                return Err(LixError::NotInitialized(source_root).into());
            }
            let source_history = SqliteHistory::open(&source_db)?;
            let report = lix.detect_conflicts_from(&source_history)?;
            let recorded = if *record {
                Some(lix.record_conflicts(&report.conflicts)?)
            } else {
                None
            };
            let out = DetectOutput { report, recorded };

            render_mode(
                output,
                &out,
                |o, w| {
                    for c in &o.report.conflicts {
                        write_conflict(w, c)?;
                    }
                    Ok(())
                },
                |o, w| {
                    pretty_kv(w, "Candidates", o.report.candidates.to_string())?;
                    pretty_kv(w, "Inserts", o.report.inserts.to_string())?;
                    pretty_kv(w, "Unchanged", o.report.unchanged.to_string())?;
                    pretty_kv(w, "Convergent", o.report.convergent.to_string())?;
                    pretty_kv(w, "Conflicts", o.report.conflicts.len().to_string())?;
                    if let Some(n) = o.recorded {
                        pretty_kv(w, "Recorded", n.to_string())?;
                    }
                    for c in &o.report.conflicts {
                        writeln!(w)?;
                        pretty_kv(w, "Target", c.change_id.as_str())?;
                        pretty_kv(w, "Source", c.conflicting_change_id.as_str())?;
                        pretty_kv(w, "Reason", &c.reason)?;
                    }
                    Ok(())
                },
            )
        }
        ConflictsCommand::List => {
            let conflicts = lix.conflicts()?;
            render(output, &conflicts, |conflicts, w| {
                for c in conflicts {
                    write_conflict(w, c)?;
                }
                Ok(())
            })
        }
        ConflictsCommand::Resolve {
            change_id,
            conflicting_change_id,
            resolved_change_id,
        } => {
            lix.resolve_conflict(
                &ChangeId::new(change_id.as_str()),
                &ChangeId::new(conflicting_change_id.as_str()),
                &ChangeId::new(resolved_change_id.as_str()),
            )?;
            let resolved = serde_json::json!({
                "change_id": change_id,
                "conflicting_change_id": conflicting_change_id,
                "resolved_change_id": resolved_change_id,
            });
            render(output, &resolved, |_, w| {
                writeln!(w, "✓ Resolved {change_id} / {conflicting_change_id}")
            })
        }
    }
}
