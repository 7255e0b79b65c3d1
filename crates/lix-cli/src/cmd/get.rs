use std::path::Path;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use serde_json::Value;

use super::open_lix;
use crate::output::{OutputMode, render};

#[derive(Args, Debug)]
pub struct GetArgs {
    /// Entity id.
    pub entity_id: String,
}

#[derive(Debug, Serialize)]
struct EntityValue<'a> {
    entity_id: &'a str,
    value: Option<Value>,
}

/// Execute `lix get`: the entity's current value on the active branch.
/// Deleted and never-written entities print `null`.
///
/// # Errors
///
/// Returns an error if the lix cannot be opened or a snapshot is missing.
pub fn run_get(args: &GetArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let lix = open_lix(project_root, None)?;
    let value = EntityValue {
        entity_id: &args.entity_id,
        value: lix.current_value(&args.entity_id)?,
    };
    render(output, &value, |v, w| {
        let body = v
            .value
            .as_ref()
            .map_or_else(|| "null".to_string(), Value::to_string);
        writeln!(w, "{body}")
    })
}
