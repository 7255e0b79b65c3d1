pub mod account;
pub mod branch;
pub mod completions;
pub mod conflicts;
pub mod edit;
pub mod fork;
pub mod get;
pub mod history;
pub mod init;
pub mod log;
pub mod show;

use std::path::Path;

use anyhow::Result;
use lix_core::Lix;

/// Open the lix under `root`, with `author` overriding every other source.
pub fn open_lix(root: &Path, author: Option<&str>) -> Result<Lix> {
    Ok(Lix::open_as(root, author)?)
}
