//! Per-directory configuration in `.lix/config.toml`.
//!
//! Every field has a default, so a missing file or a partial file both load.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LixError, Result};

/// Directory holding a lix history inside a project.
pub const LIX_DIR: &str = ".lix";
/// Config file name inside [`LIX_DIR`].
pub const CONFIG_FILE: &str = "config.toml";
/// Database file name inside [`LIX_DIR`].
pub const DB_FILE: &str = "lix.db";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LixConfig {
    #[serde(default)]
    pub author: AuthorConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorConfig {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: default_timeout_ms(),
            lock_timeout_ms: default_timeout_ms(),
        }
    }
}

impl StorageConfig {
    #[must_use]
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Append every committed change as one JSON line to this file.
    /// Relative paths resolve against the project root.
    #[serde(default)]
    pub jsonl: Option<PathBuf>,
    /// Mirror each entity's current content into files under this
    /// directory. Relative paths resolve against the project root.
    #[serde(default)]
    pub files: Option<PathBuf>,
}

/// User-wide settings from `<config_dir>/lix/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub author: AuthorConfig,
}

const fn default_timeout_ms() -> u64 {
    5_000
}

/// Path of the lix directory under `root`.
#[must_use]
pub fn lix_dir(root: &Path) -> PathBuf {
    root.join(LIX_DIR)
}

/// Load `.lix/config.toml` under `root`, falling back to defaults when the
/// file does not exist.
///
/// # Errors
///
/// Returns [`LixError::Config`] if the file exists but cannot be read or
/// parsed.
pub fn load_config(root: &Path) -> Result<LixConfig> {
    load_toml(&lix_dir(root).join(CONFIG_FILE))
}

/// Load the user-wide config, if the platform has a config directory.
///
/// # Errors
///
/// Returns [`LixError::Config`] if the file exists but cannot be parsed.
pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };
    load_toml(&config_dir.join("lix").join(CONFIG_FILE))
}

/// Project config with the user-wide author filled in where the project
/// leaves it unset.
///
/// # Errors
///
/// Returns [`LixError::Config`] if either file is malformed.
pub fn resolve_config(root: &Path) -> Result<LixConfig> {
    let mut config = load_config(root)?;
    if config.author.name.is_none() {
        config.author.name = load_user_config()?.author.name;
    }
    Ok(config)
}

/// Write a default config file, leaving an existing one untouched.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_default_config(root: &Path) -> Result<PathBuf> {
    let path = lix_dir(root).join(CONFIG_FILE);
    if path.exists() {
        return Ok(path);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(&LixConfig::default())
        .map_err(|e| LixError::Config(format!("serialize default config: {e}")))?;
    std::fs::write(&path, body)?;
    Ok(path)
}

fn load_toml<T: for<'de> Deserialize<'de> + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| LixError::Config(format!("failed to read {}: {e}", path.display())))?;
    toml::from_str(&content)
        .map_err(|e| LixError::Config(format!("failed to parse {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_uses_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cfg = load_config(dir.path()).expect("load should succeed");
        assert_eq!(cfg, LixConfig::default());
        assert_eq!(cfg.storage.busy_timeout(), Duration::from_secs(5));
        assert!(cfg.author.name.is_none());
    }

    #[test]
    fn partial_config_fills_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::create_dir_all(lix_dir(dir.path())).expect("create .lix");
        std::fs::write(
            lix_dir(dir.path()).join(CONFIG_FILE),
            "[author]\nname = \"anna\"\n\n[storage]\nlock_timeout_ms = 250\n",
        )
        .expect("write config");

        let cfg = load_config(dir.path()).expect("load");
        assert_eq!(cfg.author.name.as_deref(), Some("anna"));
        assert_eq!(cfg.storage.lock_timeout(), Duration::from_millis(250));
        assert_eq!(cfg.storage.busy_timeout_ms, 5_000);
        assert!(cfg.export.jsonl.is_none());
        assert!(cfg.export.files.is_none());
    }

    #[test]
    fn export_paths_parse() {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::create_dir_all(lix_dir(dir.path())).expect("create .lix");
        std::fs::write(
            lix_dir(dir.path()).join(CONFIG_FILE),
            "[export]\njsonl = \"out/changes.jsonl\"\nfiles = \"mirror\"\n",
        )
        .expect("write config");

        let cfg = load_config(dir.path()).expect("load");
        assert_eq!(cfg.export.jsonl, Some(PathBuf::from("out/changes.jsonl")));
        assert_eq!(cfg.export.files, Some(PathBuf::from("mirror")));
    }

    #[test]
    fn malformed_config_is_a_config_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::create_dir_all(lix_dir(dir.path())).expect("create .lix");
        std::fs::write(lix_dir(dir.path()).join(CONFIG_FILE), "[author\nname=").expect("write");

        let err = load_config(dir.path()).unwrap_err();
        assert!(matches!(err, LixError::Config(msg) if msg.contains("config.toml")));
    }

    #[test]
    fn default_config_round_trips() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = write_default_config(dir.path()).expect("write default");
        assert!(path.exists());
        assert_eq!(load_config(dir.path()).expect("load"), LixConfig::default());
    }
}
