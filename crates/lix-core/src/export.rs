//! Post-commit export sinks.
//!
//! Exporters run after a commit is durable and outside its transaction. A
//! failing exporter is logged and reported, never propagated: the change log
//! is the source of truth and an export can always be redone from it.
//!
//! An exporter advertises what it handles through [`ExportCapabilities`]:
//!
//! - `files`: [`Exporter::export_files`] mirrors entity state into files
//! - `messages`: [`Exporter::save_messages`] receives every committed change

use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::model::{Change, Commit};

/// Errors raised by an exporter.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("export i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("export serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("export rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExportCapabilities {
    pub files: bool,
    pub messages: bool,
}

/// A committed change together with its content (`None` for tombstones).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportedChange {
    #[serde(flatten)]
    pub change: Change,
    pub content: Option<Value>,
}

/// Everything one commit wrote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportBatch {
    pub commit: Commit,
    pub changes: Vec<ExportedChange>,
}

pub trait Exporter {
    /// Short name for logs and reports.
    fn name(&self) -> &str;

    fn capabilities(&self) -> ExportCapabilities;

    /// Mirror the batch into files.
    ///
    /// # Errors
    ///
    /// Implementation-defined; the pipeline logs and reports failures.
    fn export_files(&mut self, batch: &ExportBatch) -> Result<(), ExportError> {
        let _ = batch;
        Ok(())
    }

    /// Persist the batch's changes as messages.
    ///
    /// # Errors
    ///
    /// Implementation-defined; the pipeline logs and reports failures.
    fn save_messages(&mut self, batch: &ExportBatch) -> Result<(), ExportError> {
        let _ = batch;
        Ok(())
    }
}

/// Outcome of running every exporter over one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportReport {
    pub succeeded: Vec<String>,
    /// `(exporter name, error message)`.
    pub failed: Vec<(String, String)>,
}

impl ExportReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// The registered exporters, invoked in registration order.
#[derive(Default)]
pub struct ExportPipeline {
    exporters: Vec<Box<dyn Exporter>>,
}

impl std::fmt::Debug for ExportPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.exporters.iter().map(|e| e.name().to_string()))
            .finish()
    }
}

impl ExportPipeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, exporter: Box<dyn Exporter>) {
        self.exporters.push(exporter);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.exporters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.exporters.is_empty()
    }

    /// Run every exporter over `batch`, calling each capability it
    /// advertises.
    pub fn run(&mut self, batch: &ExportBatch) -> ExportReport {
        let mut report = ExportReport::default();
        for exporter in &mut self.exporters {
            let caps = exporter.capabilities();
            let mut result = Ok(());
            if caps.files {
                result = exporter.export_files(batch);
            }
            if caps.messages && result.is_ok() {
                result = exporter.save_messages(batch);
            }

            let name = exporter.name().to_string();
            match result {
                Ok(()) => {
                    debug!(exporter = %name, commit = %batch.commit.id, "export finished");
                    report.succeeded.push(name);
                }
                Err(e) => {
                    warn!(exporter = %name, commit = %batch.commit.id, error = %e, "export failed");
                    report.failed.push((name, e.to_string()));
                }
            }
        }
        report
    }
}

// ---------------------------------------------------------------------------
// JSONL message log
// ---------------------------------------------------------------------------

/// Appends one JSON line per committed change.
#[derive(Debug, Clone)]
pub struct JsonlExporter {
    path: PathBuf,
}

impl JsonlExporter {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Exporter for JsonlExporter {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn capabilities(&self) -> ExportCapabilities {
        ExportCapabilities {
            files: false,
            messages: true,
        }
    }

    fn save_messages(&mut self, batch: &ExportBatch) -> Result<(), ExportError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut buf = String::new();
        for change in &batch.changes {
            buf.push_str(&serde_json::to_string(change)?);
            buf.push('\n');
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(buf.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Per-entity file mirror
// ---------------------------------------------------------------------------

/// Mirrors each entity's latest content to `<root>/<entity_type>/<entity_id>.json`.
/// Tombstones remove the file.
///
/// Both path segments are percent-escaped by [`escape_segment`], so distinct
/// entities never share a file.
#[derive(Debug, Clone)]
pub struct FileMirrorExporter {
    root: PathBuf,
}

impl FileMirrorExporter {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn file_for(&self, change: &Change) -> PathBuf {
        self.root
            .join(escape_segment(&change.entity_type))
            .join(format!("{}.json", escape_segment(&change.entity_id)))
    }
}

/// Escape `segment` for use as one path component.
///
/// `[A-Za-z0-9_-]` pass through, as does `.` anywhere but the first byte.
/// Every other byte, `%` included, becomes `%XX`. The mapping is injective
/// and never yields `.`, `..`, or a separator.
#[must_use]
pub fn escape_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for (i, byte) in segment.bytes().enumerate() {
        let plain = byte.is_ascii_alphanumeric()
            || matches!(byte, b'-' | b'_')
            || (byte == b'.' && i > 0);
        if plain {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "%{byte:02X}");
        }
    }
    out
}

impl Exporter for FileMirrorExporter {
    fn name(&self) -> &str {
        "file-mirror"
    }

    fn capabilities(&self) -> ExportCapabilities {
        ExportCapabilities {
            files: true,
            messages: false,
        }
    }

    fn export_files(&mut self, batch: &ExportBatch) -> Result<(), ExportError> {
        for exported in &batch.changes {
            let path = self.file_for(&exported.change);
            match &exported.content {
                Some(content) => {
                    if let Some(parent) = path.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    fs::write(&path, serde_json::to_vec_pretty(content)?)?;
                }
                None => match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                },
            }
        }
        Ok(())
    }
}
