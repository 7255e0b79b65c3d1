use std::fmt;
use std::path::PathBuf;

use crate::lock::LockError;
use crate::model::{ChangeId, CommitId};

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    NotFound,
    DanglingParent,
    InvalidInput,
    IntegrityViolation,
    StorageFailure,
    LockContention,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::NotFound => "E2001",
            Self::DanglingParent => "E2002",
            Self::InvalidInput => "E2003",
            Self::IntegrityViolation => "E3001",
            Self::StorageFailure => "E5001",
            Self::LockContention => "E5002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Lix not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::NotFound => "Record not found",
            Self::DanglingParent => "Commit references an unknown parent",
            Self::InvalidInput => "Invalid input",
            Self::IntegrityViolation => "History integrity violation",
            Self::StorageFailure => "Storage failure",
            Self::LockContention => "Lock contention",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `lix init` to initialize this directory."),
            Self::ConfigParseError => Some("Fix syntax in .lix/config.toml and retry."),
            Self::NotFound => None,
            Self::DanglingParent => Some("Create parent commits before their children."),
            Self::InvalidInput => None,
            Self::IntegrityViolation => {
                Some("The history references missing records. Restore it from a good copy.")
            }
            Self::StorageFailure => Some("Check disk space and write permissions."),
            Self::LockContention => Some("Retry after the other writer releases its lock."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// The kind of record a [`LixError::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Snapshot,
    Change,
    Commit,
    Entity,
    Branch,
    Conflict,
    Account,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Snapshot => "snapshot",
            Self::Change => "change",
            Self::Commit => "commit",
            Self::Entity => "entity",
            Self::Branch => "branch",
            Self::Conflict => "conflict",
            Self::Account => "account",
        };
        f.write_str(name)
    }
}

/// Errors raised by the change-tracking core.
#[derive(Debug, thiserror::Error)]
pub enum LixError {
    /// A referenced record does not exist. Callers may treat this as "no value".
    #[error("{kind} not found: {id}")]
    NotFound { kind: RecordKind, id: String },

    /// Commit creation referenced a parent that is not in the graph.
    #[error("commit {commit} references unknown parent {parent}")]
    DanglingParent { commit: CommitId, parent: CommitId },

    /// A stored record references something that should exist but does not.
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not a lix directory: {}", .0.display())]
    NotInitialized(PathBuf),

    #[error("config error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl LixError {
    pub(crate) fn not_found(kind: RecordKind, id: impl fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub(crate) fn missing_snapshot(change: &ChangeId, snapshot: impl fmt::Display) -> Self {
        Self::IntegrityViolation(format!(
            "change {change} references missing snapshot {snapshot}"
        ))
    }

    pub(crate) fn missing_commit(change: &ChangeId, commit: &CommitId) -> Self {
        Self::IntegrityViolation(format!(
            "change {change} references missing commit {commit}"
        ))
    }

    /// `true` for the recoverable [`LixError::NotFound`] case.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::DanglingParent { .. } => ErrorCode::DanglingParent,
            Self::IntegrityViolation(_) => ErrorCode::IntegrityViolation,
            Self::InvalidInput(_) | Self::Serialize(_) => ErrorCode::InvalidInput,
            Self::NotInitialized(_) => ErrorCode::NotInitialized,
            Self::Config(_) => ErrorCode::ConfigParseError,
            Self::Storage(_) | Self::Io(_) => ErrorCode::StorageFailure,
            Self::Lock(err) => err.code(),
        }
    }

    /// Optional remediation hint for operators and agents.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

pub type Result<T> = std::result::Result<T, LixError>;
