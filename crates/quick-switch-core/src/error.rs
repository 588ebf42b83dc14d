use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Machine-readable failure tag carried on the wire next to the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NoActiveProject,
    DuplicateProject,
    WorkspaceExists,
    WorkspaceNameInvalid,
    InvalidParams,
    UnknownMethod,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("no project opened")]
    NoActiveProjectOpen,
    #[error("project already exists: {0}")]
    DuplicateProject(String),
    #[error("workspace already exists: {0}")]
    WorkspaceAlreadyExists(String),
    #[error("workspace name must match [a-z0-9-]+: {0:?}")]
    WorkspaceNameInvalid(String),
    #[error("workspace name pattern does not compile: {0}")]
    NamePattern(String),
}

impl ModelError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NoActiveProjectOpen => ErrorCode::NoActiveProject,
            Self::DuplicateProject(_) => ErrorCode::DuplicateProject,
            Self::WorkspaceAlreadyExists(_) => ErrorCode::WorkspaceExists,
            Self::WorkspaceNameInvalid(_) => ErrorCode::WorkspaceNameInvalid,
            Self::NamePattern(_) => ErrorCode::InvalidParams,
        }
    }
}

/// Reasons a config load could not produce a document.
///
/// A missing file is not represented here; the store reports it as
/// [`crate::store::Loaded::Absent`].
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot access config file {path}: {source}")]
    AccessDenied { path: PathBuf, source: io::Error },
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("malformed config file {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

impl LoadError {
    /// Access and read failures keep a visible error indicator until the
    /// next successful load. Malformed documents only reset the model.
    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::AccessDenied { .. } | Self::Read { .. })
    }
}
