use std::{io, path::Path};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("malformed: {0}")]
    Malformed(String),

    #[error("unsafe path: {0}")]
    UnsafePath(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("unrecoverable: {0}")]
    Unrecoverable(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ManagerError>;

impl ManagerError {
    /// Converts an io failure into the matching kind, prefixed with what was
    /// being attempted and where.
    pub fn io(err: io::Error, action: &str, path: &Path) -> Self {
        let detail = format!("{action} {}: {err}", path.display());
        match err.kind() {
            io::ErrorKind::NotFound => ManagerError::NotFound(detail),
            io::ErrorKind::PermissionDenied => ManagerError::PermissionDenied(detail),
            io::ErrorKind::AlreadyExists => ManagerError::AlreadyExists(detail),
            _ => ManagerError::Other(detail),
        }
    }

    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, ManagerError::Unrecoverable(_))
    }

    pub fn is_permission(&self) -> bool {
        matches!(self, ManagerError::PermissionDenied(_))
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            ManagerError::NotFound(_) => "not_found",
            ManagerError::PermissionDenied(_) => "permission_denied",
            ManagerError::AlreadyExists(_) => "already_exists",
            ManagerError::Malformed(_) => "malformed",
            ManagerError::UnsafePath(_) => "unsafe_path",
            ManagerError::Unsupported(_) => "unsupported",
            ManagerError::Unrecoverable(_) => "unrecoverable",
            ManagerError::Other(_) => "other",
        }
    }
}
