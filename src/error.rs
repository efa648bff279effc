//! Error taxonomy for the fetch/build/link pipeline.
//!
//! Manifest and settings loading report through `anyhow`; everything that can
//! go wrong for a single dependency is a [`DepError`] so the orchestrator can
//! tell which stage failed.

use std::path::PathBuf;
use thiserror::Error;

pub type DepResult<T> = Result<T, DepError>;

#[derive(Error, Debug)]
pub enum DepError {
    #[error("cache path for {name}@{version_ref} is too long ({len} bytes, limit {limit})")]
    PathTooLong {
        name: String,
        version_ref: String,
        len: usize,
        limit: usize,
    },

    #[error("invalid dependency name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("invalid version reference '{version_ref}' for {name}: {reason}")]
    InvalidRef {
        name: String,
        version_ref: String,
        reason: &'static str,
    },

    #[error("failed to clone {name} from {url}: {message}")]
    FetchFailed {
        name: String,
        url: String,
        message: String,
    },

    #[error("version '{version_ref}' not found in {name}")]
    RefNotFound { name: String, version_ref: String },

    #[error("failed to check out {version_ref} of {name}: {message}")]
    CheckoutFailed {
        name: String,
        version_ref: String,
        message: String,
    },

    #[error("build of {name} failed ({status}){}", format_log_tail(.log_tail))]
    BuildFailed {
        name: String,
        status: String,
        log_tail: String,
    },

    #[error("cannot link {artifact}: {link} already exists{}", format_existing(.existing))]
    LinkConflict {
        artifact: String,
        link: PathBuf,
        existing: Option<PathBuf>,
    },

    #[error("permission denied: {}", .path.display())]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error ({context}): {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl DepError {
    /// Wrap an I/O error, promoting `PermissionDenied` to its own variant.
    pub fn io(
        context: impl Into<String>,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            DepError::PermissionDenied {
                path: path.into(),
                source,
            }
        } else {
            DepError::Io {
                context: context.into(),
                source,
            }
        }
    }

    /// Short stage label used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            DepError::PathTooLong { .. } => "PathTooLong",
            DepError::InvalidName { .. } => "InvalidName",
            DepError::InvalidRef { .. } => "InvalidRef",
            DepError::FetchFailed { .. } => "FetchFailed",
            DepError::RefNotFound { .. } => "RefNotFound",
            DepError::CheckoutFailed { .. } => "CheckoutFailed",
            DepError::BuildFailed { .. } => "BuildFailed",
            DepError::LinkConflict { .. } => "LinkConflict",
            DepError::PermissionDenied { .. } => "PermissionDenied",
            DepError::Io { .. } => "Io",
        }
    }
}

fn format_log_tail(tail: &str) -> String {
    if tail.is_empty() {
        String::new()
    } else {
        format!(":\n{}", tail)
    }
}

fn format_existing(existing: &Option<PathBuf>) -> String {
    match existing {
        Some(target) => format!(" (points to {})", target.display()),
        None => String::new(),
    }
}
