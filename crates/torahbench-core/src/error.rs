//! Errors raised while discovering and loading packages.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// What kind of package a lookup was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageKind {
    Evaluation,
    Implementation,
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageKind::Evaluation => f.write_str("evaluation"),
            PackageKind::Implementation => f.write_str("implementation"),
        }
    }
}

#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// Package directory or descriptor does not exist
    #[error("{kind} '{name}' not found")]
    NotFound { kind: PackageKind, name: String },

    /// Something exists on disk but could not be read
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The package was found but its module could not be instantiated
    #[error("failed to load {target}: {source}")]
    LoadFailed {
        target: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

impl DiscoveryError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DiscoveryError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn load_failed(target: impl Into<String>, source: anyhow::Error) -> Self {
        DiscoveryError::LoadFailed {
            target: target.into(),
            source: source.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DiscoveryError::NotFound { .. })
    }
}

pub type DiscoveryResult<T> = std::result::Result<T, DiscoveryError>;
