//! Run-level errors.
//!
//! Every fatal failure of a run ends up as a [`BuildError`]. Its
//! [`ErrorKind`] tells the caller which class of failure aborted the run.

use crate::{archive::ArchiveError, compiler::UnitError, manifest::ManifestError};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Unit(#[from] UnitError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("run cancelled")]
    Cancelled,
}

/// Failure classes of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unreadable manifest or colliding output names.
    Configuration,
    /// A requested unit failed to build.
    Unit,
    /// The archive couldn't be written.
    Assembly,
    Cancelled,
}

impl BuildError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Manifest(_) => ErrorKind::Configuration,
            Self::Unit(_) => ErrorKind::Unit,
            Self::Archive(ArchiveError::Collision(_) | ArchiveError::ReservedPageName { .. }) => {
                ErrorKind::Configuration
            }
            Self::Archive(ArchiveError::Io { .. }) => ErrorKind::Assembly,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// The error and all of its sources on one line.
    pub fn report(&self) -> String {
        let mut out = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            out.push_str(": ");
            out.push_str(&err.to_string());
            source = std::error::Error::source(err);
        }
        out
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Configuration => "configuration",
            Self::Unit => "unit",
            Self::Assembly => "assembly",
            Self::Cancelled => "cancelled",
        })
    }
}
