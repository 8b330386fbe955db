//! Conversion error types.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why a single asset conversion failed.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Passed scales doesn't match passed files.")]
    MismatchedScales,

    #[error("No files passed.")]
    NoFiles,

    #[error("Multiple SVG scales not supported.")]
    MultipleScales,

    #[error("Scaled SVGs not supported.")]
    ScaledInput,

    #[error("Input image missing density information")]
    MissingDensity,

    /// Reading the source SVG failed; the I/O error is reported as is.
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("failed to create cache directory `{}`", .path.display())]
    CacheDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to decode `{}`", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("failed to render `{}`", .path.display())]
    Render {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("failed to write `{}`", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("rasterizer task failed")]
    Task(#[from] tokio::task::JoinError),

    /// Failure of a memoized step, seen by every caller that waited on it.
    #[error(transparent)]
    Shared(#[from] Arc<ConvertError>),
}

impl ConvertError {
    /// The underlying error, looking through shared (memoized) failures.
    pub fn unshared(&self) -> &ConvertError {
        match self {
            Self::Shared(inner) => inner.unshared(),
            other => other,
        }
    }
}
