//! Error types for figwatch-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by config bootstrapping and figure discovery.
#[derive(Debug, Error)]
pub enum FigwatchError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `dirs::home_dir()` returned `None`; cannot locate `~/.figwatch/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    #[error("not a directory: {path}")]
    NotADirectory { path: PathBuf },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> FigwatchError {
    FigwatchError::Io {
        path: path.into(),
        source,
    }
}
