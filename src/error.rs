use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while managing repositories, folds and their
/// transforms.
///
/// Bounds and consistency variants indicate caller errors and fail the whole
/// operation immediately; there are no retries and no degraded read-only
/// mode. A missing metadata or table file surfaces as [`Error::Io`] from the
/// constructor that needed it.
#[derive(Error, Debug)]
pub enum Error {
    #[error("K={k} does not lie between 1 and N={n} inclusive")]
    FoldCountOutOfBounds { k: i64, n: usize },

    #[error("fold {k} is out of bounds 0 <= k <= {max} in {folder}")]
    FoldIndexOutOfBounds {
        k: usize,
        max: usize,
        folder: PathBuf,
    },

    #[error("cannot write a frame that has no backing file")]
    UnboundFrame,

    #[error("{0} already exists and is not empty; delete it first to overwrite")]
    FolderNotEmpty(PathBuf),

    #[error("{rows}x{cols} rotation rejected: expected an orthogonal {m}x{m} matrix")]
    MalformedRotation { rows: usize, cols: usize, m: usize },

    #[error("schema mismatch: expected columns [{expected}], found [{found}]")]
    SchemaMismatch { expected: String, found: String },

    #[error("malformed table {path}: {reason}")]
    MalformedTable { path: PathBuf, reason: String },

    #[error("{context}: need at least {needed} rows, table has {rows}")]
    NotEnoughRows {
        context: &'static str,
        needed: usize,
        rows: usize,
    },

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("reading {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("metadata {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Attach a path to a raw I/O failure.
pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Error {
    Error::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Error {
    Error::Csv {
        path: path.into(),
        source,
    }
}

pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Error {
    Error::Json {
        path: path.into(),
        source,
    }
}

pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Error {
    Error::MalformedTable {
        path: path.into(),
        reason: reason.into(),
    }
}
