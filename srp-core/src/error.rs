use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PanelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("missing input file: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("corrupt archive: {0}")]
    CorruptArchive(String),

    #[error("upstream tool error: {0}")]
    Upstream(String),

    #[error("index out of range: {0}")]
    IndexOutOfRange(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("selector type mismatch: {0}")]
    TypeMismatch(String),
}

pub type Result<T> = std::result::Result<T, PanelError>;
