use thiserror::Error;

/// Failure kinds surfaced by the match engine. Validation errors are
/// returned synchronously and never partially applied; storage conflicts
/// during match formation are resolved internally and do not appear here.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("user or match not found")]
    NotFound,

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0}")]
    InvalidContent(&'static str),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
