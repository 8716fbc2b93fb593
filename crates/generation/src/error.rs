use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    /// Required credential or model id missing; raised before any I/O.
    #[error("generation not configured: {0}")]
    NotConfigured(String),
    #[error("unknown generation type: {0}")]
    UnknownKind(String),
    #[error("missing template parameter: {0}")]
    MissingParam(String),
    #[error("template error: {0}")]
    Template(String),
    /// Network or API failure, distinct from cancellation.
    #[error("generation request failed: {0}")]
    Transport(String),
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
    #[error("avatar save failed: {0}")]
    Io(#[from] std::io::Error),
}
