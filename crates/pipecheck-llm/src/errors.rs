use thiserror::Error;

/// Failure reported by a model client or by structured-output interpretation.
///
/// `Parse` is kept apart from the transport variants so callers can tell a
/// malformed reply from a call that never produced one.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("model request failed: {0}")]
    Request(String),
    #[error("model endpoint returned status {status}: {body}")]
    Http { status: u16, body: String },
    #[error("structured output did not match schema: {0}")]
    Parse(String),
}

impl ModelError {
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse(_))
    }
}
