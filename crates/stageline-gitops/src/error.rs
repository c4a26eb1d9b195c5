use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GitOpsError {
    #[error("http request failed: {0}")]
    Http(String),

    #[error("{method} {url} returned {status}: {body}")]
    Status {
        method: &'static str,
        url: String,
        status: u16,
        body: String,
    },

    #[error("failed to decode pin file: {0}")]
    Decode(String),

    #[error("pin file has no `range: '...'` field")]
    MissingPinField,

    #[error("gitops configuration error: {0}")]
    Config(String),
}

pub type GitOpsResult<T> = Result<T, GitOpsError>;
