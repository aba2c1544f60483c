// error.rs

use thiserror::Error;

pub type SyncResult<T = ()> = Result<T, SyncError>;

#[derive(Error, Debug, Clone)]
pub enum SyncError {
    #[error("no usable identifier could be derived for {0}")]
    ReferenceUnresolvable(&'static str),

    #[error("every task-fetch strategy failed, last: {0}")]
    FetchExhausted(String),

    #[error("server rejected the mutation: HTTP {status} - {body}")]
    MutationRejected { status: u16, body: String },

    #[error("toggle response carried no boolean under 'done' or 'is_done'")]
    AmbiguousServerResponse,

    #[error("HTTP {status} - {body}")]
    Http { status: u16, body: String },

    #[error("request failed: {0}")]
    Network(String),

    #[error("unexpected response body: {0}")]
    Parse(String),
}

impl SyncError {
    /// Rebrand a transport-level failure as a rejected mutation; everything
    /// else passes through untouched.
    pub fn into_mutation(self) -> SyncError {
        match self {
            SyncError::Http { status, body } => SyncError::MutationRejected { status, body },
            other => other,
        }
    }
}
