use thiserror::Error;

/// Misuse of the response-start contract by an application.
///
/// These are returned to the application from [`StartResponse`] calls and,
/// when propagated, abort processing of that request.
///
/// [`StartResponse`]: crate::gateway::StartResponse
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("response already started")]
    AlreadyStarted,

    #[error("response body written before the response was started")]
    NotStarted,

    #[error("invalid status line: {status:?}")]
    InvalidStatus { status: String },

    #[error("invalid response header {name:?}")]
    InvalidHeader { name: String },

    /// The application reported an error after the response head had been
    /// committed; the head can no longer change, so the error is handed back.
    #[error("application error after response was committed: {0}")]
    Reraised(#[source] anyhow::Error),
}
