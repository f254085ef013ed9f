use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Boxed error type accepted at consumer-trait boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Gate-level errors.
///
/// Absence of a session is deliberately *not* represented here: it is a
/// routine outcome handled inside the gate (see
/// [`SessionOutcome`](crate::SessionOutcome)), never an error. Session
/// store failures likewise never surface as errors — the resolver logs
/// them and treats the request as unauthenticated.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum GateError {
    /// Missing or invalid configuration. Fatal at startup; a service with a
    /// bad redirect table or cookie key must not accept requests.
    #[error("configuration error: {0}")]
    Config(String),
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        match self {
            Self::Config(_) => {
                tracing::error!(error = %self, "gate internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
            }
        }
    }
}

/// Resource fetch failures, surfaced as data on
/// [`Resource`](crate::Resource) rather than thrown.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum FetchError {
    /// The backing API answered with a non-success status.
    #[error("fetch failed with status {status}: {body}")]
    Status { status: u16, body: String },

    /// The request never produced a response (connect, DNS, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body did not deserialize into the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
}
