use snafu::Snafu;

use crate::Error as CrateError;

/// Failures of the transport below the throttle.
///
/// Error statuses from the server are not errors here: the response is handed
/// back as is and the caller decides what a 4xx or 5xx means.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum HttpError {
    /// The request never completed a round trip (connection, DNS, TLS).
    #[snafu(display("HTTP transport error: {}", source))]
    Transport { source: CrateError },

    /// The request was malformed before sending.
    #[snafu(display("Invalid HTTP request: {}", details))]
    InvalidRequest { details: String },

    #[snafu(display("HTTP request timed out"))]
    Timeout,

    /// Other, unspecified HTTP client errors.
    #[snafu(display("Generic HTTP client error: {}", source))]
    ClientError { source: CrateError },
}

impl HttpError {
    /// Whether the request may have failed before reaching the server.
    pub const fn is_connection_failure(&self) -> bool {
        matches!(self, HttpError::Transport { .. } | HttpError::Timeout)
    }
}
