use thiserror::Error;

/// Errors surfaced by registry operations.
///
/// Transport and status failures are propagated to the caller unmodified;
/// nothing is retried. Lenient paths (unparsable NuGet report cells, keyed
/// lookups that find no match) return zero or `None` instead of an error.
#[derive(Debug, Error)]
pub enum Error {
    /// The HTTP client itself could not be constructed.
    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),

    /// The request failed before a response arrived (connection, TLS,
    /// timeout).
    #[error("request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The upstream answered with a non-success status code.
    #[error("{url} returned HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    /// A 2xx response whose body is missing an expected key or shape.
    #[error("malformed response from {context}: {detail}")]
    MalformedResponse { context: String, detail: String },
}

impl Error {
    pub(crate) fn malformed(context: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::MalformedResponse {
            context: context.into(),
            detail: detail.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
