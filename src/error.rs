//! Proxy error taxonomy
//!
//! Every failure on the proxy route is one of these kinds. Each kind maps to
//! exactly one HTTP status and a plain-text reason shown to the client.

use hyper::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    /// The client did not supply a non-blank `url` query parameter
    #[error("Missing 'url' parameter")]
    MissingParameter,

    /// The upstream answered with a non-success status
    #[error("HTTP Error: {reason}")]
    UpstreamHttp { status: StatusCode, reason: String },

    /// DNS, connect, TLS, or wait-time failure reaching the upstream
    #[error("URL Error: {0}")]
    UpstreamUnreachable(String),

    /// Anything else that went wrong while fetching, decoding, or serializing
    #[error("Server Error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// HTTP status sent back to the client for this error
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::MissingParameter => StatusCode::BAD_REQUEST,
            Self::UpstreamHttp { status, .. } => *status,
            Self::UpstreamUnreachable(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Build the error for an upstream non-success status.
    ///
    /// `phrase` is the reason phrase the upstream actually sent, when it
    /// differs from the standard one for `status`.
    pub fn upstream_status(status: StatusCode, phrase: Option<&[u8]>) -> Self {
        let reason = match phrase {
            Some(bytes) if !bytes.is_empty() => String::from_utf8_lossy(bytes).into_owned(),
            _ => status.canonical_reason().unwrap_or("Unknown").to_string(),
        };
        Self::UpstreamHttp { status, reason }
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        let reason = error_chain(&err);
        if err.is_builder() {
            // Unparseable URL or unsupported scheme, nothing was sent
            Self::Internal(reason)
        } else if err.is_timeout() || err.is_connect() || err.is_request() {
            Self::UpstreamUnreachable(reason)
        } else {
            Self::Internal(reason)
        }
    }
}

impl From<serde_json::Error> for ProxyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Render an error and all of its sources as one line.
///
/// reqwest's top-level message only names the URL; the resolver or socket
/// failure lives further down the chain.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
