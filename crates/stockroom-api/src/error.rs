use thiserror::Error;

/// Top-level error type for the `stockroom-api` crate.
///
/// Covers transport, REST envelope, and WebSocket failures.
/// `stockroom-core` maps these into domain errors (validation, conflict,
/// not-found, network).
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Invalid bearer token header value.
    #[error("Invalid API token: {0}")]
    InvalidToken(String),

    // ── REST API ────────────────────────────────────────────────────
    /// Non-success HTTP status, with whatever the envelope carried.
    #[error("API error (HTTP {status}): {message}")]
    Api {
        status: u16,
        message: String,
        details: Option<serde_json::Value>,
    },

    /// A 2xx response whose envelope reported `success: false`.
    #[error("API rejected request: {message}")]
    Rejected {
        message: String,
        details: Option<serde_json::Value>,
    },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed unexpectedly.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// HTTP status associated with this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Structured `details` object from the response envelope, if any.
    pub fn details(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Api { details, .. } | Self::Rejected { details, .. } => details.as_ref(),
            _ => None,
        }
    }

    /// Returns `true` if the request never reached the server or the
    /// response never came back.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.is_request()
                    || e.is_body()
                    // Body read cut short; the envelope itself is parsed later.
                    || (e.is_decode() && e.status().is_none())
            }
            Self::WebSocketConnect(_) | Self::WebSocketClosed { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Returns `true` if the server reported a dependency conflict.
    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }
}
