use std::fmt;

use serde_json::Value as JsonValue;

/// Closed set of failure categories.
///
/// Callers branch on the kind, never on provider-specific strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller-supplied input was rejected before any network call.
    Validation,
    /// Provider rejected the request content (4xx other than 429).
    BadRequest,
    /// Credential missing or rejected.
    Unauthorized,
    /// Target resource does not exist.
    NotFound,
    /// Provider throttling (429).
    RateLimited,
    /// Provider 5xx, or a success response that could not be decoded.
    UpstreamUnavailable,
    /// Request exceeded its per-attempt timeout.
    TransportTimeout,
    /// Connection-level failure (DNS, refused, reset).
    TransportFailure,
    /// Shared cache unreachable. Only ever logged, never returned by a call.
    CacheUnavailable,
}

impl ErrorKind {
    /// Stable kebab-case name used in log records and tool envelopes.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::BadRequest => "bad-request",
            Self::Unauthorized => "unauthorized",
            Self::NotFound => "not-found",
            Self::RateLimited => "rate-limited",
            Self::UpstreamUnavailable => "upstream-unavailable",
            Self::TransportTimeout => "transport-timeout",
            Self::TransportFailure => "transport-failure",
            Self::CacheUnavailable => "cache-unavailable",
        }
    }

    /// Numeric code for a JSON-RPC error envelope.
    pub fn rpc_code(self) -> i64 {
        match self {
            Self::Validation => -32602,
            Self::BadRequest => -32001,
            Self::Unauthorized => -32002,
            Self::NotFound => -32003,
            Self::RateLimited => -32004,
            Self::UpstreamUnavailable => -32005,
            Self::TransportTimeout => -32006,
            Self::TransportFailure => -32007,
            Self::CacheUnavailable => -32008,
        }
    }

    /// Whether the executor retries an attempt that ended in this kind.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::RateLimited
                | Self::UpstreamUnavailable
                | Self::TransportTimeout
                | Self::TransportFailure
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type returned by this crate.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct DomainError {
    /// Category from the closed taxonomy.
    pub kind: ErrorKind,
    /// Stable, human-readable message. Never contains raw socket errors.
    pub message: String,
    /// HTTP status when the provider answered.
    pub status: Option<u16>,
    /// Provider-supplied error code, when present in the body.
    pub provider_code: Option<String>,
    /// Structured diagnostics (provider body, transport error text).
    pub detail: Option<JsonValue>,
}

impl DomainError {
    /// Error of `kind` with a stable message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            provider_code: None,
            detail: None,
        }
    }

    /// Input rejected before any I/O.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub(crate) fn cache_unavailable(source: impl fmt::Display) -> Self {
        Self::new(ErrorKind::CacheUnavailable, "shared cache unavailable")
            .with_detail(serde_json::json!({ "source": source.to_string() }))
    }

    /// Attaches the HTTP status.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attaches the provider's error code.
    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    /// Attaches structured diagnostics.
    pub fn with_detail(mut self, detail: JsonValue) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// JSON-RPC style error object: `{code, message, data}`.
    pub fn to_rpc_error(&self) -> JsonValue {
        let mut data = serde_json::Map::new();
        data.insert("kind".to_owned(), self.kind.as_str().into());
        if let Some(status) = self.status {
            data.insert("status".to_owned(), status.into());
        }
        if let Some(code) = &self.provider_code {
            data.insert("provider_code".to_owned(), code.clone().into());
        }
        serde_json::json!({
            "code": self.kind.rpc_code(),
            "message": self.message,
            "data": data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{DomainError, ErrorKind};

    #[test]
    fn only_transient_kinds_are_retryable() {
        let retryable: Vec<_> = [
            ErrorKind::Validation,
            ErrorKind::BadRequest,
            ErrorKind::Unauthorized,
            ErrorKind::NotFound,
            ErrorKind::RateLimited,
            ErrorKind::UpstreamUnavailable,
            ErrorKind::TransportTimeout,
            ErrorKind::TransportFailure,
            ErrorKind::CacheUnavailable,
        ]
        .into_iter()
        .filter(|kind| kind.is_retryable())
        .collect();

        assert_eq!(
            retryable,
            vec![
                ErrorKind::RateLimited,
                ErrorKind::UpstreamUnavailable,
                ErrorKind::TransportTimeout,
                ErrorKind::TransportFailure,
            ]
        );
    }

    #[test]
    fn display_leads_with_kind() {
        let err = DomainError::new(ErrorKind::NotFound, "not found").with_status(404);
        assert_eq!(err.to_string(), "not-found: not found");
    }

    #[test]
    fn rpc_error_carries_stable_code_and_kind() {
        let err = DomainError::new(ErrorKind::RateLimited, "rate limited")
            .with_status(429)
            .with_provider_code("RATE_LIMITED");
        let rpc = err.to_rpc_error();
        assert_eq!(rpc["code"], -32004);
        assert_eq!(rpc["data"]["kind"], "rate-limited");
        assert_eq!(rpc["data"]["status"], 429);
        assert_eq!(rpc["data"]["provider_code"], "RATE_LIMITED");
    }
}
