//! Maps failed attempts into [`DomainError`]s.

use serde_json::{json, Value as JsonValue};

use crate::{DomainError, ErrorKind};

const MAX_DETAIL_BODY_CHARS: usize = 512;

/// The last unsuccessful attempt of a call, as seen by the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Failure {
    /// Provider answered with a non-2xx status.
    Status { status: u16, body: String },
    /// Attempt exceeded its timeout.
    Timeout { source: String },
    /// No response at all: DNS, refused, reset, TLS.
    Connection { source: String },
}

/// Converts a failure into an error from the closed taxonomy.
pub fn normalize(failure: &Failure) -> DomainError {
    match failure {
        Failure::Status { status, body } => from_status(*status, body),
        Failure::Timeout { source } => {
            DomainError::new(ErrorKind::TransportTimeout, "request timed out")
                .with_detail(json!({ "source": source }))
        }
        Failure::Connection { source } => DomainError::new(
            ErrorKind::TransportFailure,
            "could not connect to upstream service",
        )
        .with_detail(json!({ "source": source })),
    }
}

fn from_status(status: u16, body: &str) -> DomainError {
    let (kind, fallback) = status_entry(status);
    let parsed = serde_json::from_str::<JsonValue>(body).ok();
    let (message, code) = parsed
        .as_ref()
        .map(provider_error)
        .unwrap_or((None, None));

    let mut err = DomainError::new(kind, message.unwrap_or_else(|| fallback.to_owned()))
        .with_status(status);
    if let Some(code) = code {
        err = err.with_provider_code(code);
    }
    match parsed {
        Some(value) => err.with_detail(value),
        None if body.trim().is_empty() => err,
        None => err.with_detail(json!({ "body": truncate(body) })),
    }
}

fn status_entry(status: u16) -> (ErrorKind, &'static str) {
    match status {
        400 => (ErrorKind::BadRequest, "bad request"),
        401 => (ErrorKind::Unauthorized, "unauthorized"),
        403 => (ErrorKind::Unauthorized, "forbidden"),
        404 => (ErrorKind::NotFound, "not found"),
        409 => (ErrorKind::BadRequest, "conflict"),
        422 => (ErrorKind::BadRequest, "unprocessable entity"),
        429 => (ErrorKind::RateLimited, "rate limited"),
        500..=599 => (ErrorKind::UpstreamUnavailable, "upstream unavailable"),
        _ => (ErrorKind::BadRequest, "request rejected"),
    }
}

/// A 2xx whose body could not be decoded into the expected shape.
pub(crate) fn undecodable(status: Option<u16>, reason: impl std::fmt::Display) -> DomainError {
    let err = DomainError::new(
        ErrorKind::UpstreamUnavailable,
        "upstream returned an unexpected response",
    )
    .with_detail(json!({ "decode": reason.to_string() }));
    match status {
        Some(status) => err.with_status(status),
        None => err,
    }
}

/// Pulls `(message, code)` out of the error shapes EasyPost and Veeqo send.
fn provider_error(body: &JsonValue) -> (Option<String>, Option<String>) {
    let mut code = body.get("code").and_then(string_of);

    let message = match body.get("error") {
        Some(JsonValue::Object(error)) => {
            code = error.get("code").and_then(string_of).or(code);
            error.get("message").and_then(joined)
        }
        Some(other) => string_of(other),
        None => None,
    }
    .or_else(|| body.get("message").and_then(string_of))
    .or_else(|| body.get("error_messages").and_then(joined))
    .or_else(|| body.get("errors").and_then(joined));

    (message, code)
}

fn string_of(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(text) if !text.trim().is_empty() => Some(text.trim().to_owned()),
        _ => None,
    }
}

/// Flattens strings, string arrays, `{message}` objects and field→messages maps.
fn joined(value: &JsonValue) -> Option<String> {
    let mut parts = Vec::new();
    collect_messages(value, &mut parts);
    (!parts.is_empty()).then(|| parts.join("; "))
}

fn collect_messages(value: &JsonValue, out: &mut Vec<String>) {
    match value {
        JsonValue::String(_) => out.extend(string_of(value)),
        JsonValue::Array(items) => items.iter().for_each(|item| collect_messages(item, out)),
        JsonValue::Object(map) => match map.get("message") {
            Some(message) => collect_messages(message, out),
            None => map.values().for_each(|item| collect_messages(item, out)),
        },
        _ => {}
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(MAX_DETAIL_BODY_CHARS).collect()
}
