use std::fmt;

use reqwest::header::{self, HeaderName, HeaderValue};

use crate::{DomainError, ErrorKind, Result};

/// How the credential is attached to each outbound request.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// `Authorization: Bearer <token>`. A missing `Bearer ` prefix is added.
    Bearer(String),
    /// HTTP Basic with the key as username and an empty password.
    Basic { username: String },
    /// Key sent in a custom header such as `x-api-key`.
    Header { name: String, value: String },
    /// Full raw `Authorization` value.
    Raw(String),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bearer(_) => f.write_str("Bearer(<redacted>)"),
            Self::Basic { .. } => f.write_str("Basic(<redacted>)"),
            Self::Header { name, .. } => f
                .debug_struct("Header")
                .field("name", name)
                .field("value", &"<redacted>")
                .finish(),
            Self::Raw(_) => f.write_str("Raw(<redacted>)"),
        }
    }
}

impl Credential {
    /// `Authorization: Bearer <token>`.
    pub fn bearer(token: impl AsRef<str>) -> Self {
        Self::Bearer(token.as_ref().trim().to_owned())
    }

    /// HTTP Basic with `username` and an empty password.
    pub fn basic(username: impl AsRef<str>) -> Self {
        Self::Basic {
            username: username.as_ref().trim().to_owned(),
        }
    }

    /// Secret sent in the header `name`.
    pub fn header(name: impl Into<String>, value: impl AsRef<str>) -> Self {
        Self::Header {
            name: name.into(),
            value: value.as_ref().trim().to_owned(),
        }
    }

    fn secret(&self) -> &str {
        match self {
            Self::Bearer(token) | Self::Raw(token) => token,
            Self::Basic { username } => username,
            Self::Header { value, .. } => value,
        }
    }

    /// Checks the credential can be sent, without any I/O.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.secret().trim().is_empty() {
            return Err(DomainError::new(
                ErrorKind::Unauthorized,
                "credential is missing",
            ));
        }
        if let Self::Header { name, value } = self {
            HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                DomainError::validation(format!("invalid credential header name '{name}'"))
            })?;
            HeaderValue::from_str(value)
                .map_err(|_| DomainError::validation("credential contains invalid characters"))?;
        }
        Ok(())
    }

    pub(crate) fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Self::Bearer(token) => {
                request.header(header::AUTHORIZATION, normalize_bearer_authorization(token))
            }
            Self::Basic { username } => request.basic_auth(username, None::<&str>),
            Self::Header { name, value } => request.header(name.as_str(), value.as_str()),
            Self::Raw(value) => request.header(header::AUTHORIZATION, value.as_str()),
        }
    }
}

fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}
