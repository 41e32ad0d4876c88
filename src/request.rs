use std::fmt;

use serde_json::Value as JsonValue;

use crate::{DomainError, Result};

/// HTTP verb of an outbound call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// Upper-case verb as sent on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Reads are served from and written to the cache; everything else invalidates it.
    pub fn is_read(self) -> bool {
        matches!(self, Self::Get)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Query string parameters, kept in caller order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Query(Vec<(String, String)>);

impl Query {
    /// Empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a parameter.
    pub fn push(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.push((key.into(), value.into()));
        self
    }

    /// Whether there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parameters in caller order.
    pub fn pairs(&self) -> &[(String, String)] {
        &self.0
    }

    /// Pairs ordered by key then value; duplicates are kept.
    pub fn sorted(&self) -> Vec<(&str, &str)> {
        let mut pairs: Vec<(&str, &str)> = self
            .0
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect();
        pairs.sort_unstable();
        pairs
    }
}

impl From<()> for Query {
    fn from(_: ()) -> Self {
        Self::default()
    }
}

impl<K: Into<String>, V: Into<String>> From<Vec<(K, V)>> for Query {
    fn from(pairs: Vec<(K, V)>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for Query {
    fn from(pairs: [(K, V); N]) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

/// One logical call: verb, path relative to the base URL, body and query.
#[derive(Clone, Debug, PartialEq)]
pub struct OutboundRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<JsonValue>,
    pub query: Query,
}

impl OutboundRequest {
    /// Request without body or query.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            query: Query::default(),
        }
    }

    /// GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    /// POST request with a JSON body.
    pub fn post(path: impl Into<String>, body: JsonValue) -> Self {
        Self::new(Method::Post, path).with_body(body)
    }

    /// PUT request with a JSON body.
    pub fn put(path: impl Into<String>, body: JsonValue) -> Self {
        Self::new(Method::Put, path).with_body(body)
    }

    /// PATCH request with a JSON body.
    pub fn patch(path: impl Into<String>, body: JsonValue) -> Self {
        Self::new(Method::Patch, path).with_body(body)
    }

    /// DELETE request.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    /// Sets the JSON body.
    pub fn with_body(mut self, body: JsonValue) -> Self {
        self.body = Some(body);
        self
    }

    /// Replaces the query parameters.
    pub fn with_query(mut self, query: impl Into<Query>) -> Self {
        self.query = query.into();
        self
    }

    /// First path segment, e.g. `shipments` for `/shipments/shp_1/buy`.
    pub fn resource_family(&self) -> &str {
        resource_family(&self.path)
    }

    /// Rejects malformed input before any I/O happens.
    pub fn validate(&self) -> Result<()> {
        let path = self.path.as_str();
        if !path.starts_with('/') {
            return Err(DomainError::validation(format!(
                "path must start with '/': '{path}'"
            )));
        }
        if path.contains(['?', '#']) {
            return Err(DomainError::validation(
                "path must not contain a query string or fragment; pass query parameters separately",
            ));
        }
        if path.chars().any(char::is_whitespace) {
            return Err(DomainError::validation("path must not contain whitespace"));
        }
        if path.split('/').any(|segment| segment == "..") {
            return Err(DomainError::validation(
                "path must not contain '..' segments",
            ));
        }
        if self.query.pairs().iter().any(|(key, _)| key.is_empty()) {
            return Err(DomainError::validation("query parameter names must not be empty"));
        }
        if self.method.is_read() && self.body.is_some() {
            return Err(DomainError::validation("GET requests cannot carry a body"));
        }
        Ok(())
    }
}

pub(crate) fn resource_family(path: &str) -> &str {
    path.trim_start_matches('/')
        .split('/')
        .next()
        .unwrap_or_default()
}
