use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use reqwest::header;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::{
    cache::{CacheKey, ResponseCache, SharedCache},
    mask::{mask_text, mask_value},
    normalize::{self, normalize, Failure},
    retry::{self, Outcome, RetryState},
    ClientConfig, DomainError, ErrorKind, OutboundRequest, Query, Result,
};

const USER_AGENT: &str = concat!("parcelkit-http/", env!("CARGO_PKG_VERSION"));

/// What a single transport attempt produced.
enum Attempt {
    Success {
        status: u16,
        body: String,
    },
    Failed {
        outcome: Outcome,
        failure: Failure,
        retry_after: Option<Duration>,
    },
}

/// Resilient JSON REST client: cache lookup, retrying execution, error
/// normalization and write-through caching.
///
/// Cheap to clone; clones share the connection pool and the cache.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    config: Arc<ClientConfig>,
    cache: Option<ResponseCache>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("credential", &self.config.credential)
            .field("timeout_ms", &self.config.timeout_ms)
            .field("max_retries", &self.config.max_retries)
            .field("cache", &self.cache)
            .finish()
    }
}

impl ApiClient {
    /// Creates a client. Fails with `validation`/`unauthorized` on a bad
    /// base URL or credential; never performs I/O.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let base_url = config.validate()?;
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| {
                DomainError::new(ErrorKind::TransportFailure, "could not initialise HTTP client")
                    .with_detail(serde_json::json!({ "source": err.to_string() }))
            })?;
        let cache = config
            .cache_enabled
            .then(|| ResponseCache::new(config.cache.max_entries));

        Ok(Self {
            http,
            base_url: base_url.as_str().trim_end_matches('/').to_owned(),
            config: Arc::new(config),
            cache,
        })
    }

    /// Adds a shared cache layer below the in-process one.
    ///
    /// Ignored when caching is disabled in the config.
    pub fn with_shared_cache(mut self, shared: Arc<dyn SharedCache>) -> Self {
        self.cache = self.cache.map(|cache| cache.with_shared(shared));
        self
    }

    /// Uses an existing cache, e.g. one shared by several clients.
    ///
    /// Ignored when caching is disabled in the config.
    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        if self.config.cache_enabled {
            self.cache = Some(cache);
        }
        self
    }

    /// Returns the configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the response cache, or `None` when caching is disabled.
    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_ref()
    }

    /// Sends a GET, served from the cache when the path is allow-listed.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: impl Into<Query>,
    ) -> Result<T> {
        self.execute(OutboundRequest::get(path).with_query(query)).await
    }

    /// Sends a POST with a JSON body and invalidates the path's resource family.
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.execute(OutboundRequest::post(path, to_json(body)?)).await
    }

    /// Sends a PUT with a JSON body and invalidates the path's resource family.
    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.execute(OutboundRequest::put(path, to_json(body)?)).await
    }

    /// Sends a PATCH with a JSON body and invalidates the path's resource family.
    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.execute(OutboundRequest::patch(path, to_json(body)?)).await
    }

    /// Sends a DELETE and invalidates the path's resource family.
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.execute(OutboundRequest::delete(path)).await
    }

    /// Executes a request and decodes the JSON response into `T`.
    ///
    /// An empty success body decodes from `null`, so `()` and `Option<_>`
    /// work for 204 responses. Only bodies that decode into `T` are cached.
    pub async fn execute<T: DeserializeOwned>(&self, request: OutboundRequest) -> Result<T> {
        request.validate()?;
        let url = self.url_for(&request.path)?;
        let policy = &self.config.cache;

        let cache_key = match &self.cache {
            Some(_) if policy.is_cacheable(request.method, &request.path) => {
                Some(policy.key_for(request.method, &request.path, &request.query))
            }
            _ => None,
        };

        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            if let Some(value) = cache.get(key, policy.ttl).await {
                let decoded = decode(&value, None);
                match &decoded {
                    Ok(_) => tracing::debug!(
                        method = %request.method,
                        path = %mask_text(&request.path),
                        cache_key = %key,
                        outcome = "cache-hit",
                        "served from cache"
                    ),
                    Err(error) => tracing::error!(
                        method = %request.method,
                        path = %mask_text(&request.path),
                        cache_key = %key,
                        outcome = "cache-hit",
                        kind = %error.kind,
                        error = %mask_text(&error.message),
                        "cached response does not match the requested type"
                    ),
                }
                return decoded;
            }
        }

        let result = self.send_with_retry::<T>(&url, &request, cache_key.as_ref()).await;

        let Some(cache) = &self.cache else {
            return result.map(|(_, decoded)| decoded);
        };
        if !request.method.is_read() {
            // the write may have landed even when the call failed
            cache.invalidate(&policy.invalidation_prefix(&request.path)).await;
            return result.map(|(_, decoded)| decoded);
        }

        let (value, decoded) = result?;
        if let Some(key) = &cache_key {
            cache.set(key, value, policy.ttl).await;
        }
        Ok(decoded)
    }

    /// Executes a request and returns the raw JSON response.
    pub async fn execute_value(&self, request: OutboundRequest) -> Result<JsonValue> {
        self.execute(request).await
    }

    async fn send_with_retry<T: DeserializeOwned>(
        &self,
        url: &reqwest::Url,
        request: &OutboundRequest,
        cache_key: Option<&CacheKey>,
    ) -> Result<(JsonValue, T)> {
        let policy = self.config.retry_policy();
        let path = mask_text(&request.path);
        let cache_key = cache_key.map(CacheKey::as_str);
        let mut state = RetryState::new();

        if let Some(body) = &request.body {
            if tracing::enabled!(tracing::Level::TRACE) {
                tracing::trace!(
                    method = %request.method,
                    path = %path,
                    body = %mask_value(body),
                    "request payload"
                );
            }
        }

        loop {
            let started = Instant::now();
            let attempt = self.send_once(url, request).await;
            let duration_ms = started.elapsed().as_millis() as u64;
            let record = AttemptRecord {
                request,
                path: &path,
                attempt: state.attempt,
                duration_ms,
                cache_key,
            };

            match attempt {
                Attempt::Success { status, body } => {
                    return match parse_body(status, &body) {
                        Ok(parsed) => {
                            tracing::info!(
                                method = %request.method,
                                path = %path,
                                attempt = state.attempt,
                                duration_ms,
                                outcome = Outcome::Success.as_str(),
                                status,
                                cache_key = ?cache_key,
                                "request succeeded"
                            );
                            Ok(parsed)
                        }
                        Err(error) => {
                            record.final_failure(Outcome::Success, &error);
                            Err(error)
                        }
                    };
                }
                Attempt::Failed {
                    outcome,
                    failure,
                    retry_after: hint,
                } => {
                    let error = normalize(&failure);

                    if policy.should_retry(outcome, state.attempt) {
                        let delay = policy.delay_for(state.attempt, hint, &mut rand::thread_rng());
                        tracing::warn!(
                            method = %request.method,
                            path = %path,
                            attempt = state.attempt,
                            duration_ms,
                            outcome = outcome.as_str(),
                            status = ?error.status,
                            cache_key = ?cache_key,
                            delay_ms = delay.as_millis() as u64,
                            "request failed; retrying"
                        );
                        state.schedule_retry(error, delay);
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    record.final_failure(outcome, &error);
                    return Err(error);
                }
            }
        }
    }

    async fn send_once(&self, url: &reqwest::Url, request: &OutboundRequest) -> Attempt {
        let mut builder = self
            .http
            .request(request.method.into(), url.clone())
            .header(header::ACCEPT, "application/json")
            .timeout(self.config.timeout());
        builder = self.config.credential.apply(builder);
        if !request.query.is_empty() {
            builder = builder.query(request.query.pairs());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => return transport_failure(&err),
        };

        let status = response.status().as_u16();
        let retry_after = retry::retry_after(response.headers());
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => return transport_failure(&err),
        };

        match Outcome::from_status(status) {
            Outcome::Success => Attempt::Success { status, body },
            outcome => Attempt::Failed {
                outcome,
                failure: Failure::Status { status, body },
                retry_after,
            },
        }
    }

    fn url_for(&self, path: &str) -> Result<reqwest::Url> {
        let joined = format!("{}{path}", self.base_url);
        reqwest::Url::parse(&joined)
            .map_err(|err| DomainError::validation(format!("invalid request url: {err}")))
    }
}

/// Log fields shared by every record of one attempt.
struct AttemptRecord<'a> {
    request: &'a OutboundRequest,
    path: &'a str,
    attempt: usize,
    duration_ms: u64,
    cache_key: Option<&'a str>,
}

impl AttemptRecord<'_> {
    // provider messages can quote addresses, so they are masked like paths
    fn final_failure(&self, outcome: Outcome, error: &DomainError) {
        tracing::error!(
            method = %self.request.method,
            path = %self.path,
            attempt = self.attempt,
            duration_ms = self.duration_ms,
            outcome = outcome.as_str(),
            status = ?error.status,
            cache_key = ?self.cache_key,
            kind = %error.kind,
            error = %mask_text(&error.message),
            "request failed"
        );
    }
}

/// Parses a success body; empty bodies read as `null`.
fn parse_body<T: DeserializeOwned>(status: u16, body: &str) -> Result<(JsonValue, T)> {
    let value = if body.trim().is_empty() {
        JsonValue::Null
    } else {
        serde_json::from_str(body).map_err(|err| normalize::undecodable(Some(status), err))?
    };
    let decoded = decode(&value, Some(status))?;
    Ok((value, decoded))
}

fn decode<T: DeserializeOwned>(value: &JsonValue, status: Option<u16>) -> Result<T> {
    Deserialize::deserialize(value).map_err(|err| normalize::undecodable(status, err))
}

fn transport_failure(err: &reqwest::Error) -> Attempt {
    let source = err.to_string();
    let failure = if err.is_timeout() {
        Failure::Timeout { source }
    } else {
        Failure::Connection { source }
    };
    Attempt::Failed {
        outcome: Outcome::TransportError,
        failure,
        retry_after: None,
    }
}

fn to_json<B: Serialize + ?Sized>(body: &B) -> Result<JsonValue> {
    serde_json::to_value(body)
        .map_err(|err| DomainError::validation(format!("request body is not serializable: {err}")))
}
