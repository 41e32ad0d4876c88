use std::{str::FromStr, time::Duration};

use reqwest::Url;

use crate::{cache::CachePolicy, retry::RetryPolicy, Credential, DomainError, Result};

/// Immutable configuration of one [`ApiClient`](crate::ApiClient).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base endpoint, e.g. `https://api.easypost.com/v2`. Request paths are appended.
    pub base_url: String,
    pub credential: Credential,
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum number of retries after the initial attempt.
    pub max_retries: usize,
    /// Base retry backoff in milliseconds (exponential strategy).
    pub retry_backoff_ms: u64,
    /// Cap on any single retry delay in milliseconds.
    pub max_backoff_ms: u64,
    pub cache_enabled: bool,
    pub cache: CachePolicy,
}

impl ClientConfig {
    pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
    pub const DEFAULT_MAX_RETRIES: usize = 3;
    pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 250;
    pub const DEFAULT_MAX_BACKOFF_MS: u64 = 10_000;

    /// Creates a config with default timeout, retry and cache settings.
    pub fn new(base_url: impl Into<String>, credential: Credential) -> Self {
        Self {
            base_url: base_url.into(),
            credential,
            timeout_ms: Self::DEFAULT_TIMEOUT_MS,
            max_retries: Self::DEFAULT_MAX_RETRIES,
            retry_backoff_ms: Self::DEFAULT_RETRY_BACKOFF_MS,
            max_backoff_ms: Self::DEFAULT_MAX_BACKOFF_MS,
            cache_enabled: true,
            cache: CachePolicy::default(),
        }
    }

    /// Builds a bearer-token config from environment variables.
    ///
    /// Reads `{PREFIX}_BASE_URL` and `{PREFIX}_API_KEY`, then the optional
    /// overrides described in [`ClientConfig::with_env_overrides`].
    pub fn from_env(prefix: &str) -> Result<Self> {
        Self::from_lookup(prefix, |name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(
        prefix: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let base_url = required(&lookup, &format!("{prefix}_BASE_URL"))?;
        let token = required(&lookup, &format!("{prefix}_API_KEY"))?;
        Self::new(base_url, Credential::bearer(token)).overrides_from(prefix, lookup)
    }

    /// Applies optional tuning from the environment:
    /// `{PREFIX}_TIMEOUT_MS`, `{PREFIX}_MAX_RETRIES`, `{PREFIX}_RETRY_BACKOFF_MS`,
    /// `{PREFIX}_CACHE_ENABLED`, `{PREFIX}_CACHE_TTL_SECS`.
    pub fn with_env_overrides(self, prefix: &str) -> Result<Self> {
        self.overrides_from(prefix, |name| std::env::var(name).ok())
    }

    pub(crate) fn overrides_from(
        mut self,
        prefix: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        if let Some(value) = optional(&lookup, &format!("{prefix}_TIMEOUT_MS"))? {
            self.timeout_ms = value;
        }
        if let Some(value) = optional(&lookup, &format!("{prefix}_MAX_RETRIES"))? {
            self.max_retries = value;
        }
        if let Some(value) = optional(&lookup, &format!("{prefix}_RETRY_BACKOFF_MS"))? {
            self.retry_backoff_ms = value;
        }
        if let Some(value) = optional(&lookup, &format!("{prefix}_CACHE_ENABLED"))? {
            self.cache_enabled = value;
        }
        if let Some(secs) = optional::<u64>(&lookup, &format!("{prefix}_CACHE_TTL_SECS"))? {
            self.cache.ttl = Duration::from_secs(secs);
        }
        Ok(self)
    }

    /// Sets the per-attempt timeout.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Sets how many retries follow the initial attempt.
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the base backoff and the cap on any single retry delay.
    pub fn with_backoff_ms(mut self, retry_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        self.retry_backoff_ms = retry_backoff_ms;
        self.max_backoff_ms = max_backoff_ms;
        self
    }

    /// Turns the response cache on or off.
    pub fn with_cache_enabled(mut self, cache_enabled: bool) -> Self {
        self.cache_enabled = cache_enabled;
        self
    }

    /// Replaces the cache policy (ttl, bound, namespace, allow-list).
    pub fn with_cache_policy(mut self, cache: CachePolicy) -> Self {
        self.cache = cache;
        self
    }

    /// Retry policy derived from the backoff settings.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base: Duration::from_millis(self.retry_backoff_ms),
            max_delay: Duration::from_millis(self.max_backoff_ms.max(self.retry_backoff_ms)),
        }
    }

    /// Per-attempt timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Parses the base URL and checks the credential; no I/O.
    pub(crate) fn validate(&self) -> Result<Url> {
        let url = Url::parse(self.base_url.trim()).map_err(|err| {
            DomainError::validation(format!("invalid base url '{}': {err}", self.base_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(DomainError::validation(format!(
                "base url must be http or https, got '{}'",
                url.scheme()
            )));
        }
        if self.timeout_ms == 0 {
            return Err(DomainError::validation("timeout_ms must be greater than zero"));
        }
        self.credential.validate()?;
        Ok(url)
    }
}

pub(crate) fn required(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<String> {
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_owned()),
        Some(_) => Err(DomainError::validation(format!("{name} is set but empty"))),
        None => Err(DomainError::validation(format!(
            "missing {name} environment variable"
        ))),
    }
}

fn optional<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>> {
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| DomainError::validation(format!("{name} has an invalid value '{value}'"))),
        _ => Ok(None),
    }
}
