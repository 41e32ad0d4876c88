//! Ready-made configurations for the supported upstream APIs.

use std::time::Duration;

use crate::{cache::CachePolicy, config::required, ApiClient, ClientConfig, Credential, Result};

/// EasyPost shipping API.
pub mod easypost {
    use super::*;

    pub const BASE_URL: &str = "https://api.easypost.com/v2";
    pub const ENV_PREFIX: &str = "EASYPOST";

    /// Resource families whose reads are cached.
    pub const CACHEABLE: &[&str] = &[
        "/addresses",
        "/carrier_accounts",
        "/parcels",
        "/shipments",
        "/trackers",
    ];

    /// Rate quotes are priced per request, including the ones nested under
    /// `/shipments/{id}`, and are never cached.
    pub const UNCACHEABLE_SEGMENTS: &[&str] = &["rates", "smartrate"];

    /// EasyPost authenticates with HTTP Basic, the API key as username.
    pub fn config(api_key: impl AsRef<str>) -> ClientConfig {
        let cache = CACHEABLE.iter().fold(
            CachePolicy::default()
                .with_namespace("easypost")
                .with_ttl(Duration::from_secs(300)),
            |policy, prefix| policy.allow_prefix(*prefix),
        );
        let cache = UNCACHEABLE_SEGMENTS
            .iter()
            .fold(cache, |policy, segment| policy.deny_segment(*segment));
        ClientConfig::new(BASE_URL, Credential::basic(api_key)).with_cache_policy(cache)
    }

    /// Reads `EASYPOST_API_KEY`, plus the optional `EASYPOST_BASE_URL` and
    /// tuning variables of [`ClientConfig::with_env_overrides`].
    pub fn config_from_env() -> Result<ClientConfig> {
        config_from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn config_from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<ClientConfig> {
        let mut config = config(required(&lookup, "EASYPOST_API_KEY")?);
        if let Some(base_url) = lookup("EASYPOST_BASE_URL").filter(|url| !url.trim().is_empty()) {
            config.base_url = base_url;
        }
        config.overrides_from(ENV_PREFIX, lookup)
    }

    /// Builds a client from [`config`].
    pub fn client(api_key: impl AsRef<str>) -> Result<ApiClient> {
        ApiClient::new(config(api_key))
    }
}

/// Veeqo inventory and order API.
pub mod veeqo {
    use super::*;

    pub const BASE_URL: &str = "https://api.veeqo.com";
    pub const ENV_PREFIX: &str = "VEEQO";
    pub const API_KEY_HEADER: &str = "x-api-key";

    pub const CACHEABLE: &[&str] = &[
        "/channels",
        "/customers",
        "/orders",
        "/products",
        "/suppliers",
        "/warehouses",
    ];

    /// Veeqo authenticates with an `x-api-key` header. Stock moves quickly,
    /// so reads are cached for one minute.
    pub fn config(api_key: impl AsRef<str>) -> ClientConfig {
        let cache = CACHEABLE.iter().fold(
            CachePolicy::default()
                .with_namespace("veeqo")
                .with_ttl(Duration::from_secs(60)),
            |policy, prefix| policy.allow_prefix(*prefix),
        );
        ClientConfig::new(BASE_URL, Credential::header(API_KEY_HEADER, api_key))
            .with_cache_policy(cache)
    }

    /// Reads `VEEQO_API_KEY`, plus the optional `VEEQO_BASE_URL` and tuning
    /// variables of [`ClientConfig::with_env_overrides`].
    pub fn config_from_env() -> Result<ClientConfig> {
        config_from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn config_from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<ClientConfig> {
        let mut config = config(required(&lookup, "VEEQO_API_KEY")?);
        if let Some(base_url) = lookup("VEEQO_BASE_URL").filter(|url| !url.trim().is_empty()) {
            config.base_url = base_url;
        }
        config.overrides_from(ENV_PREFIX, lookup)
    }

    /// Builds a client from [`config`].
    pub fn client(api_key: impl AsRef<str>) -> Result<ApiClient> {
        ApiClient::new(config(api_key))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{easypost, veeqo};
    use crate::{request::Method, Credential, ErrorKind};

    #[test]
    fn easypost_uses_basic_auth_and_caches_shipments() {
        let config = easypost::config("EZTK123");
        assert_eq!(config.base_url, easypost::BASE_URL);
        assert_eq!(config.credential, Credential::basic("EZTK123"));
        assert_eq!(config.cache.namespace, "easypost");
        assert!(config.cache.is_cacheable(Method::Get, "/shipments/shp_1"));
        assert!(!config.cache.is_cacheable(Method::Get, "/rates"));
        assert!(!config.cache.is_cacheable(Method::Get, "/shipments/shp_1/rates"));
        assert!(!config.cache.is_cacheable(Method::Get, "/shipments/shp_1/smartrate"));
    }

    #[test]
    fn veeqo_uses_api_key_header() {
        let config = veeqo::config("vq-key");
        assert_eq!(config.credential, Credential::header("x-api-key", "vq-key"));
        assert_eq!(config.cache.ttl, Duration::from_secs(60));
        assert!(config.cache.is_cacheable(Method::Get, "/products"));
    }

    #[test]
    fn env_lookup_applies_base_url_and_tuning() {
        let config = veeqo::config_from_lookup(|name| match name {
            "VEEQO_API_KEY" => Some("vq-key".to_owned()),
            "VEEQO_BASE_URL" => Some("http://127.0.0.1:9000".to_owned()),
            "VEEQO_MAX_RETRIES" => Some("1".to_owned()),
            _ => None,
        })
        .expect("config must load");
        assert_eq!(config.base_url, "http://127.0.0.1:9000");
        assert_eq!(config.max_retries, 1);
    }

    #[test]
    fn missing_key_is_validation_error() {
        let err = easypost::config_from_lookup(|_| None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(err.message.contains("EASYPOST_API_KEY"));
    }

    #[test]
    fn presets_build_clients() {
        assert!(easypost::client("k").is_ok());
        assert!(veeqo::client("k").is_ok());
    }
}
