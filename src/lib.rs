//! `parcelkit-http` is a resilient async REST client for the EasyPost
//! shipping and Veeqo inventory APIs.
//!
//! Every call goes through the same path:
//! - allow-listed GETs are served from a TTL [`cache`] when possible;
//! - misses are executed with a per-attempt timeout and retried with
//!   exponential backoff and jitter on 429, 5xx and transport failures;
//! - failures are normalized into a [`DomainError`] whose [`ErrorKind`] comes
//!   from a closed taxonomy;
//! - successful reads are written back to the cache, and writes invalidate
//!   their resource family.
//!
//! ```no_run
//! use parcelkit_http::providers::easypost;
//! use serde_json::{json, Value};
//!
//! # async fn run() -> parcelkit_http::Result<()> {
//! let client = easypost::client("EZTK...")?;
//! let shipment: Value = client
//!     .post("/shipments", &json!({"shipment": {"parcel": {"weight": 10.5}}}))
//!     .await?;
//! let trackers: Value = client.get("/trackers", [("page_size", "20")]).await?;
//! # let _ = (shipment, trackers);
//! # Ok(())
//! # }
//! ```

pub mod cache;
mod client;
mod config;
mod credential;
mod error;
pub mod mask;
mod normalize;
pub mod providers;
mod request;
mod retry;
pub mod webhook;

pub use cache::{CacheKey, CachePolicy, ResponseCache, SharedCache};
pub use client::ApiClient;
pub use config::ClientConfig;
pub use credential::Credential;
pub use error::{DomainError, ErrorKind};
pub use normalize::{normalize, Failure};
pub use request::{Method, OutboundRequest, Query};
pub use retry::{Outcome, RetryPolicy, RetryState};

pub type Result<T> = std::result::Result<T, DomainError>;
