use std::{sync::Arc, time::Duration};

use parcelkit_http::{cache::RedisCache, providers::veeqo, ApiClient};
use serde_json::Value as JsonValue;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/0".to_owned());
    let shared = RedisCache::connect(&redis_url)
        .await?
        .with_op_timeout(Duration::from_millis(250));

    let client = ApiClient::new(veeqo::config_from_env()?)?.with_shared_cache(Arc::new(shared));

    let warehouses: JsonValue = client.get("/warehouses", ()).await?;
    println!("warehouses: {}", warehouses.as_array().map_or(0, Vec::len));

    let products: JsonValue = client
        .get("/products", [("page", "1"), ("page_size", "10")])
        .await?;
    for product in products.as_array().into_iter().flatten() {
        println!(
            "{} {}",
            product["id"],
            product["title"].as_str().unwrap_or("<untitled>")
        );
    }

    Ok(())
}
