use parcelkit_http::{providers::easypost, ErrorKind};
use serde::Deserialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
struct Rate {
    carrier: String,
    service: String,
    rate: String,
}

#[derive(Debug, Deserialize)]
struct Shipment {
    id: String,
    #[serde(default)]
    rates: Vec<Rate>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let client = parcelkit_http::ApiClient::new(easypost::config_from_env()?)?;

    let shipment: Shipment = client
        .post(
            "/shipments",
            &json!({
                "shipment": {
                    "to_address": {
                        "name": "Dr. Steve Brule",
                        "street1": "179 N Harbor Dr",
                        "city": "Redondo Beach",
                        "state": "CA",
                        "zip": "90277",
                        "country": "US"
                    },
                    "from_address": {
                        "company": "EasyPost",
                        "street1": "417 Montgomery Street",
                        "city": "San Francisco",
                        "state": "CA",
                        "zip": "94104",
                        "country": "US"
                    },
                    "parcel": { "length": 20.2, "width": 10.9, "height": 5, "weight": 65.9 }
                }
            }),
        )
        .await?;

    println!("created {}", shipment.id);
    for rate in &shipment.rates {
        println!("  {:<8} {:<16} {}", rate.carrier, rate.service, rate.rate);
    }

    // served from cache the second time
    for _ in 0..2 {
        let fetched: Shipment = client.get(&format!("/shipments/{}", shipment.id), ()).await?;
        println!("fetched {}", fetched.id);
    }

    match client
        .get::<serde_json::Value>("/shipments/shp_missing", ())
        .await
    {
        Err(err) if err.kind == ErrorKind::NotFound => {
            println!("rpc error: {}", err.to_rpc_error());
        }
        other => println!("unexpected: {other:?}"),
    }

    Ok(())
}
