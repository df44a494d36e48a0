//! Read-only status queries against the dependency service.
//!
//! Uses the service's HTTP `/exec` endpoint to fetch a row count and the
//! latest trades. Nothing here touches supervision state; failures are
//! only logged.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::GlobalConfig;
use crate::{AppError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

const COUNT_QUERY: &str = "SELECT COUNT(*) FROM trades WHERE exchange = 'BSE'";

const LATEST_QUERY: &str = "SELECT symbol, price, side, timestamp FROM trades \
     WHERE exchange = 'BSE' ORDER BY timestamp DESC LIMIT 5";

/// One recent trade row.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRow {
    /// Ticker symbol.
    pub symbol: String,
    /// Trade price.
    pub price: f64,
    /// Trade side.
    pub side: String,
    /// Trade timestamp as reported by the service.
    pub timestamp: String,
}

/// Row count and most recent trades.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    /// Total number of matching rows.
    pub total_records: u64,
    /// Most recent rows, newest first.
    pub latest: Vec<TradeRow>,
}

#[derive(Debug, Deserialize)]
struct ExecResponse {
    #[serde(default)]
    dataset: Vec<Vec<Value>>,
}

/// Fetch a [`StatusSnapshot`] from the service at `base_url`.
///
/// # Errors
///
/// Returns [`AppError::Status`] on transport failures, non-success HTTP
/// statuses, or undecodable bodies.
pub async fn fetch_snapshot(base_url: &str) -> Result<StatusSnapshot> {
    let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

    let count = exec(&client, base_url, COUNT_QUERY).await?;
    let total_records = count
        .dataset
        .first()
        .and_then(|row| row.first())
        .and_then(Value::as_u64)
        .unwrap_or(0);

    let latest = exec(&client, base_url, LATEST_QUERY)
        .await?
        .dataset
        .iter()
        .filter_map(|row| parse_trade(row))
        .collect();

    Ok(StatusSnapshot {
        total_records,
        latest,
    })
}

/// Fetch and log a snapshot, swallowing any failure.
pub async fn log_snapshot(config: &GlobalConfig) {
    match fetch_snapshot(&config.service_http_url()).await {
        Ok(snapshot) => {
            info!(total_records = snapshot.total_records, "current stored data");
            if snapshot.latest.is_empty() {
                info!("no recent trades yet");
            }
            for row in &snapshot.latest {
                info!(
                    symbol = %row.symbol,
                    price = row.price,
                    side = %row.side,
                    timestamp = %row.timestamp,
                    "latest trade"
                );
            }
        }
        Err(err) => warn!(%err, "failed to fetch status snapshot"),
    }
}

async fn exec(client: &reqwest::Client, base_url: &str, query: &str) -> Result<ExecResponse> {
    let url = reqwest::Url::parse_with_params(&format!("{base_url}/exec"), &[("query", query)])
        .map_err(|err| AppError::Status(format!("invalid status url: {err}")))?;

    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(AppError::Status(format!(
            "query returned {}",
            response.status()
        )));
    }
    Ok(response.json::<ExecResponse>().await?)
}

fn parse_trade(row: &[Value]) -> Option<TradeRow> {
    let [symbol, price, side, timestamp] = row else {
        return None;
    };
    Some(TradeRow {
        symbol: symbol.as_str()?.to_owned(),
        price: price.as_f64()?,
        side: side.as_str()?.to_owned(),
        timestamp: timestamp.as_str()?.to_owned(),
    })
}
