//! Binance USD-M futures aggTrade ingester. Connects to the combined
//! stream endpoint for every configured symbol and writes each trade's
//! price into the shared [`PriceCache`].

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use rust_decimal::Decimal;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::cache::PriceCache;
use crate::services::ingest::{backoff_sleep, is_running};

/// Runs until `running` is cleared. Reconnects after `backoff` on any
/// connection-level error (dial failure, stream closed, protocol error);
/// a single malformed frame is logged and skipped, not a reconnect cause.
pub async fn run(
    base_url: &str,
    symbols: &[String],
    cache: Arc<PriceCache>,
    running: Arc<AtomicBool>,
    backoff: Duration,
) {
    let streams = symbols
        .iter()
        .map(|s| format!("{}@aggTrade", s.to_lowercase()))
        .collect::<Vec<_>>()
        .join("/");
    let url = format!("{base_url}/stream?streams={streams}");

    while is_running(&running) {
        tracing::info!(%url, "connecting to Binance futures stream");
        match connect_async(&url).await {
            Ok((stream, _)) => {
                tracing::info!("connected to Binance futures stream");
                let (_write, mut read) = stream.split();
                while is_running(&running) {
                    match read.next().await {
                        Some(Ok(Message::Text(text))) => process_message(&text, &cache),
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::warn!("Binance stream closed");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            tracing::error!(%err, "Binance stream error");
                            break;
                        }
                    }
                }
            }
            Err(err) => {
                tracing::error!(%err, "failed to connect to Binance futures stream");
            }
        }

        if is_running(&running) {
            backoff_sleep(backoff).await;
        }
    }
}

/// Payload shape: `{"stream":"btcusdt@aggTrade","data":{"s":"BTCUSDT","p":"30000.10",...}}`.
fn process_message(text: &str, cache: &PriceCache) {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
        tracing::debug!("dropping unparseable Binance frame");
        return;
    };
    let Some(data) = value.get("data") else { return };
    let (Some(symbol), Some(price_str)) = (
        data.get("s").and_then(|v| v.as_str()),
        data.get("p").and_then(|v| v.as_str()),
    ) else {
        return;
    };
    let Ok(price) = price_str.parse::<Decimal>() else {
        tracing::debug!(symbol, price_str, "invalid Binance price format");
        return;
    };
    cache.put(symbol, price);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn valid_agg_trade_updates_cache() {
        let cache = PriceCache::new();
        let frame = r#"{"stream":"btcusdt@aggTrade","data":{"e":"aggTrade","s":"BTCUSDT","p":"30123.45","q":"0.5"}}"#;
        process_message(frame, &cache);
        assert_eq!(cache.get("BTCUSDT"), Some(dec!(30123.45)));
    }

    #[test]
    fn malformed_frame_is_dropped_without_panicking() {
        let cache = PriceCache::new();
        process_message("not json", &cache);
        process_message(r#"{"stream":"btcusdt@aggTrade","data":{"s":"BTCUSDT","p":"nan"}}"#, &cache);
        assert_eq!(cache.get("BTCUSDT"), None);
    }
}
