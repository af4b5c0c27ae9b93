//! Coinbase Advanced Trade ticker ingester. Subscribes to the `ticker`
//! channel for every configured product id and writes each ticker's
//! price into the shared [`PriceCache`].

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde_json::json;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::cache::PriceCache;
use crate::services::ingest::{backoff_sleep, is_running};

pub async fn run(
    ws_url: &str,
    product_ids: &[String],
    cache: Arc<PriceCache>,
    running: Arc<AtomicBool>,
    backoff: Duration,
) {
    let subscribe_msg = json!({
        "type": "subscribe",
        "product_ids": product_ids,
        "channel": "ticker",
    })
    .to_string();

    while is_running(&running) {
        tracing::info!(url = %ws_url, "connecting to Coinbase ticker stream");
        match connect_async(ws_url).await {
            Ok((stream, _)) => {
                tracing::info!("connected to Coinbase ticker stream");
                let (mut write, mut read) = stream.split();
                if let Err(err) = write.send(Message::Text(subscribe_msg.clone())).await {
                    tracing::error!(%err, "failed to send Coinbase subscribe message");
                    if is_running(&running) {
                        backoff_sleep(backoff).await;
                    }
                    continue;
                }

                while is_running(&running) {
                    match read.next().await {
                        Some(Ok(Message::Text(text))) => process_message(&text, &cache),
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::warn!("Coinbase stream closed");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            tracing::error!(%err, "Coinbase stream error");
                            break;
                        }
                    }
                }
            }
            Err(err) => {
                tracing::error!(%err, "failed to connect to Coinbase ticker stream");
            }
        }

        if is_running(&running) {
            backoff_sleep(backoff).await;
        }
    }
}

/// Payload shape: `{"channel":"ticker","events":[{"tickers":[{"product_id":"BTC-USD","price":"..."}]}]}`.
fn process_message(text: &str, cache: &PriceCache) {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
        tracing::debug!("dropping unparseable Coinbase frame");
        return;
    };
    let Some(events) = value.get("events").and_then(|v| v.as_array()) else {
        return;
    };
    for event in events {
        let Some(tickers) = event.get("tickers").and_then(|v| v.as_array()) else {
            continue;
        };
        for ticker in tickers {
            let (Some(product_id), Some(price_str)) = (
                ticker.get("product_id").and_then(|v| v.as_str()),
                ticker.get("price").and_then(|v| v.as_str()),
            ) else {
                continue;
            };
            let Ok(price) = price_str.parse::<Decimal>() else {
                continue;
            };
            cache.put(product_id, price);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn ticker_event_updates_cache() {
        let cache = PriceCache::new();
        let frame = r#"{"channel":"ticker","events":[{"tickers":[{"product_id":"BTC-USD","price":"30250.5"}]}]}"#;
        process_message(frame, &cache);
        assert_eq!(cache.get("BTC-USD"), Some(dec!(30250.5)));
    }

    #[test]
    fn missing_events_is_ignored() {
        let cache = PriceCache::new();
        process_message(r#"{"channel":"subscriptions","events":[]}"#, &cache);
        assert_eq!(cache.get("BTC-USD"), None);
    }
}
