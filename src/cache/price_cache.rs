//! Process-wide mark price cache.
//!
//! Every venue ingester writes into this map; the matching engine, the
//! equity recorder, and the account-metrics computation all read from it.
//! There is no database backing it and no cross-process sharing — it is
//! scoped to the process, which is why it's a plain in-memory `DashMap`
//! rather than a Redis-backed cache.

use dashmap::DashMap;
use rust_decimal::Decimal;

/// `symbol -> last mark price`. Reads never block on writers: `DashMap`
/// shards its internal locking per key, so a writer updating `BTCUSDT`
/// never contends with a reader fetching `ETHUSDT`, and even same-key
/// reads are only briefly blocked by a same-key write.
#[derive(Debug, Default)]
pub struct PriceCache {
    prices: DashMap<String, Decimal>,
}

impl PriceCache {
    pub fn new() -> Self {
        Self {
            prices: DashMap::new(),
        }
    }

    /// Record a new mark for `symbol`. Non-positive prices are rejected
    /// and dropped rather than stored — a malformed venue tick must never
    /// poison the cache with a zero or negative mark.
    pub fn put(&self, symbol: &str, price: Decimal) {
        if price <= Decimal::ZERO {
            tracing::warn!(symbol, %price, "dropping non-positive mark price");
            return;
        }
        self.prices.insert(symbol.to_uppercase(), price);
    }

    /// Latest mark for `symbol`, if any venue has ever published one.
    pub fn get(&self, symbol: &str) -> Option<Decimal> {
        self.prices.get(&symbol.to_uppercase()).map(|r| *r.value())
    }

    /// A consistent-enough snapshot of every cached symbol. Cross-symbol
    /// consistency isn't guaranteed (writers aren't paused while this
    /// iterates), only that each entry reflects some write that happened
    /// before or during the call.
    pub fn snapshot(&self) -> std::collections::HashMap<String, Decimal> {
        self.prices
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn put_then_get_round_trips() {
        let cache = PriceCache::new();
        cache.put("btcusdt", dec!(30000));
        assert_eq!(cache.get("BTCUSDT"), Some(dec!(30000)));
    }

    #[test]
    fn non_positive_prices_are_rejected() {
        let cache = PriceCache::new();
        cache.put("BTCUSDT", dec!(30000));
        cache.put("BTCUSDT", dec!(0));
        cache.put("BTCUSDT", dec!(-5));
        assert_eq!(cache.get("BTCUSDT"), Some(dec!(30000)));
    }

    #[test]
    fn missing_symbol_is_none() {
        let cache = PriceCache::new();
        assert_eq!(cache.get("ETHUSDT"), None);
    }

    #[test]
    fn snapshot_contains_every_symbol() {
        let cache = PriceCache::new();
        cache.put("BTCUSDT", dec!(30000));
        cache.put("ETH-USD", dec!(2000));
        let snap = cache.snapshot();
        assert_eq!(snap.get("BTCUSDT"), Some(&dec!(30000)));
        assert_eq!(snap.get("ETH-USD"), Some(&dec!(2000)));
        assert_eq!(snap.len(), 2);
    }
}
