// 2.0: quote feed sink. a quote is produced externally and read-only to the core.
// the cache holds the latest bid/ask per instrument behind a reader/writer lock.
// updates for instruments nobody trades are a no-op for the engine, but still cached.

use crate::types::{Direction, InstrumentId, Timestamp};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentBidAskPair {
    pub instrument: InstrumentId,
    pub bid: Decimal,
    pub ask: Decimal,
    pub timestamp: Timestamp,
}

impl InstrumentBidAskPair {
    // a buy opens at ask, a sell opens at bid
    pub fn price_for_open(&self, direction: Direction) -> Decimal {
        match direction {
            Direction::Buy => self.ask,
            Direction::Sell => self.bid,
        }
    }

    // closing takes the opposite side of the book
    pub fn price_for_close(&self, direction: Direction) -> Decimal {
        match direction {
            Direction::Buy => self.bid,
            Direction::Sell => self.ask,
        }
    }
}

#[derive(Debug, Default)]
pub struct QuoteCache {
    quotes: RwLock<HashMap<InstrumentId, InstrumentBidAskPair>>,
}

impl QuoteCache {
    pub fn new() -> Self {
        Self {
            quotes: RwLock::new(HashMap::new()),
        }
    }

    pub fn update(&self, quote: InstrumentBidAskPair) {
        self.quotes.write().insert(quote.instrument, quote);
    }

    pub fn get(&self, instrument: InstrumentId) -> Option<InstrumentBidAskPair> {
        self.quotes.read().get(&instrument).copied()
    }

    pub fn len(&self) -> usize {
        self.quotes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn quote(instrument: u32, bid: Decimal, ask: Decimal) -> InstrumentBidAskPair {
        InstrumentBidAskPair {
            instrument: InstrumentId(instrument),
            bid,
            ask,
            timestamp: Timestamp::from_millis(0),
        }
    }

    #[test]
    fn open_and_close_sides() {
        let q = quote(1, dec!(1.1995), dec!(1.2005));
        assert_eq!(q.price_for_open(Direction::Buy), dec!(1.2005));
        assert_eq!(q.price_for_open(Direction::Sell), dec!(1.1995));
        assert_eq!(q.price_for_close(Direction::Buy), dec!(1.1995));
        assert_eq!(q.price_for_close(Direction::Sell), dec!(1.2005));
    }

    #[test]
    fn cache_replaces_latest() {
        let cache = QuoteCache::new();
        cache.update(quote(1, dec!(1.10), dec!(1.11)));
        cache.update(quote(1, dec!(1.20), dec!(1.21)));

        let latest = cache.get(InstrumentId(1)).unwrap();
        assert_eq!(latest.bid, dec!(1.20));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn unknown_instrument_is_none() {
        let cache = QuoteCache::new();
        assert!(cache.get(InstrumentId(99)).is_none());
    }
}
