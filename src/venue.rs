// 10.0: the external matching venue boundary. the engine calls it outside
// every index lock: this is the only operation allowed to block. the in-memory
// venue below backs tests and the sim with configurable liquidity levels.

use crate::order::{FillPolicy, MatchedOrder, Order};
use crate::types::{InstrumentId, OrderId, SignedVolume, Timestamp};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

pub trait MatchingVenue: Send + Sync {
    /// Match the order's outstanding volume. May return fewer fills than
    /// requested, or none at all. Where the engine cannot accept a partial
    /// result the match must be atomic: a fill-or-kill open and any close
    /// either fill completely or consume nothing.
    fn match_order(&self, order: &Order, open_new_position: bool) -> Vec<MatchedOrder>;

    /// Price at which the given volume could be closed right now.
    fn price_for_close(&self, instrument: InstrumentId, volume: SignedVolume) -> Option<Decimal>;
}

/// One resting liquidity level.
#[derive(Debug, Clone, Copy)]
pub struct LiquidityLevel {
    pub price: Decimal,
    pub volume: Decimal,
}

/// Venue double with per-instrument liquidity that fills consume.
#[derive(Debug, Default)]
pub struct InMemoryVenue {
    liquidity: Mutex<HashMap<InstrumentId, Vec<LiquidityLevel>>>,
    next_counterparty_id: AtomicU64,
}

impl InMemoryVenue {
    pub fn new() -> Self {
        Self {
            liquidity: Mutex::new(HashMap::new()),
            next_counterparty_id: AtomicU64::new(1_000_000),
        }
    }

    pub fn set_liquidity(&self, instrument: InstrumentId, levels: Vec<LiquidityLevel>) {
        self.liquidity.lock().insert(instrument, levels);
    }

    pub fn available_volume(&self, instrument: InstrumentId) -> Decimal {
        self.liquidity
            .lock()
            .get(&instrument)
            .map(|levels| levels.iter().map(|l| l.volume).sum())
            .unwrap_or(Decimal::ZERO)
    }

    fn next_id(&self) -> OrderId {
        OrderId(self.next_counterparty_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl MatchingVenue for InMemoryVenue {
    fn match_order(&self, order: &Order, open_new_position: bool) -> Vec<MatchedOrder> {
        let wanted = if open_new_position {
            order.unfulfilled_volume()
        } else {
            order.matched_volume() - order.close_matched_volume()
        };
        if wanted <= Decimal::ZERO {
            return Vec::new();
        }

        let mut book = self.liquidity.lock();
        let Some(levels) = book.get_mut(&order.instrument) else {
            return Vec::new();
        };

        // the book must not be consumed for a result the engine will discard
        let all_or_none =
            !open_new_position || order.fill_policy == FillPolicy::FillOrKill;
        if all_or_none {
            let available: Decimal = levels.iter().map(|l| l.volume).sum();
            if available < wanted {
                return Vec::new();
            }
        }

        let mut fills = Vec::new();
        let mut remaining = wanted;
        for level in levels.iter_mut() {
            if remaining.is_zero() {
                break;
            }
            if level.volume.is_zero() {
                continue;
            }
            let taken = remaining.min(level.volume);
            level.volume -= taken;
            remaining -= taken;
            fills.push(MatchedOrder {
                order_id: self.next_id(),
                price: level.price,
                volume: taken,
                matched_at: Timestamp::now(),
            });
        }
        levels.retain(|l| !l.volume.is_zero());
        fills
    }

    fn price_for_close(&self, instrument: InstrumentId, volume: SignedVolume) -> Option<Decimal> {
        let book = self.liquidity.lock();
        let levels = book.get(&instrument)?;
        let available: Decimal = levels.iter().map(|l| l.volume).sum();
        if available < volume.abs() {
            return None;
        }
        levels.first().map(|l| l.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{FillPolicy, OrderKind, OrderRequest};
    use crate::types::{AccountId, ClientId};
    use rust_decimal_macros::dec;

    fn order(volume: Decimal) -> Order {
        let request = OrderRequest {
            client_id: ClientId(1),
            account_id: AccountId(1),
            instrument: InstrumentId(1),
            volume: SignedVolume::new(volume),
            kind: OrderKind::Market,
            expected_open_price: None,
            take_profit: None,
            stop_loss: None,
            fill_policy: FillPolicy::PartialFill,
            validity: None,
            parent_order_id: None,
            parent_position_id: None,
        };
        Order::from_request(OrderId(1), &request, Timestamp::from_millis(0))
    }

    #[test]
    fn consumes_levels_in_order() {
        let venue = InMemoryVenue::new();
        venue.set_liquidity(
            InstrumentId(1),
            vec![
                LiquidityLevel { price: dec!(1.2000), volume: dec!(6) },
                LiquidityLevel { price: dec!(1.2010), volume: dec!(10) },
            ],
        );

        let fills = venue.match_order(&order(dec!(10)), true);
        assert_eq!(fills.len(), 2);
        assert_eq!(fills[0].volume, dec!(6));
        assert_eq!(fills[1].volume, dec!(4));
        assert_eq!(venue.available_volume(InstrumentId(1)), dec!(6));
    }

    #[test]
    fn partial_when_liquidity_is_thin() {
        let venue = InMemoryVenue::new();
        venue.set_liquidity(
            InstrumentId(1),
            vec![LiquidityLevel { price: dec!(1.2000), volume: dec!(6) }],
        );

        let fills = venue.match_order(&order(dec!(10)), true);
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].volume, dec!(6));
    }

    #[test]
    fn fill_or_kill_never_consumes_partially() {
        let venue = InMemoryVenue::new();
        venue.set_liquidity(
            InstrumentId(1),
            vec![LiquidityLevel { price: dec!(1.2000), volume: dec!(6) }],
        );

        let mut fok = order(dec!(10));
        fok.fill_policy = FillPolicy::FillOrKill;
        assert!(venue.match_order(&fok, true).is_empty());
        assert_eq!(venue.available_volume(InstrumentId(1)), dec!(6));
    }

    #[test]
    fn close_match_is_all_or_none() {
        let venue = InMemoryVenue::new();
        venue.set_liquidity(
            InstrumentId(1),
            vec![LiquidityLevel { price: dec!(1.2000), volume: dec!(6) }],
        );

        let mut position = order(dec!(10));
        position.matched.push(MatchedOrder {
            order_id: OrderId(50),
            price: dec!(1.1990),
            volume: dec!(10),
            matched_at: Timestamp::from_millis(0),
        });

        assert!(venue.match_order(&position, false).is_empty());
        assert_eq!(venue.available_volume(InstrumentId(1)), dec!(6));
    }

    #[test]
    fn no_liquidity_no_fills() {
        let venue = InMemoryVenue::new();
        assert!(venue.match_order(&order(dec!(10)), true).is_empty());
        assert!(venue
            .price_for_close(InstrumentId(1), SignedVolume::new(dec!(1)))
            .is_none());
    }
}
