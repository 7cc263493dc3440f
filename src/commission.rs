// 8.0: swap and trade commissions. rates are copied from the account asset
// onto the order at placement and are immutable afterwards; the long or short
// rate is picked by order direction.

use crate::config::AccountAssetConfig;
use crate::order::Order;
use crate::types::{Direction, Timestamp};
use rust_decimal::Decimal;

/// 365-day convention, not calendar-aware.
pub const SECONDS_PER_YEAR: u32 = 31_536_000;

/// Copy commission and swap rates from the account asset config. Buy opens at
/// the long rate and closes at the short rate; reversed for sell.
pub fn set_commission_rates(order: &mut Order, terms: &AccountAssetConfig) {
    match order.direction() {
        Direction::Buy => {
            order.open_commission_rate = terms.commission_long;
            order.close_commission_rate = terms.commission_short;
            order.swap_rate = terms.swap_long;
        }
        Direction::Sell => {
            order.open_commission_rate = terms.commission_short;
            order.close_commission_rate = terms.commission_long;
            order.swap_rate = terms.swap_short;
        }
    }
    order.commission_lot = terms.commission_lot;
}

/// Accrued swaps for the time the position has been open. Zero before the
/// order has an open timestamp.
pub fn swaps(order: &Order, accuracy: u32, now: Timestamp) -> Decimal {
    let Some(open_date) = order.open_date else {
        return Decimal::ZERO;
    };
    let seconds_open = open_date.elapsed_seconds(&now);
    (order.fpl_data.quote_rate * order.matched_volume() * order.swap_rate * seconds_open
        / Decimal::from(SECONDS_PER_YEAR))
    .round_dp(accuracy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{FillPolicy, MatchedOrder, OrderKind, OrderRequest};
    use crate::types::{
        AccountId, AssetId, ClientId, InstrumentId, OrderId, SignedVolume, TradingConditionId,
    };
    use rust_decimal_macros::dec;

    fn terms() -> AccountAssetConfig {
        AccountAssetConfig {
            trading_condition: TradingConditionId(1),
            base_asset: AssetId(1),
            instrument: InstrumentId(1),
            leverage_init: dec!(100),
            leverage_maintenance: dec!(150),
            swap_long: dec!(-0.02),
            swap_short: dec!(0.01),
            commission_long: dec!(3),
            commission_short: dec!(2),
            commission_lot: dec!(100000),
            deal_limit: dec!(10),
            position_limit: dec!(30),
            max_position_notional: None,
        }
    }

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
            fill_policy: FillPolicy::FillOrKill,
            validity: None,
            parent_order_id: None,
            parent_position_id: None,
        };
        Order::from_request(OrderId(1), &request, Timestamp::from_millis(0))
    }

    #[test]
    fn buy_uses_long_rate_for_open() {
        let mut buy = order(dec!(1));
        set_commission_rates(&mut buy, &terms());

        assert_eq!(buy.open_commission_rate, dec!(3));
        assert_eq!(buy.close_commission_rate, dec!(2));
        assert_eq!(buy.swap_rate, dec!(-0.02));
    }

    #[test]
    fn sell_uses_short_rate_for_open() {
        let mut sell = order(dec!(-1));
        set_commission_rates(&mut sell, &terms());

        assert_eq!(sell.open_commission_rate, dec!(2));
        assert_eq!(sell.close_commission_rate, dec!(3));
        assert_eq!(sell.swap_rate, dec!(0.01));
    }

    #[test]
    fn swaps_zero_before_open() {
        let o = order(dec!(1));
        assert_eq!(swaps(&o, 2, Timestamp::from_millis(1_000_000)), Decimal::ZERO);
    }

    #[test]
    fn swaps_accrue_with_time_open() {
        let mut o = order(dec!(100000));
        o.open_date = Some(Timestamp::from_millis(0));
        o.swap_rate = dec!(0.01);
        o.fpl_data.quote_rate = Decimal::ONE;
        o.matched.push(MatchedOrder {
            order_id: OrderId(9),
            price: dec!(1.2),
            volume: dec!(100000),
            matched_at: Timestamp::from_millis(0),
        });

        // one year open: 1 * 100000 * 0.01 * 31536000 / 31536000 = 1000
        let one_year = Timestamp::from_millis(31_536_000_000);
        assert_eq!(swaps(&o, 2, one_year), dec!(1000.00));

        // half a year: 500
        let half_year = Timestamp::from_millis(15_768_000_000);
        assert_eq!(swaps(&o, 2, half_year), dec!(500.00));
    }
}
