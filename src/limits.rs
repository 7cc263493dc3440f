// 9.0: deal limit checks. a pure predicate over a prospective fill: no side
// effects, a tagged result for a normal limit breach, an error only for
// malformed input (missing quote, non-positive contract size).

use crate::order::Order;
use crate::quotes::InstrumentBidAskPair;
use rust_decimal::prelude::Signed;
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DealLimitCheck {
    Ok,
    OneTimeLimit,
    TotalLimit,
    MaxPositionNotionalLimit,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum DealLimitInputError {
    #[error("No quote available for the notional check")]
    MissingQuote,

    #[error("Contract size must be positive, got {0}")]
    InvalidContractSize(Decimal),
}

#[derive(Debug, Clone, Copy)]
pub struct DealLimitParams {
    /// One-time deal volume limit in lots. Zero disables the check.
    pub one_time_limit: Decimal,
    /// Total net position volume limit in lots. Zero disables the check.
    pub total_limit: Decimal,
    /// Cap on position notional in the reference currency.
    pub max_position_notional: Option<Decimal>,
    pub contract_size: Decimal,
    /// Converts instrument quote currency into the reference currency.
    pub fx_rate: Decimal,
}

fn position_volume(order: &Order) -> Decimal {
    order.direction().sign() * order.matched_volume()
}

/// Validate a prospective fill against the configured limits. `existing` is
/// the account's open positions in the same instrument.
pub fn check_deal_limits(
    order: &Order,
    existing: &[Order],
    quote: Option<&InstrumentBidAskPair>,
    params: &DealLimitParams,
) -> Result<DealLimitCheck, DealLimitInputError> {
    if params.contract_size <= Decimal::ZERO {
        return Err(DealLimitInputError::InvalidContractSize(
            params.contract_size,
        ));
    }

    let net_existing: Decimal = existing.iter().map(position_volume).sum();
    let order_volume = order.volume.value();

    // a pure close never opens exposure and is always allowed
    let is_pure_close = !net_existing.is_zero()
        && order_volume.signum() == -net_existing.signum()
        && order_volume.abs() <= net_existing.abs();
    if is_pure_close {
        return Ok(DealLimitCheck::Ok);
    }

    if params.one_time_limit > Decimal::ZERO
        && order.unfulfilled_volume() > params.one_time_limit * params.contract_size
    {
        return Ok(DealLimitCheck::OneTimeLimit);
    }

    let projected = net_existing + order_volume;
    if params.total_limit > Decimal::ZERO
        && projected.abs() > params.total_limit * params.contract_size
    {
        return Ok(DealLimitCheck::TotalLimit);
    }

    if let Some(cap) = params.max_position_notional {
        let quote = quote.ok_or(DealLimitInputError::MissingQuote)?;
        let direction = order.direction();

        let same_dir: Decimal = existing
            .iter()
            .filter(|o| o.direction() == direction)
            .map(|o| o.matched_volume())
            .sum();
        let opposite: Decimal = existing
            .iter()
            .filter(|o| o.direction() == direction.opposite())
            .map(|o| o.matched_volume())
            .sum();

        let same_price = quote.price_for_close(direction);
        let opposite_price = quote.price_for_close(direction.opposite());

        let before =
            (same_dir * same_price - opposite * opposite_price).abs() * params.fx_rate;
        let after = ((same_dir + order.unfulfilled_volume()) * same_price
            - opposite * opposite_price)
            .abs()
            * params.fx_rate;

        // a fill that reduces notional is allowed even above the cap
        if after > before && after > cap {
            return Ok(DealLimitCheck::MaxPositionNotionalLimit);
        }
    }

    Ok(DealLimitCheck::Ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{FillPolicy, MatchedOrder, OrderKind, OrderRequest};
    use crate::types::{
        AccountId, ClientId, InstrumentId, OrderId, SignedVolume, Timestamp,
    };
    use rust_decimal_macros::dec;

    fn params() -> DealLimitParams {
        DealLimitParams {
            one_time_limit: dec!(10),
            total_limit: dec!(30),
            max_position_notional: None,
            contract_size: dec!(100000),
            fx_rate: Decimal::ONE,
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
            fill_policy: FillPolicy::PartialFill,
            validity: None,
            parent_order_id: None,
            parent_position_id: None,
        };
        Order::from_request(OrderId(1), &request, Timestamp::from_millis(0))
    }

    fn open_position(id: u64, volume: Decimal) -> Order {
        let mut position = order(volume);
        position.id = OrderId(id);
        position.matched.push(MatchedOrder {
            order_id: OrderId(900 + id),
            price: dec!(1.2),
            volume: volume.abs(),
            matched_at: Timestamp::from_millis(0),
        });
        position
    }

    fn quote() -> InstrumentBidAskPair {
        InstrumentBidAskPair {
            instrument: InstrumentId(1),
            bid: dec!(1.1995),
            ask: dec!(1.2005),
            timestamp: Timestamp::from_millis(0),
        }
    }

    #[test]
    fn within_limits_is_ok() {
        let result = check_deal_limits(&order(dec!(500000)), &[], Some(&quote()), &params());
        assert_eq!(result.unwrap(), DealLimitCheck::Ok);
    }

    #[test]
    fn one_time_limit_breached() {
        // 10 lots * 100000 = 1_000_000 max per deal
        let result = check_deal_limits(&order(dec!(1500000)), &[], Some(&quote()), &params());
        assert_eq!(result.unwrap(), DealLimitCheck::OneTimeLimit);
    }

    #[test]
    fn one_time_limit_disabled_when_zero() {
        let mut p = params();
        p.one_time_limit = Decimal::ZERO;
        p.total_limit = Decimal::ZERO;
        let result = check_deal_limits(&order(dec!(99000000)), &[], Some(&quote()), &p);
        assert_eq!(result.unwrap(), DealLimitCheck::Ok);
    }

    #[test]
    fn total_limit_counts_existing_positions() {
        // 30 lots * 100000 = 3_000_000 max net; already long 2_500_000
        let existing = vec![open_position(2, dec!(2500000))];
        let result =
            check_deal_limits(&order(dec!(600000)), &existing, Some(&quote()), &params());
        assert_eq!(result.unwrap(), DealLimitCheck::TotalLimit);
    }

    #[test]
    fn pure_close_always_allowed() {
        let mut p = params();
        p.one_time_limit = dec!(0.001);
        p.total_limit = dec!(0.001);

        let existing = vec![open_position(2, dec!(2500000))];
        let result =
            check_deal_limits(&order(dec!(-2500000)), &existing, Some(&quote()), &p);
        assert_eq!(result.unwrap(), DealLimitCheck::Ok);
    }

    #[test]
    fn notional_cap_rejects_only_increases() {
        let mut p = params();
        p.one_time_limit = Decimal::ZERO;
        p.total_limit = Decimal::ZERO;
        p.max_position_notional = Some(dec!(1000000));

        // already long ~2.4M notional, above the cap
        let existing = vec![open_position(2, dec!(2000000))];

        // adding same-direction exposure: increases and exceeds -> rejected
        let grow = check_deal_limits(&order(dec!(100000)), &existing, Some(&quote()), &p);
        assert_eq!(grow.unwrap(), DealLimitCheck::MaxPositionNotionalLimit);

        // partial reduce larger than net is not a pure close, but it does not
        // increase same-direction notional either
        let reduce =
            check_deal_limits(&order(dec!(-2500000)), &existing, Some(&quote()), &p);
        assert_eq!(reduce.unwrap(), DealLimitCheck::Ok);
    }

    #[test]
    fn malformed_input_is_an_error() {
        let mut p = params();
        p.contract_size = Decimal::ZERO;
        assert!(matches!(
            check_deal_limits(&order(dec!(1)), &[], Some(&quote()), &p),
            Err(DealLimitInputError::InvalidContractSize(_))
        ));

        let mut p = params();
        p.max_position_notional = Some(dec!(1000));
        assert!(matches!(
            check_deal_limits(&order(dec!(1)), &[], None, &p),
            Err(DealLimitInputError::MissingQuote)
        ));
    }
}
