// 7.0: floating pnl and margin math. per-order figures first, per-account
// aggregate second. everything is rounded with the account base asset accuracy
// except cross prices, which round with the instrument accuracy.
//
// chained dirtying contract: updating an order's risk figures converges the
// order snapshot (calculated = actual) and then invalidates the owning
// account's snapshot, because the account aggregate now has to be recomputed.

use crate::account::{AccountFplFigures, MarginAccount};
use crate::config::{ConfigError, TradingConfig};
use crate::order::{weighted_average_price, Order};
use crate::quotes::QuoteCache;
use crate::types::{AssetId, Direction, TradingConditionId};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Everything a single-order risk update depends on. Gathered up front so the
/// computation itself can run under an index lock without touching any other
/// lock.
#[derive(Debug, Clone, Copy)]
pub struct FplInputs {
    /// Rate converting the instrument quote asset into the account base asset.
    pub quote_rate: Decimal,
    pub account_accuracy: u32,
    pub instrument_accuracy: u32,
    pub leverage_init: Decimal,
    pub leverage_maintenance: Decimal,
}

#[derive(Debug, Clone)]
pub struct FplCalculator {
    config: Arc<TradingConfig>,
    quotes: Arc<QuoteCache>,
}

impl FplCalculator {
    pub fn new(config: Arc<TradingConfig>, quotes: Arc<QuoteCache>) -> Self {
        Self { config, quotes }
    }

    /// Conversion rate into the account base asset. 1 when the instrument is
    /// quoted in the base asset directly; otherwise the current price of the
    /// margin instrument on the side the order would trade.
    pub fn quote_rate(
        &self,
        order: &Order,
        direction: Direction,
    ) -> Result<Decimal, ConfigError> {
        let Some(margin_instrument) = order.margin_instrument else {
            return Ok(Decimal::ONE);
        };
        match self.quotes.get(margin_instrument) {
            Some(quote) => Ok(quote.price_for_open(direction)),
            None => Ok(Decimal::ONE),
        }
    }

    pub fn inputs(
        &self,
        order: &Order,
        condition: TradingConditionId,
        base_asset: AssetId,
    ) -> Result<FplInputs, ConfigError> {
        let asset = self.config.asset(base_asset)?;
        let instrument = self.config.instrument(order.instrument)?;
        let terms = self
            .config
            .account_asset(condition, base_asset, order.instrument)?;
        let quote_rate = self.quote_rate(order, order.direction())?;

        Ok(FplInputs {
            quote_rate,
            account_accuracy: asset.accuracy,
            instrument_accuracy: instrument.accuracy,
            leverage_init: terms.leverage_init,
            leverage_maintenance: terms.leverage_maintenance,
        })
    }

    /// Recompute one order's risk figures and dirty the owning account.
    pub fn update_order_risk(
        &self,
        order: &mut Order,
        account: &MarginAccount,
    ) -> Result<(), ConfigError> {
        let inputs = self.inputs(order, account.trading_condition(), account.base_asset)?;
        update_order_fpl(order, &inputs);
        account.fpl.invalidate();
        Ok(())
    }

    /// Aggregate figures for one account. `active` carries maintenance margin,
    /// `pending` carries init margin. Fails when the account's group has no
    /// configured thresholds.
    pub fn account_figures(
        &self,
        account: &MarginAccount,
        active: &[Order],
        pending: &[Order],
    ) -> Result<AccountFplFigures, ConfigError> {
        let group = self
            .config
            .account_group(account.trading_condition(), account.base_asset)?;

        let pnl: Decimal = active.iter().map(order_total_fpl).sum();

        let maintenance: Decimal = active.iter().map(|o| o.fpl_data.margin_maintenance).sum();
        let pending_init: Decimal = pending.iter().map(|o| o.fpl_data.margin_init).sum();
        let active_init: Decimal = active.iter().map(|o| o.fpl_data.margin_init).sum();

        Ok(AccountFplFigures {
            pnl,
            used_margin: maintenance + pending_init,
            margin_init: active_init + pending_init,
            open_positions_count: active.len(),
            margin_call_level: group.margin_call_level,
            stop_out_level: group.stop_out_level,
        })
    }
}

/// The single-order formulas. Deterministic in the order fields and the
/// gathered inputs, so concurrent recomputation is idempotent.
pub fn update_order_fpl(order: &mut Order, inputs: &FplInputs) {
    let accuracy = inputs.account_accuracy;
    let rate = inputs.quote_rate;
    let matched_abs = order.matched_volume();
    let signed_matched = order.direction().sign() * matched_abs;

    order.fpl_data.quote_rate = rate;

    order.fpl_data.fpl = if order.open_price > Decimal::ZERO && order.close_price > Decimal::ZERO {
        ((order.close_price - order.open_price) * rate * signed_matched).round_dp(accuracy)
    } else {
        Decimal::ZERO
    };

    // pending orders reserve margin on their full volume at the expected price
    let margin_volume = if matched_abs.is_zero() {
        order.volume.abs()
    } else {
        matched_abs
    };
    let margin_price = if order.close_price > Decimal::ZERO {
        order.close_price
    } else if order.open_price > Decimal::ZERO {
        order.open_price
    } else {
        order.expected_open_price.unwrap_or(Decimal::ZERO)
    };

    order.fpl_data.margin_init = if inputs.leverage_init > Decimal::ZERO {
        (margin_price * margin_volume * rate / inputs.leverage_init).round_dp(accuracy)
    } else {
        Decimal::ZERO
    };
    order.fpl_data.margin_maintenance = if inputs.leverage_maintenance > Decimal::ZERO {
        (margin_price * margin_volume * rate / inputs.leverage_maintenance).round_dp(accuracy)
    } else {
        Decimal::ZERO
    };

    order.fpl_data.open_cross_price =
        (order.open_price * rate).round_dp(inputs.instrument_accuracy);
    order.fpl_data.close_cross_price =
        (order.close_price * rate).round_dp(inputs.instrument_accuracy);

    order.fpl_data.mark_calculated();
}

/// FPL net of commissions and swaps. This is the order's contribution to the
/// account pnl aggregate.
pub fn order_total_fpl(order: &Order) -> Decimal {
    let commission_rate = order.open_commission_rate + order.close_commission_rate;
    let commissions = if order.commission_lot > Decimal::ZERO {
        commission_rate * order.matched_volume() / order.commission_lot
    } else {
        commission_rate
    };
    order.fpl_data.fpl - commissions - order.swaps
}

/// Volume-weighted open price over the matched fills, instrument accuracy.
pub fn matched_open_price(order: &Order, instrument_accuracy: u32) -> Decimal {
    weighted_average_price(&order.matched, instrument_accuracy)
}
