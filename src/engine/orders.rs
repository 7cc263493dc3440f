// 14.3 engine/orders.rs: placement, validation and execution against the
// venue. a rejection is a normal outcome: the order lands in the rejected
// group with a typed reason, one order's failure never takes down another.

use super::core::{order_event, TradingEngine};
use super::results::{EngineError, ValidationError};
use crate::account::MarginAccount;
use crate::commission::set_commission_rates;
use crate::events::{
    EventPayload, OrderCancelledEvent, OrderExecutedEvent, OrderRejectedEvent,
};
use crate::fpl::{matched_open_price, update_order_fpl, FplInputs};
use crate::limits::{check_deal_limits, DealLimitCheck, DealLimitParams};
use crate::order::{
    summary_volume, CloseReason, FillPolicy, MatchedOrder, Order, OrderKind, OrderRejectReason,
    OrderRequest, OrderStatus,
};
use crate::quotes::InstrumentBidAskPair;
use crate::types::{AccountId, ClientId, Direction, OrderId, Timestamp};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Everything validation resolved that the rest of placement needs.
pub(super) struct PlacementContext {
    pub account: Arc<MarginAccount>,
    pub inputs: FplInputs,
}

fn reject(reason: OrderRejectReason, message: impl ToString) -> ValidationError {
    ValidationError::new(reason, message)
}

impl TradingEngine {
    /// Place an order. A failed check produces a rejected order, not an error;
    /// errors are reserved for broken references and index violations.
    pub fn place_order(&self, request: OrderRequest) -> Result<Order, EngineError> {
        let mut order = Order::from_request(self.next_order_id(), &request, Timestamp::now());
        self.emit(EventPayload::OrderPlaced(order_event(&order)));

        let context = match self.validate_placement(&mut order) {
            Ok(context) => context,
            Err(error) => {
                tracing::debug!(order_id = order.id.0, %error, "placement rejected");
                return self.finalize_reject(order, error.reason, Some(error.message));
            }
        };

        match order.kind {
            OrderKind::Market => self.execute_order(order, &context.account),
            OrderKind::Limit => {
                // pending orders reserve init margin on their full volume
                update_order_fpl(&mut order, &context.inputs);
                self.orders.pending().add(order.clone())?;
                context.account.fpl.invalidate();
                self.refresh_account_fpl(&context.account)?;
                Ok(order)
            }
        }
    }

    /// Cancel a pending order. Anything past the pending group is refused,
    /// never silently dropped.
    pub fn cancel_order(
        &self,
        client_id: ClientId,
        account_id: AccountId,
        order_id: OrderId,
    ) -> Result<Order, EngineError> {
        if self.in_flight.lock().contains(&order_id) {
            return Err(EngineError::OrderIsExecuting(order_id));
        }
        let Some(mut order) = self.orders.pending().try_remove(order_id) else {
            return match self.orders.find(order_id) {
                Some(other) => Err(EngineError::OrderNotCancellable(order_id, other.status)),
                None => Err(EngineError::OrderNotFound(order_id)),
            };
        };
        if order.client_id != client_id || order.account_id != account_id {
            // not the caller's order; put it back untouched
            self.orders.pending().add(order)?;
            return Err(EngineError::OrderNotFound(order_id));
        }

        order.status = OrderStatus::Closed;
        order.close_reason = CloseReason::Canceled;
        order.close_date = Some(Timestamp::now());
        self.orders.closed().add(order.clone())?;
        self.emit(EventPayload::OrderCancelled(OrderCancelledEvent {
            order_id: order.id,
            client_id: order.client_id,
            account_id: order.account_id,
            instrument: order.instrument,
            reason: CloseReason::Canceled,
        }));

        if let Some(account) = self.accounts.try_get(client_id, account_id) {
            account.fpl.invalidate();
            self.refresh_account_fpl(&account)?;
        }
        Ok(order)
    }

    fn validate_placement(
        &self,
        order: &mut Order,
    ) -> Result<PlacementContext, ValidationError> {
        if order.volume.is_zero() {
            return Err(reject(
                OrderRejectReason::InvalidVolume,
                "volume must be non-zero",
            ));
        }

        let account = self
            .accounts
            .get(order.client_id, order.account_id)
            .map_err(|e| reject(OrderRejectReason::InvalidAccount, e))?;

        let instrument = self
            .config
            .instrument(order.instrument)
            .map_err(|e| reject(OrderRejectReason::InvalidInstrument, e))?;
        if !instrument.tradeable {
            return Err(reject(
                OrderRejectReason::InvalidInstrument,
                "instrument is not tradeable",
            ));
        }
        order.margin_instrument = instrument.margin_instrument;

        if let Some(parent_id) = order.parent_position_id {
            let parent = self.orders.active().get(parent_id).ok_or_else(|| {
                reject(OrderRejectReason::InvalidParent, "parent position not open")
            })?;
            let same_owner = parent.client_id == order.client_id
                && parent.account_id == order.account_id;
            if !same_owner || parent.direction() != order.direction().opposite() {
                return Err(reject(
                    OrderRejectReason::InvalidParent,
                    "close order must oppose its parent position",
                ));
            }
        }

        if order.kind == OrderKind::Limit
            && !order
                .expected_open_price
                .map_or(false, |p| p > Decimal::ZERO)
        {
            return Err(reject(
                OrderRejectReason::InvalidExpectedOpenPrice,
                "limit order needs a positive trigger price",
            ));
        }

        let quote = self.quotes.get(order.instrument).ok_or_else(|| {
            reject(OrderRejectReason::TechnicalError, "no quote for instrument")
        })?;
        let open_price = order
            .expected_open_price
            .unwrap_or_else(|| quote.price_for_open(order.direction()));

        if let Some(tp) = order.take_profit {
            let sane = match order.direction() {
                Direction::Buy => tp > open_price,
                Direction::Sell => tp < open_price,
            };
            if !sane {
                return Err(reject(
                    OrderRejectReason::InvalidTakeProfit,
                    "take profit on the wrong side of the open price",
                ));
            }
        }
        if let Some(sl) = order.stop_loss {
            let sane = match order.direction() {
                Direction::Buy => sl < open_price,
                Direction::Sell => sl > open_price,
            };
            if !sane {
                return Err(reject(
                    OrderRejectReason::InvalidStopLoss,
                    "stop loss on the wrong side of the open price",
                ));
            }
        }

        if order.is_expired(Timestamp::now()) {
            return Err(reject(OrderRejectReason::Expired, "validity already past"));
        }

        let terms = self
            .config
            .account_asset(account.trading_condition(), account.base_asset, order.instrument)
            .map_err(|e| reject(OrderRejectReason::TradingConditionError, e))?;
        set_commission_rates(order, &terms);

        let inputs = self
            .fpl
            .inputs(order, account.trading_condition(), account.base_asset)
            .map_err(|e| reject(OrderRejectReason::TradingConditionError, e))?;

        let existing = self
            .orders
            .active()
            .by_account_and_instrument(order.account_id, order.instrument);
        let params = DealLimitParams {
            one_time_limit: terms.deal_limit,
            total_limit: terms.position_limit,
            max_position_notional: terms.max_position_notional,
            contract_size: instrument.contract_size,
            fx_rate: inputs.quote_rate,
        };
        match check_deal_limits(order, &existing, Some(&quote), &params) {
            Ok(DealLimitCheck::Ok) => {}
            Ok(DealLimitCheck::OneTimeLimit) => {
                return Err(reject(
                    OrderRejectReason::OneTimeLimit,
                    "one-time deal limit exceeded",
                ))
            }
            Ok(DealLimitCheck::TotalLimit) => {
                return Err(reject(
                    OrderRejectReason::TotalLimit,
                    "total position limit exceeded",
                ))
            }
            Ok(DealLimitCheck::MaxPositionNotionalLimit) => {
                return Err(reject(
                    OrderRejectReason::MaxPositionNotionalLimit,
                    "position notional cap exceeded",
                ))
            }
            Err(e) => return Err(reject(OrderRejectReason::TechnicalError, e)),
        }

        if order.opens_new_position() {
            self.refresh_account_fpl(&account)
                .map_err(|e| reject(OrderRejectReason::TechnicalError, e))?;

            let required = if inputs.leverage_init > Decimal::ZERO {
                (open_price * order.volume.abs() * inputs.quote_rate / inputs.leverage_init)
                    .round_dp(inputs.account_accuracy)
            } else {
                Decimal::ZERO
            };
            if account.free_margin() < required {
                return Err(reject(
                    OrderRejectReason::NotEnoughBalance,
                    "free margin below required init margin",
                ));
            }

            let figures = account.fpl.figures();
            let projected_used = figures.used_margin + required;
            if projected_used > Decimal::ZERO
                && account.total_capital() / projected_used <= figures.stop_out_level
            {
                return Err(reject(
                    OrderRejectReason::LeadToStopOut,
                    "order would push the account to stop out",
                ));
            }
        }

        Ok(PlacementContext { account, inputs })
    }

    /// Route an order to the venue. The venue call runs strictly outside
    /// every index lock.
    pub(super) fn execute_order(
        &self,
        mut order: Order,
        account: &Arc<MarginAccount>,
    ) -> Result<Order, EngineError> {
        order.status = OrderStatus::ExecutionStarted;
        self.in_flight.lock().insert(order.id);
        if let Err(error) = self.orders.executing().add(order.clone()) {
            self.in_flight.lock().remove(&order.id);
            return Err(error.into());
        }

        let fills = self.venue.match_order(&order, order.opens_new_position());

        // the order stays in flight until the fills are applied, so no other
        // path touches it while it sits between groups
        let result = self.apply_fills(order.id, fills, account);
        self.in_flight.lock().remove(&order.id);
        result
    }

    /// Re-match partially filled orders against returning liquidity. Mirrors
    /// the pending retry: an order that got part of its volume keeps its
    /// fills and waits in the executing group for the rest.
    pub(super) fn process_partial_fills(
        &self,
        quote: &InstrumentBidAskPair,
    ) -> Result<(), EngineError> {
        let tradeable = self
            .config
            .instrument(quote.instrument)
            .map_or(false, |i| i.tradeable);
        if !tradeable {
            return Ok(());
        }

        for candidate in self.orders.executing().by_instrument(quote.instrument) {
            let order_id = candidate.id;
            // an order already out at the venue belongs to another path
            if !self.in_flight.lock().insert(order_id) {
                continue;
            }
            // re-read under the claim: a concurrent tick may have moved it
            let Some(order) = self.orders.executing().get(order_id) else {
                self.in_flight.lock().remove(&order_id);
                continue;
            };
            let result = match self.accounts.get(order.client_id, order.account_id) {
                Ok(account) => {
                    let fills = self.venue.match_order(&order, order.opens_new_position());
                    if fills.is_empty() {
                        Ok(())
                    } else {
                        self.apply_fills(order_id, fills, &account).map(|_| ())
                    }
                }
                Err(error) => {
                    tracing::warn!(order_id = order_id.0, %error, "skipping partial re-match");
                    Ok(())
                }
            };
            self.in_flight.lock().remove(&order_id);
            result?;
        }
        Ok(())
    }

    fn apply_fills(
        &self,
        order_id: OrderId,
        fills: Vec<MatchedOrder>,
        account: &Arc<MarginAccount>,
    ) -> Result<Order, EngineError> {
        let mut order = self.orders.executing().remove(order_id)?;
        let filled = summary_volume(&fills);
        let wanted = order.unfulfilled_volume();

        // fill-or-kill treats partial liquidity as none at all
        let no_liquidity =
            filled.is_zero() || (order.fill_policy == FillPolicy::FillOrKill && filled < wanted);
        if no_liquidity {
            return match order.kind {
                OrderKind::Market => {
                    self.finalize_reject(order, OrderRejectReason::NoLiquidity, None)
                }
                OrderKind::Limit => {
                    // non-market orders wait for liquidity and retry on a later tick
                    order.status = OrderStatus::WaitingForExecution;
                    self.orders.pending().add(order.clone())?;
                    self.emit(EventPayload::OrderChanged(order_event(&order)));
                    Ok(order)
                }
            };
        }

        order.add_fills(&fills);
        let instrument = self.config.instrument(order.instrument)?;
        let now = Timestamp::now();

        if order.is_fully_matched() {
            order.status = OrderStatus::Active;
            order.open_price = matched_open_price(&order, instrument.accuracy);
            order.open_date = Some(now);
            if let Some(quote) = self.quotes.get(order.instrument) {
                order.close_price = quote.price_for_close(order.direction());
            }
            self.fpl.update_order_risk(&mut order, account)?;
            self.orders.active().add(order.clone())?;
            self.emit(EventPayload::OrderExecuted(OrderExecutedEvent {
                order_id: order.id,
                client_id: order.client_id,
                account_id: order.account_id,
                instrument: order.instrument,
                matched_volume: order.matched_volume(),
                open_price: order.open_price,
                fully_matched: true,
            }));
            self.refresh_account_fpl(account)?;
            // an opening fill can itself tip the account over the threshold
            self.check_account_risk(account)?;
            Ok(order)
        } else {
            // not active yet, but the matched volume already carries risk;
            // price it from the current quote so margin is reserved
            if let Some(quote) = self.quotes.get(order.instrument) {
                order.close_price = quote.price_for_close(order.direction());
            }
            self.fpl.update_order_risk(&mut order, account)?;
            self.orders.executing().add(order.clone())?;
            self.emit(EventPayload::OrderExecuted(OrderExecutedEvent {
                order_id: order.id,
                client_id: order.client_id,
                account_id: order.account_id,
                instrument: order.instrument,
                matched_volume: order.matched_volume(),
                open_price: matched_open_price(&order, instrument.accuracy),
                fully_matched: false,
            }));
            self.refresh_account_fpl(account)?;
            Ok(order)
        }
    }

    pub(super) fn finalize_reject(
        &self,
        mut order: Order,
        reason: OrderRejectReason,
        comment: Option<String>,
    ) -> Result<Order, EngineError> {
        order.status = OrderStatus::Rejected;
        order.reject_reason = Some(reason);
        order.reject_comment = comment.clone();
        order.close_date = Some(Timestamp::now());
        self.orders.rejected().add(order.clone())?;
        self.emit(EventPayload::OrderRejected(OrderRejectedEvent {
            order_id: order.id,
            client_id: order.client_id,
            account_id: order.account_id,
            instrument: order.instrument,
            reason,
            comment,
        }));

        if let Some(account) = self.accounts.try_get(order.client_id, order.account_id) {
            account.fpl.invalidate();
            self.refresh_account_fpl(&account)?;
        }
        Ok(order)
    }
}
