// 14.5 engine/pending.rs: the waiting group. expiry sweep and trigger-price
// activation on every quote tick. activation races a user cancel for the same
// order; try_remove decides who wins.

use super::core::{order_event, TradingEngine};
use super::results::EngineError;
use crate::events::{EventPayload, OrderCancelledEvent};
use crate::order::{CloseReason, OrderStatus};
use crate::quotes::InstrumentBidAskPair;
use crate::types::Timestamp;

impl TradingEngine {
    /// Cancel every pending order whose validity has passed.
    pub fn process_expired(&self, now: Timestamp) -> Result<(), EngineError> {
        for candidate in self.orders.pending().all() {
            if !candidate.is_expired(now) {
                continue;
            }
            let Some(mut order) = self.orders.pending().try_remove(candidate.id) else {
                continue;
            };
            order.status = OrderStatus::Closed;
            order.close_reason = CloseReason::Expired;
            order.close_date = Some(now);
            self.orders.closed().add(order.clone())?;
            self.emit(EventPayload::OrderCancelled(OrderCancelledEvent {
                order_id: order.id,
                client_id: order.client_id,
                account_id: order.account_id,
                instrument: order.instrument,
                reason: CloseReason::Expired,
            }));

            if let Some(account) = self.accounts.try_get(order.client_id, order.account_id) {
                account.fpl.invalidate();
                self.refresh_account_fpl(&account)?;
            }
        }
        Ok(())
    }

    /// Dispatch pending orders whose trigger price the new quote reaches:
    /// a buy at or below its limit, a sell at or above it.
    pub(super) fn process_pending_on_quote(
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

        for candidate in self.orders.pending().by_instrument(quote.instrument) {
            let trigger_price = quote.price_for_open(candidate.direction());
            if !candidate.pending_trigger_hit(trigger_price) {
                continue;
            }
            let Some(order) = self.orders.pending().try_remove(candidate.id) else {
                continue;
            };
            let account = match self.accounts.get(order.client_id, order.account_id) {
                Ok(account) => account,
                Err(error) => {
                    self.finalize_reject(
                        order,
                        crate::order::OrderRejectReason::TechnicalError,
                        Some(error.to_string()),
                    )?;
                    continue;
                }
            };
            self.emit(EventPayload::OrderActivated(order_event(&order)));
            self.execute_order(order, &account)?;
        }
        Ok(())
    }
}
