// 14.4 engine/positions.rs: closing open positions. Active -> Closing ->
// venue -> Closed, with a rollback to Active when the venue cannot take the
// full outstanding volume. the realized result settles into the balance.

use super::core::{order_event, TradingEngine};
use super::results::EngineError;
use crate::commission::swaps;
use crate::events::{EventPayload, OrderClosedEvent};
use crate::fpl::order_total_fpl;
use crate::order::{summary_volume, weighted_average_price, CloseReason, Order, OrderStatus};
use crate::types::{AccountId, ClientId, OrderId, SignedVolume, Timestamp};

impl TradingEngine {
    pub fn close_position(
        &self,
        client_id: ClientId,
        account_id: AccountId,
        order_id: OrderId,
        reason: CloseReason,
    ) -> Result<Order, EngineError> {
        let account = self.accounts.get(client_id, account_id)?;

        let Some(mut order) = self.orders.active().try_remove(order_id) else {
            return Err(EngineError::OrderNotFound(order_id));
        };
        if order.client_id != client_id || order.account_id != account_id {
            self.orders.active().add(order)?;
            return Err(EngineError::OrderNotFound(order_id));
        }

        // closability pre-check before the Closing transition; the venue can
        // still come up short between here and the match, handled below
        let outstanding = order.matched_volume() - order.close_matched_volume();
        let close_volume = SignedVolume::from_direction(order.direction(), outstanding);
        if self
            .venue
            .price_for_close(order.instrument, close_volume)
            .is_none()
        {
            tracing::warn!(order_id = order_id.0, "no close liquidity, position stays open");
            self.orders.active().add(order.clone())?;
            return Ok(order);
        }

        order.status = OrderStatus::Closing;
        self.orders.closing().add(order.clone())?;
        self.emit(EventPayload::OrderClosing(order_event(&order)));

        // venue call outside all group locks
        let fills = self.venue.match_order(&order, false);

        let mut order = self.orders.closing().remove(order_id)?;
        let outstanding = order.matched_volume() - order.close_matched_volume();
        if summary_volume(&fills) < outstanding {
            tracing::warn!(
                order_id = order_id.0,
                "close failed for lack of liquidity, rolling back to active"
            );
            order.status = OrderStatus::Active;
            self.orders.active().add(order.clone())?;
            self.emit(EventPayload::OrderChanged(order_event(&order)));
            return Ok(order);
        }

        let instrument = self.config.instrument(order.instrument)?;
        let asset = self.config.asset(account.base_asset)?;
        let now = Timestamp::now();

        order.add_close_fills(&fills);
        order.close_price = weighted_average_price(&order.close_matched, instrument.accuracy);
        order.close_date = Some(now);
        order.close_reason = reason;
        order.status = OrderStatus::Closed;
        self.fpl.update_order_risk(&mut order, &account)?;
        order.swaps = swaps(&order, asset.accuracy, now);

        let realized = order_total_fpl(&order);
        account.add_balance(realized);

        self.orders.closed().add(order.clone())?;
        self.emit(EventPayload::OrderClosed(OrderClosedEvent {
            order_id: order.id,
            client_id: order.client_id,
            account_id: order.account_id,
            instrument: order.instrument,
            close_price: order.close_price,
            reason,
        }));
        self.refresh_account_fpl(&account)?;
        tracing::info!(order_id = order_id.0, realized = %realized, "position closed");
        Ok(order)
    }
}
