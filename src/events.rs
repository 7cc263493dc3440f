// 12.0: every order state transition produces exactly one event, emitted in
// transition order. the wire format and transport live downstream; the core
// contract is occurrence and ordering only.

use crate::order::{CloseReason, OrderRejectReason};
use crate::types::{AccountId, ClientId, InstrumentId, OrderId, Timestamp};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // order lifecycle
    OrderPlaced(OrderEvent),
    OrderActivated(OrderEvent),
    OrderExecuted(OrderExecutedEvent),
    OrderChanged(OrderEvent),
    OrderCancelled(OrderCancelledEvent),
    OrderRejected(OrderRejectedEvent),
    OrderClosing(OrderEvent),
    OrderClosed(OrderClosedEvent),

    // account risk
    MarginCall(MarginEvent),
    StopOut(MarginEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEvent {
    pub order_id: OrderId,
    pub client_id: ClientId,
    pub account_id: AccountId,
    pub instrument: InstrumentId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderExecutedEvent {
    pub order_id: OrderId,
    pub client_id: ClientId,
    pub account_id: AccountId,
    pub instrument: InstrumentId,
    pub matched_volume: Decimal,
    pub open_price: Decimal,
    pub fully_matched: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCancelledEvent {
    pub order_id: OrderId,
    pub client_id: ClientId,
    pub account_id: AccountId,
    pub instrument: InstrumentId,
    pub reason: CloseReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRejectedEvent {
    pub order_id: OrderId,
    pub client_id: ClientId,
    pub account_id: AccountId,
    pub instrument: InstrumentId,
    pub reason: OrderRejectReason,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderClosedEvent {
    pub order_id: OrderId,
    pub client_id: ClientId,
    pub account_id: AccountId,
    pub instrument: InstrumentId,
    pub close_price: Decimal,
    pub reason: CloseReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginEvent {
    pub client_id: ClientId,
    pub account_id: AccountId,
    pub margin_level: Decimal,
}

/// Emitters run on the engine's worker contexts, so they take `&self`.
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: Event);
}

#[derive(Debug, Default)]
pub struct EventCollector {
    events: Mutex<Vec<Event>>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventEmitter for EventCollector {
    fn emit(&self, event: Event) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_for_downstream_consumers() {
        let event = Event::new(
            EventId(7),
            Timestamp::from_millis(1_000),
            EventPayload::StopOut(MarginEvent {
                client_id: ClientId(1),
                account_id: AccountId(2),
                margin_level: rust_decimal_macros::dec!(0.93),
            }),
        );

        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, EventId(7));
        assert!(matches!(back.payload, EventPayload::StopOut(_)));
    }

    #[test]
    fn collector_preserves_order() {
        let collector = EventCollector::new();
        for i in 0..3 {
            collector.emit(Event::new(
                EventId(i),
                Timestamp::from_millis(i as i64),
                EventPayload::OrderPlaced(OrderEvent {
                    order_id: OrderId(i),
                    client_id: ClientId(1),
                    account_id: AccountId(1),
                    instrument: InstrumentId(1),
                }),
            ));
        }

        let events = collector.events();
        assert_eq!(events.len(), 3);
        assert!(events.windows(2).all(|w| w[0].id < w[1].id));

        collector.clear();
        assert!(collector.events().is_empty());
    }
}
