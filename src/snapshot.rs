// 13.0: warm restart. orders are periodically persisted through an opaque
// store and re-seeded into the index at startup, each into the group matching
// its persisted status. storage format and transport stay outside the core.

use crate::order::Order;
use crate::order_index::{OrderIndex, OrderIndexError};
use parking_lot::Mutex;

pub trait OrderSnapshotStore: Send + Sync {
    fn read_orders(&self) -> Vec<Order>;
    fn write_orders(&self, orders: &[Order]);
}

/// Re-insert every persisted order. A duplicate id in the snapshot is a
/// corrupt snapshot and fails the seed.
pub fn seed_from_snapshot(
    index: &OrderIndex,
    store: &dyn OrderSnapshotStore,
) -> Result<usize, OrderIndexError> {
    let orders = store.read_orders();
    let count = orders.len();
    for order in orders {
        index.add(order)?;
    }
    Ok(count)
}

/// Persist the current index contents.
pub fn write_snapshot(index: &OrderIndex, store: &dyn OrderSnapshotStore) {
    store.write_orders(&index.all());
}

#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    orders: Mutex<Vec<Order>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OrderSnapshotStore for InMemorySnapshotStore {
    fn read_orders(&self) -> Vec<Order> {
        self.orders.lock().clone()
    }

    fn write_orders(&self, orders: &[Order]) {
        *self.orders.lock() = orders.to_vec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{FillPolicy, OrderKind, OrderRequest, OrderStatus};
    use crate::types::{AccountId, ClientId, InstrumentId, OrderId, SignedVolume, Timestamp};
    use rust_decimal_macros::dec;

    fn order(id: u64, status: OrderStatus) -> Order {
        let request = OrderRequest {
            client_id: ClientId(1),
            account_id: AccountId(1),
            instrument: InstrumentId(1),
            volume: SignedVolume::new(dec!(1)),
            kind: OrderKind::Limit,
            expected_open_price: Some(dec!(1.2)),
            take_profit: None,
            stop_loss: None,
            fill_policy: FillPolicy::PartialFill,
            validity: None,
            parent_order_id: None,
            parent_position_id: None,
        };
        let mut order = Order::from_request(OrderId(id), &request, Timestamp::from_millis(0));
        order.status = status;
        order
    }

    #[test]
    fn round_trip_restores_groups() {
        let index = OrderIndex::new();
        index.add(order(1, OrderStatus::WaitingForExecution)).unwrap();
        index.add(order(2, OrderStatus::Active)).unwrap();
        index.add(order(3, OrderStatus::Closed)).unwrap();

        let store = InMemorySnapshotStore::new();
        write_snapshot(&index, &store);

        let restored = OrderIndex::new();
        let count = seed_from_snapshot(&restored, &store).unwrap();
        assert_eq!(count, 3);
        assert!(restored.pending().contains(OrderId(1)));
        assert!(restored.active().contains(OrderId(2)));
        assert!(restored.closed().contains(OrderId(3)));
    }

    #[test]
    fn corrupt_snapshot_fails_loudly() {
        let store = InMemorySnapshotStore::new();
        store.write_orders(&[order(1, OrderStatus::Active), order(1, OrderStatus::Active)]);

        let index = OrderIndex::new();
        assert!(seed_from_snapshot(&index, &store).is_err());
    }
}
