// 5.0: status-partitioned order store. one group per status, one mutex per
// group. the primary id map and all four secondary indices are updated inside
// a single critical section, so no reader can ever observe a half-updated
// index. readers take the same lock; a separate read path is not safe with
// multiple indices.
//
// duplicate adds and removes of absent orders are invariant violations on the
// caller's side, surfaced as typed errors and never swallowed.

use crate::order::{Order, OrderStatus};
use crate::types::{AccountId, InstrumentId, OrderId};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, thiserror::Error)]
pub enum OrderIndexError {
    #[error("Order {0:?} is already in group {1:?}")]
    DuplicateOrderId(OrderId, OrderStatus),

    #[error("Order {0:?} is not in group {1:?}")]
    OrderNotInGroup(OrderId, OrderStatus),
}

#[derive(Debug, Default)]
struct GroupInner {
    orders: HashMap<OrderId, Order>,
    by_instrument: HashMap<InstrumentId, HashSet<OrderId>>,
    by_account: HashMap<AccountId, HashSet<OrderId>>,
    by_account_instrument: HashMap<(AccountId, InstrumentId), HashSet<OrderId>>,
    by_margin_instrument: HashMap<InstrumentId, HashSet<OrderId>>,
}

impl GroupInner {
    fn link(&mut self, order: &Order) {
        let id = order.id;
        self.by_instrument
            .entry(order.instrument)
            .or_default()
            .insert(id);
        self.by_account
            .entry(order.account_id)
            .or_default()
            .insert(id);
        self.by_account_instrument
            .entry((order.account_id, order.instrument))
            .or_default()
            .insert(id);
        if let Some(margin_instrument) = order.margin_instrument {
            self.by_margin_instrument
                .entry(margin_instrument)
                .or_default()
                .insert(id);
        }
    }

    fn unlink(&mut self, order: &Order) {
        let id = order.id;
        if let Some(set) = self.by_instrument.get_mut(&order.instrument) {
            set.remove(&id);
            if set.is_empty() {
                self.by_instrument.remove(&order.instrument);
            }
        }
        if let Some(set) = self.by_account.get_mut(&order.account_id) {
            set.remove(&id);
            if set.is_empty() {
                self.by_account.remove(&order.account_id);
            }
        }
        let key = (order.account_id, order.instrument);
        if let Some(set) = self.by_account_instrument.get_mut(&key) {
            set.remove(&id);
            if set.is_empty() {
                self.by_account_instrument.remove(&key);
            }
        }
        if let Some(margin_instrument) = order.margin_instrument {
            if let Some(set) = self.by_margin_instrument.get_mut(&margin_instrument) {
                set.remove(&id);
                if set.is_empty() {
                    self.by_margin_instrument.remove(&margin_instrument);
                }
            }
        }
    }

    fn collect(&self, ids: Option<&HashSet<OrderId>>) -> Vec<Order> {
        match ids {
            Some(ids) => ids
                .iter()
                .filter_map(|id| self.orders.get(id).cloned())
                .collect(),
            None => Vec::new(),
        }
    }
}

/// All orders of one status.
#[derive(Debug)]
pub struct OrderGroup {
    status: OrderStatus,
    inner: Mutex<GroupInner>,
}

impl OrderGroup {
    pub fn new(status: OrderStatus) -> Self {
        Self {
            status,
            inner: Mutex::new(GroupInner::default()),
        }
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn add(&self, order: Order) -> Result<(), OrderIndexError> {
        let mut inner = self.inner.lock();
        if inner.orders.contains_key(&order.id) {
            return Err(OrderIndexError::DuplicateOrderId(order.id, self.status));
        }
        inner.link(&order);
        inner.orders.insert(order.id, order);
        Ok(())
    }

    pub fn remove(&self, order_id: OrderId) -> Result<Order, OrderIndexError> {
        let mut inner = self.inner.lock();
        let order = inner
            .orders
            .remove(&order_id)
            .ok_or(OrderIndexError::OrderNotInGroup(order_id, self.status))?;
        inner.unlink(&order);
        Ok(order)
    }

    /// Remove that tolerates absence. For legitimate races where two
    /// lifecycle paths contend for the same order (pending activation vs
    /// cancel); whoever gets the order proceeds, the loser backs off.
    pub fn try_remove(&self, order_id: OrderId) -> Option<Order> {
        let mut inner = self.inner.lock();
        let order = inner.orders.remove(&order_id)?;
        inner.unlink(&order);
        Some(order)
    }

    pub fn get(&self, order_id: OrderId) -> Option<Order> {
        self.inner.lock().orders.get(&order_id).cloned()
    }

    pub fn contains(&self, order_id: OrderId) -> bool {
        self.inner.lock().orders.contains_key(&order_id)
    }

    pub fn by_instrument(&self, instrument: InstrumentId) -> Vec<Order> {
        let inner = self.inner.lock();
        inner.collect(inner.by_instrument.get(&instrument))
    }

    pub fn by_account(&self, accounts: &[AccountId]) -> Vec<Order> {
        let inner = self.inner.lock();
        accounts
            .iter()
            .flat_map(|a| inner.collect(inner.by_account.get(a)))
            .collect()
    }

    pub fn by_account_and_instrument(
        &self,
        account: AccountId,
        instrument: InstrumentId,
    ) -> Vec<Order> {
        let inner = self.inner.lock();
        inner.collect(inner.by_account_instrument.get(&(account, instrument)))
    }

    pub fn by_margin_instrument(&self, instrument: InstrumentId) -> Vec<Order> {
        let inner = self.inner.lock();
        inner.collect(inner.by_margin_instrument.get(&instrument))
    }

    pub fn all(&self) -> Vec<Order> {
        self.inner.lock().orders.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().orders.is_empty()
    }

    /// In-place mutation under the group lock. The closure must stay free of
    /// venue I/O; it is index bookkeeping and pure math only.
    pub fn update<F>(&self, order_id: OrderId, f: F) -> Result<Order, OrderIndexError>
    where
        F: FnOnce(&mut Order),
    {
        let mut inner = self.inner.lock();
        let order = inner
            .orders
            .get_mut(&order_id)
            .ok_or(OrderIndexError::OrderNotInGroup(order_id, self.status))?;
        f(order);
        Ok(order.clone())
    }

    #[cfg(test)]
    fn check_consistency(&self) -> bool {
        let inner = self.inner.lock();
        let primary: HashSet<OrderId> = inner.orders.keys().copied().collect();
        let mut secondary = HashSet::new();
        for set in inner.by_instrument.values() {
            secondary.extend(set.iter().copied());
        }
        let from_accounts: HashSet<OrderId> = inner
            .by_account
            .values()
            .flat_map(|s| s.iter().copied())
            .collect();
        let from_pairs: HashSet<OrderId> = inner
            .by_account_instrument
            .values()
            .flat_map(|s| s.iter().copied())
            .collect();
        secondary == primary && from_accounts == primary && from_pairs == primary
    }
}

/// One group per status. Groups are created once; orders move between them
/// on status change (remove from the old group, insert into the new one).
#[derive(Debug)]
pub struct OrderIndex {
    waiting: OrderGroup,
    executing: OrderGroup,
    active: OrderGroup,
    closing: OrderGroup,
    closed: OrderGroup,
    rejected: OrderGroup,
}

impl OrderIndex {
    pub fn new() -> Self {
        Self {
            waiting: OrderGroup::new(OrderStatus::WaitingForExecution),
            executing: OrderGroup::new(OrderStatus::ExecutionStarted),
            active: OrderGroup::new(OrderStatus::Active),
            closing: OrderGroup::new(OrderStatus::Closing),
            closed: OrderGroup::new(OrderStatus::Closed),
            rejected: OrderGroup::new(OrderStatus::Rejected),
        }
    }

    pub fn group(&self, status: OrderStatus) -> &OrderGroup {
        match status {
            OrderStatus::WaitingForExecution => &self.waiting,
            OrderStatus::ExecutionStarted => &self.executing,
            OrderStatus::Active => &self.active,
            OrderStatus::Closing => &self.closing,
            OrderStatus::Closed => &self.closed,
            OrderStatus::Rejected => &self.rejected,
        }
    }

    pub fn pending(&self) -> &OrderGroup {
        &self.waiting
    }

    pub fn executing(&self) -> &OrderGroup {
        &self.executing
    }

    pub fn active(&self) -> &OrderGroup {
        &self.active
    }

    pub fn closing(&self) -> &OrderGroup {
        &self.closing
    }

    pub fn closed(&self) -> &OrderGroup {
        &self.closed
    }

    pub fn rejected(&self) -> &OrderGroup {
        &self.rejected
    }

    /// Insert into the group matching the order's current status.
    pub fn add(&self, order: Order) -> Result<(), OrderIndexError> {
        self.group(order.status).add(order)
    }

    /// Search across all groups. Terminal groups included.
    pub fn find(&self, order_id: OrderId) -> Option<Order> {
        [
            &self.waiting,
            &self.executing,
            &self.active,
            &self.closing,
            &self.closed,
            &self.rejected,
        ]
        .into_iter()
        .find_map(|g| g.get(order_id))
    }

    /// Every order in every group. Used for periodic snapshots.
    pub fn all(&self) -> Vec<Order> {
        let mut orders = Vec::new();
        for group in [
            &self.waiting,
            &self.executing,
            &self.active,
            &self.closing,
            &self.closed,
            &self.rejected,
        ] {
            orders.extend(group.all());
        }
        orders
    }
}

impl Default for OrderIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{FillPolicy, OrderKind, OrderRequest};
    use crate::types::{ClientId, SignedVolume, Timestamp};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn test_order(id: u64, account: u64, instrument: u32) -> Order {
        let request = OrderRequest {
            client_id: ClientId(1),
            account_id: AccountId(account),
            instrument: InstrumentId(instrument),
            volume: SignedVolume::new(dec!(1)),
            kind: OrderKind::Market,
            expected_open_price: None,
            take_profit: None,
            stop_loss: None,
            fill_policy: FillPolicy::FillOrKill,
            validity: None,
            parent_order_id: None,
            parent_position_id: None,
        };
        let mut order = Order::from_request(OrderId(id), &request, Timestamp::from_millis(0));
        order.margin_instrument = Some(InstrumentId(100));
        order
    }

    #[test]
    fn add_links_all_indices() {
        let group = OrderGroup::new(OrderStatus::Active);
        group.add(test_order(1, 7, 3)).unwrap();

        assert!(group.get(OrderId(1)).is_some());
        assert_eq!(group.by_instrument(InstrumentId(3)).len(), 1);
        assert_eq!(group.by_account(&[AccountId(7)]).len(), 1);
        assert_eq!(
            group
                .by_account_and_instrument(AccountId(7), InstrumentId(3))
                .len(),
            1
        );
        assert_eq!(group.by_margin_instrument(InstrumentId(100)).len(), 1);
        assert!(group.check_consistency());
    }

    #[test]
    fn duplicate_add_fails() {
        let group = OrderGroup::new(OrderStatus::Active);
        group.add(test_order(1, 1, 1)).unwrap();

        let err = group.add(test_order(1, 1, 1)).unwrap_err();
        assert!(matches!(err, OrderIndexError::DuplicateOrderId(..)));
        assert_eq!(group.len(), 1);
    }

    #[test]
    fn remove_unlinks_all_indices() {
        let group = OrderGroup::new(OrderStatus::Active);
        group.add(test_order(1, 7, 3)).unwrap();
        group.add(test_order(2, 7, 3)).unwrap();

        group.remove(OrderId(1)).unwrap();

        assert!(group.get(OrderId(1)).is_none());
        assert_eq!(group.by_instrument(InstrumentId(3)).len(), 1);
        assert_eq!(group.by_account(&[AccountId(7)]).len(), 1);
        assert!(group.check_consistency());

        group.remove(OrderId(2)).unwrap();
        assert!(group.by_instrument(InstrumentId(3)).is_empty());
        assert!(group.check_consistency());
    }

    #[test]
    fn remove_absent_is_invariant_violation() {
        let group = OrderGroup::new(OrderStatus::Active);
        let err = group.remove(OrderId(42)).unwrap_err();
        assert!(matches!(err, OrderIndexError::OrderNotInGroup(..)));
    }

    #[test]
    fn status_transfer_between_groups() {
        let index = OrderIndex::new();
        let order = test_order(1, 1, 1);
        index.add(order).unwrap();

        let mut order = index.pending().remove(OrderId(1)).unwrap();
        order.status = OrderStatus::Active;
        index.add(order).unwrap();

        assert!(index.pending().get(OrderId(1)).is_none());
        assert!(index.active().get(OrderId(1)).is_some());
        assert_eq!(index.find(OrderId(1)).unwrap().status, OrderStatus::Active);
    }

    #[test]
    fn concurrent_adds_of_same_id_one_wins() {
        let group = Arc::new(OrderGroup::new(OrderStatus::Active));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let group = Arc::clone(&group);
            handles.push(std::thread::spawn(move || group.add(test_order(1, 1, 1)).is_ok()));
        }
        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(successes, 1);
        assert_eq!(group.len(), 1);
    }

    #[test]
    fn concurrent_add_remove_consistency() {
        let group = Arc::new(OrderGroup::new(OrderStatus::Active));
        let mut handles = Vec::new();

        for t in 0..4u64 {
            let group = Arc::clone(&group);
            handles.push(std::thread::spawn(move || {
                for i in 0..200u64 {
                    let id = t * 1000 + i;
                    group.add(test_order(id, t, (i % 5) as u32)).unwrap();
                    if i % 2 == 0 {
                        group.remove(OrderId(id)).unwrap();
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(group.len(), 4 * 100);
        assert!(group.check_consistency());
    }
}
