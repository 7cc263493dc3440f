// 14.2 engine/core.rs: the engine struct. all collaborators are injected
// explicitly; nothing is resolved through a global.

use super::results::EngineError;
use crate::account::{AccountRegistry, MarginAccount};
use crate::config::{ConfigError, TradingConfig};
use crate::events::{Event, EventEmitter, EventId, EventPayload, OrderEvent};
use crate::fpl::FplCalculator;
use crate::liquidation::{LiquidationDispatcher, LiquidationTracker};
use crate::order::Order;
use crate::order_index::OrderIndex;
use crate::quotes::QuoteCache;
use crate::snapshot::{seed_from_snapshot, write_snapshot, OrderSnapshotStore};
use crate::types::{OrderId, Timestamp};
use crate::venue::MatchingVenue;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub struct TradingEngine {
    pub(super) orders: Arc<OrderIndex>,
    pub(super) accounts: Arc<AccountRegistry>,
    pub(super) config: Arc<TradingConfig>,
    pub(super) quotes: Arc<QuoteCache>,
    pub(super) fpl: FplCalculator,
    pub(super) venue: Arc<dyn MatchingVenue>,
    pub(super) liquidations: Arc<dyn LiquidationDispatcher>,
    pub(super) liquidation_tracker: LiquidationTracker,
    pub(super) events: Arc<dyn EventEmitter>,
    /// Orders currently out at the venue. Guards against cancel racing an
    /// in-flight execution.
    pub(super) in_flight: Mutex<HashSet<OrderId>>,
    next_order_id: AtomicU64,
    next_event_id: AtomicU64,
}

impl TradingEngine {
    pub fn new(
        config: Arc<TradingConfig>,
        accounts: Arc<AccountRegistry>,
        quotes: Arc<QuoteCache>,
        venue: Arc<dyn MatchingVenue>,
        liquidations: Arc<dyn LiquidationDispatcher>,
        events: Arc<dyn EventEmitter>,
    ) -> Self {
        let fpl = FplCalculator::new(Arc::clone(&config), Arc::clone(&quotes));
        Self {
            orders: Arc::new(OrderIndex::new()),
            accounts,
            config,
            quotes,
            fpl,
            venue,
            liquidations,
            liquidation_tracker: LiquidationTracker::new(),
            events,
            in_flight: Mutex::new(HashSet::new()),
            next_order_id: AtomicU64::new(1),
            next_event_id: AtomicU64::new(1),
        }
    }

    pub fn orders(&self) -> &OrderIndex {
        &self.orders
    }

    pub fn accounts(&self) -> &AccountRegistry {
        &self.accounts
    }

    pub fn quotes(&self) -> &QuoteCache {
        &self.quotes
    }

    pub fn find_order(&self, order_id: OrderId) -> Option<Order> {
        self.orders.find(order_id)
    }

    /// Seed the index from a persisted snapshot at startup.
    pub fn restore_orders(&self, store: &dyn OrderSnapshotStore) -> Result<usize, EngineError> {
        let count = seed_from_snapshot(&self.orders, store)?;
        tracing::info!(count, "orders restored from snapshot");
        Ok(count)
    }

    /// Persist the current index contents.
    pub fn snapshot_orders(&self, store: &dyn OrderSnapshotStore) {
        write_snapshot(&self.orders, store);
    }

    pub(super) fn next_order_id(&self) -> OrderId {
        OrderId(self.next_order_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(super) fn emit(&self, payload: EventPayload) {
        let id = EventId(self.next_event_id.fetch_add(1, Ordering::Relaxed));
        self.events.emit(Event::new(id, Timestamp::now(), payload));
    }

    /// Lazy recompute of the account risk snapshot. The generation is captured
    /// before any input is read, so a mutation racing this recompute leaves
    /// the snapshot stale and a later caller recomputes again.
    pub fn refresh_account_fpl(&self, account: &MarginAccount) -> Result<(), ConfigError> {
        if !account.fpl.is_stale() {
            return Ok(());
        }
        let generation = account.fpl.generation();

        let ids = [account.account_id];
        let mut open = self.orders.active().by_account(&ids);
        open.extend(self.orders.closing().by_account(&ids));
        let mut pending = self.orders.pending().by_account(&ids);
        pending.extend(self.orders.executing().by_account(&ids));

        let figures = self.fpl.account_figures(account, &open, &pending)?;
        account.fpl.store(figures, generation);
        Ok(())
    }
}

pub(super) fn order_event(order: &Order) -> OrderEvent {
    OrderEvent {
        order_id: order.id,
        client_id: order.client_id,
        account_id: order.account_id,
        instrument: order.instrument,
    }
}
