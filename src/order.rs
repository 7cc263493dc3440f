// 4.0: the order model. an order is the single record that travels the whole
// lifecycle: placement request, pending trigger, open position, closed trade.
// 4.2 has the fill records and the volume-weighted price math.
//
// an order is owned by exactly one index group at a time (see order_index.rs);
// ownership moves with the status.

use crate::types::{
    AccountId, ClientId, Direction, InstrumentId, OrderId, SignedVolume, Timestamp,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderKind {
    /// Routed to matching immediately.
    Market,
    /// Waits in the pending group for its trigger price.
    Limit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Pending: waiting for a trigger price (limit) or for dispatch.
    WaitingForExecution,
    /// In flight against the matching venue, or partially filled.
    ExecutionStarted,
    /// Open position.
    Active,
    /// Position close in progress. Rolls back to Active if the close fails.
    Closing,
    Closed,
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Closed | OrderStatus::Rejected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillPolicy {
    FillOrKill,
    PartialFill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    None,
    Close,
    StopLoss,
    TakeProfit,
    StopOut,
    Canceled,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderRejectReason {
    NoLiquidity,
    NotEnoughBalance,
    LeadToStopOut,
    InvalidExpectedOpenPrice,
    InvalidVolume,
    InvalidTakeProfit,
    InvalidStopLoss,
    InvalidInstrument,
    InvalidAccount,
    InvalidParent,
    TradingConditionError,
    TechnicalError,
    OneTimeLimit,
    TotalLimit,
    MaxPositionNotionalLimit,
    Expired,
}

// 4.1: margin snapshot embedded in the order. actual/calculated is a generation
// pair: the snapshot is fresh iff they are equal. mutators bump actual, the
// recompute writes the figures and sets calculated = actual.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FplData {
    pub fpl: Decimal,
    pub margin_init: Decimal,
    pub margin_maintenance: Decimal,
    pub open_cross_price: Decimal,
    pub close_cross_price: Decimal,
    pub quote_rate: Decimal,
    pub actual: u64,
    pub calculated: u64,
}

impl FplData {
    pub fn invalidate(&mut self) {
        self.actual += 1;
    }

    pub fn mark_calculated(&mut self) {
        self.calculated = self.actual;
    }

    pub fn is_stale(&self) -> bool {
        self.actual != self.calculated
    }
}

// 4.2: immutable record of one fill. never mutated after append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedOrder {
    /// Counterparty order id at the venue.
    pub order_id: OrderId,
    pub price: Decimal,
    /// Absolute filled volume.
    pub volume: Decimal,
    pub matched_at: Timestamp,
}

/// Total absolute volume across fills.
pub fn summary_volume(fills: &[MatchedOrder]) -> Decimal {
    fills.iter().map(|m| m.volume).sum()
}

/// Volume-weighted average price rounded to the instrument accuracy.
/// Zero for an empty list, not an error.
pub fn weighted_average_price(fills: &[MatchedOrder], accuracy: u32) -> Decimal {
    let total = summary_volume(fills);
    if total.is_zero() {
        return Decimal::ZERO;
    }
    let weighted: Decimal = fills.iter().map(|m| m.price * m.volume).sum();
    (weighted / total).round_dp(accuracy)
}

/// Placement request as it arrives from the outer layer.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub client_id: ClientId,
    pub account_id: AccountId,
    pub instrument: InstrumentId,
    pub volume: SignedVolume,
    pub kind: OrderKind,
    pub expected_open_price: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub fill_policy: FillPolicy,
    pub validity: Option<Timestamp>,
    pub parent_order_id: Option<OrderId>,
    pub parent_position_id: Option<OrderId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub client_id: ClientId,
    pub account_id: AccountId,
    pub instrument: InstrumentId,
    /// Conversion instrument used for margin calculation, copied from the
    /// instrument config at placement.
    pub margin_instrument: Option<InstrumentId>,
    pub volume: SignedVolume,
    pub kind: OrderKind,
    pub status: OrderStatus,
    pub expected_open_price: Option<Decimal>,
    pub open_price: Decimal,
    pub close_price: Decimal,
    pub take_profit: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub fill_policy: FillPolicy,
    pub validity: Option<Timestamp>,
    pub parent_order_id: Option<OrderId>,
    pub parent_position_id: Option<OrderId>,
    pub created_at: Timestamp,
    pub open_date: Option<Timestamp>,
    pub close_date: Option<Timestamp>,
    /// Commission rates copied from the account asset at placement.
    /// Immutable afterwards.
    pub open_commission_rate: Decimal,
    pub close_commission_rate: Decimal,
    pub commission_lot: Decimal,
    pub swap_rate: Decimal,
    pub swaps: Decimal,
    pub matched: Vec<MatchedOrder>,
    pub close_matched: Vec<MatchedOrder>,
    pub close_reason: CloseReason,
    pub reject_reason: Option<OrderRejectReason>,
    pub reject_comment: Option<String>,
    pub fpl_data: FplData,
}

impl Order {
    pub fn from_request(id: OrderId, request: &OrderRequest, now: Timestamp) -> Self {
        Self {
            id,
            client_id: request.client_id,
            account_id: request.account_id,
            instrument: request.instrument,
            margin_instrument: None,
            volume: request.volume,
            kind: request.kind,
            status: OrderStatus::WaitingForExecution,
            expected_open_price: request.expected_open_price,
            open_price: Decimal::ZERO,
            close_price: Decimal::ZERO,
            take_profit: request.take_profit,
            stop_loss: request.stop_loss,
            fill_policy: request.fill_policy,
            validity: request.validity,
            parent_order_id: request.parent_order_id,
            parent_position_id: request.parent_position_id,
            created_at: now,
            open_date: None,
            close_date: None,
            open_commission_rate: Decimal::ZERO,
            close_commission_rate: Decimal::ZERO,
            commission_lot: Decimal::ZERO,
            swap_rate: Decimal::ZERO,
            swaps: Decimal::ZERO,
            matched: Vec::new(),
            close_matched: Vec::new(),
            close_reason: CloseReason::None,
            reject_reason: None,
            reject_comment: None,
            fpl_data: FplData::default(),
        }
    }

    /// Direction is the sign of the volume. Zero volume never survives
    /// placement validation.
    pub fn direction(&self) -> Direction {
        if self.volume.is_sell() {
            Direction::Sell
        } else {
            Direction::Buy
        }
    }

    pub fn matched_volume(&self) -> Decimal {
        summary_volume(&self.matched)
    }

    pub fn close_matched_volume(&self) -> Decimal {
        summary_volume(&self.close_matched)
    }

    pub fn unfulfilled_volume(&self) -> Decimal {
        self.volume.abs() - self.matched_volume()
    }

    pub fn is_fully_matched(&self) -> bool {
        self.unfulfilled_volume() <= Decimal::ZERO
    }

    /// Opens new exposure unless it is a child of an existing position.
    pub fn opens_new_position(&self) -> bool {
        self.parent_position_id.is_none()
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.kind != OrderKind::Market && self.validity.map_or(false, |v| v < now)
    }

    pub fn add_fills(&mut self, fills: &[MatchedOrder]) {
        debug_assert!(
            summary_volume(fills) <= self.unfulfilled_volume(),
            "cannot match more than the unfulfilled volume"
        );
        self.matched.extend_from_slice(fills);
    }

    pub fn add_close_fills(&mut self, fills: &[MatchedOrder]) {
        self.close_matched.extend_from_slice(fills);
    }

    /// Trigger rule for pending orders: buy at or below the limit,
    /// sell at or above it.
    pub fn pending_trigger_hit(&self, price: Decimal) -> bool {
        let Some(limit) = self.expected_open_price else {
            return false;
        };
        match self.direction() {
            Direction::Buy => price <= limit,
            Direction::Sell => price >= limit,
        }
    }

    /// Take-profit / stop-loss rule against the current close price.
    pub fn take_profit_hit(&self, close_price: Decimal) -> bool {
        match (self.take_profit, self.direction()) {
            (Some(tp), Direction::Buy) => close_price >= tp,
            (Some(tp), Direction::Sell) => close_price <= tp,
            (None, _) => false,
        }
    }

    pub fn stop_loss_hit(&self, close_price: Decimal) -> bool {
        match (self.stop_loss, self.direction()) {
            (Some(sl), Direction::Buy) => close_price <= sl,
            (Some(sl), Direction::Sell) => close_price >= sl,
            (None, _) => false,
        }
    }
}
