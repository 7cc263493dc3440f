// 14.1: engine error taxonomy. a business rejection is a normal outcome and
// travels on the order as a reject reason; these errors are for callers
// holding a broken reference and for index invariant violations, which must
// stay loud instead of being swallowed.

use crate::account::AccountError;
use crate::config::ConfigError;
use crate::order::{OrderRejectReason, OrderStatus};
use crate::order_index::OrderIndexError;
use crate::types::OrderId;

/// A failed placement check. The reason lands on the rejected order; the
/// message goes into the reject comment.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{reason:?}: {message}")]
pub struct ValidationError {
    pub reason: OrderRejectReason,
    pub message: String,
}

impl ValidationError {
    pub fn new(reason: OrderRejectReason, message: impl ToString) -> Self {
        Self {
            reason,
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("Order index invariant violated: {0}")]
    Index(#[from] OrderIndexError),

    #[error("Account error: {0}")]
    Account(#[from] AccountError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Order {0:?} not found")]
    OrderNotFound(OrderId),

    #[error("Order {0:?} is mid-execution")]
    OrderIsExecuting(OrderId),

    #[error("Order {0:?} in status {1:?} cannot be cancelled")]
    OrderNotCancellable(OrderId, OrderStatus),
}
