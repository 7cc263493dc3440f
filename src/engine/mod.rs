// 14.0: trading engine. coordinates placement, execution against the venue,
// position lifecycle, pending activation, repricing and stop out detection.
// every method takes &self: shared state lives behind the index and registry
// locks, and venue I/O always runs outside them.

mod core;
mod orders;
mod pending;
mod positions;
mod results;
mod stopout;

pub use self::core::TradingEngine;
pub use results::{EngineError, ValidationError};
