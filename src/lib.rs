// margin-core: margin trading backend core.
// risk-first architecture: margin math and stop out detection take priority.
// venue I/O happens at a trait boundary, strictly outside every index lock.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: ids, Direction, SignedVolume, Timestamp
//   2.x  quotes.rs: bid/ask pairs and the latest-quote cache
//   3.x  config.rs: assets, instruments, account groups, account assets
//   4.x  order.rs: order model, fills, VWAP, margin snapshot
//   5.x  order_index.rs: status-partitioned concurrent order store
//   6.x  account.rs: margin accounts, risk snapshot, registry
//   7.x  fpl.rs: floating pnl and margin formulas
//   8.x  commission.rs: trade commissions and swap accrual
//   9.x  limits.rs: deal limit checks
//   10.x venue.rs: matching venue boundary + in-memory double
//   11.x liquidation.rs: liquidation commands, dispatcher, tracker
//   12.x events.rs: state transition events
//   13.x snapshot.rs: warm-restart order snapshots
//   14.x engine/: the trading engine: orders, positions, pending, stop out

// core trading modules
pub mod account;
pub mod commission;
pub mod engine;
pub mod events;
pub mod fpl;
pub mod limits;
pub mod order;
pub mod order_index;
pub mod quotes;
pub mod types;

// integration modules
pub mod config;
pub mod liquidation;
pub mod snapshot;
pub mod venue;

// re exports for convenience
pub use account::*;
pub use commission::*;
pub use config::*;
pub use engine::*;
pub use events::*;
pub use fpl::*;
pub use limits::*;
pub use liquidation::*;
pub use order::*;
pub use order_index::*;
pub use quotes::*;
pub use snapshot::*;
pub use types::*;
pub use venue::*;
