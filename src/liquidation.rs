// 11.0: liquidation trigger boundary. the core only emits a command to an
// external workflow, fire and forget; it never awaits the outcome. the tracker
// makes the trigger idempotent: an account already in liquidation is skipped
// until the workflow reports back.

use crate::types::{AccountId, ClientId, Direction};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiquidationType {
    /// Close everything on the account.
    Normal,
    /// Multi-step special liquidation driven by the external saga.
    Special,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartLiquidation {
    pub client_id: ClientId,
    pub account_id: AccountId,
    pub direction: Option<Direction>,
    pub liquidation_type: LiquidationType,
}

/// Dispatch must not block quote processing.
pub trait LiquidationDispatcher: Send + Sync {
    fn start_liquidation(&self, command: StartLiquidation);
}

/// Dispatcher double that records commands. Used in tests and the sim.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    commands: Mutex<Vec<StartLiquidation>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<StartLiquidation> {
        self.commands.lock().clone()
    }
}

impl LiquidationDispatcher for RecordingDispatcher {
    fn start_liquidation(&self, command: StartLiquidation) {
        self.commands.lock().push(command);
    }
}

/// In-progress set. `begin` returns false when the account is already being
/// liquidated, so a second stop-out trigger is a no-op.
#[derive(Debug, Default)]
pub struct LiquidationTracker {
    in_progress: Mutex<HashSet<(ClientId, AccountId)>>,
}

impl LiquidationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, client: ClientId, account: AccountId) -> bool {
        self.in_progress.lock().insert((client, account))
    }

    pub fn finish(&self, client: ClientId, account: AccountId) {
        self.in_progress.lock().remove(&(client, account));
    }

    pub fn is_in_progress(&self, client: ClientId, account: AccountId) -> bool {
        self.in_progress.lock().contains(&(client, account))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_is_idempotent() {
        let tracker = LiquidationTracker::new();

        assert!(tracker.begin(ClientId(1), AccountId(1)));
        assert!(!tracker.begin(ClientId(1), AccountId(1)));
        assert!(tracker.is_in_progress(ClientId(1), AccountId(1)));

        tracker.finish(ClientId(1), AccountId(1));
        assert!(!tracker.is_in_progress(ClientId(1), AccountId(1)));
        assert!(tracker.begin(ClientId(1), AccountId(1)));
    }

    #[test]
    fn recorder_keeps_commands_in_order() {
        let dispatcher = RecordingDispatcher::new();
        dispatcher.start_liquidation(StartLiquidation {
            client_id: ClientId(1),
            account_id: AccountId(1),
            direction: None,
            liquidation_type: LiquidationType::Normal,
        });
        dispatcher.start_liquidation(StartLiquidation {
            client_id: ClientId(2),
            account_id: AccountId(2),
            direction: Some(Direction::Buy),
            liquidation_type: LiquidationType::Special,
        });

        let commands = dispatcher.commands();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].client_id, ClientId(1));
        assert_eq!(commands[1].liquidation_type, LiquidationType::Special);
    }
}
