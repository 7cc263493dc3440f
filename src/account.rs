// 6.0: margin trading accounts and the concurrent registry.
// 6.1: the risk snapshot (AccountFpl) with its generation pair. the snapshot is
// valid iff actual == calculated. anything that moves risk (new or closed
// order, balance change, price tick) bumps actual; the recompute writes the
// figures and publishes calculated. two concurrent recomputes are idempotent:
// the formula is deterministic in its inputs and the figure block is written
// under one lock, so readers never see partial fields.

use crate::types::{AccountId, AssetId, ClientId, TradingConditionId};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountFplFigures {
    pub pnl: Decimal,
    pub used_margin: Decimal,
    pub margin_init: Decimal,
    pub open_positions_count: usize,
    pub margin_call_level: Decimal,
    pub stop_out_level: Decimal,
}

#[derive(Debug, Default)]
pub struct AccountFpl {
    actual: AtomicU64,
    calculated: AtomicU64,
    figures: RwLock<AccountFplFigures>,
}

impl AccountFpl {
    pub fn invalidate(&self) {
        self.actual.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_stale(&self) -> bool {
        self.actual.load(Ordering::SeqCst) != self.calculated.load(Ordering::SeqCst)
    }

    /// Generation to recompute against. Captured before reading any input so
    /// a mutation racing the recompute leaves the snapshot stale.
    pub fn generation(&self) -> u64 {
        self.actual.load(Ordering::SeqCst)
    }

    pub fn store(&self, figures: AccountFplFigures, generation: u64) {
        let mut guard = self.figures.write();
        *guard = figures;
        self.calculated.store(generation, Ordering::SeqCst);
    }

    pub fn figures(&self) -> AccountFplFigures {
        *self.figures.read()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountRiskLevel {
    Normal,
    MarginCall,
    StopOut,
}

#[derive(Debug)]
pub struct MarginAccount {
    pub client_id: ClientId,
    pub account_id: AccountId,
    pub base_asset: AssetId,
    trading_condition: RwLock<TradingConditionId>,
    balance: RwLock<Decimal>,
    withdraw_transfer_limit: RwLock<Decimal>,
    pub fpl: AccountFpl,
}

impl MarginAccount {
    pub fn new(
        client_id: ClientId,
        account_id: AccountId,
        trading_condition: TradingConditionId,
        base_asset: AssetId,
        balance: Decimal,
    ) -> Self {
        // a fresh account has never been computed, so it starts stale
        let fpl = AccountFpl::default();
        fpl.invalidate();
        Self {
            client_id,
            account_id,
            base_asset,
            trading_condition: RwLock::new(trading_condition),
            balance: RwLock::new(balance),
            withdraw_transfer_limit: RwLock::new(Decimal::ZERO),
            fpl,
        }
    }

    pub fn balance(&self) -> Decimal {
        *self.balance.read()
    }

    pub fn add_balance(&self, delta: Decimal) -> Decimal {
        let mut balance = self.balance.write();
        *balance += delta;
        let new_balance = *balance;
        drop(balance);
        // balance feeds total capital, so the snapshot is stale now
        self.fpl.invalidate();
        new_balance
    }

    pub fn withdraw_transfer_limit(&self) -> Decimal {
        *self.withdraw_transfer_limit.read()
    }

    pub fn set_withdraw_transfer_limit(&self, limit: Decimal) {
        *self.withdraw_transfer_limit.write() = limit;
    }

    pub fn trading_condition(&self) -> TradingConditionId {
        *self.trading_condition.read()
    }

    pub fn set_trading_condition(&self, condition: TradingConditionId) {
        *self.trading_condition.write() = condition;
        self.fpl.invalidate();
    }

    pub fn total_capital(&self) -> Decimal {
        self.balance() + self.fpl.figures().pnl
    }

    pub fn free_margin(&self) -> Decimal {
        self.total_capital() - self.fpl.figures().used_margin
    }

    /// Margin level is total capital over used margin. Defined as 100 when
    /// used margin is not positive, to avoid the degenerate unbounded ratio.
    pub fn margin_level(&self) -> Decimal {
        let used_margin = self.fpl.figures().used_margin;
        if used_margin <= Decimal::ZERO {
            return dec!(100);
        }
        self.total_capital() / used_margin
    }

    /// Stop-out at the boundary: level <= threshold, not strictly below.
    pub fn risk_level(&self) -> AccountRiskLevel {
        let figures = self.fpl.figures();
        let level = self.margin_level();
        if level <= figures.stop_out_level {
            AccountRiskLevel::StopOut
        } else if level <= figures.margin_call_level {
            AccountRiskLevel::MarginCall
        } else {
            AccountRiskLevel::Normal
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AccountError {
    #[error("Account {account:?} for client {client:?} not found")]
    AccountNotFound {
        client: ClientId,
        account: AccountId,
    },
}

/// Concurrent account lookup, keyed by client and account id. Many readers,
/// exclusive writer for balance and condition changes. Full-map replacement
/// happens only at process start.
#[derive(Debug, Default)]
pub struct AccountRegistry {
    accounts: RwLock<HashMap<(ClientId, AccountId), Arc<MarginAccount>>>,
}

impl AccountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole backing map in one exclusive step.
    pub fn init(&self, accounts: Vec<MarginAccount>) {
        let map = accounts
            .into_iter()
            .map(|a| ((a.client_id, a.account_id), Arc::new(a)))
            .collect();
        *self.accounts.write() = map;
    }

    pub fn get(
        &self,
        client: ClientId,
        account: AccountId,
    ) -> Result<Arc<MarginAccount>, AccountError> {
        self.try_get(client, account)
            .ok_or(AccountError::AccountNotFound { client, account })
    }

    pub fn try_get(&self, client: ClientId, account: AccountId) -> Option<Arc<MarginAccount>> {
        self.accounts.read().get(&(client, account)).cloned()
    }

    pub fn update_balance(
        &self,
        client: ClientId,
        account: AccountId,
        delta: Decimal,
    ) -> Result<Decimal, AccountError> {
        let account = self.get(client, account)?;
        Ok(account.add_balance(delta))
    }

    pub fn set_trading_condition(
        &self,
        client: ClientId,
        account: AccountId,
        condition: TradingConditionId,
    ) -> Result<(), AccountError> {
        let account = self.get(client, account)?;
        account.set_trading_condition(condition);
        Ok(())
    }

    /// Read-locked filtered scan.
    pub fn client_ids_by_trading_condition(
        &self,
        condition: TradingConditionId,
        account: Option<AccountId>,
    ) -> Vec<ClientId> {
        self.accounts
            .read()
            .values()
            .filter(|a| a.trading_condition() == condition)
            .filter(|a| account.map_or(true, |id| a.account_id == id))
            .map(|a| a.client_id)
            .collect()
    }

    pub fn all(&self) -> Vec<Arc<MarginAccount>> {
        self.accounts.read().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_account(client: u64, account: u64) -> MarginAccount {
        MarginAccount::new(
            ClientId(client),
            AccountId(account),
            TradingConditionId(1),
            AssetId(1),
            dec!(1000),
        )
    }

    fn store_figures(account: &MarginAccount, pnl: Decimal, used_margin: Decimal) {
        let generation = account.fpl.generation();
        account.fpl.store(
            AccountFplFigures {
                pnl,
                used_margin,
                margin_init: used_margin,
                open_positions_count: 1,
                margin_call_level: dec!(1.25),
                stop_out_level: dec!(0.95),
            },
            generation,
        );
    }

    #[test]
    fn registry_lookup() {
        let registry = AccountRegistry::new();
        registry.init(vec![test_account(1, 10), test_account(2, 20)]);

        assert!(registry.get(ClientId(1), AccountId(10)).is_ok());
        assert!(registry.try_get(ClientId(1), AccountId(20)).is_none());
        assert!(matches!(
            registry.get(ClientId(9), AccountId(9)),
            Err(AccountError::AccountNotFound { .. })
        ));
    }

    #[test]
    fn balance_update_invalidates_snapshot() {
        let registry = AccountRegistry::new();
        registry.init(vec![test_account(1, 10)]);

        let account = registry.get(ClientId(1), AccountId(10)).unwrap();
        store_figures(&account, Decimal::ZERO, Decimal::ZERO);
        assert!(!account.fpl.is_stale());

        let new_balance = registry
            .update_balance(ClientId(1), AccountId(10), dec!(500))
            .unwrap();
        assert_eq!(new_balance, dec!(1500));
        assert!(account.fpl.is_stale());
    }

    #[test]
    fn margin_level_degenerate_case() {
        let account = test_account(1, 1);
        store_figures(&account, dec!(-100), Decimal::ZERO);
        assert_eq!(account.margin_level(), dec!(100));
    }

    #[test]
    fn stop_out_scenario_from_the_book() {
        // balance 1000, pnl -950, used margin 100 => total capital 50,
        // margin level 0.5, stop out level 0.95 => StopOut
        let account = test_account(1, 1);
        store_figures(&account, dec!(-950), dec!(100));

        assert_eq!(account.total_capital(), dec!(50));
        assert_eq!(account.margin_level(), dec!(0.5));
        assert_eq!(account.risk_level(), AccountRiskLevel::StopOut);
    }

    #[test]
    fn stop_out_boundary_is_inclusive() {
        let account = test_account(1, 1);
        // total capital 95, used margin 100 => level exactly 0.95
        store_figures(&account, dec!(-905), dec!(100));
        assert_eq!(account.margin_level(), dec!(0.95));
        assert_eq!(account.risk_level(), AccountRiskLevel::StopOut);

        // a hair above the threshold is a margin call, not a stop out
        store_figures(&account, dec!(-904), dec!(100));
        assert_eq!(account.risk_level(), AccountRiskLevel::MarginCall);
    }

    #[test]
    fn trading_condition_scan() {
        let registry = AccountRegistry::new();
        let mut a = test_account(1, 10);
        a.trading_condition = RwLock::new(TradingConditionId(2));
        registry.init(vec![a, test_account(2, 20), test_account(3, 30)]);

        let clients = registry.client_ids_by_trading_condition(TradingConditionId(1), None);
        assert_eq!(clients.len(), 2);

        let filtered =
            registry.client_ids_by_trading_condition(TradingConditionId(1), Some(AccountId(20)));
        assert_eq!(filtered, vec![ClientId(2)]);
    }

    #[test]
    fn stale_generation_after_racing_mutation() {
        let account = test_account(1, 1);
        let generation = account.fpl.generation();

        // a mutation lands while the recompute is in flight
        account.fpl.invalidate();
        account.fpl.store(AccountFplFigures::default(), generation);

        assert!(account.fpl.is_stale());
    }
}
