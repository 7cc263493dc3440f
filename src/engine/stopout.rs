// 14.6 engine/stopout.rs: the quote tick pipeline. cache the quote, sweep
// expiry, activate pending triggers, re-match partial fills, reprice open
// positions, then classify every touched account. a stop out queues a liquidation command without
// blocking quote processing; the tracker keeps the trigger idempotent.

use super::core::TradingEngine;
use super::results::EngineError;
use crate::account::{AccountRiskLevel, MarginAccount};
use crate::commission::swaps;
use crate::events::{EventPayload, MarginEvent};
use crate::fpl::update_order_fpl;
use crate::liquidation::{LiquidationType, StartLiquidation};
use crate::order::{CloseReason, Order};
use crate::quotes::InstrumentBidAskPair;
use crate::types::{AccountId, ClientId, Timestamp};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

impl TradingEngine {
    /// Entry point for every quote tick.
    pub fn on_quote(&self, quote: InstrumentBidAskPair) -> Result<(), EngineError> {
        self.quotes.update(quote);
        let now = Timestamp::now();
        self.process_expired(now)?;
        self.process_pending_on_quote(&quote)?;
        self.process_partial_fills(&quote)?;
        self.reprice_positions(&quote, now)
    }

    /// The external liquidation workflow reports back here. Re-checks the
    /// account: still under water means another round.
    pub fn liquidation_finished(
        &self,
        client_id: ClientId,
        account_id: AccountId,
    ) -> Result<(), EngineError> {
        self.liquidation_tracker.finish(client_id, account_id);
        let account = self.accounts.get(client_id, account_id)?;
        account.fpl.invalidate();
        self.check_account_risk(&account)
    }

    /// Recompute risk for every open position the quote touches: positions in
    /// the quoted instrument plus positions whose margin conversion goes
    /// through it.
    fn reprice_positions(
        &self,
        quote: &InstrumentBidAskPair,
        now: Timestamp,
    ) -> Result<(), EngineError> {
        let mut candidates = self.orders.active().by_instrument(quote.instrument);
        candidates.extend(self.orders.active().by_margin_instrument(quote.instrument));

        let mut seen = HashSet::new();
        let mut touched: HashMap<(ClientId, AccountId), Arc<MarginAccount>> = HashMap::new();
        let mut triggered: Vec<(Order, CloseReason)> = Vec::new();

        for candidate in candidates {
            if !seen.insert(candidate.id) {
                continue;
            }
            let Some(account) = self
                .accounts
                .try_get(candidate.client_id, candidate.account_id)
            else {
                continue;
            };
            // inputs gathered before taking the group lock
            let inputs = match self.fpl.inputs(
                &candidate,
                account.trading_condition(),
                account.base_asset,
            ) {
                Ok(inputs) => inputs,
                Err(error) => {
                    tracing::warn!(order_id = candidate.id.0, %error, "skipping reprice");
                    continue;
                }
            };

            let direct = candidate.instrument == quote.instrument;
            let close_price = quote.price_for_close(candidate.direction());
            let accuracy = inputs.account_accuracy;
            let updated = match self.orders.active().update(candidate.id, |order| {
                if direct {
                    order.close_price = close_price;
                }
                order.swaps = swaps(order, accuracy, now);
                update_order_fpl(order, &inputs);
            }) {
                Ok(order) => order,
                // closed by a concurrent path between collect and update
                Err(_) => continue,
            };
            account.fpl.invalidate();
            touched
                .entry((candidate.client_id, candidate.account_id))
                .or_insert(account);

            if updated.take_profit_hit(updated.close_price) {
                triggered.push((updated, CloseReason::TakeProfit));
            } else if updated.stop_loss_hit(updated.close_price) {
                triggered.push((updated, CloseReason::StopLoss));
            }
        }

        for (order, reason) in triggered {
            self.close_position(order.client_id, order.account_id, order.id, reason)?;
        }

        for account in touched.values() {
            self.check_account_risk(account)?;
        }
        Ok(())
    }

    /// Refresh the snapshot and act on the classification. The margin-level
    /// ordering is total capital over used margin against the group
    /// thresholds, stop out at the boundary inclusive.
    pub(super) fn check_account_risk(
        &self,
        account: &Arc<MarginAccount>,
    ) -> Result<(), EngineError> {
        self.refresh_account_fpl(account)?;
        match account.risk_level() {
            AccountRiskLevel::Normal => {}
            AccountRiskLevel::MarginCall => {
                self.emit(EventPayload::MarginCall(MarginEvent {
                    client_id: account.client_id,
                    account_id: account.account_id,
                    margin_level: account.margin_level(),
                }));
            }
            AccountRiskLevel::StopOut => {
                if self
                    .liquidation_tracker
                    .begin(account.client_id, account.account_id)
                {
                    let margin_level = account.margin_level();
                    tracing::warn!(
                        client = account.client_id.0,
                        account = account.account_id.0,
                        level = %margin_level,
                        "stop out, queueing liquidation"
                    );
                    self.emit(EventPayload::StopOut(MarginEvent {
                        client_id: account.client_id,
                        account_id: account.account_id,
                        margin_level,
                    }));
                    self.liquidations.start_liquidation(StartLiquidation {
                        client_id: account.client_id,
                        account_id: account.account_id,
                        direction: None,
                        liquidation_type: LiquidationType::Normal,
                    });
                }
            }
        }
        Ok(())
    }
}
