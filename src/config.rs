// 3.0: trading configuration registries. assets, instruments, account groups
// (margin call / stop out thresholds) and account assets (leverage, commission
// and swap rates, deal limits). all read-heavy, loaded at startup, so lookups
// return copies and failures are typed.

use crate::types::{AssetId, InstrumentId, TradingConditionId};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Base or quote asset. Accuracy is the number of decimal digits money
/// amounts in this asset are rounded to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AssetConfig {
    pub id: AssetId,
    pub accuracy: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub id: InstrumentId,
    /// Price accuracy in decimal digits.
    pub accuracy: u32,
    pub quote_asset: AssetId,
    pub contract_size: Decimal,
    /// Instrument whose quote converts this instrument's quote asset into the
    /// account base asset. None means they are the same asset (rate 1).
    pub margin_instrument: Option<InstrumentId>,
    pub tradeable: bool,
}

/// Per (trading condition, base asset) risk thresholds. Levels are ratios of
/// total capital to used margin, e.g. stop out at 0.95.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AccountGroupConfig {
    pub trading_condition: TradingConditionId,
    pub base_asset: AssetId,
    pub margin_call_level: Decimal,
    pub stop_out_level: Decimal,
}

/// Per (trading condition, base asset, instrument) trading terms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountAssetConfig {
    pub trading_condition: TradingConditionId,
    pub base_asset: AssetId,
    pub instrument: InstrumentId,
    pub leverage_init: Decimal,
    pub leverage_maintenance: Decimal,
    pub swap_long: Decimal,
    pub swap_short: Decimal,
    pub commission_long: Decimal,
    pub commission_short: Decimal,
    pub commission_lot: Decimal,
    /// One-time deal volume limit in lots. Zero disables the check.
    pub deal_limit: Decimal,
    /// Total net position volume limit in lots. Zero disables the check.
    pub position_limit: Decimal,
    /// Cap on absolute position notional in the reference currency.
    pub max_position_notional: Option<Decimal>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("Asset {0:?} is not configured")]
    AssetNotConfigured(AssetId),

    #[error("Instrument {0:?} is not configured")]
    InstrumentNotConfigured(InstrumentId),

    #[error("No account group for trading condition {condition:?} and base asset {base_asset:?}")]
    AccountGroupNotConfigured {
        condition: TradingConditionId,
        base_asset: AssetId,
    },

    #[error("No account asset for trading condition {condition:?}, base asset {base_asset:?}, instrument {instrument:?}")]
    AccountAssetNotConfigured {
        condition: TradingConditionId,
        base_asset: AssetId,
        instrument: InstrumentId,
    },
}

/// Immutable registry of everything above. Built once at startup.
#[derive(Debug, Default)]
pub struct TradingConfig {
    assets: HashMap<AssetId, AssetConfig>,
    instruments: HashMap<InstrumentId, InstrumentConfig>,
    account_groups: HashMap<(TradingConditionId, AssetId), AccountGroupConfig>,
    account_assets: HashMap<(TradingConditionId, AssetId, InstrumentId), AccountAssetConfig>,
}

impl TradingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_asset(&mut self, asset: AssetConfig) {
        self.assets.insert(asset.id, asset);
    }

    pub fn add_instrument(&mut self, instrument: InstrumentConfig) {
        self.instruments.insert(instrument.id, instrument);
    }

    pub fn add_account_group(&mut self, group: AccountGroupConfig) {
        self.account_groups
            .insert((group.trading_condition, group.base_asset), group);
    }

    pub fn add_account_asset(&mut self, asset: AccountAssetConfig) {
        self.account_assets.insert(
            (asset.trading_condition, asset.base_asset, asset.instrument),
            asset,
        );
    }

    pub fn asset(&self, id: AssetId) -> Result<AssetConfig, ConfigError> {
        self.assets
            .get(&id)
            .copied()
            .ok_or(ConfigError::AssetNotConfigured(id))
    }

    pub fn instrument(&self, id: InstrumentId) -> Result<InstrumentConfig, ConfigError> {
        self.instruments
            .get(&id)
            .cloned()
            .ok_or(ConfigError::InstrumentNotConfigured(id))
    }

    pub fn account_group(
        &self,
        condition: TradingConditionId,
        base_asset: AssetId,
    ) -> Result<AccountGroupConfig, ConfigError> {
        self.account_groups
            .get(&(condition, base_asset))
            .copied()
            .ok_or(ConfigError::AccountGroupNotConfigured {
                condition,
                base_asset,
            })
    }

    pub fn account_asset(
        &self,
        condition: TradingConditionId,
        base_asset: AssetId,
        instrument: InstrumentId,
    ) -> Result<AccountAssetConfig, ConfigError> {
        self.account_assets
            .get(&(condition, base_asset, instrument))
            .cloned()
            .ok_or(ConfigError::AccountAssetNotConfigured {
                condition,
                base_asset,
                instrument,
            })
    }
}

/// Preset for tests and the sim: one USD account group and one fx-style
/// instrument with sane retail-margin terms.
pub fn demo_config() -> TradingConfig {
    let mut config = TradingConfig::new();

    let usd = AssetId(1);
    config.add_asset(AssetConfig {
        id: usd,
        accuracy: 2,
    });

    let condition = TradingConditionId(1);
    config.add_account_group(AccountGroupConfig {
        trading_condition: condition,
        base_asset: usd,
        margin_call_level: dec!(1.25),
        stop_out_level: dec!(0.95),
    });

    let eurusd = InstrumentId(1);
    config.add_instrument(InstrumentConfig {
        id: eurusd,
        accuracy: 5,
        quote_asset: usd,
        contract_size: dec!(100000),
        margin_instrument: None,
        tradeable: true,
    });

    config.add_account_asset(AccountAssetConfig {
        trading_condition: condition,
        base_asset: usd,
        instrument: eurusd,
        leverage_init: dec!(100),
        leverage_maintenance: dec!(150),
        swap_long: dec!(-0.02),
        swap_short: dec!(0.01),
        commission_long: dec!(2),
        commission_short: dec!(2),
        commission_lot: dec!(100000),
        deal_limit: dec!(10),
        position_limit: dec!(30),
        max_position_notional: None,
    });

    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn demo_lookups_resolve() {
        let config = demo_config();

        let asset = config.asset(AssetId(1)).unwrap();
        assert_eq!(asset.accuracy, 2);

        let instrument = config.instrument(InstrumentId(1)).unwrap();
        assert_eq!(instrument.contract_size, dec!(100000));
        assert!(instrument.tradeable);

        let group = config
            .account_group(TradingConditionId(1), AssetId(1))
            .unwrap();
        assert_eq!(group.stop_out_level, dec!(0.95));

        let terms = config
            .account_asset(TradingConditionId(1), AssetId(1), InstrumentId(1))
            .unwrap();
        assert_eq!(terms.leverage_init, dec!(100));
    }

    #[test]
    fn missing_group_is_typed_error() {
        let config = demo_config();
        let err = config
            .account_group(TradingConditionId(42), AssetId(1))
            .unwrap_err();
        assert!(matches!(err, ConfigError::AccountGroupNotConfigured { .. }));
    }

    #[test]
    fn missing_instrument_is_typed_error() {
        let config = demo_config();
        assert!(matches!(
            config.instrument(InstrumentId(9)),
            Err(ConfigError::InstrumentNotConfigured(_))
        ));
    }
}
