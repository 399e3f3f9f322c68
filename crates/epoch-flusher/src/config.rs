// Copyright 2026 Boundless Foundation, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{path::Path, time::Duration};

use alloy::primitives::{utils::parse_ether, U256};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;

use crate::{
    epoch::GenesisInputs,
    errors::CodedError,
    executor::ExecutorConfig,
    fees::{FeePolicy, GasBudget},
    impl_coded_debug,
    scheduler::{Scheduler, TierConfig, TriggerPolicy},
};

#[derive(Error)]
pub enum ConfigErr {
    #[error("{code} missing configuration: {0}", code = self.code())]
    Missing(String),

    #[error("{code} invalid configuration: {0}", code = self.code())]
    Invalid(String),

    #[error("{code} failed to parse {field}: {value:?}", code = self.code())]
    Parse { field: &'static str, value: String },
}

impl_coded_debug!(ConfigErr);

impl CodedError for ConfigErr {
    fn code(&self) -> &str {
        match self {
            ConfigErr::Missing(_) => "[F-CFG-001]",
            ConfigErr::Invalid(_) => "[F-CFG-002]",
            ConfigErr::Parse { .. } => "[F-CFG-003]",
        }
    }
}

pub mod defaults {
    pub const fn slot_duration_secs() -> u64 {
        72
    }

    pub const fn slots_per_epoch() -> u64 {
        32
    }

    pub const fn calibration_step_secs() -> u64 {
        60
    }

    pub const fn drift_check_ticks() -> u64 {
        20
    }

    pub fn low_balance() -> String {
        "0.01".into()
    }

    pub fn critical_balance() -> String {
        "0.001".into()
    }

    pub const fn expected_chain_id() -> u64 {
        1
    }

    pub const fn flush_gas_limit() -> u64 {
        250_000
    }

    pub const fn claim_gas_limit() -> u64 {
        100_000
    }

    pub const fn priority_fee_markup_percentage() -> u64 {
        20
    }

    pub const fn base_fee_multiplier_percentage() -> u64 {
        200
    }

    pub const fn max_gas_cost_usd() -> f64 {
        5.0
    }

    pub const fn native_token_usd() -> f64 {
        3300.0
    }

    pub fn min_claim() -> String {
        "100".into()
    }

    pub const fn confirmation_timeout_secs() -> u64 {
        30
    }

    pub const fn retry_delay_secs() -> u64 {
        5
    }

    pub const fn blocks_to_wait() -> u64 {
        2
    }

    pub const fn relay_poll_ms() -> u64 {
        1000
    }
}

/// Epoch clock parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpochConfig {
    #[serde(default = "defaults::slot_duration_secs")]
    pub slot_duration_secs: u64,
    #[serde(default = "defaults::slots_per_epoch")]
    pub slots_per_epoch: u64,
    /// Offset step, in seconds, used when calibrating genesis against the contract epoch.
    #[serde(default = "defaults::calibration_step_secs")]
    pub calibration_step_secs: u64,
    /// Last-resort genesis time, used when the rollup exposes neither genesis nor epoch.
    pub fallback_genesis_time: Option<u64>,
    /// Re-read `getCurrentEpoch()` every N ticks; a mismatch is warned on every tick
    /// until the next read. Zero disables.
    #[serde(default = "defaults::drift_check_ticks")]
    pub drift_check_ticks: u64,
    /// Advance chain time locally between blocks.
    #[serde(default)]
    pub interpolate_block_time: bool,
}

impl Default for EpochConfig {
    fn default() -> Self {
        Self {
            slot_duration_secs: defaults::slot_duration_secs(),
            slots_per_epoch: defaults::slots_per_epoch(),
            calibration_step_secs: defaults::calibration_step_secs(),
            fallback_genesis_time: None,
            drift_check_ticks: defaults::drift_check_ticks(),
            interpolate_block_time: false,
        }
    }
}

impl EpochConfig {
    pub fn epoch_duration(&self) -> u64 {
        self.slot_duration_secs.saturating_mul(self.slots_per_epoch)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
    #[serde(default)]
    pub policy: TriggerPolicy,
}

/// Wallet thresholds. Amounts are in ether.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Below this balance each attempt logs a warning.
    #[serde(default = "defaults::low_balance")]
    pub low_balance: String,
    /// Below this balance attempts are skipped.
    #[serde(default = "defaults::critical_balance")]
    pub critical_balance: String,
    #[serde(default = "defaults::expected_chain_id")]
    pub expected_chain_id: u64,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            low_balance: defaults::low_balance(),
            critical_balance: defaults::critical_balance(),
            expected_chain_id: defaults::expected_chain_id(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GasConfig {
    #[serde(default = "defaults::flush_gas_limit")]
    pub flush_gas_limit: u64,
    #[serde(default = "defaults::claim_gas_limit")]
    pub claim_gas_limit: u64,
    /// Percentage added on top of the estimated priority fee.
    #[serde(default = "defaults::priority_fee_markup_percentage")]
    pub priority_fee_markup_percentage: u64,
    /// Percentage of the base fee allowed in `max_fee_per_gas`.
    #[serde(default = "defaults::base_fee_multiplier_percentage")]
    pub base_fee_multiplier_percentage: u64,
    /// Floor for the priority fee, in wei.
    #[serde(default)]
    pub min_priority_fee_wei: u64,
    /// Skip the flush when its estimated cost exceeds this many USD.
    #[serde(default = "defaults::max_gas_cost_usd")]
    pub max_gas_cost_usd: f64,
    /// Price of the native token used for the USD conversion.
    #[serde(default = "defaults::native_token_usd")]
    pub native_token_usd: f64,
    pub max_gas_price_gwei: Option<f64>,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            flush_gas_limit: defaults::flush_gas_limit(),
            claim_gas_limit: defaults::claim_gas_limit(),
            priority_fee_markup_percentage: defaults::priority_fee_markup_percentage(),
            base_fee_multiplier_percentage: defaults::base_fee_multiplier_percentage(),
            min_priority_fee_wei: 0,
            max_gas_cost_usd: defaults::max_gas_cost_usd(),
            native_token_usd: defaults::native_token_usd(),
            max_gas_price_gwei: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RewardsConfig {
    /// Claim once pending rewards reach this many tokens.
    #[serde(default = "defaults::min_claim")]
    pub min_claim: String,
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self { min_claim: defaults::min_claim() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TxConfig {
    #[serde(default = "defaults::confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    /// Backoff after a failed tick.
    #[serde(default = "defaults::retry_delay_secs")]
    pub retry_delay_secs: u64,
}

impl Default for TxConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout_secs: defaults::confirmation_timeout_secs(),
            retry_delay_secs: defaults::retry_delay_secs(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Blocks past the target block after which a bundle is considered missed.
    #[serde(default = "defaults::blocks_to_wait")]
    pub blocks_to_wait: u64,
    #[serde(default = "defaults::relay_poll_ms")]
    pub poll_interval_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { blocks_to_wait: defaults::blocks_to_wait(), poll_interval_ms: defaults::relay_poll_ms() }
    }
}

/// Tuning file. Every section and field is optional.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub epoch: EpochConfig,
    #[serde(default)]
    pub trigger: TriggerConfig,
    #[serde(default)]
    pub tiers: TierConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub gas: GasConfig,
    #[serde(default)]
    pub rewards: RewardsConfig,
    #[serde(default)]
    pub tx: TxConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

fn ether(field: &'static str, value: &str) -> Result<U256, ConfigErr> {
    parse_ether(value.trim()).map_err(|_| ConfigErr::Parse { field, value: value.to_string() })
}

impl Config {
    /// Load the config from disk.
    pub async fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .await
            .context(format!("Failed to read config file from {path:?}"))?;
        let config: Self =
            toml::from_str(&data).context(format!("Failed to parse toml file from {path:?}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigErr> {
        if self.epoch.epoch_duration() == 0 {
            return Err(ConfigErr::Invalid("epoch duration must be greater than zero".into()));
        }
        match self.trigger.policy {
            TriggerPolicy::PreBoundary { fire_before_secs }
                if fire_before_secs >= self.epoch.epoch_duration() =>
            {
                return Err(ConfigErr::Invalid(format!(
                    "trigger.policy.pre_boundary.fire_before_secs ({fire_before_secs}) must be \
                     shorter than the epoch ({}s)",
                    self.epoch.epoch_duration()
                )));
            }
            TriggerPolicy::PostBoundary { fire_within_secs: 0 } => {
                return Err(ConfigErr::Invalid(
                    "trigger.policy.post_boundary.fire_within_secs must be greater than zero"
                        .into(),
                ));
            }
            _ => {}
        }
        self.tiers.validate().map_err(ConfigErr::Invalid)?;
        if self.critical_balance()? > self.low_balance()? {
            return Err(ConfigErr::Invalid(
                "wallet.critical_balance must not exceed wallet.low_balance".into(),
            ));
        }
        self.min_claim()?;
        if self.gas.flush_gas_limit == 0 || self.gas.claim_gas_limit == 0 {
            return Err(ConfigErr::Invalid("gas limits must be greater than zero".into()));
        }
        if self.gas.native_token_usd.is_nan() || self.gas.native_token_usd <= 0.0 {
            return Err(ConfigErr::Invalid("gas.native_token_usd must be positive".into()));
        }
        if self.gas.max_gas_cost_usd < 0.0 {
            return Err(ConfigErr::Invalid("gas.max_gas_cost_usd must not be negative".into()));
        }
        if self.tx.confirmation_timeout_secs == 0 {
            return Err(ConfigErr::Invalid("tx.confirmation_timeout_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn low_balance(&self) -> Result<U256, ConfigErr> {
        ether("wallet.low_balance", &self.wallet.low_balance)
    }

    pub fn critical_balance(&self) -> Result<U256, ConfigErr> {
        ether("wallet.critical_balance", &self.wallet.critical_balance)
    }

    pub fn min_claim(&self) -> Result<U256, ConfigErr> {
        ether("rewards.min_claim", &self.rewards.min_claim)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.tx.retry_delay_secs)
    }

    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(self.tiers.clone(), self.trigger.policy)
    }

    pub fn genesis_inputs(&self) -> GenesisInputs {
        GenesisInputs {
            epoch_duration: self.epoch.epoch_duration(),
            calibration_step: self.epoch.calibration_step_secs,
            fallback_genesis: self.epoch.fallback_genesis_time,
        }
    }

    pub fn executor_config(&self) -> Result<ExecutorConfig> {
        Ok(ExecutorConfig {
            low_balance: self.low_balance()?,
            critical_balance: self.critical_balance()?,
            flush_gas_limit: self.gas.flush_gas_limit,
            claim_gas_limit: self.gas.claim_gas_limit,
            min_claim: self.min_claim()?,
            confirmation_timeout: Duration::from_secs(self.tx.confirmation_timeout_secs),
            fee_policy: FeePolicy {
                priority_fee_markup_percentage: self.gas.priority_fee_markup_percentage,
                base_fee_multiplier_percentage: self.gas.base_fee_multiplier_percentage,
                min_priority_fee: self.gas.min_priority_fee_wei as u128,
            },
            gas_budget: GasBudget::new(
                self.gas.max_gas_cost_usd,
                self.gas.native_token_usd,
                self.gas.max_gas_price_gwei,
            )?,
        })
    }
}
