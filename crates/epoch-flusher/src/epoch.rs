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

//! Epoch arithmetic over chain time.
//!
//! Everything in this module works on whole seconds with integer division, so
//! `time_into + remaining == duration` holds exactly for every snapshot. Floating
//! point only appears in [EpochSnapshot::progress_percent], which is for display.

use std::fmt;

use anyhow::{Context, Result};
use thiserror::Error;

use crate::{
    chain::ChainClient,
    contracts::EpochContract,
    errors::CodedError,
    impl_coded_debug,
};

/// Basis points in a whole epoch, the unit used for progress comparisons.
pub const BPS_PER_EPOCH: u64 = 10_000;

/// Timestamp of the Ethereum mainnet genesis block. No rollup epoch clock can start before it.
pub const MIN_PLAUSIBLE_GENESIS: u64 = 1_438_269_973;

#[derive(Error, Clone, PartialEq, Eq)]
pub enum EpochError {
    #[error("{code} epoch duration must be greater than zero", code = self.code())]
    ZeroDuration,

    #[error("{code} genesis time {genesis} is not plausible (chain time {now})", code = self.code())]
    ImplausibleGenesis { genesis: u64, now: u64 },

    #[error("{code} timestamp {now} is before genesis time {genesis}", code = self.code())]
    BeforeGenesis { now: u64, genesis: u64 },
}

impl_coded_debug!(EpochError);

impl CodedError for EpochError {
    fn code(&self) -> &str {
        match self {
            EpochError::ZeroDuration => "[F-EPC-001]",
            EpochError::ImplausibleGenesis { .. } => "[F-EPC-002]",
            EpochError::BeforeGenesis { .. } => "[F-EPC-003]",
        }
    }
}

/// Where the genesis time of an [EpochClockConfig] came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenesisSource {
    /// Read directly from the rollup contract.
    Contract,
    /// Derived from the contract's current epoch and verified to reproduce it.
    Calibrated { offset: i64 },
    /// Derived from the contract's current epoch without an exact match.
    Approximate,
    /// Hard-coded constant from configuration. Treated as stale.
    Fallback,
}

impl fmt::Display for GenesisSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenesisSource::Contract => write!(f, "contract"),
            GenesisSource::Calibrated { offset } => write!(f, "calibrated (offset {offset}s)"),
            GenesisSource::Approximate => write!(f, "approximate"),
            GenesisSource::Fallback => write!(f, "fallback constant"),
        }
    }
}

/// Immutable description of the epoch clock, built once at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EpochClockConfig {
    genesis_time: u64,
    epoch_duration: u64,
    source: GenesisSource,
}

impl EpochClockConfig {
    pub fn new(
        genesis_time: u64,
        epoch_duration: u64,
        source: GenesisSource,
    ) -> Result<Self, EpochError> {
        if epoch_duration == 0 {
            return Err(EpochError::ZeroDuration);
        }
        if genesis_time < MIN_PLAUSIBLE_GENESIS {
            return Err(EpochError::ImplausibleGenesis { genesis: genesis_time, now: 0 });
        }
        Ok(Self { genesis_time, epoch_duration, source })
    }

    /// Rejects a genesis time that lies in the future relative to `now`.
    pub fn check_plausible(&self, now: u64) -> Result<(), EpochError> {
        if self.genesis_time > now {
            return Err(EpochError::ImplausibleGenesis { genesis: self.genesis_time, now });
        }
        Ok(())
    }

    pub fn genesis_time(&self) -> u64 {
        self.genesis_time
    }

    pub fn epoch_duration(&self) -> u64 {
        self.epoch_duration
    }

    pub fn source(&self) -> GenesisSource {
        self.source
    }
}

/// Position of a timestamp within its epoch. Recomputed every tick and never mutated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EpochSnapshot {
    pub now: u64,
    pub epoch: u64,
    pub start: u64,
    pub end: u64,
    pub time_into: u64,
    pub remaining: u64,
    pub duration: u64,
}

impl EpochSnapshot {
    /// Progress through the epoch in basis points, in `[0, 10_000)`.
    pub fn progress_bps(&self) -> u64 {
        ((self.time_into as u128 * BPS_PER_EPOCH as u128) / self.duration as u128) as u64
    }

    /// Progress as a percentage, for display only.
    pub fn progress_percent(&self) -> f64 {
        self.time_into as f64 * 100.0 / self.duration as f64
    }
}

/// Computes the epoch snapshot of `now` under `config`.
pub fn compute_epoch(now: u64, config: &EpochClockConfig) -> Result<EpochSnapshot, EpochError> {
    let genesis = config.genesis_time;
    let duration = config.epoch_duration;
    if now < genesis {
        return Err(EpochError::BeforeGenesis { now, genesis });
    }

    let elapsed = now - genesis;
    let epoch = elapsed / duration;
    let time_into = elapsed % duration;
    let start = now - time_into;

    Ok(EpochSnapshot {
        now,
        epoch,
        start,
        end: start + duration,
        time_into,
        remaining: duration - time_into,
        duration,
    })
}

fn epoch_at(now: u64, genesis: u64, duration: u64) -> Option<u64> {
    now.checked_sub(genesis).map(|elapsed| elapsed / duration)
}

/// Outcome of [calibrate_genesis].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Calibration {
    /// A candidate reproduces the contract epoch exactly.
    Exact { genesis: u64, offset: i64 },
    /// No candidate in the window matched; the naive estimate is returned.
    Approximate { genesis: u64 },
}

impl Calibration {
    pub fn genesis(&self) -> u64 {
        match self {
            Calibration::Exact { genesis, .. } | Calibration::Approximate { genesis } => *genesis,
        }
    }
}

/// Finds a genesis time for which `now` falls in `contract_epoch`.
///
/// The naive estimate `now - contract_epoch * duration` is probed first, then
/// offsets of increasing magnitude within one epoch duration either side, in
/// `step` second increments. The first candidate that reproduces the epoch wins,
/// so the result has the smallest absolute offset available in the window.
pub fn calibrate_genesis(
    now: u64,
    contract_epoch: u64,
    duration: u64,
    step: u64,
) -> Result<Calibration, EpochError> {
    if duration == 0 {
        return Err(EpochError::ZeroDuration);
    }
    let naive = contract_epoch
        .checked_mul(duration)
        .and_then(|span| now.checked_sub(span))
        .ok_or(EpochError::ImplausibleGenesis { genesis: 0, now })?;
    let step = step.max(1);

    let mut magnitude = 0u64;
    while magnitude <= duration {
        for offset in signed_offsets(magnitude) {
            let Some(candidate) = naive.checked_add_signed(offset) else {
                continue;
            };
            if epoch_at(now, candidate, duration) == Some(contract_epoch) {
                return Ok(Calibration::Exact { genesis: candidate, offset });
            }
        }
        magnitude += step;
    }

    Ok(Calibration::Approximate { genesis: naive })
}

fn signed_offsets(magnitude: u64) -> Vec<i64> {
    let m = magnitude as i64;
    if m == 0 {
        vec![0]
    } else {
        vec![-m, m]
    }
}

/// Where to look for the genesis time, in order of preference.
pub struct GenesisInputs {
    pub epoch_duration: u64,
    pub calibration_step: u64,
    pub fallback_genesis: Option<u64>,
}

/// Builds the [EpochClockConfig] for this process.
///
/// Prefers a live `GENESIS_TIME()` read, then calibration against
/// `getCurrentEpoch()`, then the configured fallback constant.
pub async fn resolve_genesis(
    rollup: &dyn EpochContract,
    chain: &dyn ChainClient,
    inputs: &GenesisInputs,
) -> Result<EpochClockConfig> {
    let now = chain.latest_block().await.context("Failed to read chain time")?.timestamp;

    let config = match rollup.genesis_time().await {
        Ok(genesis) => {
            tracing::info!("Genesis time from contract: {genesis}");
            EpochClockConfig::new(genesis, inputs.epoch_duration, GenesisSource::Contract)?
        }
        Err(err) => {
            tracing::warn!("Cannot read GENESIS_TIME() from rollup contract: {err}");
            let calibrated = match rollup.current_epoch().await {
                Ok(contract_epoch) => match calibrated_config(now, contract_epoch, inputs) {
                    Ok(config) => Some(config),
                    Err(err) => {
                        tracing::warn!("Genesis calibration failed: {err:?}");
                        None
                    }
                },
                Err(err) => {
                    tracing::warn!("Cannot read getCurrentEpoch() from rollup contract: {err}");
                    None
                }
            };
            match calibrated {
                Some(config) => config,
                None => fallback_config(inputs)?,
            }
        }
    };

    config.check_plausible(now)?;
    Ok(config)
}

fn fallback_config(inputs: &GenesisInputs) -> Result<EpochClockConfig> {
    let genesis = inputs.fallback_genesis.context(
        "Rollup contract exposes no usable genesis time or epoch and no fallback_genesis_time is configured",
    )?;
    tracing::warn!(
        "Using hard-coded fallback genesis time {genesis}; this constant may be stale, verify it against the rollup"
    );
    Ok(EpochClockConfig::new(genesis, inputs.epoch_duration, GenesisSource::Fallback)?)
}

fn calibrated_config(
    now: u64,
    contract_epoch: u64,
    inputs: &GenesisInputs,
) -> Result<EpochClockConfig, EpochError> {
    tracing::info!("Calibrating genesis: chain time {now}, contract epoch {contract_epoch}");
    let calibration =
        calibrate_genesis(now, contract_epoch, inputs.epoch_duration, inputs.calibration_step)?;
    let config = match calibration {
        Calibration::Exact { genesis, offset } => {
            tracing::info!("Genesis calibrated: {genesis} (offset {offset}s)");
            EpochClockConfig::new(
                genesis,
                inputs.epoch_duration,
                GenesisSource::Calibrated { offset },
            )?
        }
        Calibration::Approximate { genesis } => {
            tracing::warn!(
                "No genesis candidate reproduces contract epoch {contract_epoch}; using approximate genesis {genesis}"
            );
            EpochClockConfig::new(genesis, inputs.epoch_duration, GenesisSource::Approximate)?
        }
    };
    Ok(config)
}
