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

//! Fee parameters for flush and claim transactions, and the gas budget gate.

use alloy::primitives::{
    utils::{format_units, parse_units},
    U256,
};
use anyhow::{Context, Result};

/// Live fee estimate from the network, in wei per gas.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeeEstimate {
    pub base_fee: u128,
    pub priority_fee: u128,
}

impl FeeEstimate {
    /// Gas price a transaction pays if included at this estimate.
    pub fn gas_price(&self) -> u128 {
        self.base_fee.saturating_add(self.priority_fee)
    }
}

/// Explicit EIP-1559 parameters attached to a submitted transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeeParams {
    pub gas_limit: u64,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

/// Derives submission fees from an estimate with a competitive markup.
#[derive(Clone, Copy, Debug)]
pub struct FeePolicy {
    /// Percentage added to the priority fee (20 = +20%).
    pub priority_fee_markup_percentage: u64,
    /// Percentage the base fee is scaled by for `max_fee_per_gas` (200 = 2x headroom).
    pub base_fee_multiplier_percentage: u64,
    /// Floor for the priority fee, in wei.
    pub min_priority_fee: u128,
}

impl FeePolicy {
    pub fn params(&self, estimate: &FeeEstimate, gas_limit: u64) -> FeeParams {
        let priority = estimate
            .priority_fee
            .max(self.min_priority_fee)
            .saturating_mul(100 + self.priority_fee_markup_percentage as u128)
            / 100;
        let base = estimate.base_fee.saturating_mul(self.base_fee_multiplier_percentage as u128)
            / 100;

        FeeParams {
            gas_limit,
            max_fee_per_gas: base.saturating_add(priority),
            max_priority_fee_per_gas: priority,
        }
    }
}

/// Outcome of checking an estimate against the [GasBudget].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GasCheck {
    Within { cost_wei: U256, cost_usd: f64 },
    OverBudget { cost_wei: U256, cost_usd: f64 },
}

/// Caps the expected cost of a transaction.
///
/// The fiat budget is converted to wei once, so the comparison itself is on integers.
#[derive(Clone, Copy, Debug)]
pub struct GasBudget {
    max_cost_wei: U256,
    max_gas_price: Option<u128>,
    native_token_usd: f64,
}

impl GasBudget {
    pub fn new(
        max_gas_cost_usd: f64,
        native_token_usd: f64,
        max_gas_price_gwei: Option<f64>,
    ) -> Result<Self> {
        anyhow::ensure!(native_token_usd > 0.0, "native_token_usd must be positive");
        anyhow::ensure!(max_gas_cost_usd >= 0.0, "max_gas_cost_usd must not be negative");
        let max_cost_native = format!("{:.18}", max_gas_cost_usd / native_token_usd);
        let max_cost_wei: U256 = parse_units(&max_cost_native, "ether")
            .with_context(|| format!("Invalid gas budget {max_cost_native}"))?
            .into();
        let max_gas_price = max_gas_price_gwei
            .map(|gwei| -> Result<u128> {
                let wei: U256 = parse_units(&format!("{gwei:.9}"), "gwei")
                    .with_context(|| format!("Invalid max gas price {gwei}"))?
                    .into();
                Ok(wei.saturating_to::<u128>())
            })
            .transpose()?;

        Ok(Self { max_cost_wei, max_gas_price, native_token_usd })
    }

    /// Expected cost of `gas_limit` gas at `estimate`, in wei.
    pub fn cost_wei(estimate: &FeeEstimate, gas_limit: u64) -> U256 {
        U256::from(gas_limit) * U256::from(estimate.gas_price())
    }

    /// Fiat value of `wei`, for display.
    pub fn to_usd(&self, wei: U256) -> f64 {
        format_units(wei, "ether").ok().and_then(|eth| eth.parse::<f64>().ok()).unwrap_or(f64::MAX)
            * self.native_token_usd
    }

    pub fn check(&self, estimate: &FeeEstimate, gas_limit: u64) -> GasCheck {
        let cost_wei = Self::cost_wei(estimate, gas_limit);
        let cost_usd = self.to_usd(cost_wei);
        let price_ok = self.max_gas_price.map_or(true, |max| estimate.gas_price() <= max);
        if cost_wei <= self.max_cost_wei && price_ok {
            GasCheck::Within { cost_wei, cost_usd }
        } else {
            GasCheck::OverBudget { cost_wei, cost_usd }
        }
    }
}

/// Formats a wei-per-gas value in gwei with two decimals.
pub fn format_gwei(wei: u128) -> String {
    format_units(U256::from(wei), "gwei")
        .ok()
        .and_then(|gwei| gwei.parse::<f64>().ok())
        .map(|gwei| format!("{gwei:.2}"))
        .unwrap_or_else(|| wei.to_string())
}
