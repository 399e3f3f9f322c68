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

//! Human-readable rendering: the per-tick status line, the startup report
//! and the final stats report.

use std::fmt::Write;

use alloy::primitives::{utils::format_ether, Address, U256};
use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone};

use crate::{
    chain::ChainClient,
    contracts::{EpochContract, RewardContract},
    epoch::{EpochClockConfig, EpochSnapshot, BPS_PER_EPOCH},
    executor::format_token,
    scheduler::{PollTier, Scheduler},
    stats::StatsSnapshot,
};

const BAR_WIDTH: usize = 20;

pub fn progress_bar(progress_bps: u64, width: usize) -> String {
    let filled = ((progress_bps.min(BPS_PER_EPOCH) as usize) * width) / BPS_PER_EPOCH as usize;
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

/// `Xm Ys`
pub fn format_remaining(secs: u64) -> String {
    format!("{}m {}s", secs / 60, secs % 60)
}

pub fn status_line<Tz>(
    at: &DateTime<Tz>,
    snapshot: &EpochSnapshot,
    tier: PollTier,
    stats: &StatsSnapshot,
) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!(
        "[{}] Epoch {} [{}] {:.1}% | {} | {tier} | ok {} failed {} skipped {}",
        at.format("%H:%M:%S"),
        snapshot.epoch,
        progress_bar(snapshot.progress_bps(), BAR_WIDTH),
        snapshot.progress_percent(),
        format_remaining(snapshot.remaining),
        stats.success,
        stats.failed,
        stats.skipped,
    )
}

pub fn shutdown_report(stats: &StatsSnapshot) -> String {
    format!(
        "Final stats: {} succeeded, {} failed, {} skipped, {} tokens claimed, {} ETH spent on gas",
        stats.success,
        stats.failed,
        stats.skipped,
        format_token(stats.claimed),
        format_ether(stats.gas_spent)
    )
}

/// Snapshot of wallet, contract and settings state printed once at startup.
#[derive(Clone, Debug)]
pub struct StartupReport {
    pub wallet: Address,
    pub balance: U256,
    pub chain_id: u64,
    pub expected_chain_id: u64,
    pub pending_rewards: Option<U256>,
    pub reward_pool: Option<U256>,
    pub reward_per_insertion: Option<U256>,
    pub contract_epoch: Option<u64>,
    pub clock: EpochClockConfig,
    pub critical_balance: U256,
    pub low_balance: U256,
}

impl StartupReport {
    /// Reads the on-chain part of the report. Wallet balance and chain id are
    /// required; contract reads are best effort.
    #[allow(clippy::too_many_arguments)]
    pub async fn gather(
        chain: &dyn ChainClient,
        rewards: &dyn RewardContract,
        rollup: &dyn EpochContract,
        wallet: Address,
        expected_chain_id: u64,
        clock: EpochClockConfig,
        low_balance: U256,
        critical_balance: U256,
    ) -> Result<Self> {
        let balance = chain.balance(wallet).await.context("Failed to read wallet balance")?;
        let chain_id = chain.chain_id().await.context("Failed to read chain id")?;

        let pending_rewards = rewards
            .rewards_of(wallet)
            .await
            .map_err(|err| tracing::warn!("Failed to read pending rewards: {err}"))
            .ok();
        let reward_pool = rewards
            .rewards_available()
            .await
            .map_err(|err| tracing::warn!("Failed to read reward pool: {err}"))
            .ok();
        let reward_per_insertion = rewards.reward_per_insertion().await.ok();
        let contract_epoch = rollup
            .current_epoch()
            .await
            .map_err(|err| tracing::warn!("Failed to read contract epoch: {err}"))
            .ok();

        Ok(Self {
            wallet,
            balance,
            chain_id,
            expected_chain_id,
            pending_rewards,
            reward_pool,
            reward_per_insertion,
            contract_epoch,
            clock,
            critical_balance,
            low_balance,
        })
    }

    pub fn is_critical(&self) -> bool {
        self.balance < self.critical_balance
    }

    pub fn chain_mismatch(&self) -> bool {
        self.chain_id != self.expected_chain_id
    }

    pub fn render(&self, scheduler: &Scheduler) -> String {
        let or_unknown = |value: Option<U256>| {
            value.map(format_token).unwrap_or_else(|| "unknown".to_string())
        };
        let tiers = &scheduler.tiers;
        let duration = self.clock.epoch_duration();

        let mut out = String::new();
        // Writing to a String is infallible.
        let _ = writeln!(out, "Flusher status:");
        let _ = writeln!(out, "  Wallet:               {}", self.wallet);
        let _ = writeln!(out, "  ETH balance:          {} ETH", format_ether(self.balance));
        let _ = writeln!(out, "  Pending rewards:      {}", or_unknown(self.pending_rewards));
        let _ = writeln!(out, "  Reward pool:          {}", or_unknown(self.reward_pool));
        let _ = writeln!(out, "  Reward per insertion: {}", or_unknown(self.reward_per_insertion));
        let _ = writeln!(
            out,
            "  Contract epoch:       {}",
            self.contract_epoch.map_or_else(|| "unknown".to_string(), |epoch| epoch.to_string())
        );
        let _ = writeln!(out, "  Chain id:             {}", self.chain_id);
        let _ = writeln!(out, "Settings:");
        let _ = writeln!(
            out,
            "  Genesis time:         {} ({})",
            self.clock.genesis_time(),
            self.clock.source()
        );
        let _ = writeln!(
            out,
            "  Epoch duration:       {duration}s ({:.1} min)",
            duration as f64 / 60.0
        );
        let _ = writeln!(out, "  Flush trigger:        {}", scheduler.policy);
        let _ = write!(
            out,
            "  Poll tiers:           {}ms < {}bp <= {}ms < {}bp <= {}ms < {}bp or {}s left <= {}ms",
            tiers.idle_interval_ms,
            tiers.approaching_bps,
            tiers.approaching_interval_ms,
            tiers.near_bps,
            tiers.near_interval_ms,
            tiers.critical_bps,
            tiers.critical_remaining_secs,
            tiers.critical_interval_ms,
        );
        out
    }

    /// Logs the report, the chain id warning and the critical balance banner.
    pub fn log(&self, scheduler: &Scheduler) {
        tracing::info!("\n{}", self.render(scheduler));
        if self.chain_mismatch() {
            tracing::warn!(
                "Connected to chain id {}, expected {}; check RPC_URL and contract addresses",
                self.chain_id,
                self.expected_chain_id
            );
        }
        if self.is_critical() {
            tracing::error!(
                "CRITICAL: insufficient ETH balance {} ETH (minimum {} ETH, recommended {} ETH). \
                 Flushes will be skipped until {} is funded",
                format_ether(self.balance),
                format_ether(self.critical_balance),
                format_ether(self.low_balance),
                self.wallet
            );
        } else if self.balance < self.low_balance {
            tracing::warn!(
                "Low ETH balance {} ETH (recommended {} ETH)",
                format_ether(self.balance),
                format_ether(self.low_balance)
            );
        }
    }
}
