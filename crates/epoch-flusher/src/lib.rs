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

use std::{
    io::Write as _,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use alloy::{primitives::Address, signers::local::PrivateKeySigner};
use anyhow::{Context, Result};
use clap::Parser;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    chain::{ChainClient, ChainClock, ChainError},
    config::Config,
    contracts::{EpochContract, RewardContract},
    epoch::{compute_epoch, resolve_genesis, EpochClockConfig, EpochSnapshot},
    executor::{ActionExecutor, ActionResult},
    relay::BundleRelay,
    scheduler::{Scheduler, TriggerState},
    stats::{Stats, StatsSnapshot},
    status::StartupReport,
    task::{RetryRes, RetryTask, Supervisor, SupervisorErr},
};

pub mod balance_alert_layer;
pub mod chain;
pub mod config;
pub mod contracts;
pub mod epoch;
pub mod errors;
pub mod executor;
pub mod fees;
pub mod relay;
pub mod scheduler;
pub mod stats;
pub mod status;
pub mod task;
#[cfg(test)]
pub(crate) mod test_utils;

/// Mainnet flush rewarder deployment.
pub const DEFAULT_FLUSH_REWARDER: &str = "0x7C9a7130379F1B5dd6e7A53AF84fC0fE32267B65";
/// Mainnet rollup deployment.
pub const DEFAULT_ROLLUP: &str = "0x603bb2c05D474794ea97805e8De69bCcFb3bCA12";

/// Calls `flushEntryQueue()` at every epoch boundary and claims the rewards.
#[derive(Parser, Clone, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// URL of the Ethereum RPC endpoint.
    #[clap(short, long, env)]
    pub rpc_url: Url,
    /// Websocket RPC endpoint. Enables the block subscription path.
    #[clap(long, env)]
    pub ws_rpc_url: Option<Url>,
    /// Private key of the flushing wallet.
    #[clap(long, env, hide_env_values = true)]
    pub private_key: PrivateKeySigner,
    /// Address of the flush rewarder contract.
    #[clap(long, env, default_value = DEFAULT_FLUSH_REWARDER)]
    pub flush_rewarder_address: Address,
    /// Address of the rollup contract.
    #[clap(long, env, default_value = DEFAULT_ROLLUP)]
    pub rollup_address: Address,
    /// Flashbots-compatible relay. When set, flushes are sent as bundles first.
    #[clap(long, env)]
    pub flashbots_relay_url: Option<Url>,
    /// Key used to authenticate with the relay. Needs no funds.
    #[clap(long, env, hide_env_values = true)]
    pub flashbots_signer_key: Option<PrivateKeySigner>,
    /// Optional TOML tuning file.
    #[clap(short, long, env)]
    pub config_file: Option<PathBuf>,
    /// Log in JSON format.
    #[clap(long, env, default_value_t = false)]
    pub log_json: bool,
}

impl Args {
    pub async fn load_config(&self) -> Result<Config> {
        match &self.config_file {
            Some(path) => Config::load(path).await,
            None => {
                let config = Config::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Relay endpoint and its signer, when configured. A URL without a key is
    /// a startup error.
    pub fn relay_settings(&self) -> Result<Option<(Url, PrivateKeySigner)>> {
        match (&self.flashbots_relay_url, &self.flashbots_signer_key) {
            (Some(url), Some(key)) => Ok(Some((url.clone(), key.clone()))),
            (Some(_), None) => Err(config::ConfigErr::Missing(
                "FLASHBOTS_SIGNER_KEY is required with FLASHBOTS_RELAY_URL".into(),
            )
            .into()),
            (None, Some(_)) => {
                tracing::warn!("FLASHBOTS_SIGNER_KEY set without FLASHBOTS_RELAY_URL, ignoring");
                Ok(None)
            }
            (None, None) => Ok(None),
        }
    }
}

/// Handles to the external systems the service talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub chain: Arc<dyn ChainClient>,
    pub rewards: Arc<dyn RewardContract>,
    pub rollup: Arc<dyn EpochContract>,
    pub relay: Option<Arc<dyn BundleRelay>>,
    pub wallet: Address,
}

/// Poll loop bookkeeping carried between ticks.
#[derive(Debug, Default)]
struct LoopState {
    last_epoch: Option<u64>,
    ticks: u64,
    /// Rollup epoch minus local epoch at the last successful drift read.
    drift: Option<i64>,
}

/// Owns the epoch clock, the trigger state and the executor, and drives them
/// from the poll loop and the block watcher.
pub struct FlushService {
    chain: Arc<dyn ChainClient>,
    rewards: Arc<dyn RewardContract>,
    rollup: Arc<dyn EpochContract>,
    wallet: Address,
    epoch_config: EpochClockConfig,
    clock: ChainClock,
    scheduler: Scheduler,
    state: TriggerState,
    executor: ActionExecutor,
    stats: Arc<Stats>,
    drift_check_ticks: u64,
    retry_delay: Duration,
    print_status: bool,
}

impl FlushService {
    /// Resolves the genesis time and assembles the service.
    pub async fn start(collaborators: Collaborators, config: &Config) -> Result<Self> {
        let epoch_config = resolve_genesis(
            collaborators.rollup.as_ref(),
            collaborators.chain.as_ref(),
            &config.genesis_inputs(),
        )
        .await
        .context("Failed to resolve the epoch genesis time")?;
        Self::new(collaborators, config, epoch_config)
    }

    pub fn new(
        collaborators: Collaborators,
        config: &Config,
        epoch_config: EpochClockConfig,
    ) -> Result<Self> {
        let Collaborators { chain, rewards, rollup, relay, wallet } = collaborators;
        let stats = Arc::new(Stats::new());

        let mut executor = ActionExecutor::new(
            chain.clone(),
            rewards.clone(),
            wallet,
            config.executor_config()?,
            stats.clone(),
        );
        if let Some(relay) = relay {
            executor = executor.with_relay(relay);
        }

        Ok(Self {
            chain,
            rewards,
            rollup,
            wallet,
            epoch_config,
            clock: ChainClock::new(config.epoch.interpolate_block_time),
            scheduler: config.scheduler(),
            state: TriggerState::new(),
            executor,
            stats,
            drift_check_ticks: config.epoch.drift_check_ticks,
            retry_delay: config.retry_delay(),
            print_status: true,
        })
    }

    /// Disables the carriage-return status line, e.g. when logging JSON.
    pub fn with_status_line(self, enabled: bool) -> Self {
        Self { print_status: enabled, ..self }
    }

    pub fn epoch_config(&self) -> &EpochClockConfig {
        &self.epoch_config
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Logs wallet, contract and settings state.
    pub async fn report_startup(&self, expected_chain_id: u64) -> Result<StartupReport> {
        let config = self.executor.config();
        let report = StartupReport::gather(
            self.chain.as_ref(),
            self.rewards.as_ref(),
            self.rollup.as_ref(),
            self.wallet,
            expected_chain_id,
            self.epoch_config,
            config.low_balance,
            config.critical_balance,
        )
        .await?;
        report.log(&self.scheduler);
        Ok(report)
    }

    /// The guarded trigger. Returns `None` when the window is closed, the
    /// epoch was already acted on, or another attempt is in flight.
    pub async fn check_and_fire(&self, snapshot: &EpochSnapshot) -> Option<ActionResult> {
        if !self.scheduler.should_fire(snapshot) {
            return None;
        }
        let guard = self.state.try_begin(snapshot.epoch)?;
        let result = self.executor.execute(snapshot).await;
        if result.closes_epoch() {
            guard.mark_acted();
        }
        Some(result)
    }

    /// One poll iteration. Returns how long to sleep before the next one.
    async fn tick(&self, state: &mut LoopState) -> Result<Duration> {
        let refresh_drift = self.drift_check_ticks > 0 && state.ticks % self.drift_check_ticks == 0;
        state.ticks = state.ticks.wrapping_add(1);

        let time = self.clock.current_time(self.chain.as_ref()).await?;
        let snapshot = compute_epoch(time.timestamp, &self.epoch_config)?;

        if let Some(previous) = state.last_epoch {
            if previous != snapshot.epoch {
                tracing::info!(
                    "New epoch: {previous} -> {} at block {} (timestamp {})",
                    snapshot.epoch,
                    time.block_number,
                    snapshot.start
                );
            }
        }
        state.last_epoch = Some(snapshot.epoch);

        if refresh_drift {
            self.refresh_drift(&snapshot, &mut state.drift).await;
        }
        if let Some(drift) = state.drift.filter(|drift| *drift != 0) {
            tracing::warn!(
                "Epoch drift: local clock says epoch {} but the rollup reports {}",
                snapshot.epoch,
                snapshot.epoch as i64 + drift
            );
        }

        let tier = self.scheduler.tier(&snapshot);
        if self.print_status {
            let line =
                status::status_line(&chrono::Local::now(), &snapshot, tier, &self.stats.snapshot());
            let mut stdout = std::io::stdout();
            let _ = write!(stdout, "\r{line}   ");
            let _ = stdout.flush();
        }

        self.check_and_fire(&snapshot).await;
        Ok(self.scheduler.next_sleep(&snapshot))
    }

    /// Re-reads the rollup epoch. A failed read keeps the previous result.
    async fn refresh_drift(&self, snapshot: &EpochSnapshot, drift: &mut Option<i64>) {
        match self.rollup.current_epoch().await {
            Ok(contract_epoch) => {
                if contract_epoch == snapshot.epoch {
                    tracing::trace!("Local epoch {} matches the rollup", snapshot.epoch);
                }
                *drift = Some(contract_epoch as i64 - snapshot.epoch as i64);
            }
            Err(err) => tracing::debug!("Skipping drift check: {err}"),
        }
    }

    /// Push path: every new head is fed into the same guarded trigger as the
    /// poll loop, so it fires under either trigger policy.
    async fn watch_blocks(&self, cancel: CancellationToken) -> Result<(), SupervisorErr> {
        let mut blocks = match self.chain.subscribe_blocks().await {
            Ok(blocks) => blocks,
            Err(ChainError::Unsupported(what)) => {
                tracing::info!("No {what} on this provider, relying on polling only");
                return Ok(());
            }
            Err(err) => return Err(SupervisorErr::Recover(err.into())),
        };
        tracing::info!("Subscribed to new blocks");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                block = blocks.next() => {
                    let Some(block) = block else {
                        return Err(SupervisorErr::Recover(anyhow::anyhow!("block subscription ended")));
                    };
                    let time = self.clock.observe(block);
                    let snapshot = match compute_epoch(time.timestamp, &self.epoch_config) {
                        Ok(snapshot) => snapshot,
                        Err(err) => {
                            tracing::warn!("Ignoring block {}: {err:?}", block.number);
                            continue;
                        }
                    };
                    self.check_and_fire(&snapshot).await;
                }
            }
        }
    }

    /// Runs until `cancel` fires and returns the final stats.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<StatsSnapshot> {
        let watcher_cancel = cancel.child_token();
        let watcher = tokio::spawn(
            Supervisor::new(Arc::new(BlockWatcher { service: self.clone() }), watcher_cancel.clone())
                .spawn(),
        );

        tracing::info!("Flusher running, press Ctrl+C to stop");
        let mut state = LoopState::default();
        loop {
            let sleep = match self.tick(&mut state).await {
                Ok(sleep) => sleep,
                Err(err) => {
                    tracing::warn!(
                        "Tick failed: {err:#}, retrying in {}s",
                        self.retry_delay.as_secs()
                    );
                    self.retry_delay
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(sleep) => {}
            }
        }

        watcher_cancel.cancel();
        match watcher.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!("Block watcher stopped with error: {err:?}"),
            Err(err) => tracing::warn!("Block watcher task failed: {err}"),
        }
        if self.print_status {
            println!();
        }
        Ok(self.stats.snapshot())
    }
}

struct BlockWatcher {
    service: Arc<FlushService>,
}

impl RetryTask for BlockWatcher {
    fn spawn(&self, cancel: CancellationToken) -> RetryRes {
        let service = self.service.clone();
        Box::pin(async move { service.watch_blocks(cancel).await })
    }
}
