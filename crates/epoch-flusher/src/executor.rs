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

//! The action executor: one flush attempt for one epoch.
//!
//! The sequence is balance check, gas check, simulation, submission (through
//! the bundle relay when configured, otherwise or on non-inclusion directly),
//! confirmation and finally an opportunistic reward claim. Every outcome is
//! folded into an [ActionResult]; nothing is propagated to the caller.

use std::{fmt, sync::Arc, time::Duration};

use alloy::primitives::{
    utils::{format_ether, format_units},
    Address, TxHash, U256,
};

use crate::{
    chain::{ChainClient, TxOutcome},
    contracts::{ContractError, RewardContract},
    epoch::EpochSnapshot,
    fees::{format_gwei, FeeParams, FeePolicy, GasBudget, GasCheck},
    relay::{BundleRelay, Inclusion},
    stats::Stats,
};

/// Why an attempt failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailureReason {
    /// The transaction was mined and reverted.
    Reverted { tx: TxHash, block: u64, gas_cost: U256 },
    /// The transaction was sent but not seen mined before the deadline.
    ConfirmationTimeout { tx: TxHash, timeout: Duration },
    /// Classified error from simulation, submission or confirmation.
    Contract(ContractError),
    /// The chain provider could not be read.
    Chain(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Reverted { tx, block, .. } => {
                write!(f, "transaction {tx} reverted in block {block}")
            }
            FailureReason::ConfirmationTimeout { tx, timeout } => {
                write!(f, "transaction {tx} not confirmed within {timeout:?}")
            }
            FailureReason::Contract(err) => write!(f, "{err}"),
            FailureReason::Chain(err) => write!(f, "{err}"),
        }
    }
}

/// Outcome of one executor run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionResult {
    Success { tx: TxHash, block: u64, gas_cost: U256 },
    SkippedInsufficientFunds,
    SkippedGasTooHigh,
    /// Simulation reverted: nothing to flush, or already flushed this epoch.
    SkippedQueueEmpty,
    Failed(FailureReason),
}

impl ActionResult {
    /// Whether no further attempt should be made for this epoch.
    ///
    /// Transient conditions (low balance, expensive gas, timeouts, transport
    /// errors) leave the epoch eligible for the next tick.
    pub fn closes_epoch(&self) -> bool {
        match self {
            ActionResult::Success { .. } | ActionResult::SkippedQueueEmpty => true,
            ActionResult::Failed(FailureReason::Reverted { .. }) => true,
            ActionResult::Failed(FailureReason::Contract(err)) => err.closes_window(),
            _ => false,
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            ActionResult::SkippedInsufficientFunds
                | ActionResult::SkippedGasTooHigh
                | ActionResult::SkippedQueueEmpty
        )
    }
}

/// Tunables of the executor, taken from the loaded config.
#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    pub low_balance: U256,
    pub critical_balance: U256,
    pub flush_gas_limit: u64,
    pub claim_gas_limit: u64,
    pub min_claim: U256,
    pub confirmation_timeout: Duration,
    pub fee_policy: FeePolicy,
    pub gas_budget: GasBudget,
}

pub struct ActionExecutor {
    chain: Arc<dyn ChainClient>,
    rewards: Arc<dyn RewardContract>,
    relay: Option<Arc<dyn BundleRelay>>,
    wallet: Address,
    config: ExecutorConfig,
    stats: Arc<Stats>,
}

impl ActionExecutor {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        rewards: Arc<dyn RewardContract>,
        wallet: Address,
        config: ExecutorConfig,
        stats: Arc<Stats>,
    ) -> Self {
        Self { chain, rewards, relay: None, wallet, config, stats }
    }

    pub fn with_relay(self, relay: Arc<dyn BundleRelay>) -> Self {
        Self { relay: Some(relay), ..self }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Runs one attempt for `snapshot.epoch` and records it in [Stats].
    ///
    /// The caller holds the processing guard and decides, from
    /// [ActionResult::closes_epoch], whether to mark the epoch.
    pub async fn execute(&self, snapshot: &EpochSnapshot) -> ActionResult {
        tracing::info!(
            "Flushing entry queue for epoch {} ({}s remaining)",
            snapshot.epoch,
            snapshot.remaining
        );
        let result = self.attempt().await;
        self.record(&result);

        match &result {
            ActionResult::Success { tx, block, gas_cost } => {
                tracing::info!(
                    "Flush succeeded for epoch {}: tx {tx} in block {block}, gas cost {} ETH",
                    snapshot.epoch,
                    format_ether(*gas_cost)
                );
                self.try_claim().await;
            }
            ActionResult::Failed(reason) => {
                tracing::error!("Flush failed for epoch {}: {reason}", snapshot.epoch);
            }
            skipped => {
                tracing::info!("Flush skipped for epoch {}: {skipped:?}", snapshot.epoch);
            }
        }
        result
    }

    fn record(&self, result: &ActionResult) {
        match result {
            ActionResult::Success { gas_cost, .. } => self.stats.record_success(*gas_cost),
            ActionResult::Failed(FailureReason::Reverted { gas_cost, .. }) => {
                self.stats.record_failure(*gas_cost)
            }
            ActionResult::Failed(_) => self.stats.record_failure(U256::ZERO),
            _ => self.stats.record_skip(),
        }
    }

    async fn attempt(&self) -> ActionResult {
        let balance = match self.chain.balance(self.wallet).await {
            Ok(balance) => balance,
            Err(err) => return ActionResult::Failed(FailureReason::Chain(err.to_string())),
        };
        if balance < self.config.critical_balance {
            tracing::error!(
                "Wallet {} balance {} ETH is below the critical threshold {} ETH",
                self.wallet,
                format_ether(balance),
                format_ether(self.config.critical_balance)
            );
            return ActionResult::SkippedInsufficientFunds;
        }
        if balance < self.config.low_balance {
            tracing::warn!(
                "Wallet {} balance {} ETH is below the low threshold {} ETH",
                self.wallet,
                format_ether(balance),
                format_ether(self.config.low_balance)
            );
        }

        let estimate = match self.chain.fee_estimate().await {
            Ok(estimate) => estimate,
            Err(err) => return ActionResult::Failed(FailureReason::Chain(err.to_string())),
        };
        match self.config.gas_budget.check(&estimate, self.config.flush_gas_limit) {
            GasCheck::Within { cost_usd, .. } => {
                tracing::debug!(
                    "Gas price {} gwei, estimated flush cost ${cost_usd:.2}",
                    format_gwei(estimate.gas_price())
                );
            }
            GasCheck::OverBudget { cost_wei, cost_usd } => {
                tracing::warn!(
                    "Gas too expensive: {} gwei, estimated flush cost {} ETH (${cost_usd:.2})",
                    format_gwei(estimate.gas_price()),
                    format_ether(cost_wei)
                );
                return ActionResult::SkippedGasTooHigh;
            }
        }

        self.check_reward_pool().await;

        match self.rewards.simulate_flush().await {
            Ok(()) => {}
            Err(err) if err.closes_window() => {
                tracing::info!("Flush simulation reverted, queue empty or already flushed: {err}");
                return ActionResult::SkippedQueueEmpty;
            }
            Err(ContractError::InsufficientFunds(msg)) => {
                tracing::warn!("Flush simulation reports insufficient funds: {msg}");
                return ActionResult::SkippedInsufficientFunds;
            }
            Err(err) => return ActionResult::Failed(FailureReason::Contract(err)),
        }

        let fees = self.config.fee_policy.params(&estimate, self.config.flush_gas_limit);
        if let Some(relay) = &self.relay {
            if let Some(result) = self.submit_bundle(relay.as_ref(), &fees).await {
                return result;
            }
        }
        self.submit_direct(&fees).await
    }

    async fn check_reward_pool(&self) {
        match self.rewards.rewards_available().await {
            Ok(pool) if pool.is_zero() => {
                tracing::info!("Reward pool is empty; flushing anyway, no reward will accrue");
            }
            Ok(_) => {}
            Err(err) => tracing::debug!("Could not read reward pool: {err}"),
        }
    }

    /// Relay path. `None` means the bundle did not land and the caller should
    /// fall back to a direct transaction.
    async fn submit_bundle(&self, relay: &dyn BundleRelay, fees: &FeeParams) -> Option<ActionResult> {
        let signed = match self.rewards.sign_flush(fees).await {
            Ok(signed) => signed,
            Err(err) => {
                tracing::warn!("Failed to sign flush for bundle submission: {err}");
                return None;
            }
        };
        let target_block = match self.chain.latest_block().await {
            Ok(block) => block.number + 1,
            Err(err) => {
                tracing::warn!("Failed to read head block for bundle target: {err}");
                return None;
            }
        };

        let handle = match relay.submit(&signed, target_block).await {
            Ok(handle) => handle,
            Err(err) => {
                tracing::warn!("Bundle submission failed, sending directly: {err}");
                return None;
            }
        };
        tracing::info!("Bundle submitted for block {target_block}, tx {}", signed.tx_hash);

        match relay.await_inclusion(&handle, self.config.confirmation_timeout).await {
            Ok(Inclusion::Included { block }) => {
                tracing::info!("Bundle included in block {block}");
                match self.chain.receipt(signed.tx_hash).await {
                    Ok(Some(outcome)) => Some(self.mined(outcome)),
                    Ok(None) => Some(self.confirm(signed.tx_hash).await),
                    Err(err) => {
                        tracing::warn!("Included bundle receipt unavailable: {err}");
                        Some(self.confirm(signed.tx_hash).await)
                    }
                }
            }
            Ok(Inclusion::NotIncluded) => {
                tracing::warn!("Bundle not included by block {target_block}, sending directly");
                None
            }
            Ok(Inclusion::Timeout) => {
                tracing::warn!("Bundle inclusion wait timed out, sending directly");
                None
            }
            Err(err) => {
                tracing::warn!("Bundle inclusion check failed, sending directly: {err}");
                None
            }
        }
    }

    async fn submit_direct(&self, fees: &FeeParams) -> ActionResult {
        let tx_hash = match self.rewards.submit_flush(fees).await {
            Ok(tx_hash) => tx_hash,
            Err(ContractError::InsufficientFunds(msg)) => {
                tracing::error!("Insufficient funds to send flush: {msg}");
                return ActionResult::SkippedInsufficientFunds;
            }
            Err(err) => return ActionResult::Failed(FailureReason::Contract(err)),
        };
        tracing::info!(
            "Flush tx {tx_hash} sent, max fee {} gwei, priority fee {} gwei",
            format_gwei(fees.max_fee_per_gas),
            format_gwei(fees.max_priority_fee_per_gas)
        );
        self.confirm(tx_hash).await
    }

    async fn confirm(&self, tx_hash: TxHash) -> ActionResult {
        let timeout = self.config.confirmation_timeout;
        match self.chain.await_confirmation(tx_hash, timeout).await {
            Ok(outcome) => self.mined(outcome),
            Err(ContractError::Timeout(_)) => {
                ActionResult::Failed(FailureReason::ConfirmationTimeout { tx: tx_hash, timeout })
            }
            Err(err) => ActionResult::Failed(FailureReason::Contract(err)),
        }
    }

    fn mined(&self, outcome: TxOutcome) -> ActionResult {
        if outcome.success {
            ActionResult::Success {
                tx: outcome.tx_hash,
                block: outcome.block_number,
                gas_cost: outcome.gas_cost(),
            }
        } else {
            ActionResult::Failed(FailureReason::Reverted {
                tx: outcome.tx_hash,
                block: outcome.block_number,
                gas_cost: outcome.gas_cost(),
            })
        }
    }

    /// Claims accrued rewards once they reach the configured minimum. Failures
    /// are logged only.
    async fn try_claim(&self) {
        let pending = match self.rewards.rewards_of(self.wallet).await {
            Ok(pending) => pending,
            Err(err) => {
                tracing::warn!("Failed to read pending rewards: {err}");
                return;
            }
        };
        if pending < self.config.min_claim {
            tracing::debug!("Pending rewards {} below claim threshold", format_token(pending));
            return;
        }

        let estimate = match self.chain.fee_estimate().await {
            Ok(estimate) => estimate,
            Err(err) => {
                tracing::warn!("Skipping claim, fee estimate unavailable: {err}");
                return;
            }
        };
        let fees = self.config.fee_policy.params(&estimate, self.config.claim_gas_limit);

        tracing::info!("Claiming {} reward tokens", format_token(pending));
        let tx_hash = match self.rewards.submit_claim(&fees).await {
            Ok(tx_hash) => tx_hash,
            Err(err) => {
                tracing::warn!("Claim transaction failed to send: {err}");
                return;
            }
        };
        match self.chain.await_confirmation(tx_hash, self.config.confirmation_timeout).await {
            Ok(outcome) if outcome.success => {
                self.stats.record_claim(pending, outcome.gas_cost());
                tracing::info!("Claimed {} reward tokens in tx {tx_hash}", format_token(pending));
            }
            Ok(outcome) => {
                tracing::warn!("Claim tx {tx_hash} reverted in block {}", outcome.block_number);
            }
            Err(err) => tracing::warn!("Claim tx {tx_hash} not confirmed: {err}"),
        }
    }
}

/// Formats an 18-decimal token amount.
pub fn format_token(amount: U256) -> String {
    format_units(amount, "ether").unwrap_or_else(|_| amount.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chain::BlockInfo,
        epoch::{compute_epoch, EpochClockConfig, GenesisSource},
        fees::FeeEstimate,
        relay::{BundleHandle, RelayError},
        test_utils::{MockChain, MockRewards, CLAIM_TX, FLUSH_TX},
    };
    use alloy::primitives::utils::parse_ether;
    use std::sync::{atomic::Ordering, Mutex};
    use tracing_test::traced_test;

    const GWEI: u128 = 1_000_000_000;

    fn config() -> ExecutorConfig {
        ExecutorConfig {
            low_balance: parse_ether("0.01").unwrap(),
            critical_balance: parse_ether("0.001").unwrap(),
            flush_gas_limit: 250_000,
            claim_gas_limit: 100_000,
            min_claim: parse_ether("100").unwrap(),
            confirmation_timeout: Duration::from_secs(30),
            fee_policy: FeePolicy {
                priority_fee_markup_percentage: 20,
                base_fee_multiplier_percentage: 200,
                min_priority_fee: 0,
            },
            gas_budget: GasBudget::new(20.0, 3300.0, None).unwrap(),
        }
    }

    fn snapshot() -> EpochSnapshot {
        let config = EpochClockConfig::new(1_700_000_000, 2304, GenesisSource::Contract).unwrap();
        compute_epoch(1_700_000_000 + 2304 * 3 - 4, &config).unwrap()
    }

    fn mined(tx: TxHash, success: bool) -> TxOutcome {
        TxOutcome {
            tx_hash: tx,
            success,
            block_number: 1001,
            gas_used: 60_000,
            effective_gas_price: 11 * GWEI,
        }
    }

    struct Harness {
        chain: Arc<MockChain>,
        rewards: Arc<MockRewards>,
        stats: Arc<Stats>,
        executor: ActionExecutor,
    }

    fn harness() -> Harness {
        let chain = Arc::new(MockChain::at(1_700_000_000));
        let rewards = Arc::new(MockRewards::default());
        let stats = Arc::new(Stats::new());
        let executor = ActionExecutor::new(
            chain.clone(),
            rewards.clone(),
            Address::repeat_byte(0x11),
            config(),
            stats.clone(),
        );
        Harness { chain, rewards, stats, executor }
    }

    #[tokio::test]
    #[traced_test]
    async fn successful_flush_is_recorded() {
        let h = harness();
        h.chain.add_receipt(mined(FLUSH_TX, true));

        let result = h.executor.execute(&snapshot()).await;

        let gas_cost = U256::from(60_000u64 * 11 * GWEI as u64);
        assert_eq!(result, ActionResult::Success { tx: FLUSH_TX, block: 1001, gas_cost });
        assert!(result.closes_epoch());
        let stats = h.stats.snapshot();
        assert_eq!(stats.success, 1);
        assert_eq!(stats.gas_spent, gas_cost);
        assert_eq!(h.rewards.flush_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn critical_balance_skips_without_sending() {
        let h = harness();
        h.chain.set_balance(parse_ether("0.0005").unwrap());

        let result = h.executor.execute(&snapshot()).await;

        assert_eq!(result, ActionResult::SkippedInsufficientFunds);
        assert!(!result.closes_epoch());
        assert_eq!(h.rewards.flush_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.rewards.simulate_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.stats.snapshot().skipped, 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn low_balance_only_warns() {
        let h = harness();
        h.chain.set_balance(parse_ether("0.005").unwrap());
        h.chain.add_receipt(mined(FLUSH_TX, true));

        let result = h.executor.execute(&snapshot()).await;

        assert!(matches!(result, ActionResult::Success { .. }));
        assert!(logs_contain("below the low threshold"));
    }

    #[tokio::test]
    #[traced_test]
    async fn expensive_gas_skips_without_marking() {
        let h = harness();
        // 250k gas at 200 gwei is 0.05 ETH, well above $20 at $3300.
        h.chain.set_fees(FeeEstimate { base_fee: 199 * GWEI, priority_fee: GWEI });

        let result = h.executor.execute(&snapshot()).await;

        assert_eq!(result, ActionResult::SkippedGasTooHigh);
        assert!(!result.closes_epoch());
        assert_eq!(h.rewards.simulate_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn simulation_revert_means_queue_empty() {
        let h = harness();
        h.rewards.fail_simulation(ContractError::Reverted { reason: Some("empty queue".into()) });

        let result = h.executor.execute(&snapshot()).await;

        assert_eq!(result, ActionResult::SkippedQueueEmpty);
        assert!(result.closes_epoch());
        assert_eq!(h.rewards.flush_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn simulation_transport_error_leaves_epoch_open() {
        let h = harness();
        h.rewards.fail_simulation(ContractError::Transport("connection reset".into()));

        let result = h.executor.execute(&snapshot()).await;

        assert!(matches!(result, ActionResult::Failed(FailureReason::Contract(_))));
        assert!(!result.closes_epoch());
        assert_eq!(h.stats.snapshot().failed, 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn mined_revert_closes_epoch() {
        let h = harness();
        h.chain.add_receipt(mined(FLUSH_TX, false));

        let result = h.executor.execute(&snapshot()).await;

        assert!(matches!(result, ActionResult::Failed(FailureReason::Reverted { .. })));
        assert!(result.closes_epoch());
        let stats = h.stats.snapshot();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.gas_spent, U256::from(60_000u64 * 11 * GWEI as u64));
    }

    #[tokio::test]
    #[traced_test]
    async fn confirmation_timeout_leaves_epoch_open() {
        let h = harness();

        let result = h.executor.execute(&snapshot()).await;

        assert_eq!(
            result,
            ActionResult::Failed(FailureReason::ConfirmationTimeout {
                tx: FLUSH_TX,
                timeout: Duration::from_secs(30)
            })
        );
        assert!(!result.closes_epoch());
        assert_eq!(h.stats.snapshot().failed, 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn send_time_errors_are_classified() {
        let h = harness();
        h.rewards.fail_submission(ContractError::InsufficientFunds("gas * price + value".into()));
        let result = h.executor.execute(&snapshot()).await;
        assert_eq!(result, ActionResult::SkippedInsufficientFunds);
        assert!(!result.closes_epoch());

        let h = harness();
        h.rewards.fail_submission(ContractError::Reverted { reason: None });
        let result = h.executor.execute(&snapshot()).await;
        assert!(result.closes_epoch());
        assert_eq!(h.stats.snapshot().failed, 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn submission_uses_marked_up_fees() {
        let h = harness();
        h.chain.set_fees(FeeEstimate { base_fee: 10 * GWEI, priority_fee: GWEI });
        h.chain.add_receipt(mined(FLUSH_TX, true));

        h.executor.execute(&snapshot()).await;

        let fees = h.rewards.last_fees.lock().unwrap().expect("flush was submitted");
        assert_eq!(fees.gas_limit, 250_000);
        assert_eq!(fees.max_priority_fee_per_gas, 1_200_000_000);
        assert_eq!(fees.max_fee_per_gas, 21_200_000_000);
    }

    #[tokio::test]
    #[traced_test]
    async fn claims_when_rewards_reach_threshold() {
        let h = harness();
        h.chain.add_receipt(mined(FLUSH_TX, true));
        h.chain.add_receipt(mined(CLAIM_TX, true));
        h.rewards.set_pending(parse_ether("150").unwrap());

        h.executor.execute(&snapshot()).await;

        assert_eq!(h.rewards.claim_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.stats.snapshot().claimed, parse_ether("150").unwrap());
    }

    #[tokio::test]
    #[traced_test]
    async fn no_claim_below_threshold() {
        let h = harness();
        h.chain.add_receipt(mined(FLUSH_TX, true));
        h.rewards.set_pending(parse_ether("99.9").unwrap());

        h.executor.execute(&snapshot()).await;

        assert_eq!(h.rewards.claim_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.stats.snapshot().claimed, U256::ZERO);
    }

    #[tokio::test]
    #[traced_test]
    async fn empty_reward_pool_still_flushes() {
        let h = harness();
        h.chain.add_receipt(mined(FLUSH_TX, true));
        h.rewards.set_pool(U256::ZERO);

        let result = h.executor.execute(&snapshot()).await;

        assert!(matches!(result, ActionResult::Success { .. }));
        assert!(logs_contain("no reward will accrue"));
    }

    /// Relay double that reports a fixed inclusion outcome.
    struct StubRelay {
        inclusion: Inclusion,
        submitted: Mutex<Vec<u64>>,
    }

    #[async_trait::async_trait]
    impl BundleRelay for StubRelay {
        async fn submit(
            &self,
            tx: &crate::contracts::SignedTx,
            target_block: u64,
        ) -> Result<BundleHandle, RelayError> {
            self.submitted.lock().unwrap().push(target_block);
            Ok(BundleHandle { tx_hash: tx.tx_hash, target_block, bundle_hash: None })
        }

        async fn await_inclusion(
            &self,
            _handle: &BundleHandle,
            _timeout: Duration,
        ) -> Result<Inclusion, RelayError> {
            Ok(self.inclusion)
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn included_bundle_skips_direct_send() {
        let h = harness();
        h.chain.set_block(BlockInfo { timestamp: 1_700_000_000, number: 1000 });
        h.chain.add_receipt(mined(FLUSH_TX, true));
        let relay = Arc::new(StubRelay {
            inclusion: Inclusion::Included { block: 1001 },
            submitted: Mutex::new(vec![]),
        });
        let executor = h.executor.with_relay(relay.clone());

        let result = executor.execute(&snapshot()).await;

        assert!(matches!(result, ActionResult::Success { block: 1001, .. }));
        assert_eq!(*relay.submitted.lock().unwrap(), vec![1001]);
        assert_eq!(h.rewards.sign_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.rewards.flush_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn missed_bundle_falls_back_to_direct_send() {
        let h = harness();
        h.chain.add_receipt(mined(FLUSH_TX, true));
        let relay =
            Arc::new(StubRelay { inclusion: Inclusion::NotIncluded, submitted: Mutex::new(vec![]) });
        let executor = h.executor.with_relay(relay);

        let result = executor.execute(&snapshot()).await;

        assert!(matches!(result, ActionResult::Success { .. }));
        assert_eq!(h.rewards.flush_calls.load(Ordering::SeqCst), 1);
        assert!(logs_contain("sending directly"));
    }
}
