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

//! In-memory collaborators for unit tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Mutex,
    },
    time::Duration,
};

use alloy::primitives::{utils::parse_ether, Address, Bytes, TxHash, U256};
use async_trait::async_trait;

use crate::{
    chain::{BlockInfo, ChainClient, ChainError, TxOutcome},
    contracts::{ContractError, EpochContract, RewardContract, SignedTx},
    fees::{FeeEstimate, FeeParams},
};

pub(crate) const FLUSH_TX: TxHash = TxHash::repeat_byte(0xf1);
pub(crate) const CLAIM_TX: TxHash = TxHash::repeat_byte(0xc1);

const GWEI: u128 = 1_000_000_000;

pub(crate) struct MockChain {
    block: Mutex<BlockInfo>,
    balance: Mutex<U256>,
    fees: Mutex<FeeEstimate>,
    chain_id: Mutex<u64>,
    receipts: Mutex<HashMap<TxHash, TxOutcome>>,
    fail_blocks: AtomicBool,
    pub block_calls: AtomicU64,
}

impl MockChain {
    /// A chain whose head block has timestamp `timestamp`, with a funded wallet
    /// and 11 gwei gas.
    pub(crate) fn at(timestamp: u64) -> Self {
        Self {
            block: Mutex::new(BlockInfo { timestamp, number: 1000 }),
            balance: Mutex::new(parse_ether("1").unwrap()),
            fees: Mutex::new(FeeEstimate { base_fee: 10 * GWEI, priority_fee: GWEI }),
            chain_id: Mutex::new(1),
            receipts: Mutex::new(HashMap::new()),
            fail_blocks: AtomicBool::new(false),
            block_calls: AtomicU64::new(0),
        }
    }

    pub(crate) fn set_block(&self, block: BlockInfo) {
        *self.block.lock().unwrap() = block;
    }

    /// Moves the head to `timestamp`, one block per call.
    pub(crate) fn set_time(&self, timestamp: u64) {
        let mut block = self.block.lock().unwrap();
        block.timestamp = timestamp;
        block.number += 1;
    }

    pub(crate) fn set_balance(&self, balance: U256) {
        *self.balance.lock().unwrap() = balance;
    }

    pub(crate) fn set_fees(&self, fees: FeeEstimate) {
        *self.fees.lock().unwrap() = fees;
    }

    pub(crate) fn set_chain_id(&self, chain_id: u64) {
        *self.chain_id.lock().unwrap() = chain_id;
    }

    pub(crate) fn add_receipt(&self, outcome: TxOutcome) {
        self.receipts.lock().unwrap().insert(outcome.tx_hash, outcome);
    }

    pub(crate) fn fail_blocks(&self, fail: bool) {
        self.fail_blocks.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn latest_block(&self) -> Result<BlockInfo, ChainError> {
        self.block_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_blocks.load(Ordering::SeqCst) {
            return Err(ChainError::Transient("connection refused".into()));
        }
        Ok(*self.block.lock().unwrap())
    }

    async fn balance(&self, _address: Address) -> Result<U256, ChainError> {
        Ok(*self.balance.lock().unwrap())
    }

    async fn fee_estimate(&self) -> Result<FeeEstimate, ChainError> {
        Ok(*self.fees.lock().unwrap())
    }

    async fn chain_id(&self) -> Result<u64, ChainError> {
        Ok(*self.chain_id.lock().unwrap())
    }

    async fn await_confirmation(
        &self,
        tx_hash: TxHash,
        timeout: Duration,
    ) -> Result<TxOutcome, ContractError> {
        self.receipts.lock().unwrap().get(&tx_hash).copied().ok_or(ContractError::Timeout(timeout))
    }

    async fn receipt(&self, tx_hash: TxHash) -> Result<Option<TxOutcome>, ChainError> {
        Ok(self.receipts.lock().unwrap().get(&tx_hash).copied())
    }
}

/// Rollup double. `None` makes the corresponding call revert.
pub(crate) struct MockRollup {
    pub genesis: Option<u64>,
    pub epoch: Option<u64>,
}

#[async_trait]
impl EpochContract for MockRollup {
    async fn current_epoch(&self) -> Result<u64, ContractError> {
        self.epoch.ok_or(ContractError::Reverted { reason: None })
    }

    async fn genesis_time(&self) -> Result<u64, ContractError> {
        self.genesis.ok_or(ContractError::Reverted { reason: None })
    }
}

pub(crate) struct MockRewards {
    pub simulate_calls: AtomicU64,
    pub flush_calls: AtomicU64,
    pub sign_calls: AtomicU64,
    pub claim_calls: AtomicU64,
    pub last_fees: Mutex<Option<FeeParams>>,
    simulate_error: Mutex<Option<ContractError>>,
    submit_error: Mutex<Option<ContractError>>,
    simulate_delay: Mutex<Option<Duration>>,
    pending: Mutex<U256>,
    pool: Mutex<U256>,
}

impl Default for MockRewards {
    fn default() -> Self {
        Self {
            simulate_calls: AtomicU64::new(0),
            flush_calls: AtomicU64::new(0),
            sign_calls: AtomicU64::new(0),
            claim_calls: AtomicU64::new(0),
            last_fees: Mutex::new(None),
            simulate_error: Mutex::new(None),
            submit_error: Mutex::new(None),
            simulate_delay: Mutex::new(None),
            pending: Mutex::new(U256::ZERO),
            pool: Mutex::new(parse_ether("1000").unwrap()),
        }
    }
}

impl MockRewards {
    pub(crate) fn fail_simulation(&self, err: ContractError) {
        *self.simulate_error.lock().unwrap() = Some(err);
    }

    pub(crate) fn fail_submission(&self, err: ContractError) {
        *self.submit_error.lock().unwrap() = Some(err);
    }

    /// Makes simulation yield for `delay`, so concurrent attempts overlap.
    pub(crate) fn delay_simulation(&self, delay: Duration) {
        *self.simulate_delay.lock().unwrap() = Some(delay);
    }

    pub(crate) fn set_pending(&self, amount: U256) {
        *self.pending.lock().unwrap() = amount;
    }

    pub(crate) fn set_pool(&self, amount: U256) {
        *self.pool.lock().unwrap() = amount;
    }
}

#[async_trait]
impl RewardContract for MockRewards {
    async fn simulate_flush(&self) -> Result<(), ContractError> {
        self.simulate_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.simulate_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.simulate_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn submit_flush(&self, fees: &FeeParams) -> Result<TxHash, ContractError> {
        self.flush_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_fees.lock().unwrap() = Some(*fees);
        match self.submit_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(FLUSH_TX),
        }
    }

    async fn sign_flush(&self, fees: &FeeParams) -> Result<SignedTx, ContractError> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_fees.lock().unwrap() = Some(*fees);
        Ok(SignedTx { tx_hash: FLUSH_TX, raw: Bytes::from_static(&[0x02]) })
    }

    async fn rewards_of(&self, _account: Address) -> Result<U256, ContractError> {
        Ok(*self.pending.lock().unwrap())
    }

    async fn rewards_available(&self) -> Result<U256, ContractError> {
        Ok(*self.pool.lock().unwrap())
    }

    async fn reward_per_insertion(&self) -> Result<U256, ContractError> {
        Ok(parse_ether("1").unwrap())
    }

    async fn submit_claim(&self, _fees: &FeeParams) -> Result<TxHash, ContractError> {
        self.claim_calls.fetch_add(1, Ordering::SeqCst);
        Ok(CLAIM_TX)
    }
}
