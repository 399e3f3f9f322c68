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

use std::{pin::Pin, sync::Mutex, time::Duration};

use alloy::{
    consensus::BlockHeader,
    eips::BlockNumberOrTag,
    network::Ethereum,
    primitives::{Address, TxHash, U256},
    providers::{DynProvider, PendingTransactionBuilder, Provider},
    rpc::types::TransactionReceipt,
    transports::{RpcError, TransportError, TransportErrorKind},
};
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use thiserror::Error;
use tokio::time::Instant;

use crate::{
    contracts::{classify_transport_err, ContractError},
    errors::CodedError,
    fees::FeeEstimate,
    impl_coded_debug,
};

#[derive(Error)]
pub enum ChainError {
    /// Network failure or timeout; retried by the caller.
    #[error("{code} transient provider error: {0}", code = self.code())]
    Transient(String),

    /// The provider does not offer this capability (e.g. no pubsub over HTTP).
    #[error("{code} unsupported provider capability: {0}", code = self.code())]
    Unsupported(&'static str),

    /// The provider answered, but with an error or an empty response.
    #[error("{code} rpc error: {0}", code = self.code())]
    Rpc(String),
}

impl_coded_debug!(ChainError);

impl CodedError for ChainError {
    fn code(&self) -> &str {
        match self {
            ChainError::Transient(_) => "[F-CHN-001]",
            ChainError::Unsupported(_) => "[F-CHN-002]",
            ChainError::Rpc(_) => "[F-CHN-003]",
        }
    }
}

impl From<TransportError> for ChainError {
    fn from(err: TransportError) -> Self {
        match err {
            RpcError::Transport(kind) => match kind {
                TransportErrorKind::PubsubUnavailable => {
                    ChainError::Unsupported("block subscriptions")
                }
                other => ChainError::Transient(other.to_string()),
            },
            RpcError::NullResp => ChainError::Rpc("null response".into()),
            other => ChainError::Rpc(other.to_string()),
        }
    }
}

/// Timestamp and height of a block as reported by the chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
    pub timestamp: u64,
    pub number: u64,
}

/// Mined transaction result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxOutcome {
    pub tx_hash: TxHash,
    pub success: bool,
    pub block_number: u64,
    pub gas_used: u64,
    pub effective_gas_price: u128,
}

impl TxOutcome {
    /// Total fee paid in wei.
    pub fn gas_cost(&self) -> U256 {
        U256::from(self.gas_used) * U256::from(self.effective_gas_price)
    }
}

impl From<&TransactionReceipt> for TxOutcome {
    fn from(receipt: &TransactionReceipt) -> Self {
        Self {
            tx_hash: receipt.transaction_hash,
            success: receipt.status(),
            block_number: receipt.block_number.unwrap_or_default(),
            gas_used: receipt.gas_used,
            effective_gas_price: receipt.effective_gas_price,
        }
    }
}

pub type BlockStream = Pin<Box<dyn Stream<Item = BlockInfo> + Send>>;

/// The chain provider as seen by the flusher.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Latest block, with the block's own timestamp (never the local clock).
    async fn latest_block(&self) -> Result<BlockInfo, ChainError>;

    async fn balance(&self, address: Address) -> Result<U256, ChainError>;

    async fn fee_estimate(&self) -> Result<FeeEstimate, ChainError>;

    async fn chain_id(&self) -> Result<u64, ChainError>;

    /// Waits for `tx_hash` to be mined, up to `timeout`.
    async fn await_confirmation(
        &self,
        tx_hash: TxHash,
        timeout: Duration,
    ) -> Result<TxOutcome, ContractError>;

    /// Receipt of `tx_hash` if already mined.
    async fn receipt(&self, tx_hash: TxHash) -> Result<Option<TxOutcome>, ChainError>;

    /// Push channel of new blocks, when the transport supports subscriptions.
    async fn subscribe_blocks(&self) -> Result<BlockStream, ChainError> {
        Err(ChainError::Unsupported("block subscriptions"))
    }
}

/// [ChainClient] backed by an alloy provider.
#[derive(Clone)]
pub struct AlloyChainClient {
    provider: DynProvider<Ethereum>,
    /// Separate pubsub provider, when a websocket endpoint is configured.
    pubsub: Option<DynProvider<Ethereum>>,
}

impl AlloyChainClient {
    pub fn new(provider: DynProvider<Ethereum>) -> Self {
        Self { provider, pubsub: None }
    }

    pub fn with_pubsub(self, pubsub: DynProvider<Ethereum>) -> Self {
        Self { pubsub: Some(pubsub), ..self }
    }
}

#[async_trait]
impl ChainClient for AlloyChainClient {
    async fn latest_block(&self) -> Result<BlockInfo, ChainError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await?
            .ok_or_else(|| ChainError::Rpc("latest block not found".into()))?;
        Ok(BlockInfo { timestamp: block.header.timestamp(), number: block.header.number() })
    }

    async fn balance(&self, address: Address) -> Result<U256, ChainError> {
        Ok(self.provider.get_balance(address).await?)
    }

    async fn fee_estimate(&self) -> Result<FeeEstimate, ChainError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await?
            .ok_or_else(|| ChainError::Rpc("latest block not found".into()))?;
        let base_fee = block
            .header
            .base_fee_per_gas()
            .ok_or(ChainError::Unsupported("eip1559 base fee"))?;
        let priority_fee = self.provider.get_max_priority_fee_per_gas().await?;
        Ok(FeeEstimate { base_fee: base_fee as u128, priority_fee })
    }

    async fn chain_id(&self) -> Result<u64, ChainError> {
        Ok(self.provider.get_chain_id().await?)
    }

    async fn await_confirmation(
        &self,
        tx_hash: TxHash,
        timeout: Duration,
    ) -> Result<TxOutcome, ContractError> {
        let receipt = PendingTransactionBuilder::new(self.provider.root().clone(), tx_hash)
            .with_timeout(Some(timeout))
            .get_receipt()
            .await
            .map_err(|err| match err {
                alloy::providers::PendingTransactionError::TransportError(err) => {
                    classify_transport_err(err)
                }
                alloy::providers::PendingTransactionError::TxWatcher(_) => {
                    ContractError::Timeout(timeout)
                }
                other => ContractError::Transport(other.to_string()),
            })?;
        Ok(TxOutcome::from(&receipt))
    }

    async fn receipt(&self, tx_hash: TxHash) -> Result<Option<TxOutcome>, ChainError> {
        let receipt = self.provider.get_transaction_receipt(tx_hash).await?;
        Ok(receipt.as_ref().map(TxOutcome::from))
    }

    async fn subscribe_blocks(&self) -> Result<BlockStream, ChainError> {
        let pubsub = self.pubsub.as_ref().ok_or(ChainError::Unsupported("block subscriptions"))?;
        let subscription = pubsub.subscribe_blocks().await?;
        let stream = subscription
            .into_stream()
            .map(|header| BlockInfo { timestamp: header.timestamp(), number: header.number() });
        Ok(Box::pin(stream))
    }
}

/// Time reading taken from the chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainTime {
    pub timestamp: u64,
    pub block_number: u64,
}

/// The Chain Clock: reads chain time once per call, no caching.
///
/// With interpolation enabled, the seconds elapsed locally since the current
/// head block was first observed are added to its timestamp. Block timestamps
/// only move once per slot, so without this a short pre-boundary window can
/// fall entirely between two blocks.
pub struct ChainClock {
    interpolate: bool,
    head: Mutex<Option<(BlockInfo, Instant)>>,
}

impl ChainClock {
    pub fn new(interpolate: bool) -> Self {
        Self { interpolate, head: Mutex::new(None) }
    }

    pub async fn current_time(&self, chain: &dyn ChainClient) -> Result<ChainTime, ChainError> {
        let block = chain.latest_block().await?;
        Ok(self.observe(block))
    }

    /// Records an observed head block and returns the resulting chain time.
    pub fn observe(&self, block: BlockInfo) -> ChainTime {
        if !self.interpolate {
            return ChainTime { timestamp: block.timestamp, block_number: block.number };
        }

        let now = Instant::now();
        let Ok(mut head) = self.head.lock() else {
            return ChainTime { timestamp: block.timestamp, block_number: block.number };
        };
        let (head_block, seen_at) = match *head {
            Some((prev, seen_at)) if prev.number >= block.number => (prev, seen_at),
            _ => {
                *head = Some((block, now));
                (block, now)
            }
        };
        let elapsed = now.saturating_duration_since(seen_at).as_secs();
        ChainTime { timestamp: head_block.timestamp + elapsed, block_number: head_block.number }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(number: u64, timestamp: u64) -> BlockInfo {
        BlockInfo { number, timestamp }
    }

    #[tokio::test(start_paused = true)]
    async fn clock_reports_block_timestamp() {
        let clock = ChainClock::new(false);
        clock.observe(block(10, 1_700_000_000));
        tokio::time::advance(Duration::from_secs(7)).await;
        let time = clock.observe(block(10, 1_700_000_000));
        assert_eq!(time, ChainTime { timestamp: 1_700_000_000, block_number: 10 });
    }

    #[tokio::test(start_paused = true)]
    async fn clock_interpolates_between_blocks() {
        let clock = ChainClock::new(true);
        assert_eq!(clock.observe(block(10, 1_700_000_000)).timestamp, 1_700_000_000);

        tokio::time::advance(Duration::from_secs(7)).await;
        assert_eq!(clock.observe(block(10, 1_700_000_000)).timestamp, 1_700_000_007);

        // A new head resets the local reference point.
        let time = clock.observe(block(11, 1_700_000_012));
        assert_eq!(time, ChainTime { timestamp: 1_700_000_012, block_number: 11 });

        // A lagging node reporting an older block doesn't move time backwards.
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(clock.observe(block(10, 1_700_000_000)).timestamp, 1_700_000_014);
    }

    #[test]
    fn transport_errors_are_classified() {
        let err: ChainError = RpcError::<TransportErrorKind>::NullResp.into();
        assert!(matches!(err, ChainError::Rpc(_)));
        let err: ChainError = TransportErrorKind::pubsub_unavailable().into();
        assert!(matches!(err, ChainError::Unsupported(_)));
        let err: ChainError = TransportErrorKind::backend_gone().into();
        assert!(matches!(err, ChainError::Transient(_)));
    }
}
