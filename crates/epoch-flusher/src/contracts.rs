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

use std::time::Duration;

use alloy::{
    contract::Error as ContractErr,
    eips::eip2718::Encodable2718,
    network::{EthereumWallet, TransactionBuilder},
    primitives::{Address, Bytes, TxHash, U256},
    providers::{DynProvider, Provider},
    signers::local::PrivateKeySigner,
    sol,
    sol_types::{decode_revert_reason, Revert, SolError},
    transports::{RpcError, TransportError},
};
use async_trait::async_trait;
use thiserror::Error;

use crate::{errors::CodedError, fees::FeeParams, impl_coded_debug};

sol! {
    #[sol(rpc)]
    interface IFlushRewarder {
        function flushEntryQueue() external;
        function claimRewards() external;
        function rewardsOf(address account) external view returns (uint256);
        function rewardsAvailable() external view returns (uint256);
        function rewardPerInsertion() external view returns (uint256);
    }
}

sol! {
    #[sol(rpc)]
    interface IRollup {
        function getCurrentEpoch() external view returns (uint256);
        function GENESIS_TIME() external view returns (uint256);
    }
}

/// JSON-RPC error code geth and most clients use for reverts that carry data.
const REVERT_ERROR_CODE: i64 = 3;

#[derive(Error, Clone, PartialEq, Eq)]
pub enum ContractError {
    /// The call reverted, either in simulation, at gas estimation or once mined.
    #[error("{code} execution reverted: {}", reason.as_deref().unwrap_or("no reason"), code = self.code())]
    Reverted { reason: Option<String> },

    /// The wallet can't pay for the transaction.
    #[error("{code} insufficient funds: {0}", code = self.code())]
    InsufficientFunds(String),

    /// Network level failure.
    #[error("{code} transport error: {0}", code = self.code())]
    Transport(String),

    /// The node answered with an error we have no better classification for.
    #[error("{code} rpc error {rpc_code}: {message}", code = self.code())]
    Rpc { rpc_code: i64, message: String },

    /// The transaction was not mined before the deadline.
    #[error("{code} confirmation timed out after {0:?}", code = self.code())]
    Timeout(Duration),

    /// Encoding, decoding or other contract-binding failure.
    #[error("{code} contract call error: {0}", code = self.code())]
    Call(String),

    /// The transaction could not be built or signed.
    #[error("{code} signing error: {0}", code = self.code())]
    Signing(String),
}

impl_coded_debug!(ContractError);

impl CodedError for ContractError {
    fn code(&self) -> &str {
        match self {
            ContractError::Reverted { .. } => "[F-CTR-001]",
            ContractError::InsufficientFunds(_) => "[F-CTR-002]",
            ContractError::Transport(_) => "[F-CTR-003]",
            ContractError::Rpc { .. } => "[F-CTR-004]",
            ContractError::Timeout(_) => "[F-CTR-005]",
            ContractError::Call(_) => "[F-CTR-006]",
            ContractError::Signing(_) => "[F-CTR-007]",
        }
    }
}

impl ContractError {
    /// A revert means the queue is empty or the epoch was already flushed;
    /// retrying within the same epoch can't succeed.
    pub fn closes_window(&self) -> bool {
        matches!(self, ContractError::Reverted { .. })
    }
}

impl From<ContractErr> for ContractError {
    fn from(err: ContractErr) -> Self {
        match err {
            ContractErr::TransportError(err) => classify_transport_err(err),
            other => ContractError::Call(other.to_string()),
        }
    }
}

pub(crate) fn classify_transport_err(err: TransportError) -> ContractError {
    match err {
        RpcError::ErrorResp(payload) => {
            classify_error_response(payload.code, &payload.message, payload.as_revert_data())
        }
        RpcError::Transport(kind) => ContractError::Transport(kind.to_string()),
        other => ContractError::Transport(other.to_string()),
    }
}

/// Classifies a JSON-RPC error response.
///
/// Structured signals (error code 3, revert data) are checked first. Clients
/// disagree on codes for the remaining cases, so the message text is the
/// fallback.
pub(crate) fn classify_error_response(
    rpc_code: i64,
    message: &str,
    revert_data: Option<Bytes>,
) -> ContractError {
    if rpc_code == REVERT_ERROR_CODE || revert_data.is_some() {
        let reason = revert_data
            .as_ref()
            .and_then(|data| revert_reason(data))
            .or_else(|| Some(message.to_string()).filter(|msg| !msg.is_empty()));
        return ContractError::Reverted { reason };
    }

    let lower = message.to_ascii_lowercase();
    if lower.contains("execution reverted") {
        ContractError::Reverted { reason: Some(message.to_string()) }
    } else if lower.contains("insufficient funds") {
        ContractError::InsufficientFunds(message.to_string())
    } else {
        ContractError::Rpc { rpc_code, message: message.to_string() }
    }
}

/// Bare `Error(string)` reason, else whatever alloy can make of the data
/// (panic codes, custom errors).
fn revert_reason(data: &[u8]) -> Option<String> {
    Revert::abi_decode(data).map(|revert| revert.reason).ok().or_else(|| decode_revert_reason(data))
}

/// A signed raw transaction ready for relay submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedTx {
    pub tx_hash: TxHash,
    pub raw: Bytes,
}

/// The reward-distributing contract whose entry queue is flushed.
#[async_trait]
pub trait RewardContract: Send + Sync {
    /// Read-only execution of `flushEntryQueue()`.
    async fn simulate_flush(&self) -> Result<(), ContractError>;

    async fn submit_flush(&self, fees: &FeeParams) -> Result<TxHash, ContractError>;

    /// Builds and signs `flushEntryQueue()` without broadcasting it.
    async fn sign_flush(&self, fees: &FeeParams) -> Result<SignedTx, ContractError>;

    async fn rewards_of(&self, account: Address) -> Result<U256, ContractError>;

    async fn rewards_available(&self) -> Result<U256, ContractError>;

    async fn reward_per_insertion(&self) -> Result<U256, ContractError>;

    async fn submit_claim(&self, fees: &FeeParams) -> Result<TxHash, ContractError>;
}

/// The rollup contract that owns the epoch clock.
#[async_trait]
pub trait EpochContract: Send + Sync {
    async fn current_epoch(&self) -> Result<u64, ContractError>;

    async fn genesis_time(&self) -> Result<u64, ContractError>;
}

fn to_u64(value: U256, what: &str) -> Result<u64, ContractError> {
    u64::try_from(value).map_err(|_| ContractError::Call(format!("{what} {value} overflows u64")))
}

/// [RewardContract] over alloy `sol!` bindings.
#[derive(Clone)]
pub struct FlushRewarderContract {
    instance: IFlushRewarder::IFlushRewarderInstance<DynProvider>,
    wallet: EthereumWallet,
    caller: Address,
}

impl FlushRewarderContract {
    pub fn new(address: Address, provider: DynProvider, signer: PrivateKeySigner) -> Self {
        let caller = signer.address();
        let wallet = EthereumWallet::from(signer);
        Self { instance: IFlushRewarder::new(address, provider), wallet, caller }
    }

    pub fn address(&self) -> Address {
        *self.instance.address()
    }
}

#[async_trait]
impl RewardContract for FlushRewarderContract {
    async fn simulate_flush(&self) -> Result<(), ContractError> {
        self.instance.flushEntryQueue().from(self.caller).call().await?;
        Ok(())
    }

    async fn submit_flush(&self, fees: &FeeParams) -> Result<TxHash, ContractError> {
        let pending = self
            .instance
            .flushEntryQueue()
            .from(self.caller)
            .gas(fees.gas_limit)
            .max_fee_per_gas(fees.max_fee_per_gas)
            .max_priority_fee_per_gas(fees.max_priority_fee_per_gas)
            .send()
            .await?;
        Ok(*pending.tx_hash())
    }

    async fn sign_flush(&self, fees: &FeeParams) -> Result<SignedTx, ContractError> {
        let provider = self.instance.provider();
        let nonce =
            provider.get_transaction_count(self.caller).await.map_err(classify_transport_err)?;
        let chain_id = provider.get_chain_id().await.map_err(classify_transport_err)?;

        let envelope = self
            .instance
            .flushEntryQueue()
            .into_transaction_request()
            .with_from(self.caller)
            .with_nonce(nonce)
            .with_chain_id(chain_id)
            .with_gas_limit(fees.gas_limit)
            .with_max_fee_per_gas(fees.max_fee_per_gas)
            .with_max_priority_fee_per_gas(fees.max_priority_fee_per_gas)
            .build(&self.wallet)
            .await
            .map_err(|err| ContractError::Signing(err.to_string()))?;

        Ok(SignedTx { tx_hash: *envelope.tx_hash(), raw: envelope.encoded_2718().into() })
    }

    async fn rewards_of(&self, account: Address) -> Result<U256, ContractError> {
        Ok(self.instance.rewardsOf(account).call().await?)
    }

    async fn rewards_available(&self) -> Result<U256, ContractError> {
        Ok(self.instance.rewardsAvailable().call().await?)
    }

    async fn reward_per_insertion(&self) -> Result<U256, ContractError> {
        Ok(self.instance.rewardPerInsertion().call().await?)
    }

    async fn submit_claim(&self, fees: &FeeParams) -> Result<TxHash, ContractError> {
        let pending = self
            .instance
            .claimRewards()
            .from(self.caller)
            .gas(fees.gas_limit)
            .max_fee_per_gas(fees.max_fee_per_gas)
            .max_priority_fee_per_gas(fees.max_priority_fee_per_gas)
            .send()
            .await?;
        Ok(*pending.tx_hash())
    }
}

/// [EpochContract] over alloy `sol!` bindings.
#[derive(Clone)]
pub struct RollupContract {
    instance: IRollup::IRollupInstance<DynProvider>,
}

impl RollupContract {
    pub fn new(address: Address, provider: DynProvider) -> Self {
        Self { instance: IRollup::new(address, provider) }
    }
}

#[async_trait]
impl EpochContract for RollupContract {
    async fn current_epoch(&self) -> Result<u64, ContractError> {
        let epoch = self.instance.getCurrentEpoch().call().await?;
        to_u64(epoch, "epoch")
    }

    async fn genesis_time(&self) -> Result<u64, ContractError> {
        let genesis = self.instance.GENESIS_TIME().call().await?;
        to_u64(genesis, "genesis time")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revert_code_is_a_revert() {
        let err = classify_error_response(3, "execution reverted", None);
        assert_eq!(err, ContractError::Reverted { reason: Some("execution reverted".into()) });
        assert!(err.closes_window());
    }

    #[test]
    fn revert_data_is_decoded() {
        let data: Bytes = Revert { reason: "queue already flushed".into() }.abi_encode().into();
        let err = classify_error_response(-32000, "execution reverted", Some(data));
        assert_eq!(err, ContractError::Reverted { reason: Some("queue already flushed".into()) });
        assert_eq!(err.to_string(), "[F-CTR-001] execution reverted: queue already flushed");
    }

    #[test]
    fn revert_data_without_reason_string() {
        // Panic(0x11): arithmetic overflow.
        let mut data = vec![0x4e, 0x48, 0x7b, 0x71];
        data.extend_from_slice(&U256::from(0x11).to_be_bytes::<32>());
        let err = classify_error_response(3, "execution reverted", Some(data.into()));
        match &err {
            ContractError::Reverted { reason: Some(reason) } => {
                assert!(reason.contains("overflow"), "{reason}")
            }
            other => panic!("expected a decoded revert, got {other}"),
        }
    }

    #[test]
    fn message_fallbacks() {
        assert!(matches!(
            classify_error_response(-32000, "Execution Reverted: custom", None),
            ContractError::Reverted { .. }
        ));
        let err = classify_error_response(
            -32000,
            "insufficient funds for gas * price + value: have 1 want 2",
            None,
        );
        assert!(matches!(err, ContractError::InsufficientFunds(_)));
        assert!(!err.closes_window());
        assert_eq!(
            classify_error_response(-32601, "method not found", None),
            ContractError::Rpc { rpc_code: -32601, message: "method not found".into() }
        );
    }

    #[test]
    fn u256_conversion_bounds() {
        assert_eq!(to_u64(U256::from(42u64), "epoch").unwrap(), 42);
        assert!(matches!(to_u64(U256::MAX, "epoch"), Err(ContractError::Call(_))));
    }
}
