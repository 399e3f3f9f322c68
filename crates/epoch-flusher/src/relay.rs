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

//! Private bundle submission through a Flashbots-compatible relay.

use std::{sync::Arc, time::Duration};

use alloy::{
    hex,
    primitives::{keccak256, TxHash},
    signers::{local::PrivateKeySigner, Signer},
};
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::{
    chain::{ChainClient, ChainError},
    contracts::SignedTx,
    errors::CodedError,
    impl_coded_debug,
};

const SIGNATURE_HEADER: &str = "X-Flashbots-Signature";

#[derive(Error)]
pub enum RelayError {
    #[error("{code} relay request failed: {0}", code = self.code())]
    Http(#[from] reqwest::Error),

    #[error("{code} relay rejected bundle: {0}", code = self.code())]
    Rejected(String),

    #[error("{code} failed to sign relay request: {0}", code = self.code())]
    Signing(String),

    #[error("{code} chain error while waiting for inclusion: {0}", code = self.code())]
    Chain(#[from] ChainError),
}

impl_coded_debug!(RelayError);

impl CodedError for RelayError {
    fn code(&self) -> &str {
        match self {
            RelayError::Http(_) => "[F-RLY-001]",
            RelayError::Rejected(_) => "[F-RLY-002]",
            RelayError::Signing(_) => "[F-RLY-003]",
            RelayError::Chain(_) => "[F-RLY-004]",
        }
    }
}

/// A bundle accepted by the relay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BundleHandle {
    pub tx_hash: TxHash,
    pub target_block: u64,
    pub bundle_hash: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Inclusion {
    Included { block: u64 },
    /// The chain moved past the bundle's last eligible block.
    NotIncluded,
    Timeout,
}

#[async_trait]
pub trait BundleRelay: Send + Sync {
    async fn submit(&self, tx: &SignedTx, target_block: u64) -> Result<BundleHandle, RelayError>;

    async fn await_inclusion(
        &self,
        handle: &BundleHandle,
        timeout: Duration,
    ) -> Result<Inclusion, RelayError>;
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<SendBundleResult>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendBundleResult {
    bundle_hash: Option<String>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// `eth_sendBundle` client. Requests are authenticated with a dedicated
/// signer, which needs no funds and should not be the transacting wallet.
pub struct FlashbotsRelay {
    client: reqwest::Client,
    url: Url,
    signer: PrivateKeySigner,
    chain: Arc<dyn ChainClient>,
    blocks_to_wait: u64,
    poll_interval: Duration,
}

impl FlashbotsRelay {
    pub fn new(url: Url, signer: PrivateKeySigner, chain: Arc<dyn ChainClient>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            signer,
            chain,
            blocks_to_wait: 2,
            poll_interval: Duration::from_secs(1),
        }
    }

    pub fn with_blocks_to_wait(self, blocks_to_wait: u64) -> Self {
        Self { blocks_to_wait, ..self }
    }

    pub fn with_poll_interval(self, poll_interval: Duration) -> Self {
        Self { poll_interval, ..self }
    }

    /// `<address>:<signature>` where the signature is an EIP-191 signature of
    /// the hex-encoded keccak256 of the request body.
    async fn signature_header(&self, body: &str) -> Result<String, RelayError> {
        let digest = keccak256(body.as_bytes()).to_string();
        let signature = self
            .signer
            .sign_message(digest.as_bytes())
            .await
            .map_err(|err| RelayError::Signing(err.to_string()))?;
        Ok(format!("{}:{}", self.signer.address(), hex::encode_prefixed(signature.as_bytes())))
    }
}

fn send_bundle_body(tx: &SignedTx, target_block: u64) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "eth_sendBundle",
        "params": [{
            "txs": [hex::encode_prefixed(&tx.raw)],
            "blockNumber": format!("{target_block:#x}"),
        }],
    })
}

#[async_trait]
impl BundleRelay for FlashbotsRelay {
    async fn submit(&self, tx: &SignedTx, target_block: u64) -> Result<BundleHandle, RelayError> {
        let body = send_bundle_body(tx, target_block).to_string();
        let signature = self.signature_header(&body).await?;

        let response = self
            .client
            .post(self.url.clone())
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(body)
            .send()
            .await?;

        if let Err(err) = response.error_for_status_ref() {
            let message = response.text().await.unwrap_or_default();
            return Err(RelayError::Rejected(format!("{err}: {message}")));
        }

        let reply: RpcResponse = response.json().await?;
        if let Some(error) = reply.error {
            return Err(RelayError::Rejected(format!("{} ({})", error.message, error.code)));
        }
        let bundle_hash = reply.result.and_then(|result| result.bundle_hash);
        tracing::debug!(
            "Bundle for tx {} accepted by relay, target block {target_block}, bundle hash {}",
            tx.tx_hash,
            bundle_hash.as_deref().unwrap_or("unknown")
        );

        Ok(BundleHandle { tx_hash: tx.tx_hash, target_block, bundle_hash })
    }

    async fn await_inclusion(
        &self,
        handle: &BundleHandle,
        timeout: Duration,
    ) -> Result<Inclusion, RelayError> {
        let last_block = handle.target_block + self.blocks_to_wait;
        let poll = async {
            loop {
                if let Some(outcome) = self.chain.receipt(handle.tx_hash).await? {
                    return Ok(Inclusion::Included { block: outcome.block_number });
                }
                if self.chain.latest_block().await?.number > last_block {
                    return Ok(Inclusion::NotIncluded);
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };

        match tokio::time::timeout(timeout, poll).await {
            Ok(result) => result,
            Err(_) => Ok(Inclusion::Timeout),
        }
    }
}
