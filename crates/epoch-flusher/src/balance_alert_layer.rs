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

use std::marker::PhantomData;

use alloy::{
    network::{Ethereum, Network},
    primitives::{utils::format_ether, Address, U256},
    providers::{PendingTransactionBuilder, Provider, ProviderLayer, RootProvider},
    transports::TransportResult,
};

#[derive(Debug, Clone, Default)]
pub struct BalanceAlertConfig {
    /// Address to periodically check the balance of
    pub watch_address: Address,
    /// Threshold at which to log a warning
    pub warn_threshold: U256,
    /// Threshold at which to log an error
    pub error_threshold: U256,
}

impl BalanceAlertConfig {
    fn report(&self, balance: U256) {
        if balance < self.error_threshold {
            tracing::error!(
                "balance of {} < critical threshold: {} ETH, flushes will be skipped",
                self.watch_address,
                format_ether(balance)
            );
        } else if balance < self.warn_threshold {
            tracing::warn!(
                "balance of {} < low threshold: {} ETH",
                self.watch_address,
                format_ether(balance)
            );
        } else {
            tracing::trace!("balance of {} is: {} ETH", self.watch_address, format_ether(balance));
        }
    }
}

/// A ProviderLayer that logs the balance of the flushing wallet after every
/// raw transaction it sends, at error level below the critical threshold and
/// at warn level below the low threshold.
///
/// # Examples
/// ```ignore
/// let provider = ProviderBuilder::new()
///     .layer(BalanceAlertLayer::new(BalanceAlertConfig {
///         watch_address: signer.address(),
///         warn_threshold: parse_ether("0.01")?,
///         error_threshold: parse_ether("0.001")?,
///     }))
///     .wallet(wallet)
///     .connect_http(rpc_url);
/// ```
#[derive(Debug, Clone, Default)]
pub struct BalanceAlertLayer {
    config: BalanceAlertConfig,
}

impl BalanceAlertLayer {
    pub fn new(config: BalanceAlertConfig) -> Self {
        Self { config }
    }
}

impl<P, N> ProviderLayer<P, N> for BalanceAlertLayer
where
    P: Provider<N>,
    N: Network,
{
    type Provider = BalanceAlertProvider<P, N>;

    fn layer(&self, inner: P) -> Self::Provider {
        BalanceAlertProvider { inner, config: self.config.clone(), _network: PhantomData }
    }
}

#[derive(Clone, Debug)]
pub struct BalanceAlertProvider<P, N = Ethereum> {
    inner: P,
    config: BalanceAlertConfig,
    _network: PhantomData<N>,
}

#[async_trait::async_trait]
impl<P, N> Provider<N> for BalanceAlertProvider<P, N>
where
    P: Provider<N>,
    N: Network,
{
    #[inline(always)]
    fn root(&self) -> &RootProvider<N> {
        self.inner.root()
    }

    async fn send_raw_transaction(
        &self,
        encoded_tx: &[u8],
    ) -> TransportResult<PendingTransactionBuilder<N>> {
        let res = self.inner.send_raw_transaction(encoded_tx).await;
        match self.inner.get_balance(self.config.watch_address).await {
            Ok(balance) => self.config.report(balance),
            Err(err) => tracing::debug!("balance check after send failed: {err}"),
        }
        res
    }
}
