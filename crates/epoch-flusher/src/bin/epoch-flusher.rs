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

use std::{process::ExitCode, sync::Arc};

use alloy::{
    network::EthereumWallet,
    providers::{Provider, ProviderBuilder, WsConnect},
    rpc::client::RpcClient,
    transports::layers::RetryBackoffLayer,
};
use anyhow::{Context, Result};
use clap::Parser;
use epoch_flusher::{
    balance_alert_layer::{BalanceAlertConfig, BalanceAlertLayer},
    chain::{AlloyChainClient, ChainClient},
    contracts::{FlushRewarderContract, RollupContract},
    relay::{BundleRelay, FlashbotsRelay},
    status, Args, Collaborators, FlushService,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::fmt::format::FmtSpan;

/// Rate-limit retries for the HTTP transport.
const RPC_RETRY_MAX: u32 = 10;
const RPC_RETRY_BACKOFF_MS: u64 = 1000;
const RPC_RETRY_CU: u64 = 100;

#[tokio::main]
async fn main() -> ExitCode {
    let dotenv = dotenvy::dotenv();
    let args = Args::parse();

    if args.log_json {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_span_events(FmtSpan::CLOSE)
            .json()
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_span_events(FmtSpan::CLOSE)
            .init();
    }

    match dotenv {
        Ok(path) => tracing::debug!("Loaded environment variables from {:?}", path),
        Err(e) if e.not_found() => tracing::debug!("No .env file found"),
        Err(e) => {
            tracing::error!("failed to load .env file: {e}");
            return ExitCode::FAILURE;
        }
    }

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("Flusher failed to start: {err:?}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> Result<()> {
    let config = args.load_config().await.context("Failed to load flusher config")?;
    let signer = args.private_key.clone();
    let wallet_address = signer.address();

    let balance_alerts_layer = BalanceAlertLayer::new(BalanceAlertConfig {
        watch_address: wallet_address,
        warn_threshold: config.low_balance()?,
        error_threshold: config.critical_balance()?,
    });

    let client = RpcClient::builder()
        .layer(RetryBackoffLayer::new(RPC_RETRY_MAX, RPC_RETRY_BACKOFF_MS, RPC_RETRY_CU))
        .http(args.rpc_url.clone());
    let provider = ProviderBuilder::new()
        .layer(balance_alerts_layer)
        .wallet(EthereumWallet::from(signer.clone()))
        .connect_client(client)
        .erased();

    let mut chain = AlloyChainClient::new(provider.clone());
    if let Some(ws_url) = &args.ws_rpc_url {
        match ProviderBuilder::new().connect_ws(WsConnect::new(ws_url.as_str())).await {
            Ok(pubsub) => chain = chain.with_pubsub(pubsub.erased()),
            Err(err) => tracing::warn!("Failed to connect to {ws_url}, polling only: {err}"),
        }
    }
    let chain: Arc<dyn ChainClient> = Arc::new(chain);

    let relay: Option<Arc<dyn BundleRelay>> = match args.relay_settings()? {
        Some((url, relay_signer)) => {
            tracing::info!("Submitting flushes through relay {url}");
            Some(Arc::new(
                FlashbotsRelay::new(url, relay_signer, chain.clone())
                    .with_blocks_to_wait(config.relay.blocks_to_wait)
                    .with_poll_interval(std::time::Duration::from_millis(
                        config.relay.poll_interval_ms,
                    )),
            ))
        }
        None => None,
    };

    let collaborators = Collaborators {
        chain,
        rewards: Arc::new(FlushRewarderContract::new(
            args.flush_rewarder_address,
            provider.clone(),
            signer,
        )),
        rollup: Arc::new(RollupContract::new(args.rollup_address, provider)),
        relay,
        wallet: wallet_address,
    };

    let service = FlushService::start(collaborators, &config)
        .await
        .context("Failed to start the flusher")?
        .with_status_line(!args.log_json);
    service.report_startup(config.wallet.expected_chain_id).await?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Received SIGINT, stopping");
                    cancel.cancel();
                }
                Err(err) => tracing::error!("Failed to listen for SIGINT: {err}"),
            }
        }
    });

    let stats = Arc::new(service).run(cancel).await?;
    tracing::info!("{}", status::shutdown_report(&stats));
    Ok(())
}
