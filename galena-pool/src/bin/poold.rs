//! The pool daemon.
//!
//! Startup order: resolve configuration, probe the node, validate the
//! reward address, fetch the first template, then start the Stratum
//! listener (and the statistics API when enabled). SIGINT/SIGTERM trigger
//! a graceful shutdown; startup failures exit with status 1.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use galena_pool::api;
use galena_pool::config::{Args, Config};
use galena_pool::job::coinbase::reward_script;
use galena_pool::node::{BitcoindRpc, NodeClient};
use galena_pool::services::Services;
use galena_pool::stratum::server::{self, PoolServer};
use galena_pool::vardiff::VardiffConfig;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    galena_pool::tracing::init(args.verbose);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = Config::resolve(args)?;

    info!("Connecting to bitcoin node...");
    let node = BitcoindRpc::connect(
        &config.rpchost,
        config.rpcport,
        &config.rpcuser,
        &config.rpcpassword,
    )
    .await
    .context("failed to connect to bitcoin node")?;

    let info = node.get_blockchain_info().await?;
    info!(chain = %info.chain, height = info.blocks, "Node is live");
    let Some(network) = info.network() else {
        bail!("unsupported chain {:?} reported by node", info.chain);
    };

    let address_info = node
        .validate_address(&config.address)
        .await
        .context("failed to validate reward address")?;
    if !address_info.is_valid {
        bail!("invalid reward address: {}", config.address);
    }
    let reward_script = reward_script(&config.address, network)?;

    let services = Arc::new(Services::new(
        Arc::new(node),
        config.address.clone(),
        reward_script,
        config.coinbase_message.clone().into_bytes(),
        VardiffConfig {
            initial_difficulty: config.difficulty,
            min_difficulty: config.difficulty.min(0.01),
            ..VardiffConfig::default()
        },
    ));

    let first_job = server::refresh_job(&services)
        .await
        .context("failed to fetch the initial block template")?;

    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?;

    info!(host = %config.host, port = config.port, "Solo mining pool started");
    info!(address = %config.address, "Mining rewards will be sent here");
    info!(message = %config.coinbase_message, "Coinbase message");
    info!(difficulty = config.difficulty, "Initial difficulty");
    info!(height = first_job.height, "Mining on top of the chain tip");

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    if config.web_stats {
        let addr = format!("{}:{}", config.host, config.web_port)
            .parse()
            .with_context(|| format!("bad statistics address {}:{}", config.host, config.web_port))?;
        tokio::spawn(api::server::serve(
            Arc::clone(&services),
            addr,
            shutdown.clone(),
        ));
    }

    PoolServer::new(services, shutdown).run(listener).await
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            let mut term = match signal(SignalKind::terminate()) {
                Ok(term) => term,
                Err(err) => {
                    error!(error = %err, "Failed to install SIGTERM handler");
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }

        info!("Shutting down mining pool...");
        shutdown.cancel();
    });
}
