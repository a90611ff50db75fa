//! API server wiring and state snapshots.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use utoipa_axum::router::OpenApiRouter;

use crate::api_client::types::{BlockSummary, MethodLogEntry, PoolSummary, WorkerSummary};
use crate::services::{Services, unix_now};
use crate::stats::{HASHRATE_WINDOW_SECS, format_duration, format_hashrate};
use crate::tracing::prelude::*;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct SharedState {
    pub services: Arc<Services>,
}

impl SharedState {
    pub fn pool_summary(&self) -> PoolSummary {
        let now = unix_now();
        let stats = self.services.stats.lock();
        let hashrate = stats.pool_hashrate(now, HASHRATE_WINDOW_SECS);
        let uptime = stats.uptime_secs(now);

        PoolSummary {
            uptime_secs: uptime as u64,
            uptime_human: format_duration(uptime),
            hashrate,
            hashrate_human: format_hashrate(hashrate),
            valid_shares: stats.valid,
            invalid_shares: stats.invalid,
            stale_shares: stats.stale,
            blocks_found: stats.blocks_found,
            active_workers: stats.active_workers(),
            total_workers: stats.workers().len(),
            connected_sessions: self.services.sessions.lock().len(),
            reward_address: self.services.reward_address.clone(),
        }
    }

    pub fn workers(&self) -> Vec<WorkerSummary> {
        let now = unix_now();
        let stats = self.services.stats.lock();
        let mut workers: Vec<WorkerSummary> = stats
            .workers()
            .iter()
            .map(|(name, w)| {
                let hashrate = w.hashrate(now, HASHRATE_WINDOW_SECS);
                WorkerSummary {
                    name: name.clone(),
                    valid_shares: w.valid,
                    invalid_shares: w.invalid,
                    stale_shares: w.stale,
                    difficulty: w.difficulty,
                    hashrate,
                    hashrate_human: format_hashrate(hashrate),
                    last_share_secs_ago: (w.last_share_time > 0.0)
                        .then(|| (now - w.last_share_time).max(0.0) as u64),
                    active: w.active,
                    blocks_found: w.blocks.len(),
                }
            })
            .collect();
        workers.sort_by(|a, b| a.name.cmp(&b.name));
        workers
    }

    pub fn blocks(&self) -> Vec<BlockSummary> {
        let now = unix_now();
        let stats = self.services.stats.lock();
        let mut blocks: Vec<BlockSummary> = stats
            .workers()
            .iter()
            .flat_map(|(name, w)| {
                w.blocks.iter().map(|b| BlockSummary {
                    worker: name.clone(),
                    height: b.height,
                    hash: b.hash.clone(),
                    found_secs_ago: (now - b.time).max(0.0) as u64,
                })
            })
            .collect();
        blocks.sort_by_key(|b| b.height);
        blocks
    }

    pub fn methods(&self) -> Vec<MethodLogEntry> {
        let now = unix_now();
        self.services
            .stats
            .lock()
            .recent_methods()
            .map(|record| MethodLogEntry {
                secs_ago: (now - record.time).max(0.0) as u64,
                direction: record.direction.as_str().to_string(),
                method: record.method.clone(),
            })
            .collect()
    }
}

/// Serve the statistics API until shutdown.
pub async fn serve(
    services: Arc<Services>,
    addr: SocketAddr,
    shutdown: CancellationToken,
) -> Result<()> {
    let state = SharedState { services };

    let (router, _openapi) = OpenApiRouter::<SharedState>::new()
        .nest("/v0", super::v0::routes())
        .split_for_parts();
    let app = router
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind statistics API on {addr}"))?;
    info!(%addr, "Statistics API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("statistics API server failed")
}
