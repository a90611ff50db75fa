//! API data transfer objects.
//!
//! These types define the API contract shared between the daemon and
//! clients.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Pool-wide snapshot.
#[derive(Clone, Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct PoolSummary {
    pub uptime_secs: u64,
    pub uptime_human: String,
    /// Rolling hashrate in hashes per second.
    pub hashrate: f64,
    pub hashrate_human: String,
    pub valid_shares: u64,
    pub invalid_shares: u64,
    pub stale_shares: u64,
    pub blocks_found: u64,
    pub active_workers: usize,
    pub total_workers: usize,
    pub connected_sessions: usize,
    pub reward_address: String,
}

/// Per-worker snapshot.
#[derive(Clone, Debug, Deserialize, Serialize, ToSchema)]
pub struct WorkerSummary {
    pub name: String,
    pub valid_shares: u64,
    pub invalid_shares: u64,
    pub stale_shares: u64,
    pub difficulty: f64,
    /// Rough hashrate in hashes per second.
    pub hashrate: f64,
    pub hashrate_human: String,
    /// Seconds since the last valid share, if any.
    pub last_share_secs_ago: Option<u64>,
    pub active: bool,
    pub blocks_found: usize,
}

/// A block found by the pool.
#[derive(Clone, Debug, Deserialize, Serialize, ToSchema)]
pub struct BlockSummary {
    pub worker: String,
    pub height: u32,
    pub hash: String,
    pub found_secs_ago: u64,
}

/// One entry of the recent Stratum method log.
#[derive(Clone, Debug, Deserialize, Serialize, ToSchema)]
pub struct MethodLogEntry {
    pub secs_ago: u64,
    /// `miner->pool` or `pool->miner`.
    pub direction: String,
    pub method: String,
}
