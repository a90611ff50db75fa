//! Pool and per-worker statistics.
//!
//! Counters, a bounded ring of recent share records for hashrate
//! estimation, and a diagnostic log of recent Stratum method traffic.
//! Workers are keyed by the username from `mining.authorize` and kept
//! (marked inactive) after disconnect so history survives reconnects.

use std::collections::{HashMap, VecDeque};

use crate::tracing::prelude::*;

/// Shares retained for the rolling hashrate estimate.
const SHARE_LOG_CAPACITY: usize = 1000;

/// Sampled pool hashrates retained for the history ring.
const HASHRATE_HISTORY_CAPACITY: usize = 100;

/// Recent Stratum method calls retained for diagnostics.
const METHOD_LOG_CAPACITY: usize = 100;

/// Window for the default hashrate estimate, seconds.
pub const HASHRATE_WINDOW_SECS: f64 = 300.0;

/// How a submitted share was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareKind {
    Valid,
    Invalid,
    Stale,
}

/// Direction of a logged Stratum method call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    MinerToPool,
    PoolToMiner,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::MinerToPool => "miner->pool",
            Direction::PoolToMiner => "pool->miner",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MethodRecord {
    pub time: f64,
    pub direction: Direction,
    pub method: String,
}

/// A block found by a worker.
#[derive(Debug, Clone)]
pub struct FoundBlock {
    pub height: u32,
    pub hash: String,
    pub time: f64,
}

/// Per-worker counters and state.
#[derive(Debug, Clone)]
pub struct WorkerStats {
    pub valid: u64,
    pub invalid: u64,
    pub stale: u64,
    pub last_share_time: f64,
    pub connected_at: f64,
    pub difficulty: f64,
    pub active: bool,
    pub blocks: Vec<FoundBlock>,
}

impl WorkerStats {
    fn new(now: f64) -> Self {
        Self {
            valid: 0,
            invalid: 0,
            stale: 0,
            last_share_time: 0.0,
            connected_at: now,
            difficulty: 0.0,
            active: true,
            blocks: Vec::new(),
        }
    }

    /// Rough per-worker hashrate from lifetime valid shares at the current
    /// difficulty over the connected window.
    pub fn hashrate(&self, now: f64, window_secs: f64) -> f64 {
        let elapsed = (now - self.connected_at).min(window_secs);
        if elapsed <= 0.0 || self.valid == 0 {
            return 0.0;
        }
        (self.valid as f64 * self.difficulty * 2f64.powi(32)) / elapsed
    }
}

/// Aggregate statistics for the pool.
#[derive(Debug)]
pub struct PoolStats {
    pub valid: u64,
    pub invalid: u64,
    pub stale: u64,
    pub blocks_found: u64,
    pub started_at: f64,
    share_log: VecDeque<(f64, f64)>,
    hashrate_history: VecDeque<(f64, f64)>,
    workers: HashMap<String, WorkerStats>,
    method_log: VecDeque<MethodRecord>,
}

impl PoolStats {
    pub fn new(started_at: f64) -> Self {
        Self {
            valid: 0,
            invalid: 0,
            stale: 0,
            blocks_found: 0,
            started_at,
            share_log: VecDeque::with_capacity(SHARE_LOG_CAPACITY),
            hashrate_history: VecDeque::with_capacity(HASHRATE_HISTORY_CAPACITY),
            workers: HashMap::new(),
            method_log: VecDeque::with_capacity(METHOD_LOG_CAPACITY),
        }
    }

    /// Record a classified share for a worker.
    pub fn add_share(&mut self, worker: &str, kind: ShareKind, difficulty: f64, now: f64) {
        let entry = self
            .workers
            .entry(worker.to_string())
            .or_insert_with(|| WorkerStats::new(now));

        match kind {
            ShareKind::Valid => {
                self.valid += 1;
                entry.valid += 1;
                entry.last_share_time = now;
                entry.difficulty = difficulty;
                self.share_log.push_back((now, difficulty));
                if self.share_log.len() > SHARE_LOG_CAPACITY {
                    self.share_log.pop_front();
                }
            }
            ShareKind::Stale => {
                self.stale += 1;
                entry.stale += 1;
            }
            ShareKind::Invalid => {
                self.invalid += 1;
                entry.invalid += 1;
            }
        }
    }

    /// Record a found block against a worker.
    pub fn add_block(&mut self, worker: &str, height: u32, hash: &str, now: f64) {
        self.blocks_found += 1;
        info!(worker, height, hash, "BLOCK FOUND");
        let entry = self
            .workers
            .entry(worker.to_string())
            .or_insert_with(|| WorkerStats::new(now));
        entry.blocks.push(FoundBlock {
            height,
            hash: hash.to_string(),
            time: now,
        });
    }

    /// Register or reactivate a worker at authorize time.
    pub fn worker_connected(&mut self, worker: &str, now: f64) {
        self.workers
            .entry(worker.to_string())
            .and_modify(|w| w.active = true)
            .or_insert_with(|| WorkerStats::new(now));
    }

    /// Mark a worker inactive; history is retained for reporting.
    pub fn worker_disconnected(&mut self, worker: &str) {
        if let Some(w) = self.workers.get_mut(worker) {
            w.active = false;
        }
    }

    /// Pool hashrate over a trailing window: sum of share difficulties in
    /// the window, times 2^32, over the window length.
    pub fn pool_hashrate(&self, now: f64, window_secs: f64) -> f64 {
        if window_secs <= 0.0 {
            return 0.0;
        }
        let total: f64 = self
            .share_log
            .iter()
            .filter(|(t, _)| now - t <= window_secs)
            .map(|(_, d)| d)
            .sum();
        (total * 2f64.powi(32)) / window_secs
    }

    /// Sample the current pool hashrate into the bounded history ring.
    pub fn sample_hashrate(&mut self, now: f64) {
        let rate = self.pool_hashrate(now, HASHRATE_WINDOW_SECS);
        self.hashrate_history.push_back((now, rate));
        if self.hashrate_history.len() > HASHRATE_HISTORY_CAPACITY {
            self.hashrate_history.pop_front();
        }
    }

    pub fn hashrate_history(&self) -> impl Iterator<Item = &(f64, f64)> {
        self.hashrate_history.iter()
    }

    /// Log a Stratum method call for the diagnostics view.
    pub fn record_method(&mut self, direction: Direction, method: &str, now: f64) {
        self.method_log.push_back(MethodRecord {
            time: now,
            direction,
            method: method.to_string(),
        });
        if self.method_log.len() > METHOD_LOG_CAPACITY {
            self.method_log.pop_front();
        }
    }

    pub fn recent_methods(&self) -> impl Iterator<Item = &MethodRecord> {
        self.method_log.iter()
    }

    pub fn workers(&self) -> &HashMap<String, WorkerStats> {
        &self.workers
    }

    pub fn active_workers(&self) -> usize {
        self.workers.values().filter(|w| w.active).count()
    }

    pub fn uptime_secs(&self, now: f64) -> f64 {
        (now - self.started_at).max(0.0)
    }
}

/// Human-readable hashrate.
pub fn format_hashrate(rate: f64) -> String {
    const UNITS: [(f64, &str); 4] = [
        (1e12, "TH/s"),
        (1e9, "GH/s"),
        (1e6, "MH/s"),
        (1e3, "KH/s"),
    ];
    for (scale, unit) in UNITS {
        if rate >= scale {
            return format!("{:.2} {unit}", rate / scale);
        }
    }
    format!("{rate:.2} H/s")
}

/// Human-readable duration from seconds.
pub fn format_duration(secs: f64) -> String {
    let secs = secs.max(0.0) as u64;
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86_400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86_400, (secs % 86_400) / 3600)
    }
}
