//! Per-client variable difficulty.
//!
//! Keeps each miner's share cadence near a target interval by doubling or
//! halving its difficulty from the spacing of consecutive shares. Increases
//! carry an upper guard so a share arriving after a long pause does not
//! look like a fast miner.

use std::collections::{HashMap, VecDeque};

use crate::tracing::prelude::*;

/// Tuning knobs for the adjuster.
#[derive(Debug, Clone)]
pub struct VardiffConfig {
    /// Starting difficulty for clients that have not been seen.
    pub initial_difficulty: f64,
    /// Desired seconds between shares.
    pub target_share_time: f64,
    /// Allowed deviation from the target, in percent, before adjusting.
    pub variance_percent: f64,
    /// Multiplicative step applied per adjustment.
    pub adjustment_factor: f64,
    pub min_difficulty: f64,
    pub max_difficulty: f64,
    /// Seconds without a share before the sweep halves a client's difficulty.
    pub no_share_timeout: f64,
}

impl Default for VardiffConfig {
    fn default() -> Self {
        Self {
            initial_difficulty: 0.01,
            target_share_time: 10.0,
            variance_percent: 30.0,
            adjustment_factor: 2.0,
            min_difficulty: 0.01,
            max_difficulty: 1_000_000.0,
            no_share_timeout: 30.0,
        }
    }
}

/// Increases are only considered when the share arrived within this many
/// seconds of the previous one.
const INCREASE_GUARD_SECS: f64 = 10.0;

/// Number of share timestamps retained per client.
const SHARE_TIME_WINDOW: usize = 10;

#[derive(Debug)]
struct ClientRecord {
    difficulty: f64,
    share_times: VecDeque<f64>,
}

/// Tracks share cadence and difficulty per client.
///
/// Shared across sessions behind a mutex; all methods take `&mut self` and
/// never call back out, so lock scope stays trivial.
#[derive(Debug)]
pub struct DifficultyAdjuster {
    config: VardiffConfig,
    clients: HashMap<String, ClientRecord>,
}

impl DifficultyAdjuster {
    pub fn new(config: VardiffConfig) -> Self {
        Self {
            config,
            clients: HashMap::new(),
        }
    }

    pub fn config(&self) -> &VardiffConfig {
        &self.config
    }

    /// Current difficulty for a client, or the initial difficulty if the
    /// client has no record yet.
    pub fn difficulty(&self, client_id: &str) -> f64 {
        self.clients
            .get(client_id)
            .map(|c| c.difficulty)
            .unwrap_or(self.config.initial_difficulty)
    }

    fn record_mut(&mut self, client_id: &str) -> &mut ClientRecord {
        let initial = self.config.initial_difficulty;
        self.clients
            .entry(client_id.to_string())
            .or_insert_with(|| ClientRecord {
                difficulty: initial,
                share_times: VecDeque::with_capacity(SHARE_TIME_WINDOW),
            })
    }

    /// Record a share submission at time `t` (epoch seconds) and adjust
    /// the client's difficulty from the interval since its previous one.
    ///
    /// Returns `(changed, difficulty)`.
    pub fn record_share(&mut self, client_id: &str, t: f64) -> (bool, f64) {
        let target = self.config.target_share_time;
        let variance = target * (self.config.variance_percent / 100.0);
        let factor = self.config.adjustment_factor;
        let (min, max) = (self.config.min_difficulty, self.config.max_difficulty);

        let record = self.record_mut(client_id);
        let last = record.share_times.back().copied();

        if record.share_times.len() == SHARE_TIME_WINDOW {
            record.share_times.pop_front();
        }
        record.share_times.push_back(t);

        let Some(last) = last else {
            // First share only establishes the baseline.
            return (false, record.difficulty);
        };

        let delta = t - last;
        let current = record.difficulty;

        let new = if delta < target - variance && delta <= INCREASE_GUARD_SECS {
            (current * factor).min(max)
        } else if delta > target + variance {
            (current / factor).max(min)
        } else {
            current
        };

        if new != current {
            debug!(
                client = client_id,
                from = current,
                to = new,
                interval = delta,
                "Adjusted difficulty"
            );
            record.difficulty = new;
            (true, new)
        } else {
            (false, current)
        }
    }

    /// Install a client-suggested difficulty, clamped into bounds.
    ///
    /// Returns `(changed, difficulty)`; the suggestion always overrides any
    /// previously adjusted value.
    pub fn suggest_difficulty(&mut self, client_id: &str, suggested: f64) -> (bool, f64) {
        let clamped = suggested
            .min(self.config.max_difficulty)
            .max(self.config.min_difficulty);

        let record = self.record_mut(client_id);
        let changed = record.difficulty != clamped;
        record.difficulty = clamped;
        info!(client = client_id, difficulty = clamped, "Using suggested difficulty");
        (changed, clamped)
    }

    /// Halve the difficulty of clients that have gone quiet.
    ///
    /// Returns the adjusted `(client_id, difficulty)` pairs so the caller
    /// can notify the affected sessions.
    pub fn sweep_inactive(&mut self, now: f64) -> Vec<(String, f64)> {
        let timeout = self.config.no_share_timeout;
        let min = self.config.min_difficulty;
        let mut adjusted = Vec::new();

        for (client_id, record) in &mut self.clients {
            let Some(&last) = record.share_times.back() else {
                continue;
            };
            let idle = now - last;
            if idle > timeout && record.difficulty > min {
                let new = (record.difficulty / 2.0).max(min);
                info!(
                    client = client_id.as_str(),
                    idle_secs = idle,
                    from = record.difficulty,
                    to = new,
                    "Halving difficulty for inactive client"
                );
                record.difficulty = new;
                adjusted.push((client_id.clone(), new));
            }
        }

        adjusted
    }

    /// Drop a client's record when its session closes.
    pub fn remove_client(&mut self, client_id: &str) {
        self.clients.remove(client_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adjuster(initial: f64) -> DifficultyAdjuster {
        DifficultyAdjuster::new(VardiffConfig {
            initial_difficulty: initial,
            ..VardiffConfig::default()
        })
    }

    #[test]
    fn test_first_share_makes_no_change() {
        let mut adj = adjuster(1.0);
        assert_eq!(adj.record_share("miner", 100.0), (false, 1.0));
    }

    #[test]
    fn test_fast_shares_double_difficulty() {
        // Target 10s, variance 30% -> lower bound 7s. Shares at t=0, 2, 4.
        let mut adj = adjuster(1.0);
        adj.record_share("miner", 0.0);
        assert_eq!(adj.record_share("miner", 2.0), (true, 2.0));
        assert_eq!(adj.record_share("miner", 4.0), (true, 4.0));
    }

    #[test]
    fn test_slow_shares_halve_difficulty() {
        // Upper bound is 13s; a 20s gap divides by the factor.
        let mut adj = adjuster(4.0);
        adj.record_share("miner", 0.0);
        assert_eq!(adj.record_share("miner", 20.0), (true, 2.0));
    }

    #[test]
    fn test_interval_inside_band_is_stable() {
        let mut adj = adjuster(1.0);
        adj.record_share("miner", 0.0);
        assert_eq!(adj.record_share("miner", 10.0), (false, 1.0));
        assert_eq!(adj.record_share("miner", 18.0), (false, 1.0));
    }

    #[test]
    fn test_increase_guard_after_pause() {
        // Target 40s makes the lower bound 28s; a 20s interval is "fast"
        // but beyond the 10s guard, so no increase happens.
        let mut adj = DifficultyAdjuster::new(VardiffConfig {
            initial_difficulty: 1.0,
            target_share_time: 40.0,
            ..VardiffConfig::default()
        });
        adj.record_share("miner", 0.0);
        assert_eq!(adj.record_share("miner", 20.0), (false, 1.0));
        // Within the guard it does increase.
        assert_eq!(adj.record_share("miner", 25.0), (true, 2.0));
    }

    #[test]
    fn test_difficulty_stays_in_bounds() {
        let mut adj = DifficultyAdjuster::new(VardiffConfig {
            initial_difficulty: 1.0,
            min_difficulty: 0.5,
            max_difficulty: 4.0,
            ..VardiffConfig::default()
        });

        let mut t = 0.0;
        adj.record_share("miner", t);
        for _ in 0..10 {
            t += 1.0;
            let (_, diff) = adj.record_share("miner", t);
            assert!(diff <= 4.0);
        }
        assert_eq!(adj.difficulty("miner"), 4.0);

        for _ in 0..10 {
            t += 100.0;
            let (_, diff) = adj.record_share("miner", t);
            assert!(diff >= 0.5);
        }
        assert_eq!(adj.difficulty("miner"), 0.5);
    }

    #[test]
    fn test_suggestion_clamped_and_installed() {
        let mut adj = adjuster(1.0);
        assert_eq!(adj.suggest_difficulty("miner", 0.0001), (true, 0.01));
        assert_eq!(adj.suggest_difficulty("miner", 5e9), (true, 1_000_000.0));
        assert_eq!(adj.suggest_difficulty("miner", 8.0), (true, 8.0));
        // Re-suggesting the same value reports no change.
        assert_eq!(adj.suggest_difficulty("miner", 8.0), (false, 8.0));
        assert_eq!(adj.difficulty("miner"), 8.0);
    }

    #[test]
    fn test_sweep_halves_idle_clients() {
        let mut adj = adjuster(2.0);
        adj.record_share("idle", 0.0);
        adj.record_share("busy", 0.0);
        adj.record_share("busy", 10.0);

        let adjusted = adj.sweep_inactive(35.0);
        assert_eq!(adjusted, vec![("idle".to_string(), 1.0)]);
        assert_eq!(adj.difficulty("idle"), 1.0);
        assert_eq!(adj.difficulty("busy"), 2.0);
    }

    #[test]
    fn test_sweep_respects_minimum() {
        let mut adj = adjuster(0.01);
        adj.record_share("miner", 0.0);
        assert!(adj.sweep_inactive(100.0).is_empty());
        assert_eq!(adj.difficulty("miner"), 0.01);

        // Just above the floor it halves only down to the floor.
        let mut adj = adjuster(0.015);
        adj.record_share("miner", 0.0);
        assert_eq!(adj.sweep_inactive(100.0), vec![("miner".to_string(), 0.01)]);
    }

    #[test]
    fn test_share_window_is_bounded() {
        let mut adj = adjuster(1.0);
        for i in 0..50 {
            adj.record_share("miner", i as f64 * 10.0);
        }
        let record = adj.clients.get("miner").unwrap();
        assert_eq!(record.share_times.len(), SHARE_TIME_WINDOW);
    }

    #[test]
    fn test_remove_client_resets_to_initial() {
        let mut adj = adjuster(1.0);
        adj.suggest_difficulty("miner", 64.0);
        adj.remove_client("miner");
        assert_eq!(adj.difficulty("miner"), 1.0);
    }
}
