//! Shared pool services.
//!
//! One owned struct holds everything sessions and timers touch: the node
//! client, the job registry, statistics, the difficulty adjuster, and the
//! live-session directory. Each piece sits behind its own mutex; nothing
//! here holds a lock across an await point.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use crate::job::registry::JobRegistry;
use crate::node::NodeClient;
use crate::stats::PoolStats;
use crate::stratum::session::SessionDirectory;
use crate::stratum::wire::{ExtraNonce1, JobId};
use crate::vardiff::{DifficultyAdjuster, VardiffConfig};

/// Current epoch time in seconds.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

pub struct Services {
    pub node: Arc<dyn NodeClient>,
    /// Configured reward address, kept for display.
    pub reward_address: String,
    /// Output script the coinbase pays to.
    pub reward_script: Vec<u8>,
    pub coinbase_message: Vec<u8>,
    pub jobs: Mutex<JobRegistry>,
    pub stats: Mutex<PoolStats>,
    pub vardiff: Mutex<DifficultyAdjuster>,
    pub sessions: Mutex<SessionDirectory>,
    extranonce1_counter: AtomicU32,
    job_counter: AtomicU64,
}

impl Services {
    pub fn new(
        node: Arc<dyn NodeClient>,
        reward_address: String,
        reward_script: Vec<u8>,
        coinbase_message: Vec<u8>,
        vardiff: VardiffConfig,
    ) -> Self {
        Self {
            node,
            reward_address,
            reward_script,
            coinbase_message,
            jobs: Mutex::new(JobRegistry::default()),
            stats: Mutex::new(PoolStats::new(unix_now())),
            vardiff: Mutex::new(DifficultyAdjuster::new(vardiff)),
            sessions: Mutex::new(SessionDirectory::default()),
            extranonce1_counter: AtomicU32::new(0),
            job_counter: AtomicU64::new(0),
        }
    }

    /// Allocate a globally unique extranonce1.
    pub fn next_extranonce1(&self) -> ExtraNonce1 {
        let counter = self.extranonce1_counter.fetch_add(1, Ordering::Relaxed) + 1;
        ExtraNonce1::from_counter(counter)
    }

    /// Allocate the next job id, `<epoch>_<counter>`.
    pub fn next_job_id(&self) -> JobId {
        let counter = self.job_counter.fetch_add(1, Ordering::Relaxed);
        JobId::new(unix_now() as u64, counter)
    }

    /// Initial difficulty handed to fresh sessions.
    pub fn initial_difficulty(&self) -> f64 {
        self.vardiff.lock().config().initial_difficulty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{
        AddressInfo, BlockTemplate, BlockchainInfo, NodeError,
    };
    use async_trait::async_trait;

    struct NullNode;

    #[async_trait]
    impl NodeClient for NullNode {
        async fn get_blockchain_info(&self) -> Result<BlockchainInfo, NodeError> {
            Err(NodeError::Unreachable(0))
        }

        async fn get_block_template(&self) -> Result<BlockTemplate, NodeError> {
            Err(NodeError::Unreachable(0))
        }

        async fn submit_block(&self, _: &str) -> Result<Option<String>, NodeError> {
            Err(NodeError::Unreachable(0))
        }

        async fn validate_address(&self, _: &str) -> Result<AddressInfo, NodeError> {
            Err(NodeError::Unreachable(0))
        }
    }

    fn services() -> Services {
        Services::new(
            Arc::new(NullNode),
            "addr".into(),
            vec![0x51],
            b"msg".to_vec(),
            VardiffConfig::default(),
        )
    }

    #[test]
    fn test_extranonce1_values_are_unique() {
        let services = services();
        let a = services.next_extranonce1();
        let b = services.next_extranonce1();
        let c = services.next_extranonce1();
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
    }

    #[test]
    fn test_job_ids_are_monotonic() {
        let services = services();
        let a = services.next_job_id();
        let b = services.next_job_id();
        assert_ne!(a, b);
        assert!(a.as_str().ends_with("_0"));
        assert!(b.as_str().ends_with("_1"));
    }
}
