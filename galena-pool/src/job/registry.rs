//! Bounded registry of recent jobs.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::stratum::wire::JobId;

use super::Job;

/// How many jobs stay eligible for share submission.
pub const DEFAULT_CAPACITY: usize = 10;

/// Recent jobs keyed by id, evicting the oldest beyond the capacity.
///
/// Shares naming an evicted id are rejected as stale; sessions only ever
/// hold ids, so eviction cannot dangle.
#[derive(Debug)]
pub struct JobRegistry {
    jobs: HashMap<JobId, Arc<Job>>,
    order: VecDeque<JobId>,
    capacity: usize,
}

impl JobRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            jobs: HashMap::with_capacity(capacity + 1),
            order: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Insert a job, evicting the oldest when over capacity.
    pub fn insert(&mut self, job: Job) -> Arc<Job> {
        let job = Arc::new(job);
        self.order.push_back(job.id.clone());
        self.jobs.insert(job.id.clone(), Arc::clone(&job));

        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.jobs.remove(&oldest);
            }
        }
        job
    }

    pub fn get(&self, id: &JobId) -> Option<Arc<Job>> {
        self.jobs.get(id).cloned()
    }

    /// The most recently inserted job, if any.
    pub fn latest(&self) -> Option<Arc<Job>> {
        self.order.back().and_then(|id| self.jobs.get(id).cloned())
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
