//! Pool server: TCP acceptor and periodic timers.
//!
//! One loop owns the listener and the three timers: template refresh
//! (which broadcasts fresh work with `clean_jobs` set), the statistics
//! sample, and the inactivity sweep. Sessions run as their own tasks and
//! share state through [`Services`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::job::{Job, build_job};
use crate::services::{Services, unix_now};
use crate::stats::{HASHRATE_WINDOW_SECS, format_hashrate};
use crate::stratum::{messages, session};
use crate::tracing::prelude::*;

/// Seconds between template refreshes.
pub const TEMPLATE_REFRESH_SECS: u64 = 30;

/// Seconds between hashrate samples and stats log lines.
pub const STATS_INTERVAL_SECS: u64 = 60;

/// Seconds between inactivity sweeps.
pub const SWEEP_INTERVAL_SECS: u64 = 30;

/// Fetch a template from the node and register it as the newest job.
pub async fn refresh_job(services: &Arc<Services>) -> Result<Arc<Job>> {
    let template = services.node.get_block_template().await?;
    let job = build_job(
        &template,
        services.next_job_id(),
        &services.coinbase_message,
        &services.reward_script,
    )?;
    let height = job.height;
    let job = services.jobs.lock().insert(job);
    info!(height, job = %job.id, "New block template");
    Ok(job)
}

/// Broadcast a job to every authorized session.
pub fn broadcast_job(services: &Services, job: &Job, clean_jobs: bool) {
    let line = messages::notify_line(job, messages::current_ntime(), clean_jobs);
    let reached = services.sessions.lock().broadcast_job(&line);
    debug!(job = %job.id, sessions = reached, "Broadcast job");
}

pub struct PoolServer {
    services: Arc<Services>,
    shutdown: CancellationToken,
}

impl PoolServer {
    pub fn new(services: Arc<Services>, shutdown: CancellationToken) -> Self {
        Self { services, shutdown }
    }

    /// Accept connections and drive the timers until shutdown.
    pub async fn run(self, listener: TcpListener) -> Result<()> {
        let period = |secs| {
            time::interval_at(
                Instant::now() + Duration::from_secs(secs),
                Duration::from_secs(secs),
            )
        };
        let mut template_timer = period(TEMPLATE_REFRESH_SECS);
        let mut stats_timer = period(STATS_INTERVAL_SECS);
        let mut sweep_timer = period(SWEEP_INTERVAL_SECS);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tokio::spawn(session::run(
                            stream,
                            peer,
                            Arc::clone(&self.services),
                            self.shutdown.clone(),
                        ));
                    }
                    Err(err) => warn!(error = %err, "Accept failed"),
                },

                _ = template_timer.tick() => {
                    match refresh_job(&self.services).await {
                        Ok(job) => broadcast_job(&self.services, &job, true),
                        // Sessions keep mining the previous template until
                        // the next refresh succeeds.
                        Err(err) => warn!(error = %err, "Template refresh failed"),
                    }
                }

                _ = stats_timer.tick() => self.log_stats(),

                _ = sweep_timer.tick() => self.sweep_inactive(),

                _ = self.shutdown.cancelled() => break,
            }
        }

        info!("Stratum server stopped");
        Ok(())
    }

    fn log_stats(&self) {
        let now = unix_now();
        let mut stats = self.services.stats.lock();
        stats.sample_hashrate(now);
        let hashrate = stats.pool_hashrate(now, HASHRATE_WINDOW_SECS);
        info!(
            hashrate = %format_hashrate(hashrate),
            valid = stats.valid,
            invalid = stats.invalid,
            stale = stats.stale,
            blocks = stats.blocks_found,
            miners = self.services.sessions.lock().len(),
            "Pool stats"
        );
    }

    fn sweep_inactive(&self) {
        let adjusted = self.services.vardiff.lock().sweep_inactive(unix_now());
        if adjusted.is_empty() {
            return;
        }
        let sessions = self.services.sessions.lock();
        for (client_id, difficulty) in adjusted {
            sessions.send_difficulty(&client_id, difficulty);
        }
    }
}
