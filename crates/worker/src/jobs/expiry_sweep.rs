//! Expiry sweep background job.

use std::sync::Arc;

use domain::InvitationEngine;
use tracing::{debug, info};

use super::scheduler::{Job, JobFrequency};
use crate::config::SweeperConfig;

/// Expires invitations past their TTL in bounded batches.
pub struct ExpirySweepJob {
    engine: Arc<InvitationEngine>,
    interval_secs: u64,
    batch_size: i64,
    max_batches: u32,
}

impl ExpirySweepJob {
    pub fn new(engine: Arc<InvitationEngine>, config: &SweeperConfig) -> Self {
        Self {
            engine,
            interval_secs: config.interval_secs.max(1),
            batch_size: config.batch_size.max(1),
            max_batches: config.max_batches_per_run.max(1),
        }
    }

    /// Sweep until a short batch or the batch cap. Returns how many
    /// invitations this run expired.
    pub async fn sweep(&self) -> Result<usize, String> {
        let mut total = 0;

        for batch in 1..=self.max_batches {
            let expired = self
                .engine
                .sweep_expired(self.batch_size)
                .await
                .map_err(|e| e.to_string())?;
            total += expired;
            debug!(batch, expired, "Expiry sweep batch done");

            if (expired as i64) < self.batch_size {
                break;
            }
            tokio::task::yield_now().await;
        }

        if total > 0 {
            info!(expired = total, "Expired stale invitations");
        }
        Ok(total)
    }
}

#[async_trait::async_trait]
impl Job for ExpirySweepJob {
    fn name(&self) -> &'static str {
        "expiry_sweep"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Seconds(self.interval_secs)
    }

    fn run_on_start(&self) -> bool {
        true
    }

    async fn execute(&self) -> Result<usize, String> {
        self.sweep().await
    }
}
