//! Background job scheduler and job implementations.

mod expiry_sweep;
mod pool_metrics;
mod scheduler;

pub use expiry_sweep::ExpirySweepJob;
pub use pool_metrics::PoolMetricsJob;
pub use scheduler::{Job, JobFrequency, JobScheduler};
