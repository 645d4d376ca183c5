//! Store metrics.
//!
//! Query latency and error counters for the invitation store, plus pool
//! gauges sampled by the worker.

use metrics::{counter, gauge, histogram};
use sqlx::PgPool;
use std::time::Instant;

pub fn record_query_duration(query_name: &'static str, duration_secs: f64) {
    histogram!("invite_store_query_duration_seconds", "query" => query_name).record(duration_secs);
}

pub fn record_query_error(query_name: &'static str) {
    counter!("invite_store_query_errors_total", "query" => query_name).increment(1);
}

/// Record connection pool gauges. Called periodically by the worker.
pub fn record_pool_metrics(pool: &PgPool) {
    let size = pool.size() as usize;
    let idle = pool.num_idle();
    let active = size.saturating_sub(idle);

    gauge!("invite_store_connections_active").set(active as f64);
    gauge!("invite_store_connections_idle").set(idle as f64);
    gauge!("invite_store_connections_total").set(size as f64);
}

/// Times one store query.
///
/// ```ignore
/// let timer = QueryTimer::new("get_invitation");
/// let result = sqlx::query_as::<_, InvitationEntity>(...).fetch_optional(&pool).await;
/// timer.finish(&result);
/// ```
pub struct QueryTimer {
    query_name: &'static str,
    start: Instant,
}

impl QueryTimer {
    pub fn new(query_name: &'static str) -> Self {
        Self {
            query_name,
            start: Instant::now(),
        }
    }

    /// Record the elapsed time, and an error count if the query failed.
    pub fn finish<T, E>(self, result: &Result<T, E>) {
        record_query_duration(self.query_name, self.start.elapsed().as_secs_f64());
        if result.is_err() {
            record_query_error(self.query_name);
        }
    }
}
