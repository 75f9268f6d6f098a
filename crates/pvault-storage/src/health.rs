//! Storage health check

use std::time::{Duration, Instant};

use anyhow::Result;
use opendal::Operator;

/// Verify the storage endpoint is reachable by listing the root.
/// Returns the round-trip time of the listing.
pub async fn check_health(op: &Operator) -> Result<Duration> {
    let started = Instant::now();
    op.list("/")
        .await
        .map_err(|e| anyhow::anyhow!("storage health check failed: {e}"))?;
    Ok(started.elapsed())
}
