//! Logs queue depth roughly once a second and cancels the pipeline once
//! every chunk has finished, successfully or not (spec §4.5). Completion
//! is counting-based rather than channel-close-based: every stage
//! shares its queue by `Arc`, so there is no "last sender dropped"
//! signal to wait on.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use super::Counters;

pub async fn run(counters: Arc<Counters>, cancel: CancellationToken) {
    let mut ticker = interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                tracing::debug!(
                    completed = counters.completed(),
                    failed = counters.failed_count(),
                    total = counters.total,
                    "pipeline progress"
                );
                if counters.is_done() {
                    cancel.cancel();
                    return;
                }
            }
        }
    }
}
