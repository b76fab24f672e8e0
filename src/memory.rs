//! Memory Governor (spec §4.9): backs the Read stage off when resident
//! memory approaches the configured limit, instead of letting an
//! unbounded number of in-flight chunks run the process out of memory.
//! `sysinfo` is the only crate in the pack that samples RSS/available
//! memory; wrapped in a `tokio::sync::Mutex` since concurrent refreshes
//! on one `System` are not documented safe on every platform (the same
//! reasoning the teacher applies to its own `ObjectPool`'s internal
//! `Mutex`).

use std::sync::atomic::{AtomicU64, Ordering};

use sysinfo::{Pid, System};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::constant::{MEMORY_BACKOFF_CEILING_SECS, MEMORY_LIMIT_FRACTION};

pub struct MemoryGovernor {
    system: Mutex<System>,
    pid: Pid,
    limit_bytes: AtomicU64,
}

impl MemoryGovernor {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        let limit_bytes = (system.available_memory() as f64 * MEMORY_LIMIT_FRACTION) as u64;
        Self {
            system: Mutex::new(system),
            pid: Pid::from_u32(std::process::id()),
            limit_bytes: AtomicU64::new(limit_bytes),
        }
    }

    pub fn limit_bytes(&self) -> u64 {
        self.limit_bytes.load(Ordering::Relaxed)
    }

    async fn current_rss(&self) -> u64 {
        let mut system = self.system.lock().await;
        system.refresh_process(self.pid);
        system.process(self.pid).map(|p| p.memory()).unwrap_or(0)
    }

    /// Call once per Read-stage iteration. Sleeps with doubling backoff
    /// (2, 4, 8, ... capped at 16s) for as long as current RSS exceeds
    /// the limit, re-sampling available system memory and raising the
    /// limit if it grew in the meantime (spec §4.9) — this lets the
    /// governor recover automatically if another process on the host
    /// frees memory while UA is backed off.
    pub async fn wait_if_over_limit(&self, cancel: &CancellationToken) {
        let mut backoff_secs = 2u64;
        loop {
            let rss = self.current_rss().await;
            if rss <= self.limit_bytes() {
                return;
            }
            tracing::warn!(rss, limit = self.limit_bytes(), backoff_secs, "memory governor backing off read stage");
            tokio::select! {
                _ = sleep(std::time::Duration::from_secs(backoff_secs)) => {}
                _ = cancel.cancelled() => return,
            }

            let mut system = self.system.lock().await;
            system.refresh_memory();
            let available_limit = (system.available_memory() as f64 * MEMORY_LIMIT_FRACTION) as u64;
            drop(system);
            if available_limit > self.limit_bytes() {
                self.limit_bytes.store(available_limit, Ordering::Relaxed);
            }

            backoff_secs = (backoff_secs * 2).min(MEMORY_BACKOFF_CEILING_SECS);
        }
    }
}

impl Default for MemoryGovernor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn under_limit_returns_immediately() {
        let governor = MemoryGovernor::new();
        governor.limit_bytes.store(u64::MAX, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let start = std::time::Instant::now();
        governor.wait_if_over_limit(&cancel).await;
        assert!(start.elapsed() < std::time::Duration::from_millis(200));
    }

    #[tokio::test]
    async fn cancellation_interrupts_backoff() {
        let governor = MemoryGovernor::new();
        governor.limit_bytes.store(0, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let start = std::time::Instant::now();
        governor.wait_if_over_limit(&cancel).await;
        assert!(start.elapsed() < std::time::Duration::from_secs(1));
    }
}
