//! Per-worker byte-rate limiter backing `--throttle` (spec §4.6). A
//! small hand-rolled token bucket: no crate in the pack provides a
//! byte-rate limiter, so this is written directly against `tokio::time`
//! the way the teacher writes its other small utility types (see the
//! teacher's `ObjectPool`, a plain `Mutex`-guarded pool with no
//! counterpart needed in this crate).

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::time::sleep;

pub struct Throttle {
    bytes_per_sec: u64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl Throttle {
    pub fn new(bytes_per_sec: u64) -> Self {
        Self {
            bytes_per_sec,
            state: Mutex::new(BucketState {
                tokens: bytes_per_sec as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Blocks (asynchronously) until `n` bytes' worth of budget is
    /// available, refilling continuously based on elapsed wall time.
    pub async fn acquire(&self, n: u64) {
        loop {
            let wait = {
                let mut state = self.state.lock().unwrap();
                let now = Instant::now();
                let elapsed = now.duration_since(state.last_refill).as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.bytes_per_sec as f64).min(self.bytes_per_sec as f64);
                state.last_refill = now;

                if state.tokens >= n as f64 {
                    state.tokens -= n as f64;
                    None
                } else {
                    let deficit = n as f64 - state.tokens;
                    Some(Duration::from_secs_f64(deficit / self.bytes_per_sec as f64))
                }
            };
            match wait {
                None => return,
                Some(d) => sleep(d).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_within_budget_does_not_block() {
        let throttle = Throttle::new(1 << 20);
        let start = Instant::now();
        throttle.acquire(1024).await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn acquire_beyond_budget_waits() {
        let throttle = Throttle::new(1024);
        throttle.acquire(1024).await;
        let start = Instant::now();
        throttle.acquire(1024).await;
        assert!(start.elapsed() >= Duration::from_millis(500));
    }
}
