//! Streaming progress reporter (spec §4.6): one `indicatif` bar per
//! file, refreshed on a timer against a rolling throughput window
//! rather than instantaneous deltas, so the displayed rate doesn't
//! jitter between ticks.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use crate::constant::{THROUGHPUT_WINDOW_CAPACITY, THROUGHPUT_WINDOW_MAX_AGE_SECS};
use crate::model::UploadFile;

struct ThroughputWindow {
    samples: Mutex<VecDeque<(Instant, u64)>>,
}

impl ThroughputWindow {
    fn new() -> Self {
        Self {
            samples: Mutex::new(VecDeque::with_capacity(THROUGHPUT_WINDOW_CAPACITY)),
        }
    }

    fn record(&self, total_bytes: u64) {
        let mut samples = self.samples.lock().unwrap();
        let now = Instant::now();
        samples.push_back((now, total_bytes));
        while samples.len() > THROUGHPUT_WINDOW_CAPACITY {
            samples.pop_front();
        }
        while samples
            .front()
            .is_some_and(|(t, _)| now.duration_since(*t) > Duration::from_secs(THROUGHPUT_WINDOW_MAX_AGE_SECS))
        {
            samples.pop_front();
        }
    }

    /// Bytes/sec averaged across the window's current span; `None` until
    /// at least two samples with a non-zero elapsed span exist.
    fn rate(&self) -> Option<f64> {
        let samples = self.samples.lock().unwrap();
        let (first_t, first_b) = *samples.front()?;
        let (last_t, last_b) = *samples.back()?;
        let elapsed = last_t.duration_since(first_t).as_secs_f64();
        if elapsed <= 0.0 {
            return None;
        }
        Some((last_b.saturating_sub(first_b)) as f64 / elapsed)
    }
}

/// Runs until `cancel` fires, redrawing every file's bar roughly every
/// 500ms. Intended to be spawned alongside the pipeline, not awaited
/// for completion signaling.
pub async fn run(files: Arc<Vec<Arc<UploadFile>>>, cancel: CancellationToken) {
    let multi = MultiProgress::new();
    let style = ProgressStyle::with_template("{msg} [{bar:40}] {bytes}/{total_bytes} ({bytes_per_sec})")
        .unwrap_or_else(|_| ProgressStyle::default_bar());

    let mut bars = Vec::with_capacity(files.len());
    let mut windows = Vec::with_capacity(files.len());
    for file in files.iter() {
        let bar = multi.add(ProgressBar::new(file.source.size));
        bar.set_style(style.clone());
        bar.set_message(file.destination.name.clone());
        bars.push(bar);
        windows.push(ThroughputWindow::new());
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        for ((file, bar), window) in files.iter().zip(bars.iter()).zip(windows.iter()) {
            let uploaded = file.bytes_uploaded();
            window.record(uploaded);
            bar.set_position(uploaded);
            if let Some(rate) = window.rate() {
                bar.set_message(format!("{} ({:.1} MiB/s)", file.destination.name, rate / (1 << 20) as f64));
            }
        }
    }

    for bar in &bars {
        bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_has_no_rate() {
        let window = ThroughputWindow::new();
        assert!(window.rate().is_none());
        window.record(0);
        assert!(window.rate().is_none());
    }

    #[test]
    fn window_caps_at_capacity() {
        let window = ThroughputWindow::new();
        for i in 0..(THROUGHPUT_WINDOW_CAPACITY + 10) {
            window.record(i as u64);
        }
        assert!(window.samples.lock().unwrap().len() <= THROUGHPUT_WINDOW_CAPACITY);
    }
}
