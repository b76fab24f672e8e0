//! Bounded FIFO queue connecting pipeline stages (spec §3). Generalizes
//! the "blocking queue with explicit interrupt points" from the source
//! into a `tokio::sync::mpsc` channel pair per DESIGN NOTES §9: channel
//! close replaces thread interruption, and `produce`/`consume` are the
//! suspension (and cancellation) points.
//!
//! Not restartable and has no separate cancellation token of its own —
//! callers race `produce`/`consume` against a shared
//! `tokio_util::sync::CancellationToken` when they need to stop early.

use tokio::sync::mpsc;

/// `-1` capacity (spec §3) becomes this variant instead of a sentinel
/// integer, so "unbounded" is a type-level fact rather than a magic
/// number callers must remember to check for.
pub enum BoundedQueue<T> {
    Bounded {
        tx: mpsc::Sender<T>,
        rx: tokio::sync::Mutex<mpsc::Receiver<T>>,
    },
    Unbounded {
        tx: mpsc::UnboundedSender<T>,
        rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<T>>,
    },
}

impl<T: Send + 'static> BoundedQueue<T> {
    pub fn bounded(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self::Bounded {
            tx,
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    pub fn unbounded() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self::Unbounded {
            tx,
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    /// Blocks (asynchronously) while the queue is full. Returns `Err`
    /// once every receiver/sender-derived handle has been dropped, which
    /// this crate uses as the "all consumers gone" shutdown signal.
    pub async fn produce(&self, item: T) -> Result<(), T> {
        match self {
            Self::Bounded { tx, .. } => tx.send(item).await.map_err(|e| e.0),
            Self::Unbounded { tx, .. } => tx.send(item).map_err(|e| e.0),
        }
    }

    /// Blocks (asynchronously) while the queue is empty; `None` once the
    /// queue is drained and closed.
    pub async fn consume(&self) -> Option<T> {
        match self {
            Self::Bounded { rx, .. } => rx.lock().await.recv().await,
            Self::Unbounded { rx, .. } => rx.lock().await.recv().await,
        }
    }

    pub fn sender(&self) -> QueueSender<T> {
        match self {
            Self::Bounded { tx, .. } => QueueSender::Bounded(tx.clone()),
            Self::Unbounded { tx, .. } => QueueSender::Unbounded(tx.clone()),
        }
    }
}

/// A cloneable handle that can enqueue items without holding a reference
/// to the whole `BoundedQueue`; every producer task gets one of these.
#[derive(Clone)]
pub enum QueueSender<T> {
    Bounded(mpsc::Sender<T>),
    Unbounded(mpsc::UnboundedSender<T>),
}

impl<T> QueueSender<T> {
    pub async fn produce(&self, item: T) -> Result<(), T> {
        match self {
            Self::Bounded(tx) => tx.send(item).await.map_err(|e| e.0),
            Self::Unbounded(tx) => tx.send(item).map_err(|e| e.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bounded_queue_round_trips() {
        let q: BoundedQueue<u32> = BoundedQueue::bounded(2);
        q.produce(1).await.unwrap();
        q.produce(2).await.unwrap();
        assert_eq!(q.consume().await, Some(1));
        assert_eq!(q.consume().await, Some(2));
    }

    #[tokio::test]
    async fn unbounded_queue_never_blocks_producer() {
        let q: BoundedQueue<u32> = BoundedQueue::unbounded();
        for i in 0..10_000u32 {
            q.produce(i).await.unwrap();
        }
        for i in 0..10_000u32 {
            assert_eq!(q.consume().await, Some(i));
        }
    }

    #[tokio::test]
    async fn bounded_queue_applies_backpressure() {
        let q = std::sync::Arc::new(BoundedQueue::<u32>::bounded(1));
        q.produce(1).await.unwrap();
        let q2 = q.clone();
        let handle = tokio::spawn(async move { q2.produce(2).await });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!handle.is_finished());
        assert_eq!(q.consume().await, Some(1));
        handle.await.unwrap().unwrap();
    }
}
