//! Bounded FIFO admission queue between intake and the worker pool.
//! Grounded on `original_source/main.py`'s `asyncio.Queue(maxsize=25)`
//! and the soft-reservation admission check in its `/transcribe`
//! handler; the lock-free length counter alongside the channel mirrors
//! the teacher's pattern of an atomic bookkeeping counter kept next to
//! an async channel rather than locking the channel itself to ask "how
//! full are you".

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

pub const CAPACITY: usize = 25;
pub const SOFT_RESERVE: usize = 5;

#[derive(Debug, Clone)]
pub struct TaskHandle {
    pub task_id: Uuid,
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue is saturated")]
    Saturated,
    #[error("queue is closed")]
    Closed,
}

struct Shared {
    len: AtomicUsize,
}

#[derive(Clone)]
pub struct QueueSender {
    inner: mpsc::Sender<TaskHandle>,
    shared: Arc<Shared>,
}

pub struct QueueReceiver {
    inner: mpsc::Receiver<TaskHandle>,
    shared: Arc<Shared>,
}

/// Creates a bounded admission queue of `capacity`, soft-reserving the
/// last `soft_reserve` slots so admission checks can reject before the
/// channel itself is physically full.
pub fn bounded(capacity: usize) -> (QueueSender, QueueReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    let shared = Arc::new(Shared {
        len: AtomicUsize::new(0),
    });
    (
        QueueSender {
            inner: tx,
            shared: shared.clone(),
        },
        QueueReceiver {
            inner: rx,
            shared,
        },
    )
}

impl QueueSender {
    /// Current occupancy, read without taking any lock so the intake
    /// admission guard (spec.md §4.5/§5) never blocks on worker
    /// throughput.
    pub fn current_len(&self) -> usize {
        self.shared.len.load(Ordering::SeqCst)
    }

    /// True when admitting one more task would cross into the soft
    /// reserve (`len >= capacity - soft_reserve`).
    pub fn is_saturated(&self, capacity: usize, soft_reserve: usize) -> bool {
        self.current_len() >= capacity.saturating_sub(soft_reserve)
    }

    pub async fn enqueue(&self, handle: TaskHandle) -> Result<(), QueueError> {
        self.shared.len.fetch_add(1, Ordering::SeqCst);
        if self.inner.send(handle).await.is_err() {
            self.shared.len.fetch_sub(1, Ordering::SeqCst);
            return Err(QueueError::Closed);
        }
        Ok(())
    }
}

impl QueueReceiver {
    pub async fn dequeue(&mut self) -> Option<TaskHandle> {
        let handle = self.inner.recv().await;
        if handle.is_some() {
            self.shared.len.fetch_sub(1, Ordering::SeqCst);
        }
        handle
    }

    pub async fn dequeue_timeout(
        &mut self,
        duration: std::time::Duration,
    ) -> Option<TaskHandle> {
        match tokio::time::timeout(duration, self.dequeue()).await {
            Ok(handle) => handle,
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn len_tracks_enqueue_and_dequeue() {
        let (tx, mut rx) = bounded(CAPACITY);
        assert_eq!(tx.current_len(), 0);
        tx.enqueue(TaskHandle {
            task_id: Uuid::new_v4(),
        })
        .await
        .unwrap();
        assert_eq!(tx.current_len(), 1);
        rx.dequeue().await;
        assert_eq!(tx.current_len(), 0);
    }

    #[tokio::test]
    async fn saturation_trips_at_capacity_minus_soft_reserve() {
        let (tx, _rx) = bounded(CAPACITY);
        for _ in 0..(CAPACITY - SOFT_RESERVE) {
            tx.enqueue(TaskHandle {
                task_id: Uuid::new_v4(),
            })
            .await
            .unwrap();
        }
        assert!(tx.is_saturated(CAPACITY, SOFT_RESERVE));
    }

    #[tokio::test]
    async fn dequeue_timeout_returns_none_when_idle() {
        let (_tx, mut rx) = bounded(CAPACITY);
        let result = rx.dequeue_timeout(std::time::Duration::from_millis(10)).await;
        assert!(result.is_none());
    }
}
