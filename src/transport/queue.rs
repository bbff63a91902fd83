use std::collections::VecDeque;
use std::sync::Mutex;

use thiserror::Error;
use tokio::sync::Notify;
use tracing::trace;

/// Producers raced a queue that was already shut down.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("send queue closed")]
pub struct QueueClosed;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Frames currently buffered.
    pub depth: usize,
    /// Frames evicted to admit newer ones.
    pub dropped: u64,
}

/// Bounded outbound buffer decoupling callers from the network writer.
///
/// Overflow evicts the *oldest* buffered frame: queued traffic is transient
/// (heartbeat echoes, best-effort calls), and losing a stale frame beats
/// stalling the session behind a slow socket. Producers never block. Closing
/// the queue is the multiplexing loop's termination signal; `recv` drains
/// what remains, then reports `None`.
pub struct SendQueue<T> {
    inner: Mutex<Inner<T>>,
    ready: Notify,
    capacity: usize,
}

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
    dropped: u64,
}

impl<T> SendQueue<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be non-zero");
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
                dropped: 0,
            }),
            ready: Notify::new(),
            capacity,
        }
    }

    /// Enqueues a frame, evicting the oldest one when full. Never blocks.
    pub fn push(&self, item: T) -> Result<(), QueueClosed> {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        if inner.closed {
            return Err(QueueClosed);
        }
        if inner.items.len() >= self.capacity {
            inner.items.pop_front();
            inner.dropped += 1;
            trace!(dropped = inner.dropped, "outbound queue full, evicted oldest frame");
        }
        inner.items.push_back(item);
        drop(inner);
        self.ready.notify_one();
        Ok(())
    }

    /// Dequeues the next frame in FIFO order, waiting if empty. Returns
    /// `None` once the queue is closed and drained. Single-consumer.
    pub async fn recv(&self) -> Option<T> {
        loop {
            let notified = self.ready.notified();
            {
                let mut inner = self.inner.lock().expect("queue lock poisoned");
                if let Some(item) = inner.items.pop_front() {
                    return Some(item);
                }
                if inner.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Marks the queue closed and wakes the consumer. Idempotent.
    pub fn close(&self) {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        inner.closed = true;
        drop(inner);
        self.ready.notify_waiters();
        self.ready.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().expect("queue lock poisoned").closed
    }

    pub fn stats(&self) -> QueueStats {
        let inner = self.inner.lock().expect("queue lock poisoned");
        QueueStats {
            depth: inner.items.len(),
            dropped: inner.dropped,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn delivers_in_fifo_order() {
        let queue = SendQueue::new(8);
        for n in 0..5u32 {
            queue.push(n).expect("push");
        }
        for n in 0..5u32 {
            assert_eq!(queue.recv().await, Some(n));
        }
    }

    #[test]
    fn overflow_drops_oldest_and_never_exceeds_capacity() {
        let queue = SendQueue::new(4);
        for n in 0..100u32 {
            queue.push(n).expect("push never blocks or fails while open");
            assert!(queue.stats().depth <= 4);
        }
        let stats = queue.stats();
        assert_eq!(stats.depth, 4);
        assert_eq!(stats.dropped, 96);
    }

    #[tokio::test]
    async fn overflow_keeps_newest_frames() {
        let queue = SendQueue::new(2);
        for n in 0..5u32 {
            queue.push(n).expect("push");
        }
        assert_eq!(queue.recv().await, Some(3));
        assert_eq!(queue.recv().await, Some(4));
    }

    #[tokio::test]
    async fn close_drains_then_ends() {
        let queue = SendQueue::new(4);
        queue.push(1u32).expect("push");
        queue.close();
        assert_eq!(queue.push(2), Err(QueueClosed));
        assert_eq!(queue.recv().await, Some(1));
        assert_eq!(queue.recv().await, None);
    }

    #[tokio::test]
    async fn close_wakes_blocked_consumer() {
        let queue = Arc::new(SendQueue::<u32>::new(4));
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.recv().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();
        let got = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .expect("consumer stuck after close")
            .expect("consumer panicked");
        assert_eq!(got, None);
    }
}
