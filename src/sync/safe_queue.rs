use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use super::safe_map::Emptiable;

/// A thread-safe FIFO queue with a polling and a blocking read mode.
///
/// `dequeue` never suspends; `read` parks the caller until a value is
/// published, the queue is closed, or the supplied cancellation fires.
/// Waiters are woken in arrival order.
pub struct SafeQueue<T> {
    items: Mutex<VecDeque<T>>,
    notify: Notify,
    closed: AtomicBool,
}

impl<T> SafeQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Append `value`. Enqueueing onto a closed queue drops the value.
    pub fn enqueue(&self, value: T) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        self.items.lock().unwrap().push_back(value);
        self.notify.notify_one();
    }

    /// Polling read: `None` when the queue is currently empty.
    pub fn dequeue(&self) -> Option<T> {
        self.items.lock().unwrap().pop_front()
    }

    /// Blocking read: suspend until a value arrives, the queue closes, or
    /// `cancel` fires. Values already queued are drained even after close.
    pub async fn read(&self, cancel: &CancellationToken) -> Option<T> {
        loop {
            // arm the wakeup before checking, so an enqueue between the
            // check and the await cannot be missed
            let notified = self.notify.notified();
            if let Some(value) = self.dequeue() {
                return Some(value);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            tokio::select! {
                _ = notified => {}
                _ = cancel.cancelled() => return None,
            }
        }
    }

    /// Close the queue, waking every parked reader. Idempotent.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().unwrap().is_empty()
    }
}

impl<T> Default for SafeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Emptiable for SafeQueue<T> {
    fn is_empty(&self) -> bool {
        SafeQueue::is_empty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn fifo_single_producer() {
        let q = SafeQueue::new();
        for i in 0..10 {
            q.enqueue(i);
        }
        let drained: Vec<i32> = std::iter::from_fn(|| q.dequeue()).collect();
        assert_eq!(drained, (0..10).collect::<Vec<_>>());
        assert_eq!(q.dequeue(), None);
    }

    #[tokio::test]
    async fn multi_producer_preserves_per_producer_order() {
        let q = Arc::new(SafeQueue::new());
        let mut tasks = Vec::new();
        for p in 0..4u32 {
            let q = Arc::clone(&q);
            tasks.push(tokio::spawn(async move {
                for i in 0..100u32 {
                    q.enqueue((p, i));
                }
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }

        let mut last = [None::<u32>; 4];
        while let Some((p, i)) = q.dequeue() {
            if let Some(prev) = last[p as usize] {
                assert!(i > prev, "producer {p} reordered: {prev} before {i}");
            }
            last[p as usize] = Some(i);
        }
        assert_eq!(last, [Some(99); 4]);
    }

    #[tokio::test]
    async fn blocking_read_wakes_on_enqueue() {
        let q = Arc::new(SafeQueue::new());
        let cancel = CancellationToken::new();

        let reader = {
            let q = Arc::clone(&q);
            let cancel = cancel.clone();
            tokio::spawn(async move { q.read(&cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        q.enqueue(42);
        assert_eq!(reader.await.unwrap(), Some(42));
    }

    #[tokio::test]
    async fn blocking_read_returns_none_on_cancel() {
        let q: Arc<SafeQueue<i32>> = Arc::new(SafeQueue::new());
        let cancel = CancellationToken::new();

        let reader = {
            let q = Arc::clone(&q);
            let cancel = cancel.clone();
            tokio::spawn(async move { q.read(&cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        assert_eq!(reader.await.unwrap(), None);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_wakes_readers() {
        let q: Arc<SafeQueue<i32>> = Arc::new(SafeQueue::new());
        let cancel = CancellationToken::new();

        let reader = {
            let q = Arc::clone(&q);
            let cancel = cancel.clone();
            tokio::spawn(async move { q.read(&cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        q.close();
        q.close();
        assert_eq!(reader.await.unwrap(), None);
        // enqueue after close is dropped
        q.enqueue(1);
        assert_eq!(q.dequeue(), None);
    }

    #[tokio::test]
    async fn queued_values_drain_after_close() {
        let q = SafeQueue::new();
        q.enqueue(1);
        q.enqueue(2);
        q.close();
        let cancel = CancellationToken::new();
        assert_eq!(q.read(&cancel).await, Some(1));
        assert_eq!(q.read(&cancel).await, Some(2));
        assert_eq!(q.read(&cancel).await, None);
    }
}
