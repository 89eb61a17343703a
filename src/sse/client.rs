use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::bus::{Event, EventBus, Subscriber};
use crate::sync::SafeQueue;

use super::session::EventSession;

/// Per-stream actor state: a bus subscriber feeding a blocking queue that
/// the drain task empties into the HTTP response.
pub struct EventsClient {
    pub session: EventSession,
    pub subscriber: Subscriber,
    queue: Arc<SafeQueue<Event>>,
    done: CancellationToken,
    ended: AtomicBool,
}

impl EventsClient {
    pub fn new(session: EventSession) -> Self {
        Self {
            session,
            subscriber: Subscriber::new(),
            queue: Arc::new(SafeQueue::new()),
            done: CancellationToken::new(),
            ended: AtomicBool::new(false),
        }
    }

    pub fn queue(&self) -> Arc<SafeQueue<Event>> {
        Arc::clone(&self.queue)
    }

    pub fn done(&self) -> &CancellationToken {
        &self.done
    }

    pub fn ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    /// Mark the client ended. Returns whether this call was the one that
    /// ended it, so cleanup runs exactly once.
    pub(super) fn end(&self) -> bool {
        !self.ended.swap(true, Ordering::SeqCst)
    }

    pub(super) fn close_queue(&self) {
        self.done.cancel();
        self.queue.close();
    }

    pub fn enqueue(&self, event: Event) {
        if self.ended() {
            return;
        }
        self.queue.enqueue(event);
    }

    /// Add `event_type` to this stream's subscription set.
    pub fn subscribe_to(self: &Arc<Self>, bus: &EventBus, event_type: &str) {
        if self.ended() || event_type.is_empty() {
            return;
        }
        let client = Arc::clone(self);
        bus.subscribe(
            event_type,
            Some(self.subscriber.clone()),
            Arc::new(move |event| client.enqueue(event)),
        );
    }

    /// Drop `event_type` from this stream's subscription set.
    pub fn unsubscribe_from(&self, bus: &EventBus, event_type: &str) {
        if self.ended() || event_type.is_empty() {
            return;
        }
        bus.unsubscribe(event_type, &self.subscriber);
    }
}
