//! In-process typed publish/subscribe fabric.
//!
//! The bus keeps two mutually consistent indices: event type -> set of
//! subscribers (forward) and subscriber -> (event type -> handler) (reverse).
//! Delivery is concurrent but bounded: every handler invocation holds one
//! permit from a bus-wide semaphore, so a publish storm back-pressures
//! publishers instead of exploding the task count.

mod event;

pub use event::{kind, Event, Subscriber};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Semaphore;

use crate::sync::{SafeMap, SafeSet};

pub type Handler = Arc<dyn Fn(Event) + Send + Sync>;

pub struct EventBus {
    subscriptions: SafeMap<String, Arc<SafeSet<Subscriber>>>,
    handlers: SafeMap<Subscriber, Arc<SafeMap<String, Handler>>>,
    gate: Arc<Semaphore>,
    closed: AtomicBool,
}

impl EventBus {
    pub fn new(gate_depth: usize) -> Self {
        Self {
            subscriptions: SafeMap::new(),
            handlers: SafeMap::new(),
            gate: Arc::new(Semaphore::new(gate_depth)),
            closed: AtomicBool::new(false),
        }
    }

    /// Register `handler` for `event_type`. A fresh subscriber is minted
    /// when none is supplied. Both index entries exist by the time this
    /// returns.
    pub fn subscribe(
        &self,
        event_type: &str,
        subscriber: Option<Subscriber>,
        handler: Handler,
    ) -> Subscriber {
        let subscriber = subscriber.unwrap_or_default();

        let by_event = self
            .handlers
            .get_or_default(subscriber.clone(), Arc::new(SafeMap::new()));
        by_event.set(event_type.to_string(), handler);

        // The forward set may be garbage-collected between our insert and a
        // concurrent unsubscribe's delete_if_empty; retry until the set we
        // joined is the one the index holds.
        loop {
            let set = self
                .subscriptions
                .get_or_default(event_type.to_string(), Arc::new(SafeSet::new()));
            set.add(subscriber.clone());
            match self.subscriptions.get(&event_type.to_string()) {
                Some(current) if Arc::ptr_eq(&current, &set) => break,
                _ => continue,
            }
        }

        subscriber
    }

    /// Remove the `(event_type, subscriber)` pair from both indices.
    /// An empty `event_type` removes the subscriber from every event it
    /// holds, driven by the reverse index.
    pub fn unsubscribe(&self, event_type: &str, subscriber: &Subscriber) {
        if event_type.is_empty() {
            if let Some(by_event) = self.handlers.pop(subscriber) {
                for event_type in by_event.keys() {
                    if let Some(set) = self.subscriptions.get(&event_type) {
                        set.remove(subscriber);
                        self.subscriptions.delete_if_empty(&event_type);
                    }
                }
            }
            return;
        }

        if let Some(set) = self.subscriptions.get(&event_type.to_string()) {
            set.remove(subscriber);
            self.subscriptions.delete_if_empty(&event_type.to_string());
        }
        if let Some(by_event) = self.handlers.get(subscriber) {
            by_event.remove(&event_type.to_string());
            self.handlers.delete_if_empty(subscriber);
        }
    }

    /// Deliver `event` to every current subscriber of its type.
    ///
    /// Iteration captures a logical snapshot of the subscriber set: a
    /// subscription added mid-publish may or may not be hit. Handlers run
    /// on their own tasks, so a panicking handler never reaches the
    /// publisher or its siblings. Suspends while the delivery gate is full.
    pub async fn publish(&self, event: Event) {
        if event.event_type.is_empty() || self.closed.load(Ordering::Acquire) {
            return;
        }

        let Some(set) = self.subscriptions.get(&event.event_type) else {
            return;
        };

        for subscriber in set.iter() {
            let handler = self
                .handlers
                .get(&subscriber)
                .and_then(|by_event| by_event.get(&event.event_type));
            match handler {
                Some(handler) => {
                    let permit = Arc::clone(&self.gate)
                        .acquire_owned()
                        .await
                        .expect("event bus gate is never closed");
                    let event = event.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        handler(event);
                    });
                }
                // forward entry without a reverse entry: reconcile lazily
                None => self.unsubscribe(&event.event_type, &subscriber),
            }
        }
    }

    /// Convenience for publishing a plain `{type, data}` event.
    pub async fn publish_data(&self, event_type: &str, data: Value) {
        self.publish(Event::new(event_type, data)).await;
    }

    /// Stop accepting publishes. Part of hub shutdown; subscriptions stay
    /// readable so late unsubscribes remain cheap no-ops.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Event types that currently have at least one subscriber.
    pub fn subscribed_types(&self) -> Vec<String> {
        self.subscriptions.keys()
    }
}
