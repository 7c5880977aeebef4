// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! `thread_event_added` notifications (spec §4.A).
//!
//! Grounded on `sven-bootstrap::agent::AgentBuilder`'s
//! `mpsc::channel::<ToolEvent>` wiring, but a `broadcast` channel here since
//! multiple independent subscribers (a session's coordinator, any number of
//! delegate-watching UIs) must each see every append — an `mpsc` would have
//! split the stream across them instead.

use tokio::sync::broadcast;

use crate::types::ThreadEvent;

/// A durable append has happened; `threadId` is carried alongside the event
/// for subscribers that filter on thread ancestry without re-reading it out
/// of `event.thread_id` each time.
#[derive(Debug, Clone)]
pub struct ThreadEventAdded {
    pub thread_id: crate::ids::ThreadId,
    pub event: ThreadEvent,
}

/// Publish/subscribe hub for thread-event-store writes.  Cloning shares the
/// same underlying channel (cheap: an `Arc` internally).
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<ThreadEventAdded>,
}

impl Notifier {
    pub fn new() -> Self {
        // Bounded at 1024: a slow subscriber drops the oldest notifications
        // rather than applying backpressure to writers (appends must never
        // block on a reader).
        let (tx, _rx) = broadcast::channel(1024);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ThreadEventAdded> {
        self.tx.subscribe()
    }

    pub(crate) fn publish(&self, thread_id: crate::ids::ThreadId, event: ThreadEvent) {
        // No subscribers is the common case (a headless append) — ignore
        // the send error rather than treating it as a failure.
        let _ = self.tx.send(ThreadEventAdded { thread_id, event });
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
