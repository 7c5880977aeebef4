// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Append-only thread event store (spec §4.A) backing sven agent
//! conversations: hierarchical thread ids, typed events, and a
//! `thread_event_added` notification hub.

mod error;
mod ids;
mod notify;
mod store;
mod types;

pub use error::{MemoryError, Result};
pub use ids::ThreadId;
pub use notify::{Notifier, ThreadEventAdded};
pub use store::{with_busy_retry, SharedConnection, ThreadStore};
pub use types::{EventType, Thread, ThreadEvent, ThreadMetadata};
