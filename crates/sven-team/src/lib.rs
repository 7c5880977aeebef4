// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Session coordination layer (spec §3 `Session`, §4.F): a coordinator
//! thread plus named delegate agents, configuration inheritance from the
//! project config, and task-driven lazy agent spawning.

mod bridge;
pub mod config_merge;
pub mod error;
pub mod ids;
pub mod registry;
pub mod session;
pub mod store;
pub mod types;

pub use error::{Result, TeamError};
pub use ids::new_session_id;
pub use registry::SessionRegistry;
pub use session::Session;
pub use store::SessionStore;
pub use types::{SessionRecord, SessionStatus};
