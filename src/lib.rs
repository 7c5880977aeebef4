// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Runtime core of a multi-agent coding assistant: the thread event store,
//! the task store, the tool executor, the provider abstraction, the agent
//! turn engine, and the session/scheduler layer that ties them together.
//!
//! This crate is a thin facade over its constituent workspace crates —
//! `sven-memory` (thread events), `sven-scheduler` (tasks), `sven-tools`
//! (tool executor + approval protocol), `sven-model` (provider abstraction),
//! `sven-core` (agent turn engine), `sven-bootstrap` (agent construction),
//! and `sven-team` (session coordination) — re-exported here for callers
//! that want a single dependency.

pub use sven_bootstrap as bootstrap;
pub use sven_config as config;
pub use sven_core as core;
pub use sven_memory as memory;
pub use sven_model as model;
pub use sven_scheduler as scheduler;
pub use sven_team as team;
pub use sven_tools as tools;

pub use sven_core::{Agent, AgentEvent, AgentRuntimeContext, TokenAccount};
pub use sven_team::{Session, SessionRegistry};
