// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Task-driven agent spawning callback (spec §4.F).
//!
//! `sven-team` owns the `Session`/`SessionRegistry` that can actually spawn
//! a delegate agent; `sven-scheduler` must not depend on `sven-team`
//! (dependency direction kept acyclic, matching the teacher's discipline of
//! `sven-bootstrap` depending on `sven-core`/`sven-tools` rather than the
//! reverse). This trait is the seam: `sven-team` implements it, the Task
//! Store calls it when a task's assignee resolves to `new:<type>/<model>`.

use async_trait::async_trait;

use crate::types::Task;

#[async_trait]
pub trait TaskAssignmentSink: Send + Sync {
    /// A task was assigned (or reassigned) to `new:<provider_type>/<model_id>`.
    /// The sink resolves `provider_type` to a configured provider instance,
    /// spawns a named delegate, and delivers an initial directive message
    /// describing the task.
    async fn on_task_assigned(&self, provider_type: &str, model_id: &str, task: &Task);
}

/// No-op sink for tests and standalone Task Store usage without a session.
pub struct NullSink;

#[async_trait]
impl TaskAssignmentSink for NullSink {
    async fn on_task_assigned(&self, _provider_type: &str, _model_id: &str, _task: &Task) {}
}
