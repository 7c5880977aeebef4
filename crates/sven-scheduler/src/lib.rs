// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Task Store: assignee-driven task/note persistence and the `task_*`
//! tools (spec §4.B, §6). Shares its SQLite connection with
//! `sven-memory::ThreadStore` rather than opening a second one — see
//! `sven-memory::store` for the schema both crates read/write.

pub mod assignee;
mod error;
pub mod ids;
mod retry;
mod sink;
pub mod store;
pub mod tools;
pub mod types;

pub use assignee::Assignee;
pub use error::{Result, SchedulerError};
pub use ids::{new_task_id, new_task_id_at};
pub use retry::with_busy_retry;
pub use sink::{NullSink, TaskAssignmentSink};
pub use store::{TaskFilter, TaskStore, TaskUpdate};
pub use tools::{
    TaskAddNoteTool, TaskAddTool, TaskCompleteTool, TaskListTool, TaskUpdateTool, TaskViewTool,
};
pub use types::{NewTask, Task, TaskNote, TaskPriority, TaskStatus};
