// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Task Store data model (spec §3 `Task`, `TaskNote`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::assignee::Assignee;
use crate::error::{Result, SchedulerError};

pub const TITLE_MAX_LEN: usize = 200;
pub const DESCRIPTION_MAX_LEN: usize = 1000;
pub const MIN_BULK_TASKS: usize = 1;
pub const MAX_BULK_TASKS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Blocked => "blocked",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => TaskStatus::Pending,
            "in_progress" => TaskStatus::InProgress,
            "completed" => TaskStatus::Completed,
            "blocked" => TaskStatus::Blocked,
            _ => return None,
        })
    }

    /// Validate a status transition (spec §3 invariant):
    /// `pending -> in_progress -> completed`, `* -> blocked -> *`.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (*self, next) {
            (a, b) if a == b => true,
            (_, Blocked) => true,
            (Blocked, _) => true,
            (Pending, InProgress) => true,
            (Pending, Completed) => true,
            (InProgress, Completed) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    // Ord derive compares in declaration order; declare Low < Medium < High
    // so sort-by-priority-then-recency can do `.rev()` for "highest first".
    Low,
    Medium,
    High,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::High => "high",
            TaskPriority::Medium => "medium",
            TaskPriority::Low => "low",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "high" => TaskPriority::High,
            "medium" => TaskPriority::Medium,
            "low" => TaskPriority::Low,
            _ => return None,
        })
    }
}

impl Default for TaskPriority {
    fn default() -> Self {
        TaskPriority::Medium
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskNote {
    pub id: String,
    pub author: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub prompt: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub assigned_to: Option<Assignee>,
    pub created_by: String,
    pub thread_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub notes: Vec<TaskNote>,
}

/// Fields accepted by `task_add` (spec §6) before a `Task` id/status/
/// timestamps are assigned.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub prompt: String,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub assigned_to: Option<String>,
}

impl NewTask {
    pub fn validate(&self) -> Result<()> {
        if self.title.is_empty() {
            return Err(SchedulerError::Validation("title must not be empty".into()));
        }
        if self.title.chars().count() > TITLE_MAX_LEN {
            return Err(SchedulerError::Validation(format!(
                "title must be at most {TITLE_MAX_LEN} characters"
            )));
        }
        if self.description.chars().count() > DESCRIPTION_MAX_LEN {
            return Err(SchedulerError::Validation(format!(
                "description must be at most {DESCRIPTION_MAX_LEN} characters"
            )));
        }
        if self.prompt.is_empty() {
            return Err(SchedulerError::Validation("prompt must not be empty".into()));
        }
        if let Some(raw) = &self.assigned_to {
            Assignee::parse(raw)?;
        }
        Ok(())
    }
}
