// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The six `task_*` tools (spec §6), each bound at construction to the
//! calling thread's id so the `Tool` trait stays unchanged from the
//! teacher's shape (no per-call context argument).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use sven_config::AgentMode;
use sven_tools::policy::ApprovalPolicy;
use sven_tools::tool::{OutputCategory, Tool, ToolCall, ToolOutput};

use crate::store::{TaskFilter, TaskStore, TaskUpdate};
use crate::types::{NewTask, TaskPriority, TaskStatus};

fn missing_param(call: &ToolCall, name: &str) -> ToolOutput {
    ToolOutput::err(&call.id, format!("missing required parameter '{name}'"))
}

fn render_task(t: &crate::types::Task) -> Value {
    json!({
        "id": t.id,
        "title": t.title,
        "description": t.description,
        "prompt": t.prompt,
        "status": t.status.as_str(),
        "priority": t.priority.as_str(),
        "assignedTo": t.assigned_to.as_ref().map(|a| a.to_raw()),
        "createdBy": t.created_by,
        "threadId": t.thread_id,
        "createdAt": t.created_at.to_rfc3339(),
        "updatedAt": t.updated_at.to_rfc3339(),
        "notes": t.notes.iter().map(|n| json!({
            "author": n.author,
            "content": n.content,
            "timestamp": n.timestamp.to_rfc3339(),
        })).collect::<Vec<_>>(),
    })
}

/// `task_add` — create one to twenty tasks in a single call.
pub struct TaskAddTool {
    store: Arc<TaskStore>,
    thread_id: String,
}

impl TaskAddTool {
    pub fn new(store: Arc<TaskStore>, thread_id: impl Into<String>) -> Self {
        Self {
            store,
            thread_id: thread_id.into(),
        }
    }
}

#[async_trait]
impl Tool for TaskAddTool {
    fn name(&self) -> &str {
        "task_add"
    }

    fn description(&self) -> &str {
        "Create one or more tasks (up to 20 per call). Each task needs a title and a prompt; \
         description and priority are optional. assigned_to is either a thread id or \
         new:<providerType>/<modelId> to spawn a fresh delegate for the task."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "tasks": {
                    "type": "array",
                    "minItems": 1,
                    "maxItems": 20,
                    "items": {
                        "type": "object",
                        "properties": {
                            "title": {"type": "string"},
                            "description": {"type": "string"},
                            "prompt": {"type": "string"},
                            "priority": {"type": "string", "enum": ["low", "medium", "high"]},
                            "assigned_to": {"type": "string"}
                        },
                        "required": ["title", "prompt"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["tasks"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    fn modes(&self) -> &[AgentMode] {
        &[AgentMode::Plan, AgentMode::Agent]
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(tasks_raw) = call.args.get("tasks").and_then(|v| v.as_array()) else {
            return missing_param(call, "tasks");
        };
        let mut tasks = Vec::with_capacity(tasks_raw.len());
        for raw in tasks_raw {
            match serde_json::from_value::<NewTask>(raw.clone()) {
                Ok(t) => tasks.push(t),
                Err(e) => return ToolOutput::err(&call.id, format!("invalid task entry: {e}")),
            }
        }

        match self.store.create_tasks(&self.thread_id, &self.thread_id, tasks).await {
            Ok(created) => {
                let ids: Vec<_> = created.iter().map(|t| t.id.as_str()).collect();
                ToolOutput::ok(&call.id, format!("created {} task(s): {}", ids.len(), ids.join(", ")))
            }
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}

/// `task_list` — list tasks visible to the calling thread under a filter.
pub struct TaskListTool {
    store: Arc<TaskStore>,
    thread_id: String,
}

impl TaskListTool {
    pub fn new(store: Arc<TaskStore>, thread_id: impl Into<String>) -> Self {
        Self {
            store,
            thread_id: thread_id.into(),
        }
    }
}

#[async_trait]
impl Tool for TaskListTool {
    fn name(&self) -> &str {
        "task_list"
    }

    fn description(&self) -> &str {
        "List tasks. filter is one of mine (assigned to this thread), created (created by this \
         thread), thread (this thread's own task list) or all. Completed tasks are hidden unless \
         include_completed is true."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "filter": {"type": "string", "enum": ["mine", "created", "thread", "all"]},
                "include_completed": {"type": "boolean"}
            },
            "required": ["filter"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::MatchList
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let filter = match call.args.get("filter").and_then(|v| v.as_str()) {
            Some("mine") => TaskFilter::Mine,
            Some("created") => TaskFilter::Created,
            Some("thread") => TaskFilter::Thread,
            Some("all") => TaskFilter::All,
            Some(other) => return ToolOutput::err(&call.id, format!("unknown filter {other:?}")),
            None => return missing_param(call, "filter"),
        };
        let include_completed = call
            .args
            .get("include_completed")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        match self
            .store
            .by_filter(filter, &self.thread_id, &self.thread_id, include_completed)
            .await
        {
            Ok(tasks) => {
                let rendered: Vec<_> = tasks.iter().map(render_task).collect();
                ToolOutput::ok(
                    &call.id,
                    serde_json::to_string_pretty(&rendered).unwrap_or_default(),
                )
            }
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}

/// `task_view` — fetch a single task with its full note history.
pub struct TaskViewTool {
    store: Arc<TaskStore>,
}

impl TaskViewTool {
    pub fn new(store: Arc<TaskStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for TaskViewTool {
    fn name(&self) -> &str {
        "task_view"
    }

    fn description(&self) -> &str {
        "Fetch a single task by id, including its full note history."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"task_id": {"type": "string"}},
            "required": ["task_id"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::FileContent
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(task_id) = call.args.get("task_id").and_then(|v| v.as_str()) else {
            return missing_param(call, "task_id");
        };
        match self.store.by_id(task_id).await {
            Ok(task) => ToolOutput::ok(
                &call.id,
                serde_json::to_string_pretty(&render_task(&task)).unwrap_or_default(),
            ),
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}

/// `task_update` — mutate status, assignee, priority, title, description or prompt.
pub struct TaskUpdateTool {
    store: Arc<TaskStore>,
}

impl TaskUpdateTool {
    pub fn new(store: Arc<TaskStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for TaskUpdateTool {
    fn name(&self) -> &str {
        "task_update"
    }

    fn description(&self) -> &str {
        "Update one or more fields of an existing task: status, assigned_to, priority, title, \
         description, or prompt. At least one field besides task_id must be given. Status \
         transitions follow pending -> in_progress -> completed, with blocked reachable from \
         and returning to any state."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task_id": {"type": "string"},
                "status": {"type": "string", "enum": ["pending", "in_progress", "completed", "blocked"]},
                "assigned_to": {"type": "string"},
                "priority": {"type": "string", "enum": ["low", "medium", "high"]},
                "title": {"type": "string"},
                "description": {"type": "string"},
                "prompt": {"type": "string"}
            },
            "required": ["task_id"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(task_id) = call.args.get("task_id").and_then(|v| v.as_str()) else {
            return missing_param(call, "task_id");
        };

        let status = match call.args.get("status").and_then(|v| v.as_str()) {
            Some(s) => match TaskStatus::from_str(s) {
                Some(status) => Some(status),
                None => return ToolOutput::err(&call.id, format!("unknown status {s:?}")),
            },
            None => None,
        };
        let priority = match call.args.get("priority").and_then(|v| v.as_str()) {
            Some(p) => match TaskPriority::from_str(p) {
                Some(priority) => Some(priority),
                None => return ToolOutput::err(&call.id, format!("unknown priority {p:?}")),
            },
            None => None,
        };
        let assigned_to = match call.args.get("assigned_to").and_then(|v| v.as_str()) {
            Some(raw) => match crate::assignee::Assignee::parse(raw) {
                Ok(a) => Some(Some(a)),
                Err(e) => return ToolOutput::err(&call.id, e.to_string()),
            },
            None => None,
        };

        let update = TaskUpdate {
            status,
            assigned_to,
            priority,
            title: call.args.get("title").and_then(|v| v.as_str()).map(str::to_string),
            description: call
                .args
                .get("description")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            prompt: call.args.get("prompt").and_then(|v| v.as_str()).map(str::to_string),
        };

        match self.store.update_task(task_id, update).await {
            Ok(task) => ToolOutput::ok(&call.id, format!("updated task {}", task.id)),
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}

/// `task_complete` — append a completion note and mark the task done.
pub struct TaskCompleteTool {
    store: Arc<TaskStore>,
    thread_id: String,
}

impl TaskCompleteTool {
    pub fn new(store: Arc<TaskStore>, thread_id: impl Into<String>) -> Self {
        Self {
            store,
            thread_id: thread_id.into(),
        }
    }
}

#[async_trait]
impl Tool for TaskCompleteTool {
    fn name(&self) -> &str {
        "task_complete"
    }

    fn description(&self) -> &str {
        "Mark a task completed, recording a summary message as its final note."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": {"type": "string"},
                "message": {"type": "string"}
            },
            "required": ["id", "message"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(task_id) = call.args.get("id").and_then(|v| v.as_str()) else {
            return missing_param(call, "id");
        };
        let Some(message) = call.args.get("message").and_then(|v| v.as_str()) else {
            return missing_param(call, "message");
        };

        match self.store.complete_task(task_id, &self.thread_id, message).await {
            Ok(task) => ToolOutput::ok(&call.id, format!("completed task {}", task.id)),
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}

/// `task_add_note` — append a progress note without changing status.
pub struct TaskAddNoteTool {
    store: Arc<TaskStore>,
    thread_id: String,
}

impl TaskAddNoteTool {
    pub fn new(store: Arc<TaskStore>, thread_id: impl Into<String>) -> Self {
        Self {
            store,
            thread_id: thread_id.into(),
        }
    }
}

#[async_trait]
impl Tool for TaskAddNoteTool {
    fn name(&self) -> &str {
        "task_add_note"
    }

    fn description(&self) -> &str {
        "Append a progress note to a task without changing its status."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task_id": {"type": "string"},
                "note": {"type": "string"}
            },
            "required": ["task_id", "note"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(task_id) = call.args.get("task_id").and_then(|v| v.as_str()) else {
            return missing_param(call, "task_id");
        };
        let Some(content) = call.args.get("note").and_then(|v| v.as_str()) else {
            return missing_param(call, "note");
        };

        match self.store.add_note(task_id, &self.thread_id, content).await {
            Ok(_) => ToolOutput::ok(&call.id, "note added"),
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}
