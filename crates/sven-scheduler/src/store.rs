// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! [`TaskStore`] — tasks/task_notes CRUD (spec §4.B), sharing the
//! connection `sven-memory::ThreadStore` opens.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use sven_memory::SharedConnection;

use crate::assignee::Assignee;
use crate::error::{Result, SchedulerError};
use crate::ids::new_task_id;
use crate::retry::with_busy_retry;
use crate::sink::{NullSink, TaskAssignmentSink};
use crate::types::{NewTask, Task, TaskNote, TaskPriority, TaskStatus, MAX_BULK_TASKS, MIN_BULK_TASKS};

/// Which tasks `task_list`/`byFilter` should return (spec §6 `task_list`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskFilter {
    /// Tasks assigned to the caller's thread.
    Mine,
    /// Tasks the caller's thread created.
    Created,
    /// Tasks scoped to the caller's parent thread (its own task list).
    Thread,
    /// Every task visible to the store.
    All,
}

#[derive(Debug, Clone)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub assigned_to: Option<Option<Assignee>>,
    pub priority: Option<TaskPriority>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub prompt: Option<String>,
}

impl TaskUpdate {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.assigned_to.is_none()
            && self.priority.is_none()
            && self.title.is_none()
            && self.description.is_none()
            && self.prompt.is_none()
    }
}

pub struct TaskStore {
    conn: SharedConnection,
    sink: Arc<dyn TaskAssignmentSink>,
}

impl TaskStore {
    pub fn new(conn: SharedConnection) -> Self {
        Self {
            conn,
            sink: Arc::new(NullSink),
        }
    }

    pub fn with_sink(conn: SharedConnection, sink: Arc<dyn TaskAssignmentSink>) -> Self {
        Self { conn, sink }
    }

    /// Create 1..=20 tasks in one call (spec §6 `task_add`). Each task's
    /// assignee is validated and, if it resolves to `new:<type>/<model>`,
    /// the assignment sink is notified after the row is durably written.
    pub async fn create_tasks(
        &self,
        created_by: &str,
        thread_id: &str,
        tasks: Vec<NewTask>,
    ) -> Result<Vec<Task>> {
        if tasks.len() < MIN_BULK_TASKS {
            return Err(SchedulerError::Validation(format!(
                "task_add requires at least {MIN_BULK_TASKS} task"
            )));
        }
        if tasks.len() > MAX_BULK_TASKS {
            return Err(SchedulerError::Validation(format!(
                "task_add accepts no more than {MAX_BULK_TASKS} tasks, got more than {MAX_BULK_TASKS}"
            )));
        }
        for t in &tasks {
            t.validate()?;
        }

        let mut created = Vec::with_capacity(tasks.len());
        for new_task in tasks {
            created.push(
                self.create_task(created_by, thread_id, new_task).await?,
            );
        }
        Ok(created)
    }

    async fn create_task(&self, created_by: &str, thread_id: &str, new_task: NewTask) -> Result<Task> {
        new_task.validate()?;
        let assigned_to = new_task
            .assigned_to
            .as_deref()
            .map(Assignee::parse)
            .transpose()?;
        let now = Utc::now();
        let task = Task {
            id: new_task_id(),
            title: new_task.title,
            description: new_task.description,
            prompt: new_task.prompt,
            status: TaskStatus::Pending,
            priority: new_task.priority,
            assigned_to,
            created_by: created_by.to_string(),
            thread_id: thread_id.to_string(),
            created_at: now,
            updated_at: now,
            notes: Vec::new(),
        };

        let conn = self.conn.clone();
        let row = task.clone();
        with_busy_retry(move || {
            let conn = conn.lock().expect("task store mutex poisoned");
            conn.execute(
                "INSERT INTO tasks (id, title, description, prompt, status, priority,
                    assigned_to, created_by, thread_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    row.id,
                    row.title,
                    row.description,
                    row.prompt,
                    row.status.as_str(),
                    row.priority.as_str(),
                    row.assigned_to.as_ref().map(Assignee::to_raw),
                    row.created_by,
                    row.thread_id,
                    row.created_at.to_rfc3339(),
                    row.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await?;

        if let Some(Assignee::NewAgent {
            provider_type,
            model_id,
        }) = &task.assigned_to
        {
            self.sink.on_task_assigned(provider_type, model_id, &task).await;
        }

        Ok(task)
    }

    pub async fn by_id(&self, id: &str) -> Result<Task> {
        let conn = self.conn.clone();
        let id = id.to_string();
        with_busy_retry(move || {
            let conn = conn.lock().expect("task store mutex poisoned");
            let mut task = query_task_row(&conn, &id)?
                .ok_or_else(|| SchedulerError::TaskNotFound(id.clone()))?;
            task.notes = query_notes(&conn, &id)?;
            Ok(task)
        })
        .await
    }

    pub async fn by_thread(&self, parent_thread_id: &str) -> Result<Vec<Task>> {
        let conn = self.conn.clone();
        let thread_id = parent_thread_id.to_string();
        with_busy_retry(move || {
            let conn = conn.lock().expect("task store mutex poisoned");
            query_tasks(&conn, "WHERE thread_id = ?1", params![thread_id])
        })
        .await
    }

    pub async fn by_assignee(&self, assignee_id: &str) -> Result<Vec<Task>> {
        let conn = self.conn.clone();
        let assignee_id = assignee_id.to_string();
        with_busy_retry(move || {
            let conn = conn.lock().expect("task store mutex poisoned");
            query_tasks(&conn, "WHERE assigned_to = ?1", params![assignee_id])
        })
        .await
    }

    /// `byFilter({mine|created|thread|all}, includeCompleted)` (spec §4.B).
    /// `caller_thread_id` identifies the requesting thread for `mine` (as
    /// assignee) and `created` (as creator); `thread` uses `scope_thread_id`
    /// (the parent thread whose task list is being read).
    pub async fn by_filter(
        &self,
        filter: TaskFilter,
        caller_thread_id: &str,
        scope_thread_id: &str,
        include_completed: bool,
    ) -> Result<Vec<Task>> {
        let mut tasks = match filter {
            TaskFilter::Mine => self.by_assignee(caller_thread_id).await?,
            TaskFilter::Created => self.by_created(caller_thread_id).await?,
            TaskFilter::Thread => self.by_thread(scope_thread_id).await?,
            TaskFilter::All => self.all().await?,
        };
        if !include_completed {
            tasks.retain(|t| t.status != TaskStatus::Completed);
        }
        sort_by_priority_then_recency(&mut tasks);
        Ok(tasks)
    }

    async fn by_created(&self, created_by: &str) -> Result<Vec<Task>> {
        let conn = self.conn.clone();
        let created_by = created_by.to_string();
        with_busy_retry(move || {
            let conn = conn.lock().expect("task store mutex poisoned");
            query_tasks(&conn, "WHERE created_by = ?1", params![created_by])
        })
        .await
    }

    async fn all(&self) -> Result<Vec<Task>> {
        let conn = self.conn.clone();
        with_busy_retry(move || {
            let conn = conn.lock().expect("task store mutex poisoned");
            query_tasks(&conn, "", params![])
        })
        .await
    }

    /// `updateTask(partial)` — bumps `updated_at`; re-notifies the
    /// assignment sink if the assignee changed to `new:<type>/<model>`.
    pub async fn update_task(&self, id: &str, update: TaskUpdate) -> Result<Task> {
        if update.is_empty() {
            return Err(SchedulerError::Validation(
                "task_update requires at least one mutable field".into(),
            ));
        }
        if let Some(status) = update.status {
            let current = self.by_id(id).await?;
            if !current.status.can_transition_to(status) {
                return Err(SchedulerError::Validation(format!(
                    "cannot transition task {id} from {:?} to {:?}",
                    current.status, status
                )));
            }
        }

        let conn = self.conn.clone();
        let id_owned = id.to_string();
        let update_clone = update.clone();
        with_busy_retry(move || {
            let conn = conn.lock().expect("task store mutex poisoned");
            let now = Utc::now().to_rfc3339();
            if let Some(status) = update_clone.status {
                conn.execute(
                    "UPDATE tasks SET status = ?1, updated_at = ?2 WHERE id = ?3",
                    params![status.as_str(), now, id_owned],
                )?;
            }
            if let Some(assigned_to) = &update_clone.assigned_to {
                conn.execute(
                    "UPDATE tasks SET assigned_to = ?1, updated_at = ?2 WHERE id = ?3",
                    params![assigned_to.as_ref().map(Assignee::to_raw), now, id_owned],
                )?;
            }
            if let Some(priority) = update_clone.priority {
                conn.execute(
                    "UPDATE tasks SET priority = ?1, updated_at = ?2 WHERE id = ?3",
                    params![priority.as_str(), now, id_owned],
                )?;
            }
            if let Some(title) = &update_clone.title {
                conn.execute(
                    "UPDATE tasks SET title = ?1, updated_at = ?2 WHERE id = ?3",
                    params![title, now, id_owned],
                )?;
            }
            if let Some(description) = &update_clone.description {
                conn.execute(
                    "UPDATE tasks SET description = ?1, updated_at = ?2 WHERE id = ?3",
                    params![description, now, id_owned],
                )?;
            }
            if let Some(prompt) = &update_clone.prompt {
                conn.execute(
                    "UPDATE tasks SET prompt = ?1, updated_at = ?2 WHERE id = ?3",
                    params![prompt, now, id_owned],
                )?;
            }
            Ok(())
        })
        .await?;

        let task = self.by_id(id).await?;
        if let Some(Some(Assignee::NewAgent {
            provider_type,
            model_id,
        })) = &update.assigned_to
        {
            self.sink.on_task_assigned(provider_type, model_id, &task).await;
        }
        Ok(task)
    }

    /// `task_complete` (spec §6): append `message` as a note, then mark the
    /// task `completed`.
    pub async fn complete_task(&self, id: &str, author: &str, message: &str) -> Result<Task> {
        self.add_note(id, author, message).await?;
        self.update_task(
            id,
            TaskUpdate {
                status: Some(TaskStatus::Completed),
                assigned_to: None,
                priority: None,
                title: None,
                description: None,
                prompt: None,
            },
        )
        .await
    }

    pub async fn add_note(&self, task_id: &str, author: &str, content: &str) -> Result<TaskNote> {
        if content.is_empty() {
            return Err(SchedulerError::Validation("note content must not be empty".into()));
        }
        let note = TaskNote {
            id: uuid::Uuid::new_v4().to_string(),
            author: author.to_string(),
            content: content.to_string(),
            timestamp: Utc::now(),
        };
        let conn = self.conn.clone();
        let task_id = task_id.to_string();
        let row = note.clone();
        with_busy_retry(move || {
            let conn = conn.lock().expect("task store mutex poisoned");
            conn.execute(
                "INSERT INTO task_notes (id, task_id, author, content, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![row.id, task_id, row.author, row.content, row.timestamp.to_rfc3339()],
            )?;
            conn.execute(
                "UPDATE tasks SET updated_at = ?1 WHERE id = ?2",
                params![Utc::now().to_rfc3339(), task_id],
            )?;
            Ok(())
        })
        .await?;
        Ok(note)
    }
}

fn sort_by_priority_then_recency(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
}

fn row_to_task(r: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let id: String = r.get(0)?;
    let title: String = r.get(1)?;
    let description: String = r.get(2)?;
    let prompt: String = r.get(3)?;
    let status_s: String = r.get(4)?;
    let priority_s: String = r.get(5)?;
    let assigned_to_s: Option<String> = r.get(6)?;
    let created_by: String = r.get(7)?;
    let thread_id: String = r.get(8)?;
    let created_at_s: String = r.get(9)?;
    let updated_at_s: String = r.get(10)?;

    Ok(Task {
        id,
        title,
        description,
        prompt,
        status: TaskStatus::from_str(&status_s).unwrap_or(TaskStatus::Pending),
        priority: TaskPriority::from_str(&priority_s).unwrap_or_default(),
        assigned_to: assigned_to_s.and_then(|s| Assignee::parse(&s).ok()),
        created_by,
        thread_id,
        created_at: created_at_s.parse().unwrap_or_else(|_| Utc::now()),
        updated_at: updated_at_s.parse().unwrap_or_else(|_| Utc::now()),
        notes: Vec::new(),
    })
}

fn query_tasks(
    conn: &rusqlite::Connection,
    where_clause: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Task>> {
    let sql = format!(
        "SELECT id, title, description, prompt, status, priority, assigned_to,
            created_by, thread_id, created_at, updated_at FROM tasks {where_clause}"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params, row_to_task)?;
    let mut out = Vec::new();
    for row in rows {
        let mut task = row?;
        task.notes = query_notes(conn, &task.id)?;
        out.push(task);
    }
    Ok(out)
}

fn query_task_row(conn: &rusqlite::Connection, id: &str) -> Result<Option<Task>> {
    conn.query_row(
        "SELECT id, title, description, prompt, status, priority, assigned_to,
            created_by, thread_id, created_at, updated_at FROM tasks WHERE id = ?1",
        params![id],
        row_to_task,
    )
    .optional()
    .map_err(SchedulerError::from)
}

fn query_notes(conn: &rusqlite::Connection, task_id: &str) -> Result<Vec<TaskNote>> {
    let mut stmt = conn.prepare(
        "SELECT id, author, content, timestamp FROM task_notes WHERE task_id = ?1 ORDER BY timestamp",
    )?;
    let rows = stmt.query_map(params![task_id], |r| {
        Ok((
            r.get::<_, String>(0)?,
            r.get::<_, String>(1)?,
            r.get::<_, String>(2)?,
            r.get::<_, String>(3)?,
        ))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (id, author, content, timestamp) = row?;
        out.push(TaskNote {
            id,
            author,
            content,
            timestamp: timestamp.parse().unwrap_or_else(|_| Utc::now()),
        });
    }
    Ok(out)
}
