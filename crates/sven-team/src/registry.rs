// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! [`SessionRegistry`] — owns the shared `ThreadStore`/`TaskStore`/
//! `SessionStore` and creates/looks up [`Session`]s (spec §4.F).
//!
//! One `TaskStore` backs every session in the process (tasks are rows keyed
//! by the thread that created them, not partitioned per session), so its
//! `TaskAssignmentSink` can't simply *be* a `Session` — a task assigned to
//! `new:<type>/<model>` might belong to any of them. [`RegistryTaskSink`]
//! resolves `task.thread_id`'s session root and dispatches there, which
//! also sidesteps the `Session` <-> `TaskStore` ownership cycle a
//! sink-is-a-session design would hit: the registry holds both, a
//! `Weak<SessionRegistry>` is all the sink needs.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;

use sven_config::Config;
use sven_memory::{ThreadId, ThreadStore};
use sven_scheduler::{Task, TaskAssignmentSink, TaskStore};
use sven_tools::ApprovalCallback;

use crate::error::{Result, TeamError};
use crate::session::Session;
use crate::store::SessionStore;

pub struct SessionRegistry {
    thread_store: Arc<ThreadStore>,
    task_store: Arc<TaskStore>,
    session_store: SessionStore,
    project_config: Arc<Config>,
    sessions: AsyncMutex<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    /// Open (or create) the on-disk store backing threads, tasks, and
    /// sessions.
    pub fn open(path: impl AsRef<Path>, project_config: Arc<Config>) -> Result<Arc<Self>> {
        let thread_store = Arc::new(ThreadStore::open(path)?);
        Ok(Self::from_thread_store(thread_store, project_config))
    }

    /// In-memory store, for tests and the demo binary.
    pub fn open_in_memory(project_config: Arc<Config>) -> Result<Arc<Self>> {
        let thread_store = Arc::new(ThreadStore::open_in_memory()?);
        Ok(Self::from_thread_store(thread_store, project_config))
    }

    fn from_thread_store(thread_store: Arc<ThreadStore>, project_config: Arc<Config>) -> Arc<Self> {
        let conn = thread_store.connection();
        let session_store = SessionStore::new(conn.clone());
        Arc::new_cyclic(|weak: &Weak<SessionRegistry>| {
            let sink: Arc<dyn TaskAssignmentSink> = Arc::new(RegistryTaskSink {
                registry: weak.clone(),
            });
            let task_store = Arc::new(TaskStore::with_sink(conn, sink));
            Self {
                thread_store,
                task_store,
                session_store,
                project_config,
                sessions: AsyncMutex::new(HashMap::new()),
            }
        })
    }

    pub fn thread_store(&self) -> Arc<ThreadStore> {
        self.thread_store.clone()
    }

    pub fn task_store(&self) -> Arc<TaskStore> {
        self.task_store.clone()
    }

    /// Create a new session: persist its row, create its root thread, and
    /// build its coordinator agent.
    pub async fn create_session(
        self: &Arc<Self>,
        name: impl Into<String>,
        description: impl Into<String>,
        project_id: Option<String>,
        configuration: serde_json::Value,
        approval_callback: Arc<dyn ApprovalCallback>,
    ) -> Result<Arc<Session>> {
        let id = crate::ids::new_session_id();
        let record = self
            .session_store
            .create(id.clone(), project_id, name.into(), description.into(), configuration)
            .await?;

        let session = Session::bootstrap(
            record,
            &self.project_config,
            self.thread_store.clone(),
            self.task_store.clone(),
            approval_callback,
        )
        .await?;

        self.sessions.lock().await.insert(id, session.clone());
        Ok(session)
    }

    pub async fn get_session(&self, id: &str) -> Result<Arc<Session>> {
        self.sessions
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| TeamError::SessionNotFound(id.to_string()))
    }

    pub async fn list_sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.lock().await.values().cloned().collect()
    }

    pub async fn archive_session(&self, id: &str) -> Result<()> {
        self.session_store
            .update_status(id, crate::types::SessionStatus::Archived)
            .await?;
        Ok(())
    }
}

/// Bridges `sven_scheduler::TaskStore`'s assignment callback to whichever
/// loaded session owns the task's thread.
struct RegistryTaskSink {
    registry: Weak<SessionRegistry>,
}

#[async_trait]
impl TaskAssignmentSink for RegistryTaskSink {
    async fn on_task_assigned(&self, provider_type: &str, model_id: &str, task: &Task) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let Ok(thread_id) = ThreadId::from_raw(task.thread_id.as_str()) else {
            tracing::warn!(task_id = %task.id, thread_id = %task.thread_id, "task has malformed thread id");
            return;
        };
        let session_id = thread_id.root_id();
        let session = registry.sessions.lock().await.get(session_id.as_str()).cloned();
        match session {
            Some(session) => session.spawn_delegate_for_task(provider_type, model_id, task).await,
            None => {
                tracing::warn!(
                    task_id = %task.id,
                    session_id = %session_id,
                    "task assigned to new agent but its owning session is not loaded"
                );
            }
        }
    }
}
