// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! [`Session`] — a coordinator thread plus its delegate agents (spec §4.F,
//! §3 `Session`).
//!
//! A session's root thread id (its `SessionRecord.id`) is also the
//! coordinator agent's `ThreadId`. `spawn_agent` adds named delegates as
//! children of that root; `sven_scheduler::TaskStore` drives the same path
//! when a task is assigned to `new:<providerType>/<modelId>`
//! ([`crate::registry::SessionRegistry`] bridges that callback in).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::json;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use sven_bootstrap::{AgentBuilder, RuntimeContext, ToolSetProfile};
use sven_config::Config;
use sven_core::{Agent, AgentEvent};
use sven_memory::{EventType, ThreadEvent, ThreadId, ThreadMetadata, ThreadStore};
use sven_scheduler::{Task, TaskStore};
use sven_tools::{ApprovalCallback, ApprovalGate};

use crate::bridge;
use crate::error::{Result, TeamError};
use crate::types::SessionRecord;

/// A coordinator thread and the named delegate agents spawned under it.
///
/// Every agent the session owns (coordinator included) shares one
/// [`ApprovalGate`] — an `allow_session` decision for a tool made by the
/// coordinator also covers a delegate calling the same tool, matching spec
/// §4.G's "session handle" scoping.
pub struct Session {
    id: String,
    root: ThreadId,
    name: String,
    config: Config,
    thread_store: Arc<ThreadStore>,
    task_store: Arc<TaskStore>,
    approval: Arc<ApprovalGate>,
    agents: AsyncMutex<HashMap<String, Arc<AsyncMutex<Agent>>>>,
    next_child: AtomicU64,
}

impl Session {
    /// Persist the root thread, build the coordinator agent, and return the
    /// constructed session. `record` must already be durably written to the
    /// `sessions` table — callers go through
    /// [`crate::registry::SessionRegistry::create_session`] rather than this
    /// directly.
    pub(crate) async fn bootstrap(
        record: SessionRecord,
        project_config: &Config,
        thread_store: Arc<ThreadStore>,
        task_store: Arc<TaskStore>,
        approval_callback: Arc<dyn ApprovalCallback>,
    ) -> Result<Arc<Self>> {
        let config = crate::config_merge::merge_config(project_config, &record.configuration)?;
        let root = ThreadId::root(record.id.clone()).map_err(TeamError::Memory)?;
        thread_store
            .create_thread(root.clone(), None, record.project_id.clone())
            .await?;
        let approval = Arc::new(ApprovalGate::new(record.id.clone(), approval_callback));

        let session = Arc::new(Self {
            id: record.id.clone(),
            root: root.clone(),
            name: record.name.clone(),
            config,
            thread_store,
            task_store,
            approval,
            agents: AsyncMutex::new(HashMap::new()),
            next_child: AtomicU64::new(1),
        });

        let coordinator_name = Some(session.name.clone());
        session
            .spawn_agent_on_thread(root, None, coordinator_name, None)
            .await?;

        Ok(session)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn root_thread(&self) -> &ThreadId {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn thread_store(&self) -> Arc<ThreadStore> {
        self.thread_store.clone()
    }

    pub fn task_store(&self) -> Arc<TaskStore> {
        self.task_store.clone()
    }

    pub fn approval(&self) -> Arc<ApprovalGate> {
        self.approval.clone()
    }

    pub async fn has_agent(&self, thread_id: &ThreadId) -> bool {
        self.agents.lock().await.contains_key(thread_id.as_str())
    }

    pub async fn agent_thread_ids(&self) -> Vec<String> {
        self.agents.lock().await.keys().cloned().collect()
    }

    pub async fn events(&self, thread_id: &ThreadId) -> Result<Vec<ThreadEvent>> {
        Ok(self.thread_store.list_events(thread_id).await?)
    }

    /// Spawn a named delegate agent as a child of the coordinator thread
    /// (spec §3 `Session.spawnAgent({name?, providerInstanceId?, modelId?})`).
    ///
    /// `model_override` follows `sven_model::resolve_model_from_config`'s
    /// grammar (`"provider/model"`, a bare provider id, or a bare model
    /// name); `None` uses the session's configured default model.
    pub async fn spawn_agent(
        self: &Arc<Self>,
        name: Option<String>,
        model_override: Option<&str>,
    ) -> Result<ThreadId> {
        let idx = self.next_child.fetch_add(1, Ordering::SeqCst);
        let thread_id = self.root.child(idx);
        self.spawn_agent_on_thread(thread_id.clone(), Some(self.root.clone()), name, model_override)
            .await?;
        Ok(thread_id)
    }

    /// Called by [`crate::registry::SessionRegistry`]'s `TaskAssignmentSink`
    /// when a task owned by this session is assigned to
    /// `new:<providerType>/<modelId>` (spec §4.B/§4.F). Spawns the delegate,
    /// then asynchronously delivers an initial directive describing the
    /// task so task creation itself is not blocked on a full agent turn.
    pub(crate) async fn spawn_delegate_for_task(self: &Arc<Self>, provider_type: &str, model_id: &str, task: &Task) {
        let name = format!("task:{}", task.id);
        let model_override = format!("{provider_type}/{model_id}");
        let thread_id = match self.spawn_agent(Some(name), Some(&model_override)).await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(task_id = %task.id, error = %e, "failed to spawn delegate for task assignment");
                return;
            }
        };

        let directive = format!(
            "You have been assigned task `{}`: {}\n\n{}\n\n\
             Use the task_view/task_update/task_add_note/task_complete tools to track \
             your progress on it. Your instructions:\n{}",
            task.id, task.title, task.description, task.prompt,
        );

        let session = self.clone();
        tokio::spawn(async move {
            match session.submit(&thread_id, &directive).await {
                Ok(mut rx) => while rx.recv().await.is_some() {},
                Err(e) => {
                    tracing::warn!(task_id = %task.id, error = %e, "failed to deliver initial task directive")
                }
            }
        });
    }

    /// Push a user message onto `thread_id`'s agent and drive one turn.
    /// Events are persisted to the thread's log as they arrive and also
    /// forwarded live through the returned receiver.
    pub async fn submit(self: &Arc<Self>, thread_id: &ThreadId, user_input: &str) -> Result<mpsc::Receiver<AgentEvent>> {
        let agent = {
            let agents = self.agents.lock().await;
            agents
                .get(thread_id.as_str())
                .cloned()
                .ok_or_else(|| TeamError::AgentNotFound(thread_id.as_str().to_string()))?
        };

        self.thread_store
            .append_event(thread_id, EventType::UserMessage, json!({ "text": user_input }))
            .await?;

        let token_account = agent.lock().await.token_account();
        let turn_id = uuid::Uuid::new_v4().to_string();
        let metrics = bridge::metrics_snapshot(&token_account).await;
        self.thread_store
            .append_event(
                thread_id,
                EventType::TurnStart,
                json!({ "turnId": turn_id, "metrics": metrics }),
            )
            .await?;
        let (tx_internal, rx_internal) = mpsc::channel(64);
        let (tx_external, rx_external) = mpsc::channel(64);

        tokio::spawn(bridge::drain_and_persist(
            self.thread_store.clone(),
            thread_id.clone(),
            token_account,
            rx_internal,
            tx_external,
        ));

        let user_input = user_input.to_string();
        let submit_thread_id = thread_id.clone();
        tokio::spawn(async move {
            let mut agent = agent.lock().await;
            if let Err(e) = agent.submit(&user_input, tx_internal).await {
                tracing::warn!(thread_id = %submit_thread_id, error = %e, "agent turn failed");
            }
        });

        Ok(rx_external)
    }

    async fn spawn_agent_on_thread(
        self: &Arc<Self>,
        thread_id: ThreadId,
        parent: Option<ThreadId>,
        name: Option<String>,
        model_override: Option<&str>,
    ) -> Result<()> {
        let model_cfg = match model_override {
            Some(o) => sven_model::resolve_model_from_config(&self.config, o),
            None => self.config.model.clone(),
        };
        let provider: Arc<dyn sven_model::ModelProvider> =
            Arc::from(sven_model::from_config(&model_cfg).map_err(TeamError::Model)?);

        if thread_id != self.root {
            self.thread_store
                .create_thread(thread_id.clone(), parent.clone(), None)
                .await?;
        }

        let mut metadata = ThreadMetadata::agent(model_cfg.provider.clone(), model_cfg.name.clone());
        if thread_id == self.root {
            metadata.is_session = true;
        }
        if let Some(n) = &name {
            metadata.name = Some(n.clone());
        }
        self.thread_store.update_metadata(&thread_id, metadata).await?;

        let mut builder = AgentBuilder::new(Arc::new(self.config.clone()))
            .with_runtime_context(RuntimeContext::auto_detect())
            .with_thread(thread_id.as_str())
            .with_task_store(self.task_store.clone());
        if let Some(p) = &parent {
            builder = builder.with_parent_thread(p.as_str());
        }

        let delegate_depth = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let agent = builder
            .build(
                self.config.agent.default_mode,
                provider,
                ToolSetProfile::Full { delegate_depth },
            )
            .with_approval(self.approval.clone());

        self.agents
            .lock()
            .await
            .insert(thread_id.as_str().to_string(), Arc::new(AsyncMutex::new(agent)));
        Ok(())
    }
}
