// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Centralised tool-registry builder.
//!
//! All callers (the demo binary, sub-agents spawned via [`crate::task_tool::DelegateTool`])
//! use `build_tool_registry` with the appropriate [`ToolSetProfile`] instead of
//! each inlining their own registration loop.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use sven_config::{AgentMode, Config};
use sven_core::AgentRuntimeContext;
use sven_model::ModelProvider;
use sven_scheduler::{
    TaskAddNoteTool, TaskAddTool, TaskCompleteTool, TaskListTool, TaskStore, TaskUpdateTool,
    TaskViewTool,
};
use sven_tools::{
    events::ToolEvent,
    DeleteFileTool, EditFileTool, FsTool, GrepTool, ListDirTool, ReadFileTool,
    RunTerminalCommandTool, ToolRegistry, WriteTool,
};

use crate::context::ToolSetProfile;
use crate::task_tool::DelegateTool;

/// Build a [`ToolRegistry`] populated according to the given `profile`.
///
/// This is the single canonical place where tools are wired up.  Adding a
/// new tool to sven means adding it here once and it will appear in every
/// appropriate profile automatically.
///
/// `mode_lock` and `tool_event_tx` are the same shared instances passed to
/// `Agent::new()`; tools that need to signal the agent loop (none of the
/// current built-ins do, but stateful future tools will) send on this
/// channel.
pub fn build_tool_registry(
    cfg: &Config,
    model: Arc<dyn ModelProvider>,
    profile: ToolSetProfile,
    _mode_lock: Arc<Mutex<AgentMode>>,
    _tool_event_tx: mpsc::Sender<ToolEvent>,
    sub_agent_runtime: AgentRuntimeContext,
) -> ToolRegistry {
    build_tool_registry_with_tasks(
        cfg,
        model,
        profile,
        _mode_lock,
        _tool_event_tx,
        sub_agent_runtime,
        None,
    )
}

/// Same as [`build_tool_registry`], additionally wiring the `task_*` tools
/// when the caller supplies a [`TaskStore`] and the thread they should be
/// scoped to (`task_list filter: mine/created` reads relative to this
/// thread). A session passes its shared Task Store here so every agent it
/// spawns — coordinator and delegates alike — can read and mutate the same
/// shared task list (spec §4.F); standalone agents built without a session
/// (e.g. the demo binary) omit it and simply don't get task tools.
pub fn build_tool_registry_with_tasks(
    cfg: &Config,
    model: Arc<dyn ModelProvider>,
    profile: ToolSetProfile,
    _mode_lock: Arc<Mutex<AgentMode>>,
    _tool_event_tx: mpsc::Sender<ToolEvent>,
    sub_agent_runtime: AgentRuntimeContext,
    tasks: Option<(Arc<TaskStore>, String)>,
) -> ToolRegistry {
    let mut reg = ToolRegistry::new();

    reg.register(ReadFileTool);
    reg.register(ListDirTool);
    reg.register(FsTool);
    reg.register(GrepTool);
    reg.register(WriteTool);
    reg.register(EditFileTool);
    reg.register(DeleteFileTool);
    reg.register(RunTerminalCommandTool {
        timeout_secs: cfg.tools.timeout_secs,
    });

    if let Some((store, thread_id)) = tasks {
        reg.register(TaskAddTool::new(store.clone(), thread_id.clone()));
        reg.register(TaskListTool::new(store.clone(), thread_id.clone()));
        reg.register(TaskViewTool::new(store.clone()));
        reg.register(TaskUpdateTool::new(store.clone()));
        reg.register(TaskCompleteTool::new(store.clone(), thread_id.clone()));
        reg.register(TaskAddNoteTool::new(store, thread_id));
    }

    if let ToolSetProfile::Full { delegate_depth } = profile {
        reg.register(DelegateTool::new(
            model,
            Arc::new(cfg.clone()),
            delegate_depth,
            sub_agent_runtime,
        ));
    }

    reg
}
