// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Data types for the thread event store (spec §3 `Thread`, `ThreadEvent`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::ThreadId;

/// Well-known thread metadata keys, with passthrough for arbitrary keys the
/// caller wants to stash (spec §3: "metadata (map of string -> value)").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreadMetadata {
    pub name: Option<String>,
    #[serde(default)]
    pub is_session: bool,
    pub provider_instance_id: Option<String>,
    pub model_id: Option<String>,
    #[serde(default)]
    pub is_agent: bool,
    /// Arbitrary extra keys not promoted to a named field.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ThreadMetadata {
    pub fn session(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            is_session: true,
            ..Default::default()
        }
    }

    pub fn agent(provider_instance_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            is_agent: true,
            provider_instance_id: Some(provider_instance_id.into()),
            model_id: Some(model_id.into()),
            ..Default::default()
        }
    }

    /// Shallow merge: fields set in `partial` overwrite `self`'s; `extra`
    /// keys merge field-wise (matching spec §4.A's `updateMetadata(partial)`).
    pub fn merge(&mut self, partial: ThreadMetadata) {
        if partial.name.is_some() {
            self.name = partial.name;
        }
        if partial.is_session {
            self.is_session = true;
        }
        if partial.provider_instance_id.is_some() {
            self.provider_instance_id = partial.provider_instance_id;
        }
        if partial.model_id.is_some() {
            self.model_id = partial.model_id;
        }
        if partial.is_agent {
            self.is_agent = true;
        }
        for (k, v) in partial.extra {
            self.extra.insert(k, v);
        }
    }
}

/// A thread: linear ordered log of events, identified by a hierarchical id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub parent_thread_id: Option<ThreadId>,
    pub project_id: Option<String>,
    pub metadata: ThreadMetadata,
    pub created_at: DateTime<Utc>,
}

/// Thread event discriminant (spec §3). `#[serde(tag = "type")]` so
/// persisted JSON self-describes its payload shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "USER_MESSAGE")]
    UserMessage,
    #[serde(rename = "AGENT_MESSAGE")]
    AgentMessage,
    #[serde(rename = "AGENT_THINKING")]
    AgentThinking,
    #[serde(rename = "TOOL_CALL")]
    ToolCall,
    #[serde(rename = "TOOL_RESULT")]
    ToolResult,
    #[serde(rename = "LOCAL_SYSTEM_MESSAGE")]
    LocalSystemMessage,
    #[serde(rename = "TURN_START")]
    TurnStart,
    #[serde(rename = "TURN_COMPLETE")]
    TurnComplete,
    #[serde(rename = "TURN_ABORTED")]
    TurnAborted,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::UserMessage => "USER_MESSAGE",
            EventType::AgentMessage => "AGENT_MESSAGE",
            EventType::AgentThinking => "AGENT_THINKING",
            EventType::ToolCall => "TOOL_CALL",
            EventType::ToolResult => "TOOL_RESULT",
            EventType::LocalSystemMessage => "LOCAL_SYSTEM_MESSAGE",
            EventType::TurnStart => "TURN_START",
            EventType::TurnComplete => "TURN_COMPLETE",
            EventType::TurnAborted => "TURN_ABORTED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "USER_MESSAGE" => EventType::UserMessage,
            "AGENT_MESSAGE" => EventType::AgentMessage,
            "AGENT_THINKING" => EventType::AgentThinking,
            "TOOL_CALL" => EventType::ToolCall,
            "TOOL_RESULT" => EventType::ToolResult,
            "LOCAL_SYSTEM_MESSAGE" => EventType::LocalSystemMessage,
            "TURN_START" => EventType::TurnStart,
            "TURN_COMPLETE" => EventType::TurnComplete,
            "TURN_ABORTED" => EventType::TurnAborted,
            _ => return None,
        })
    }

    /// `true` for the two event types that terminate a `TURN_START`.
    pub fn is_turn_terminal(&self) -> bool {
        matches!(self, EventType::TurnComplete | EventType::TurnAborted)
    }
}

/// One append-only record in a thread's event log.
///
/// `id` is monotonic *within a thread* (spec §3) — the store assigns it as
/// the per-thread sequence number at append time; it is not a global id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadEvent {
    pub id: u64,
    pub thread_id: ThreadId,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl ThreadEvent {
    /// For a `TOOL_RESULT` event, the `TOOL_CALL` id it cites (spec §3
    /// invariant: "`TOOL_RESULT` must cite a prior `TOOL_CALL` id in the
    /// same thread"). `None` if this isn't a tool-result event or the
    /// payload lacks the field.
    pub fn tool_call_id(&self) -> Option<&str> {
        if self.event_type != EventType::ToolResult {
            return None;
        }
        self.data.get("toolCallId").and_then(Value::as_str)
    }
}
