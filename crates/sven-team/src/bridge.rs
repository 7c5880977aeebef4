// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Bridges a running [`sven_core::Agent`]'s turn events into its thread's
//! append-only event log (spec §4.F: "the Session persists each agent's
//! turn as `ThreadEvent`s as it streams").
//!
//! Streaming-only signals (`TextDelta`, `ThinkingDelta`/`ThinkingComplete`,
//! `TokenUsage`, `ContextCompacted`, `TodoUpdate`, `ModeChanged`,
//! `Question`/`QuestionAnswer`) are forwarded to the live subscriber but not
//! separately persisted — a UI needs them as they happen, but the durable
//! record of a turn is its tool calls/results and its final message, not
//! every chunk that composed it.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::{mpsc, Mutex};

use sven_core::{AgentEvent, TokenAccount};
use sven_memory::{EventType, ThreadId, ThreadStore};

/// Drain `rx`, persisting each event to `thread_id`'s log and forwarding a
/// copy to `tx` for a live subscriber. Exits when `rx` closes or `tx`'s
/// receiver is dropped, whichever comes first.
pub(crate) async fn drain_and_persist(
    thread_store: Arc<ThreadStore>,
    thread_id: ThreadId,
    token_account: Arc<Mutex<TokenAccount>>,
    mut rx: mpsc::Receiver<AgentEvent>,
    tx: mpsc::Sender<AgentEvent>,
) {
    while let Some(event) = rx.recv().await {
        if let Err(e) = persist_event(&thread_store, &thread_id, &event, &token_account).await {
            tracing::warn!(thread_id = %thread_id, error = %e, "failed to persist agent event");
        }
        if tx.send(event).await.is_err() {
            break;
        }
    }
}

async fn persist_event(
    store: &ThreadStore,
    thread_id: &ThreadId,
    event: &AgentEvent,
    token_account: &Arc<Mutex<TokenAccount>>,
) -> sven_memory::Result<()> {
    match event {
        AgentEvent::ToolCallStarted(call) => {
            store
                .append_event(
                    thread_id,
                    EventType::ToolCall,
                    json!({ "id": call.id, "name": call.name, "args": call.args }),
                )
                .await?;
        }
        AgentEvent::ToolCallFinished {
            call_id,
            tool_name,
            output,
            is_error,
        } => {
            store
                .append_event(
                    thread_id,
                    EventType::ToolResult,
                    json!({
                        "toolCallId": call_id,
                        "name": tool_name,
                        "output": output,
                        "isError": is_error,
                    }),
                )
                .await?;
        }
        AgentEvent::TextComplete(text) => {
            store
                .append_event(thread_id, EventType::AgentMessage, json!({ "text": text }))
                .await?;
        }
        AgentEvent::TurnComplete => {
            let metrics = metrics_snapshot(token_account).await;
            store
                .append_event(
                    thread_id,
                    EventType::TurnComplete,
                    json!({ "metrics": metrics }),
                )
                .await?;
        }
        AgentEvent::Aborted { partial_text } => {
            let metrics = metrics_snapshot(token_account).await;
            store
                .append_event(
                    thread_id,
                    EventType::TurnAborted,
                    json!({ "partialText": partial_text, "metrics": metrics }),
                )
                .await?;
        }
        AgentEvent::Error(msg) => {
            store
                .append_event(
                    thread_id,
                    EventType::LocalSystemMessage,
                    json!({ "text": msg, "level": "error" }),
                )
                .await?;
        }
        AgentEvent::TextDelta(_)
        | AgentEvent::ThinkingDelta(_)
        | AgentEvent::ThinkingComplete(_)
        | AgentEvent::ContextCompacted { .. }
        | AgentEvent::TokenUsage { .. }
        | AgentEvent::TodoUpdate(_)
        | AgentEvent::ModeChanged(_)
        | AgentEvent::Question { .. }
        | AgentEvent::QuestionAnswer { .. } => {}
    }
    Ok(())
}

pub(crate) async fn metrics_snapshot(token_account: &Arc<Mutex<TokenAccount>>) -> serde_json::Value {
    let acc = *token_account.lock().await;
    json!({
        "promptTokens": acc.prompt_tokens,
        "completionTokens": acc.completion_tokens,
        "totalTokens": acc.total_tokens,
        "contextGrowth": acc.context_growth,
    })
}
