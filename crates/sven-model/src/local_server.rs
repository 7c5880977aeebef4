// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Provider wrapper for local model servers that don't support native tool
//! calling (see `registry::DriverMeta::native_tool_calling`).
//!
//! Wraps [`crate::openai_compat::OpenAICompatProvider`]: it injects a system
//! instruction describing the available tools as JSON schemas instead of
//! using the wire-format `tools` field, then sniffs tool-call JSON out of the
//! completion text via [`crate::json_tool_sniff`].
//!
//! Because the tool call may be split anywhere across the completion (and
//! arguments may themselves contain braces), this provider fully drains the
//! inner stream before sniffing rather than forwarding deltas live — text is
//! buffered, tool calls are extracted once the full response is known, and
//! only then replayed as a flattened event sequence.

use async_trait::async_trait;
use futures::StreamExt;

use crate::{
    catalog::ModelCatalogEntry,
    json_tool_sniff::{sniff_tool_calls, tool_instruction_block},
    openai_compat::{AuthStyle, OpenAICompatProvider},
    provider::ResponseStream,
    CompletionRequest, Message, MessageContent, ModelProvider, Role, ResponseEvent,
};

pub struct LocalServerProvider {
    driver_name: &'static str,
    inner: OpenAICompatProvider,
}

impl LocalServerProvider {
    pub fn new(
        driver_name: &'static str,
        model: String,
        base_url: &str,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
        driver_options: serde_json::Value,
    ) -> Self {
        Self {
            driver_name,
            inner: OpenAICompatProvider::new(
                driver_name,
                model,
                None,
                base_url,
                max_tokens,
                temperature,
                vec![],
                AuthStyle::None,
                driver_options,
            ),
        }
    }
}

#[async_trait]
impl ModelProvider for LocalServerProvider {
    fn name(&self) -> &str {
        self.driver_name
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn list_models(&self) -> anyhow::Result<Vec<ModelCatalogEntry>> {
        self.inner.list_models().await
    }

    async fn complete(&self, mut req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        let tool_schemas = std::mem::take(&mut req.tools);
        let instruction = tool_instruction_block(&tool_schemas);
        if !instruction.is_empty() {
            inject_instruction(&mut req.messages, &instruction);
        }

        let inner_stream = self.inner.complete(req).await?;
        let events = drain_and_sniff(inner_stream).await?;
        Ok(Box::pin(futures::stream::iter(events)))
    }
}

fn inject_instruction(messages: &mut [Message], instruction: &str) {
    if let Some(first) = messages.first_mut() {
        if first.role == Role::System {
            if let MessageContent::Text(t) = &mut first.content {
                t.push_str("\n\n");
                t.push_str(instruction);
                return;
            }
        }
    }
}

/// Drain `stream` fully, then replay it as a single flattened sequence:
/// non-text events pass through in arrival order, accumulated text is
/// sniffed for tool calls once, and the cleaned remainder is emitted as a
/// trailing text delta before any extracted tool calls and the final `Done`.
async fn drain_and_sniff(
    mut stream: ResponseStream,
) -> anyhow::Result<Vec<anyhow::Result<ResponseEvent>>> {
    let mut text_buf = String::new();
    let mut passthrough = Vec::new();
    let mut saw_done = false;

    while let Some(item) = stream.next().await {
        match item {
            Ok(ResponseEvent::TextDelta(t)) => text_buf.push_str(&t),
            Ok(ResponseEvent::Done) => {
                saw_done = true;
            }
            Ok(other) => passthrough.push(Ok(other)),
            Err(e) => passthrough.push(Err(e)),
        }
    }

    let sniffed = sniff_tool_calls(&text_buf);

    let mut out = passthrough;
    if !sniffed.remaining_text.is_empty() {
        out.push(Ok(ResponseEvent::TextDelta(sniffed.remaining_text)));
    }
    for (index, call) in sniffed.tool_calls.into_iter().enumerate() {
        out.push(Ok(ResponseEvent::ToolCall {
            index: index as u32,
            id: call.id,
            name: call.name,
            arguments: call.arguments,
        }));
    }
    if saw_done {
        out.push(Ok(ResponseEvent::Done));
    }
    Ok(out)
}
