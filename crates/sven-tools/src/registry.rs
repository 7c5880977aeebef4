// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use sven_config::AgentMode;

use crate::approval::ApprovalDecision;
use crate::context::ToolContext;
use crate::policy::ApprovalPolicy;
use crate::tool::OutputCategory;
use crate::{Tool, ToolCall, ToolOutput};

/// A tool schema – mirrors sven_model::ToolSchema but keeps tools crate
/// independent from the model crate.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Central registry holding all available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

// SAFETY: ToolRegistry is Sync because:
// - HashMap<String, Arc<dyn Tool>> is Sync (String is Sync, Arc<T: Send + Sync> is Sync)
// - Tools implement Send + Sync (required by the Tool trait)
// - No interior mutability exists after construction (all methods take &self)
// - Parallel tool execution is safe because tools are immutable after registration
unsafe impl Sync for ToolRegistry {}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Produce schemas for ALL registered tools (mode-unfiltered).
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self.tools.values().map(|t| ToolSchema {
            name: t.name().to_string(),
            description: t.description().to_string(),
            parameters: t.parameters_schema(),
        }).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Produce schemas only for tools available in the given mode.
    pub fn schemas_for_mode(&self, mode: AgentMode) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self.tools.values()
            .filter(|t| t.modes().contains(&mode))
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    pub async fn execute(&self, call: &ToolCall) -> ToolOutput {
        match self.tools.get(&call.name) {
            Some(tool) => tool.execute(call).await,
            None => ToolOutput::err(
                &call.id,
                format!("unknown tool: {}", call.name),
            ),
        }
    }

    /// Full invocation pipeline (spec §4.C): validate the call against the
    /// tool's schema, gate non-`Auto` tools through the approval protocol,
    /// and only then execute.
    ///
    /// `execute` (above) is kept as the ungated primitive for callers that
    /// predate the approval protocol or intentionally bypass it (most
    /// existing tests). New call sites — the agent loop in particular —
    /// should use this instead.
    pub async fn execute_gated(&self, call: &ToolCall, ctx: &ToolContext) -> ToolOutput {
        let tool = match self.tools.get(&call.name) {
            Some(t) => t.clone(),
            None => {
                return ToolOutput::err(&call.id, format!("unknown tool: {}", call.name));
            }
        };

        if ctx.cancel.is_cancelled() {
            return ToolOutput::err(&call.id, "cancelled before execution");
        }

        if let Err(msg) = validate_required_args(&tool.parameters_schema(), &call.args) {
            return ToolOutput::err(&call.id, msg);
        }

        match tool.default_policy() {
            ApprovalPolicy::Deny => {
                return ToolOutput::err(
                    &call.id,
                    format!("tool '{}' is denied by policy", call.name),
                );
            }
            ApprovalPolicy::Auto => {}
            ApprovalPolicy::Ask => {
                let decision = ctx
                    .approval
                    .check(&call.name, &call.args, tool.is_read_only())
                    .await;
                if decision == ApprovalDecision::Deny {
                    return ToolOutput::err(
                        &call.id,
                        format!("tool '{}' call was denied", call.name),
                    );
                }
            }
        }

        if ctx.cancel.is_cancelled() {
            return ToolOutput::err(&call.id, "cancelled before execution");
        }

        tool.execute(call).await
    }

    /// The output shape a registered tool declares for context-aware
    /// truncation (`sven-core` consults this after execution). Unknown tool
    /// names fall back to `Generic` rather than panicking — by the time a
    /// tool result is being truncated, the call already succeeded.
    pub fn output_category(&self, name: &str) -> OutputCategory {
        self.tools
            .get(name)
            .map(|t| t.output_category())
            .unwrap_or_default()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn names_for_mode(&self, mode: AgentMode) -> Vec<String> {
        let mut names: Vec<String> = self.tools.values()
            .filter(|t| t.modes().contains(&mode))
            .map(|t| t.name().to_string())
            .collect();
        names.sort();
        names
    }
}

impl Default for ToolRegistry {
    fn default() -> Self { Self::new() }
}

/// Lightweight JSON Schema check: every name in the schema's top-level
/// `required` array must be present in `args`. This is deliberately not a
/// full JSON Schema validator (no type/format/enum checking) — tools already
/// validate their own argument shapes in `execute()` and return a
/// descriptive `ToolOutput::err` on malformed input; this check only catches
/// the common case of a missing required field before spending a call on it.
fn validate_required_args(schema: &serde_json::Value, args: &serde_json::Value) -> Result<(), String> {
    let Some(required) = schema.get("required").and_then(|r| r.as_array()) else {
        return Ok(());
    };
    for name in required {
        let Some(name) = name.as_str() else { continue };
        let present = args.get(name).is_some();
        if !present {
            return Err(format!("missing required argument: {name}"));
        }
    }
    Ok(())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;
    use crate::policy::ApprovalPolicy;
    use crate::tool::{Tool, ToolCall, ToolOutput};

    /// Minimal no-op tool for registry tests.
    struct EchoTool { name: &'static str }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str { self.name }
        fn description(&self) -> &str { "echoes its input" }
        fn parameters_schema(&self) -> Value { json!({ "type": "object" }) }
        fn default_policy(&self) -> ApprovalPolicy { ApprovalPolicy::Auto }
        async fn execute(&self, call: &ToolCall) -> ToolOutput {
            ToolOutput::ok(&call.id, format!("echo:{}", call.args))
        }
    }

    #[test]
    fn register_and_get() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "echo" });
        assert!(reg.get("echo").is_some());
    }

    #[test]
    fn get_unknown_returns_none() {
        let reg = ToolRegistry::new();
        assert!(reg.get("nope").is_none());
    }

    #[test]
    fn names_returns_all_registered() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "a" });
        reg.register(EchoTool { name: "b" });
        let mut names = reg.names();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn schemas_contains_registered_tool() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "my_tool" });
        let schemas = reg.schemas();
        assert!(schemas.iter().any(|s| s.name == "my_tool"));
    }

    #[test]
    fn schemas_include_description() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "t" });
        let schemas = reg.schemas();
        assert_eq!(schemas[0].description, "echoes its input");
    }

    #[tokio::test]
    async fn execute_known_tool_succeeds() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "echo" });
        let call = ToolCall { id: "1".into(), name: "echo".into(), args: json!({"x":1}) };
        let out = reg.execute(&call).await;
        assert!(!out.is_error);
        assert!(out.content.starts_with("echo:"));
    }

    #[tokio::test]
    async fn execute_unknown_tool_returns_error() {
        let reg = ToolRegistry::new();
        let call = ToolCall { id: "x".into(), name: "missing".into(), args: json!({}) };
        let out = reg.execute(&call).await;
        assert!(out.is_error);
        assert!(out.content.contains("unknown tool"));
    }

    #[test]
    fn output_category_looks_up_registered_tool() {
        let mut reg = ToolRegistry::new();
        reg.register(HeadTailEchoTool);
        assert_eq!(reg.output_category("ht_echo"), crate::tool::OutputCategory::HeadTail);
    }

    #[test]
    fn output_category_unknown_tool_is_generic() {
        let reg = ToolRegistry::new();
        assert_eq!(reg.output_category("nope"), crate::tool::OutputCategory::Generic);
    }

    struct HeadTailEchoTool;

    #[async_trait]
    impl Tool for HeadTailEchoTool {
        fn name(&self) -> &str { "ht_echo" }
        fn description(&self) -> &str { "echoes, head/tail truncated" }
        fn parameters_schema(&self) -> Value { json!({ "type": "object" }) }
        fn default_policy(&self) -> ApprovalPolicy { ApprovalPolicy::Auto }
        fn output_category(&self) -> crate::tool::OutputCategory { crate::tool::OutputCategory::HeadTail }
        async fn execute(&self, call: &ToolCall) -> ToolOutput {
            ToolOutput::ok(&call.id, "ok")
        }
    }

    #[test]
    fn registering_same_name_twice_overwrites() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "t" });
        reg.register(EchoTool { name: "t" });
        assert_eq!(reg.names().len(), 1);
    }

    // ── execute_gated ─────────────────────────────────────────────────────

    struct AskTool;

    #[async_trait]
    impl Tool for AskTool {
        fn name(&self) -> &str { "ask_tool" }
        fn description(&self) -> &str { "needs approval" }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object", "required": ["path"] })
        }
        fn default_policy(&self) -> ApprovalPolicy { ApprovalPolicy::Ask }
        async fn execute(&self, call: &ToolCall) -> ToolOutput {
            ToolOutput::ok(&call.id, "ran")
        }
    }

    struct DenyTool;

    #[async_trait]
    impl Tool for DenyTool {
        fn name(&self) -> &str { "deny_tool" }
        fn description(&self) -> &str { "never runs" }
        fn parameters_schema(&self) -> Value { json!({ "type": "object" }) }
        fn default_policy(&self) -> ApprovalPolicy { ApprovalPolicy::Deny }
        async fn execute(&self, call: &ToolCall) -> ToolOutput {
            ToolOutput::ok(&call.id, "should never get here")
        }
    }

    use crate::approval::{AlwaysDeny, ApprovalGate, AutoApprove};
    use std::sync::Arc as StdArc;

    fn unscoped_ctx() -> ToolContext {
        ToolContext::new("t1", StdArc::new(ApprovalGate::new("s1", StdArc::new(AutoApprove))))
    }

    #[tokio::test]
    async fn execute_gated_runs_auto_tool_without_approval() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "echo" });
        let call = ToolCall { id: "1".into(), name: "echo".into(), args: json!({"x":1}) };
        let out = reg.execute_gated(&call, &unscoped_ctx()).await;
        assert!(!out.is_error);
    }

    #[tokio::test]
    async fn execute_gated_denies_deny_policy_tool() {
        let mut reg = ToolRegistry::new();
        reg.register(DenyTool);
        let call = ToolCall { id: "1".into(), name: "deny_tool".into(), args: json!({}) };
        let out = reg.execute_gated(&call, &unscoped_ctx()).await;
        assert!(out.is_error);
        assert!(out.content.contains("denied by policy"));
    }

    #[tokio::test]
    async fn execute_gated_rejects_missing_required_arg() {
        let mut reg = ToolRegistry::new();
        reg.register(AskTool);
        let call = ToolCall { id: "1".into(), name: "ask_tool".into(), args: json!({}) };
        let out = reg.execute_gated(&call, &unscoped_ctx()).await;
        assert!(out.is_error);
        assert!(out.content.contains("missing required argument"));
    }

    #[tokio::test]
    async fn execute_gated_runs_ask_tool_when_approved() {
        let mut reg = ToolRegistry::new();
        reg.register(AskTool);
        let ctx = ToolContext::new(
            "t1",
            StdArc::new(ApprovalGate::new("s1", StdArc::new(AutoApprove))),
        );
        let call = ToolCall {
            id: "1".into(),
            name: "ask_tool".into(),
            args: json!({"path": "/tmp/x"}),
        };
        let out = reg.execute_gated(&call, &ctx).await;
        assert!(!out.is_error);
        assert_eq!(out.content, "ran");
    }

    #[tokio::test]
    async fn execute_gated_blocks_ask_tool_when_denied() {
        let mut reg = ToolRegistry::new();
        reg.register(AskTool);
        let ctx = ToolContext::new(
            "t1",
            StdArc::new(ApprovalGate::new("s1", StdArc::new(AlwaysDeny))),
        );
        let call = ToolCall {
            id: "1".into(),
            name: "ask_tool".into(),
            args: json!({"path": "/tmp/x"}),
        };
        let out = reg.execute_gated(&call, &ctx).await;
        assert!(out.is_error);
        assert!(out.content.contains("denied"));
    }

    #[tokio::test]
    async fn execute_gated_respects_cancellation() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "echo" });
        let ctx = unscoped_ctx();
        ctx.cancel.cancel();
        let call = ToolCall { id: "1".into(), name: "echo".into(), args: json!({}) };
        let out = reg.execute_gated(&call, &ctx).await;
        assert!(out.is_error);
        assert!(out.content.contains("cancelled"));
    }
}
