// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Approval Protocol (spec §4.G): per-tool-call request/response gating for
//! tools whose [`ApprovalPolicy`](crate::policy::ApprovalPolicy) is `Ask`.
//!
//! `ToolPolicy` (see `policy.rs`) is the fast-path string-command classifier
//! `run_terminal_command` consults internally; this module is the outer gate
//! that applies to every non-`Auto` tool regardless of kind, and is what
//! actually suspends execution on a human/UI decision.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;

/// Decision returned by an [`ApprovalCallback`] for one tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    /// Run this one call, ask again next time.
    AllowOnce,
    /// Run this call and every future call to the same tool for the rest of
    /// the session without asking again.
    AllowSession,
    /// Do not run; the tool call resolves to an error result.
    Deny,
}

/// What the Tool Executor publishes to a session's UI/interface boundary
/// when a non-safe tool call needs a decision.
#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    pub tool_name: String,
    pub input: Value,
    pub is_read_only: bool,
}

/// The consumer side of an approval request — a UI, a CLI prompt, or (in
/// tests / unattended runs) an automatic policy.
#[async_trait]
pub trait ApprovalCallback: Send + Sync {
    async fn request_approval(&self, request: ApprovalRequest) -> ApprovalDecision;
}

/// Approves every request without asking. Used where no approval UI is
/// wired up (the demo binary, sub-agents that inherit their coordinator's
/// gate instead of getting their own).
pub struct AutoApprove;

#[async_trait]
impl ApprovalCallback for AutoApprove {
    async fn request_approval(&self, _request: ApprovalRequest) -> ApprovalDecision {
        ApprovalDecision::AllowOnce
    }
}

/// Denies every request. Useful for tests asserting deny-path behavior.
pub struct AlwaysDeny;

#[async_trait]
impl ApprovalCallback for AlwaysDeny {
    async fn request_approval(&self, _request: ApprovalRequest) -> ApprovalDecision {
        ApprovalDecision::Deny
    }
}

/// Session-scoped approval gate.
///
/// Caches `allow_session` decisions per tool name so the same tool is not
/// asked about twice in one session, and serializes concurrent requests
/// through a single in-flight lock — spec §4.G: "Only one approval request
/// is open at a time per session; concurrent requests queue."
pub struct ApprovalGate {
    session_id: String,
    callback: Arc<dyn ApprovalCallback>,
    session_allowed: AsyncMutex<HashSet<String>>,
    in_flight: AsyncMutex<()>,
}

impl ApprovalGate {
    pub fn new(session_id: impl Into<String>, callback: Arc<dyn ApprovalCallback>) -> Self {
        Self {
            session_id: session_id.into(),
            callback,
            session_allowed: AsyncMutex::new(HashSet::new()),
            in_flight: AsyncMutex::new(()),
        }
    }

    /// A gate with no UI wired up — every call auto-approves. Used by
    /// callers that construct an `Agent` directly without a session.
    pub fn auto() -> Self {
        Self::new("unscoped", Arc::new(AutoApprove))
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Resolve the decision for one call to `tool_name`. Read-only and
    /// `safe_internal` tools should never reach this (the registry only
    /// calls it for `ApprovalPolicy::Ask` tools), but `is_read_only` is
    /// still forwarded into the request payload per spec's
    /// `approval_request{toolName, input, isReadOnly, resolve}`.
    pub async fn check(&self, tool_name: &str, input: &Value, is_read_only: bool) -> ApprovalDecision {
        if self.session_allowed.lock().await.contains(tool_name) {
            return ApprovalDecision::AllowSession;
        }
        // Single-in-flight: hold this lock for the entire round trip so a
        // second concurrent call queues behind the first rather than firing
        // its own overlapping request.
        let _permit = self.in_flight.lock().await;
        if self.session_allowed.lock().await.contains(tool_name) {
            return ApprovalDecision::AllowSession;
        }
        let decision = self
            .callback
            .request_approval(ApprovalRequest {
                tool_name: tool_name.to_string(),
                input: input.clone(),
                is_read_only,
            })
            .await;
        if decision == ApprovalDecision::AllowSession {
            self.session_allowed.lock().await.insert(tool_name.to_string());
        }
        decision
    }
}
