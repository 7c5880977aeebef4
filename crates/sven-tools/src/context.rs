// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Per-call context threaded through `ToolRegistry::execute_gated` (spec
//! §4.C: "`context` carries `threadId`, optional `parentThreadId`, session
//! handle, and a cancellation token").

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::approval::ApprovalGate;

#[derive(Clone)]
pub struct ToolContext {
    pub thread_id: String,
    pub parent_thread_id: Option<String>,
    pub session_id: Option<String>,
    pub cancel: CancellationToken,
    pub approval: Arc<ApprovalGate>,
}

impl ToolContext {
    pub fn new(thread_id: impl Into<String>, approval: Arc<ApprovalGate>) -> Self {
        Self {
            thread_id: thread_id.into(),
            parent_thread_id: None,
            session_id: None,
            cancel: CancellationToken::new(),
            approval,
        }
    }

    pub fn with_parent_thread(mut self, parent_thread_id: impl Into<String>) -> Self {
        self.parent_thread_id = Some(parent_thread_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// A context with no thread/session binding and an always-allow gate.
    /// Used by callers (the demo binary, existing tests) that predate the
    /// approval protocol and don't need it gated.
    pub fn unscoped() -> Self {
        Self::new("unscoped", Arc::new(ApprovalGate::auto()))
    }
}
