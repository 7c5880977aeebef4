// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Cumulative token accounting (spec.md §4.E).
//!
//! Tracks the `{promptTokens (latest), completionTokens (sum), totalTokens,
//! contextGrowth, lastPromptTokens}` identity across a conversation. The
//! update only ever happens at turn completion, never per streaming delta —
//! a token account built from per-chunk usage events would double-count
//! whenever a provider resends cumulative totals mid-stream.

use serde::{Deserialize, Serialize};

/// Running token ledger for one agent/session.
///
/// `update()` is the entire state machine: callers do not mutate the fields
/// directly.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenAccount {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub context_growth: u32,
    pub last_prompt_tokens: u32,
    turns_seen: u32,
}

impl TokenAccount {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one turn's usage to the ledger, per spec.md §4.E:
    ///
    /// - First turn ever: `contextGrowth := promptTokens` (the system prompt).
    /// - Otherwise: `contextGrowth := max(0, promptTokens − lastPromptTokens)`.
    /// - `completionTokens += completion_tokens`;
    ///   `totalTokens += contextGrowth + completion_tokens`;
    ///   `lastPromptTokens := promptTokens`.
    pub fn update(&mut self, prompt_tokens: u32, completion_tokens: u32) {
        let context_growth = if self.turns_seen == 0 {
            prompt_tokens
        } else {
            prompt_tokens.saturating_sub(self.last_prompt_tokens)
        };
        self.prompt_tokens = prompt_tokens;
        self.completion_tokens += completion_tokens;
        self.total_tokens += context_growth + completion_tokens;
        self.context_growth = context_growth;
        self.last_prompt_tokens = prompt_tokens;
        self.turns_seen += 1;
    }
}
