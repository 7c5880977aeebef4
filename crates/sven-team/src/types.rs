// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Session data model (spec §3 `Session`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Archived,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Archived => "archived",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "active" => SessionStatus::Active,
            "completed" => SessionStatus::Completed,
            "archived" => SessionStatus::Archived,
            _ => return None,
        })
    }
}

/// A persisted session row (`sessions` table). `id` doubles as the root
/// `ThreadId` of the coordinator thread (spec §3: a session *is* a thread
/// tree root plus this bookkeeping).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub project_id: Option<String>,
    pub name: String,
    pub description: String,
    /// Session-level configuration overrides, deep-merged onto the project
    /// config (see `crate::config_merge::merge_config`). Stored as the raw
    /// override blob, not the merged result, so changing the project config
    /// later is still reflected the next time the session's agents rebuild.
    pub configuration: serde_json::Value,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
