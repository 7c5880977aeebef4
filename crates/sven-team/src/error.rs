// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TeamError {
    #[error("storage error: {0}")]
    Memory(#[from] sven_memory::MemoryError),
    #[error("task store error: {0}")]
    Scheduler(#[from] sven_scheduler::SchedulerError),
    #[error("configuration error: {0}")]
    Config(#[from] sven_config::ConfigError),
    #[error("model provider error: {0}")]
    Model(#[source] anyhow::Error),
    #[error("malformed session payload: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("agent not found: {0}")]
    AgentNotFound(String),
}

pub type Result<T> = std::result::Result<T, TeamError>;
