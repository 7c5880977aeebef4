// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Error taxonomy for the thread event store. Everything here maps onto the
//! `Storage` error kind at the `sven-core` boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("malformed event/metadata payload: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("thread not found: {0}")]
    ThreadNotFound(String),
    #[error("invalid thread id: {0:?}")]
    InvalidThreadId(String),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, MemoryError>;
