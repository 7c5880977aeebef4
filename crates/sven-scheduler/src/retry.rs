// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Write-ahead bounded-retry for Task Store mutations (spec §4.B): 100ms,
//! doubling, capped at 1s, 3 attempts. Structurally identical to
//! `sven_memory::with_busy_retry` (both guard the same single shared
//! connection's busy-retry discipline, spec §5) — delegated to rather than
//! duplicated, kept as its own named entry point since the two components
//! document the policy independently in spec §4.A/§4.B.

use crate::error::{Result, SchedulerError};

pub async fn with_busy_retry<F, T>(f: F) -> Result<T>
where
    F: Fn() -> Result<T> + Send + Sync + 'static,
    T: Send + 'static,
{
    sven_memory::with_busy_retry(move || f().map_err(to_memory_error))
        .await
        .map_err(from_memory_error)
}

fn to_memory_error(e: SchedulerError) -> sven_memory::MemoryError {
    match e {
        SchedulerError::Storage(inner) => sven_memory::MemoryError::Storage(inner),
        other => sven_memory::MemoryError::Internal(other.to_string()),
    }
}

fn from_memory_error(e: sven_memory::MemoryError) -> SchedulerError {
    match e {
        sven_memory::MemoryError::Storage(inner) => SchedulerError::Storage(inner),
        other => SchedulerError::Validation(other.to_string()),
    }
}
