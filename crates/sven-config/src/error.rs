// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Typed validation errors for session/agent configuration.
//!
//! Session creation fails fast on any of these (spec's `ConfigurationMissing`
//! / `Validation` error kinds) rather than constructing a half-valid agent.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_tokens must be greater than 0")]
    MaxTokensNotPositive,
    #[error("temperature must be between 0.0 and 2.0, got {0}")]
    TemperatureOutOfRange(String),
    #[error("unknown provider type: {0:?} (expected one of: anthropic, openai, ollama, lmstudio, mock)")]
    UnknownProviderType(String),
    #[error("invalid tool policy {0:?} for tool {1:?} (expected one of: allow, require-approval, deny)")]
    InvalidToolPolicy(String, String),
    #[error("no provider instance or model configured")]
    MissingProvider,
}
