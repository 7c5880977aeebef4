// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Assignee grammar (spec §6): either a bare `threadId` or
//! `new:<providerType>/<modelId>` (lazy agent creation).

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Assignee {
    Thread(String),
    NewAgent {
        provider_type: String,
        model_id: String,
    },
}

impl Assignee {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(SchedulerError::Validation(
                "assignee must not be empty".into(),
            ));
        }
        if let Some(rest) = raw.strip_prefix("new:") {
            let (provider_type, model_id) = rest.split_once('/').ok_or_else(|| {
                SchedulerError::Validation(format!(
                    "invalid new-agent assignee {raw:?}: expected new:<providerType>/<modelId>"
                ))
            })?;
            if provider_type.is_empty() || model_id.is_empty() {
                return Err(SchedulerError::Validation(format!(
                    "invalid new-agent assignee {raw:?}: provider type and model id must be non-empty"
                )));
            }
            return Ok(Assignee::NewAgent {
                provider_type: provider_type.to_string(),
                model_id: model_id.to_string(),
            });
        }
        Ok(Assignee::Thread(raw.to_string()))
    }

    pub fn to_raw(&self) -> String {
        match self {
            Assignee::Thread(id) => id.clone(),
            Assignee::NewAgent {
                provider_type,
                model_id,
            } => format!("new:{provider_type}/{model_id}"),
        }
    }
}
