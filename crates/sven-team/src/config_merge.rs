// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Session-level configuration inheritance (spec §4.F): a session's effective
//! config is the project config with the session's own overrides deep-merged
//! on top. Generalizes `sven_config::loader`'s YAML deep-merge to
//! `serde_json::Value`, since session overrides travel as a JSON blob (the
//! `sessions.configuration` column) rather than a YAML file on disk.
//!
//! The merge is a single recursive rule — objects merge key-by-key, anything
//! else is replaced — which already gives `tool_policies`/`environment_variables`
//! their documented field-wise-merge-with-session-precedence semantics
//! (`sven_config::schema::Config::tool_policies`) as a special case: those are
//! JSON objects too, so merging them recursively merges per key instead of
//! replacing the whole map.

use sven_config::Config;

use crate::error::{Result, TeamError};

/// Deep-merge `src` into `dst`; `src` wins on scalar (non-object) conflicts.
pub fn merge_json(dst: &mut serde_json::Value, src: serde_json::Value) {
    match (dst, src) {
        (serde_json::Value::Object(d), serde_json::Value::Object(s)) => {
            for (k, v) in s {
                let entry = d.entry(k).or_insert(serde_json::Value::Object(Default::default()));
                merge_json(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}

/// Compute a session's effective configuration: `project` serialized to JSON,
/// `overrides` deep-merged on top, then deserialized back and validated.
pub fn merge_config(project: &Config, overrides: &serde_json::Value) -> Result<Config> {
    let mut merged = serde_json::to_value(project).map_err(TeamError::Serialization)?;
    merge_json(&mut merged, overrides.clone());
    let config: Config = serde_json::from_value(merged).map_err(TeamError::Serialization)?;
    config
        .validate()
        .map_err(|e| TeamError::Validation(e.to_string()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_json_scalar_src_wins() {
        let mut dst = json!({"x": 1});
        merge_json(&mut dst, json!({"x": 2}));
        assert_eq!(dst["x"], 2);
    }

    #[test]
    fn merge_json_preserves_keys_not_in_src() {
        let mut dst = json!({"a": 1, "b": 2});
        merge_json(&mut dst, json!({"b": 99}));
        assert_eq!(dst["a"], 1);
        assert_eq!(dst["b"], 99);
    }

    #[test]
    fn merge_json_merges_tool_policies_field_wise() {
        let mut dst = json!({"tool_policies": {"run_terminal_command": "deny", "write_file": "allow"}});
        merge_json(
            &mut dst,
            json!({"tool_policies": {"run_terminal_command": "require-approval"}}),
        );
        assert_eq!(dst["tool_policies"]["run_terminal_command"], "require-approval");
        assert_eq!(dst["tool_policies"]["write_file"], "allow");
    }

    #[test]
    fn merge_config_session_override_wins_model_name() {
        let project = Config::default();
        let overrides = json!({"model": {"name": "claude-opus-4-5", "provider": "anthropic"}});
        let merged = merge_config(&project, &overrides).unwrap();
        assert_eq!(merged.model.name, "claude-opus-4-5");
        assert_eq!(merged.model.provider, "anthropic");
    }

    #[test]
    fn merge_config_without_overrides_equals_project() {
        let project = Config::default();
        let merged = merge_config(&project, &json!({})).unwrap();
        assert_eq!(merged.model.name, project.model.name);
        assert_eq!(merged.agent.max_tool_rounds, project.agent.max_tool_rounds);
    }

    #[test]
    fn merge_config_rejects_invalid_override() {
        let project = Config::default();
        let overrides = json!({"model": {"provider": "not-a-real-provider", "name": "x"}});
        assert!(merge_config(&project, &overrides).is_err());
    }
}
