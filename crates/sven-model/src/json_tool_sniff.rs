// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Tool-call extraction from free-form completion text.
//!
//! Models that do not support native (vendor) tool calling — see
//! `registry::DriverMeta::native_tool_calling` — are instructed via a system
//! prompt to emit tool calls as JSON objects in their response text. This
//! module scans that text for such objects and turns them into
//! [`crate::ResponseEvent::ToolCall`] events, mirroring what a native tool
//! calling API would have streamed.
//!
//! Two passes are tried, in order:
//! 1. Fenced ` ```json ... ``` ` blocks — models that follow instructions
//!    closely wrap their tool calls this way.
//! 2. A brace-balanced scan for standalone `{...}` objects anywhere in the
//!    text. A naive regex cannot handle nested objects inside `arguments`,
//!    so this walks the text tracking brace depth and (separately) whether
//!    it is inside a quoted string, to find complete top-level objects.
//!
//! Candidate objects are filtered to those containing both a `"name"` and an
//! `"arguments"` key, deduplicated by `(name, canonical_json(arguments))` so
//! a model that repeats itself across both passes doesn't produce duplicate
//! calls, and assigned sequential `call_N` ids.

use serde_json::Value;

use crate::ToolSchema;

/// A tool call extracted from completion text.
#[derive(Debug, Clone, PartialEq)]
pub struct SniffedToolCall {
    pub id: String,
    pub name: String,
    /// Canonical (re-serialized) JSON arguments.
    pub arguments: String,
}

/// Result of sniffing: the extracted calls plus the surface text with the
/// matched JSON spans removed.
#[derive(Debug, Clone, PartialEq)]
pub struct SniffResult {
    pub tool_calls: Vec<SniffedToolCall>,
    pub remaining_text: String,
}

/// Build the system-prompt instruction block describing the available
/// tools as JSON schemas, for models lacking native tool calling.
pub fn tool_instruction_block(tools: &[ToolSchema]) -> String {
    if tools.is_empty() {
        return String::new();
    }
    let mut out = String::from(
        "You have access to the following tools. To call one, emit a single JSON object \
         with exactly two keys, \"name\" and \"arguments\", either inside a ```json fenced \
         code block or as a standalone object in your reply. Do not call more than one tool \
         per object; emit multiple objects for multiple calls.\n\nTools:\n",
    );
    for t in tools {
        out.push_str(&format!(
            "- {}: {}\n  parameters: {}\n",
            t.name,
            t.description,
            t.parameters
        ));
    }
    out
}

/// Scan `text` for tool-call JSON objects and return the extracted calls
/// plus the text with matched spans removed.
pub fn sniff_tool_calls(text: &str) -> SniffResult {
    let mut spans: Vec<(usize, usize, Value)> = Vec::new();

    for (start, end, raw) in fenced_json_blocks(text) {
        if let Ok(v) = serde_json::from_str::<Value>(&raw) {
            if is_tool_call_object(&v) {
                spans.push((start, end, v));
            }
        }
    }

    if spans.is_empty() {
        for (start, end, raw) in balanced_brace_objects(text) {
            if let Ok(v) = serde_json::from_str::<Value>(&raw) {
                if is_tool_call_object(&v) {
                    spans.push((start, end, v));
                }
            }
        }
    }

    // Remove spans from the text, back to front so earlier offsets stay valid.
    let mut remaining = text.to_string();
    let mut sorted_spans = spans.clone();
    sorted_spans.sort_by(|a, b| b.0.cmp(&a.0));
    for (start, end, _) in &sorted_spans {
        remaining.replace_range(*start..*end, "");
    }

    // Dedupe by (name, canonical_json(arguments)), preserving first-seen order.
    spans.sort_by_key(|(start, _, _)| *start);
    let mut seen = std::collections::HashSet::new();
    let mut tool_calls = Vec::new();
    let mut counter = 0;
    for (_, _, v) in spans {
        let name = v["name"].as_str().unwrap_or_default().to_string();
        let canonical = canonical_json(&v["arguments"]);
        let key = (name.clone(), canonical.clone());
        if !seen.insert(key) {
            continue;
        }
        counter += 1;
        tool_calls.push(SniffedToolCall {
            id: format!("call_{counter}"),
            name,
            arguments: canonical,
        });
    }

    SniffResult {
        tool_calls,
        remaining_text: remaining.trim().to_string(),
    }
}

fn is_tool_call_object(v: &Value) -> bool {
    v.is_object() && v.get("name").is_some() && v.get("arguments").is_some()
}

/// Canonical JSON: re-serialize with sorted keys via `serde_json::Value`'s
/// default `BTreeMap`-backed object representation, so equivalent objects
/// with differently-ordered keys compare equal.
fn canonical_json(v: &Value) -> String {
    serde_json::to_string(v).unwrap_or_default()
}

/// Find ` ```json ... ``` ` fenced blocks; returns `(start, end, inner_text)`
/// where `start`/`end` bound the *entire* fence (including the backticks) so
/// callers can strip it from the surface text.
fn fenced_json_blocks(text: &str) -> Vec<(usize, usize, String)> {
    const FENCE_OPEN: &str = "```json";
    const FENCE_CLOSE: &str = "```";
    let mut blocks = Vec::new();
    let mut search_from = 0;
    while let Some(rel_start) = text[search_from..].find(FENCE_OPEN) {
        let start = search_from + rel_start;
        let body_start = start + FENCE_OPEN.len();
        if let Some(rel_end) = text[body_start..].find(FENCE_CLOSE) {
            let body_end = body_start + rel_end;
            let end = body_end + FENCE_CLOSE.len();
            blocks.push((start, end, text[body_start..body_end].trim().to_string()));
            search_from = end;
        } else {
            break;
        }
    }
    blocks
}

/// Scan for standalone top-level `{...}` objects using brace-depth tracking,
/// respecting quoted strings and escapes so braces inside string values
/// (including nested JSON-as-a-string in `arguments`) don't confuse depth.
fn balanced_brace_objects(text: &str) -> Vec<(usize, usize, String)> {
    let bytes = text.as_bytes();
    let mut objects = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some(end) = find_matching_brace(bytes, i) {
                objects.push((i, end, text[i..end].to_string()));
                i = end;
                continue;
            }
        }
        i += 1;
    }
    objects
}

/// Given the index of an opening `{`, return the index just past its
/// matching closing `}`, or `None` if unbalanced.
fn find_matching_brace(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    let mut i = open;
    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
        } else {
            match b {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i + 1);
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}
