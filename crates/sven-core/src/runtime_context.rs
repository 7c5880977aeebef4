// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Runtime context for an agent session.
//!
//! This is separate from [`sven_config::AgentConfig`], which holds only
//! config-file fields.  [`AgentRuntimeContext`] carries values detected or
//! specified at runtime (project root, git/CI context, prompt overrides,
//! thread identity).

use std::path::PathBuf;

/// Identifies a thread within the event store's hierarchy (see
/// `sven_memory::ThreadId`).  Carried here as a plain `String` so `sven-core`
/// does not need to depend on `sven-memory` for this single value; the
/// session layer is responsible for keeping the two in sync.
pub type ThreadId = String;

/// Environment-detected context injected into an agent at construction time.
#[derive(Debug, Default, Clone)]
pub struct AgentRuntimeContext {
    /// Absolute path to the project root (found via `.git` walk-up).
    pub project_root: Option<PathBuf>,
    /// Pre-formatted git context block (branch, commit, dirty status).
    pub git_context_note: Option<String>,
    /// Pre-formatted CI environment context block.
    pub ci_context_note: Option<String>,
    /// Contents of the project context file (`.sven/context.md`, `AGENTS.md`, …).
    pub project_context_file: Option<String>,
    /// Text appended to the default system prompt (from `--append-system-prompt`).
    pub append_system_prompt: Option<String>,
    /// Full system prompt override (from `--system-prompt-file`).
    /// When set, replaces `AgentConfig::system_prompt` entirely.
    pub system_prompt_override: Option<String>,
    /// The thread this agent is bound to in the event store.
    pub thread_id: Option<ThreadId>,
    /// The parent thread, if this agent was spawned as a delegate.
    pub parent_thread_id: Option<ThreadId>,
    /// The project this thread belongs to, if any.
    pub project_id: Option<String>,
}

/// Walk up from `start` looking for a `.git` directory or file (worktrees use
/// a `.git` file pointing at the real gitdir).  Returns the first ancestor
/// that contains one, or `None` if the search reaches the filesystem root.
pub fn find_project_root(start: &std::path::Path) -> Option<PathBuf> {
    let mut dir = if start.is_dir() {
        start.to_path_buf()
    } else {
        start.parent()?.to_path_buf()
    };
    loop {
        if dir.join(".git").exists() {
            return Some(dir);
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// Read `AGENTS.md` or `.sven/context.md` from the project root, preferring
/// `AGENTS.md` when both are present.
pub fn load_project_context_file(root: &std::path::Path) -> Option<String> {
    for candidate in [root.join("AGENTS.md"), root.join(".sven/context.md")] {
        if let Ok(content) = std::fs::read_to_string(&candidate) {
            return Some(content);
        }
    }
    None
}

/// Collect a short, human-readable git status block: current branch, short
/// commit hash, and whether the worktree is dirty.  Best-effort — returns
/// `None` if `git` cannot be invoked or the directory is not a repository.
pub fn collect_git_context_note(root: &std::path::Path) -> Option<String> {
    let run = |args: &[&str]| -> Option<String> {
        let out = std::process::Command::new("git")
            .args(args)
            .current_dir(root)
            .output()
            .ok()?;
        if !out.status.success() {
            return None;
        }
        Some(String::from_utf8_lossy(&out.stdout).trim().to_string())
    };

    let branch = run(&["rev-parse", "--abbrev-ref", "HEAD"])?;
    let commit = run(&["rev-parse", "--short", "HEAD"]).unwrap_or_default();
    let dirty = run(&["status", "--porcelain"])
        .map(|s| !s.is_empty())
        .unwrap_or(false);

    Some(format!(
        "## Git Context\nBranch: {branch}\nCommit: {commit}\nDirty: {dirty}",
    ))
}

/// Detect a CI environment from well-known environment variables and return a
/// formatted context block, or `None` outside of CI.
pub fn detect_ci_context_note() -> Option<String> {
    let provider = if std::env::var_os("GITHUB_ACTIONS").is_some() {
        "GitHub Actions"
    } else if std::env::var_os("GITLAB_CI").is_some() {
        "GitLab CI"
    } else if std::env::var_os("JENKINS_URL").is_some() {
        "Jenkins"
    } else if std::env::var_os("CI").is_some() {
        "CI"
    } else {
        return None;
    };

    let branch = std::env::var("GITHUB_REF_NAME")
        .or_else(|_| std::env::var("CI_COMMIT_REF_NAME"))
        .unwrap_or_default();

    Some(format!(
        "## CI Environment\nRunning in: {provider}\nBranch: {branch}",
    ))
}
