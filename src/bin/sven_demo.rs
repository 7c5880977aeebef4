// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Minimal end-to-end demonstration of the session/scheduler stack: opens an
//! in-memory store, creates a session against the mock provider, submits a
//! user turn, then assigns a task to `new:mock/mock-model` to show
//! task-driven delegate spawning.
//!
//! Not a CLI — just a smoke-test harness for the crate's public surface.
//! `sven-tui`/`sven-ci`-shaped front ends would build on `sven_team::SessionRegistry`
//! the same way this binary does.

use std::sync::Arc;
use std::time::Duration;

use sven_config::{Config, ModelConfig};
use sven_scheduler::NewTask;
use sven_team::SessionRegistry;
use sven_tools::AutoApprove;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Arc::new(Config {
        model: ModelConfig {
            provider: "mock".into(),
            name: "mock-model".into(),
            ..ModelConfig::default()
        },
        ..Config::default()
    });

    let registry = SessionRegistry::open_in_memory(config)?;

    let session = registry
        .create_session(
            "demo session",
            "smoke-test session for the sven_demo binary",
            None,
            serde_json::json!({}),
            Arc::new(AutoApprove),
        )
        .await?;
    println!("created session {}", session.id());

    let mut rx = session
        .submit(session.root_thread(), "list the files in the current directory")
        .await?;
    while let Some(event) = rx.recv().await {
        println!("coordinator event: {event:?}");
    }

    let task_store = session.task_store();
    task_store
        .create_tasks(
            session.root_thread().as_str(),
            session.root_thread().as_str(),
            vec![NewTask {
                title: "investigate flaky test".into(),
                description: "the CI job `unit-tests` fails intermittently".into(),
                prompt: "find and fix the flaky test in the CI job `unit-tests`".into(),
                priority: sven_scheduler::TaskPriority::High,
                assigned_to: Some("new:mock/mock-model".into()),
            }],
        )
        .await?;

    // The delegate's directive turn runs on a spawned background task; give
    // it a moment to persist its first events before printing the log.
    tokio::time::sleep(Duration::from_millis(200)).await;

    for thread_id in session.agent_thread_ids().await {
        let id = sven_memory::ThreadId::from_raw(&thread_id)?;
        let events = session.events(&id).await?;
        println!("--- thread {thread_id} ({} events) ---", events.len());
        for event in events {
            println!("{:?} {}", event.event_type, event.data);
        }
    }

    Ok(())
}
