// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! [`ThreadStore`] — the append-only thread event store (spec §4.A).
//!
//! Wraps a single `rusqlite::Connection` behind `spawn_blocking` (the
//! standard idiom for mixing a synchronous DB driver into an async runtime
//! — no exact teacher precedent, documented in DESIGN.md as a pack-wide
//! ecosystem idiom). The connection also backs `sven-scheduler`'s
//! `tasks`/`task_notes` tables and `sven-team`'s `sessions` table — all five
//! tables spec §6 names live in the one `db.sqlite` this crate opens, so a
//! single writer/busy-retry discipline covers the whole persistence layer.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::error::{MemoryError, Result};
use crate::ids::ThreadId;
use crate::notify::{Notifier, ThreadEventAdded};
use crate::types::{EventType, Thread, ThreadEvent, ThreadMetadata};

/// Shared handle to the single SQLite connection backing the whole
/// persistence layer. `sven-scheduler` and `sven-team` take this by
/// construction instead of opening their own connection, so `tasks`/
/// `task_notes`/`sessions` share `threads`' single-writer discipline.
pub type SharedConnection = Arc<Mutex<Connection>>;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS threads (
    id TEXT PRIMARY KEY,
    parent_id TEXT,
    project_id TEXT,
    metadata TEXT NOT NULL,
    created_at TEXT NOT NULL,
    FOREIGN KEY(parent_id) REFERENCES threads(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS thread_events (
    thread_id TEXT NOT NULL,
    seq INTEGER NOT NULL,
    id TEXT NOT NULL,
    type TEXT NOT NULL,
    data TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    PRIMARY KEY(thread_id, seq),
    FOREIGN KEY(thread_id) REFERENCES threads(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    prompt TEXT NOT NULL,
    status TEXT NOT NULL,
    priority TEXT NOT NULL,
    assigned_to TEXT,
    created_by TEXT NOT NULL,
    thread_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY(thread_id) REFERENCES threads(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS task_notes (
    id TEXT PRIMARY KEY,
    task_id TEXT NOT NULL,
    author TEXT NOT NULL,
    content TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    FOREIGN KEY(task_id) REFERENCES tasks(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    project_id TEXT,
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    configuration TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY(id) REFERENCES threads(id) ON DELETE CASCADE
);
"#;

/// Append-only per-thread event log plus thread-tree bookkeeping.
#[derive(Clone)]
pub struct ThreadStore {
    conn: SharedConnection,
    notifier: Notifier,
}

impl ThreadStore {
    /// Open (creating if absent) the SQLite database at `path`, applying the
    /// schema migration. Foreign keys are enabled per-connection since
    /// SQLite defaults them off.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(rusqlite_io_err)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            notifier: Notifier::new(),
        })
    }

    /// In-memory store, for tests and the demo binary.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            notifier: Notifier::new(),
        })
    }

    /// The shared connection, for `sven-scheduler`/`sven-team` to attach
    /// their own tables' queries to without opening a second connection.
    pub fn connection(&self) -> SharedConnection {
        self.conn.clone()
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ThreadEventAdded> {
        self.notifier.subscribe()
    }

    pub async fn create_thread(
        &self,
        id: ThreadId,
        parent_id: Option<ThreadId>,
        project_id: Option<String>,
    ) -> Result<Thread> {
        let conn = self.conn.clone();
        let thread = Thread {
            id,
            parent_thread_id: parent_id,
            project_id,
            metadata: ThreadMetadata::default(),
            created_at: Utc::now(),
        };
        let row = thread.clone();
        with_busy_retry(move || {
            let conn = conn.lock().expect("thread store mutex poisoned");
            conn.execute(
                "INSERT INTO threads (id, parent_id, project_id, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    row.id.as_str(),
                    row.parent_thread_id.as_ref().map(ThreadId::as_str),
                    row.project_id,
                    serde_json::to_string(&row.metadata)?,
                    row.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await?;
        Ok(thread)
    }

    pub async fn get_thread(&self, id: &ThreadId) -> Result<Thread> {
        let conn = self.conn.clone();
        let id = id.clone();
        with_busy_retry(move || {
            let conn = conn.lock().expect("thread store mutex poisoned");
            let row = conn
                .query_row(
                    "SELECT id, parent_id, project_id, metadata, created_at FROM threads WHERE id = ?1",
                    params![id.as_str()],
                    |r| {
                        Ok((
                            r.get::<_, String>(0)?,
                            r.get::<_, Option<String>>(1)?,
                            r.get::<_, Option<String>>(2)?,
                            r.get::<_, String>(3)?,
                            r.get::<_, String>(4)?,
                        ))
                    },
                )
                .optional()?;
            let (id_s, parent_s, project_id, metadata_json, created_at) =
                row.ok_or_else(|| MemoryError::ThreadNotFound(id.as_str().to_string()))?;
            Ok(Thread {
                id: ThreadId::from_raw(id_s)?,
                parent_thread_id: parent_s.map(ThreadId::from_raw).transpose()?,
                project_id,
                metadata: serde_json::from_str(&metadata_json)?,
                created_at: created_at
                    .parse()
                    .map_err(|_| MemoryError::Internal("bad created_at timestamp".into()))?,
            })
        })
        .await
    }

    /// Append a typed event, assigning it the next per-thread sequence
    /// number inside a transaction so concurrent appenders are serialized
    /// and the numbering is gap-free and strictly increasing.
    pub async fn append_event(
        &self,
        thread_id: &ThreadId,
        event_type: EventType,
        data: Value,
    ) -> Result<ThreadEvent> {
        let conn = self.conn.clone();
        let thread_id = thread_id.clone();
        let event = with_busy_retry(move || {
            let mut conn = conn.lock().expect("thread store mutex poisoned");
            // IMMEDIATE acquires the write lock up front so the
            // MAX(seq)+1 read and the insert cannot interleave with another
            // writer's transaction (guards the strict per-thread ordering
            // invariant even if two processes share the database file).
            let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
            let next_seq: i64 = tx
                .query_row(
                    "SELECT COALESCE(MAX(seq), 0) + 1 FROM thread_events WHERE thread_id = ?1",
                    params![thread_id.as_str()],
                    |r| r.get(0),
                )?;
            let timestamp = Utc::now();
            let event_id = uuid::Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO thread_events (thread_id, seq, id, type, data, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    thread_id.as_str(),
                    next_seq,
                    event_id,
                    event_type.as_str(),
                    serde_json::to_string(&data)?,
                    timestamp.to_rfc3339(),
                ],
            )?;
            tx.commit()?;
            Ok(ThreadEvent {
                id: next_seq as u64,
                thread_id: thread_id.clone(),
                event_type,
                data: data.clone(),
                timestamp,
            })
        })
        .await?;
        self.notifier.publish(thread_id, event.clone());
        Ok(event)
    }

    pub async fn list_events(&self, thread_id: &ThreadId) -> Result<Vec<ThreadEvent>> {
        let conn = self.conn.clone();
        let thread_id = thread_id.clone();
        with_busy_retry(move || {
            let conn = conn.lock().expect("thread store mutex poisoned");
            query_events(&conn, "WHERE thread_id = ?1", params![thread_id.as_str()])
        })
        .await
    }

    /// All events for `root_id` and every descendant thread, merged into a
    /// single timestamp-ordered sequence (spec §4.A
    /// `listMainAndDelegateEvents`).
    pub async fn list_main_and_delegate_events(&self, root_id: &ThreadId) -> Result<Vec<ThreadEvent>> {
        let conn = self.conn.clone();
        let root_id = root_id.clone();
        with_busy_retry(move || {
            let conn = conn.lock().expect("thread store mutex poisoned");
            let mut events = query_events(
                &conn,
                "WHERE thread_id = ?1 OR thread_id LIKE ?2",
                params![root_id.as_str(), format!("{}.%", root_id.as_str())],
            )?;
            events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
            Ok(events)
        })
        .await
    }

    /// Every thread belonging to the session rooted at `root_id` (the root
    /// itself plus all descendants), ordered by id.
    pub async fn list_threads_for_session(&self, root_id: &ThreadId) -> Result<Vec<Thread>> {
        let conn = self.conn.clone();
        let root_id = root_id.clone();
        with_busy_retry(move || {
            let conn = conn.lock().expect("thread store mutex poisoned");
            let mut stmt = conn.prepare(
                "SELECT id, parent_id, project_id, metadata, created_at FROM threads
                 WHERE id = ?1 OR id LIKE ?2 ORDER BY id",
            )?;
            let rows = stmt.query_map(
                params![root_id.as_str(), format!("{}.%", root_id.as_str())],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, Option<String>>(1)?,
                        r.get::<_, Option<String>>(2)?,
                        r.get::<_, String>(3)?,
                        r.get::<_, String>(4)?,
                    ))
                },
            )?;
            let mut out = Vec::new();
            for row in rows {
                let (id_s, parent_s, project_id, metadata_json, created_at) = row?;
                out.push(Thread {
                    id: ThreadId::from_raw(id_s)?,
                    parent_thread_id: parent_s.map(ThreadId::from_raw).transpose()?,
                    project_id,
                    metadata: serde_json::from_str(&metadata_json)?,
                    created_at: created_at
                        .parse()
                        .map_err(|_| MemoryError::Internal("bad created_at timestamp".into()))?,
                });
            }
            Ok(out)
        })
        .await
    }

    pub async fn update_metadata(&self, thread_id: &ThreadId, partial: ThreadMetadata) -> Result<()> {
        let conn = self.conn.clone();
        let thread_id = thread_id.clone();
        with_busy_retry(move || {
            let conn = conn.lock().expect("thread store mutex poisoned");
            let current: String = conn
                .query_row(
                    "SELECT metadata FROM threads WHERE id = ?1",
                    params![thread_id.as_str()],
                    |r| r.get(0),
                )
                .optional()?
                .ok_or_else(|| MemoryError::ThreadNotFound(thread_id.as_str().to_string()))?;
            let mut metadata: ThreadMetadata = serde_json::from_str(&current)?;
            metadata.merge(partial.clone());
            conn.execute(
                "UPDATE threads SET metadata = ?1 WHERE id = ?2",
                params![serde_json::to_string(&metadata)?, thread_id.as_str()],
            )?;
            Ok(())
        })
        .await
    }

    /// Delete a thread and cascade to every descendant (`ON DELETE CASCADE`
    /// propagates through `thread_events`/`tasks`/`task_notes`/`sessions`).
    pub async fn delete_thread(&self, thread_id: &ThreadId) -> Result<()> {
        let conn = self.conn.clone();
        let thread_id = thread_id.clone();
        with_busy_retry(move || {
            let conn = conn.lock().expect("thread store mutex poisoned");
            conn.execute(
                "DELETE FROM threads WHERE id = ?1 OR id LIKE ?2",
                params![thread_id.as_str(), format!("{}.%", thread_id.as_str())],
            )?;
            Ok(())
        })
        .await
    }
}

fn query_events(
    conn: &Connection,
    where_clause: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<ThreadEvent>> {
    let sql = format!(
        "SELECT thread_id, seq, type, data, timestamp FROM thread_events {where_clause} ORDER BY seq"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params, |r| {
        Ok((
            r.get::<_, String>(0)?,
            r.get::<_, i64>(1)?,
            r.get::<_, String>(2)?,
            r.get::<_, String>(3)?,
            r.get::<_, String>(4)?,
        ))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (thread_id, seq, type_s, data_json, timestamp) = row?;
        out.push(ThreadEvent {
            id: seq as u64,
            thread_id: ThreadId::from_raw(thread_id)?,
            event_type: EventType::from_str(&type_s)
                .ok_or_else(|| MemoryError::Internal(format!("unknown event type {type_s:?}")))?,
            data: serde_json::from_str(&data_json)?,
            timestamp: timestamp
                .parse()
                .map_err(|_| MemoryError::Internal("bad timestamp".into()))?,
        });
    }
    Ok(out)
}

fn rusqlite_io_err(e: std::io::Error) -> MemoryError {
    MemoryError::Internal(format!("io error: {e}"))
}

/// Bounded exponential backoff for `SQLITE_BUSY`/contention errors: 100ms,
/// 200ms, 400ms, capped at 1s, 3 attempts — matches the Task Store's
/// durability policy (spec §4.B), applied here since both share a
/// single-writer connection (spec §5).
pub async fn with_busy_retry<F, T>(f: F) -> Result<T>
where
    F: Fn() -> Result<T> + Send + Sync + 'static,
    T: Send + 'static,
{
    let f = Arc::new(f);
    let mut delay_ms: u64 = 100;
    let mut attempt = 0;
    loop {
        attempt += 1;
        let f = f.clone();
        let outcome = tokio::task::spawn_blocking(move || f())
            .await
            .expect("blocking task panicked");
        match outcome {
            Ok(v) => return Ok(v),
            Err(MemoryError::Storage(rusqlite::Error::SqliteFailure(e, _)))
                if e.code == rusqlite::ErrorCode::DatabaseBusy && attempt < 3 =>
            {
                tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                delay_ms = (delay_ms * 2).min(1000);
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn root_id() -> ThreadId {
        ThreadId::root("sess1").unwrap()
    }

    #[tokio::test]
    async fn create_and_get_thread_round_trips() {
        let store = ThreadStore::open_in_memory().unwrap();
        store
            .create_thread(root_id(), None, Some("proj1".into()))
            .await
            .unwrap();
        let thread = store.get_thread(&root_id()).await.unwrap();
        assert_eq!(thread.id, root_id());
        assert_eq!(thread.project_id.as_deref(), Some("proj1"));
    }

    #[tokio::test]
    async fn get_unknown_thread_errors() {
        let store = ThreadStore::open_in_memory().unwrap();
        let err = store.get_thread(&root_id()).await.unwrap_err();
        assert!(matches!(err, MemoryError::ThreadNotFound(_)));
    }

    #[tokio::test]
    async fn append_event_assigns_monotonic_ids() {
        let store = ThreadStore::open_in_memory().unwrap();
        store.create_thread(root_id(), None, None).await.unwrap();
        let e1 = store
            .append_event(&root_id(), EventType::UserMessage, json!({"text": "hi"}))
            .await
            .unwrap();
        let e2 = store
            .append_event(&root_id(), EventType::AgentMessage, json!({"text": "hello"}))
            .await
            .unwrap();
        assert_eq!(e1.id, 1);
        assert_eq!(e2.id, 2);
    }

    #[tokio::test]
    async fn reading_events_twice_returns_equal_sequences() {
        let store = ThreadStore::open_in_memory().unwrap();
        store.create_thread(root_id(), None, None).await.unwrap();
        store
            .append_event(&root_id(), EventType::UserMessage, json!({"text": "hi"}))
            .await
            .unwrap();
        let first = store.list_events(&root_id()).await.unwrap();
        let second = store.list_events(&root_id()).await.unwrap();
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.data, b.data);
        }
    }

    #[tokio::test]
    async fn list_main_and_delegate_events_interleaves_descendants() {
        let store = ThreadStore::open_in_memory().unwrap();
        let root = root_id();
        let child = root.child(1);
        store.create_thread(root.clone(), None, None).await.unwrap();
        store
            .create_thread(child.clone(), Some(root.clone()), None)
            .await
            .unwrap();
        store
            .append_event(&root, EventType::UserMessage, json!({"n": 1}))
            .await
            .unwrap();
        store
            .append_event(&child, EventType::AgentMessage, json!({"n": 2}))
            .await
            .unwrap();
        store
            .append_event(&root, EventType::TurnComplete, json!({"n": 3}))
            .await
            .unwrap();

        let merged = store.list_main_and_delegate_events(&root).await.unwrap();
        assert_eq!(merged.len(), 3);
        // Timestamp order preserved (insertion order here, ties broken by seq).
        assert_eq!(merged[0].data["n"], 1);
        assert_eq!(merged[1].data["n"], 2);
        assert_eq!(merged[2].data["n"], 3);
    }

    #[tokio::test]
    async fn list_threads_for_session_excludes_unrelated_sessions() {
        let store = ThreadStore::open_in_memory().unwrap();
        let root = root_id();
        let other_root = ThreadId::root("sess2").unwrap();
        store.create_thread(root.clone(), None, None).await.unwrap();
        store
            .create_thread(root.child(1), Some(root.clone()), None)
            .await
            .unwrap();
        store
            .create_thread(other_root.clone(), None, None)
            .await
            .unwrap();

        let threads = store.list_threads_for_session(&root).await.unwrap();
        assert_eq!(threads.len(), 2);
        assert!(threads.iter().all(|t| t.id.root_id() == root));
    }

    #[tokio::test]
    async fn update_metadata_merges_fields() {
        let store = ThreadStore::open_in_memory().unwrap();
        store.create_thread(root_id(), None, None).await.unwrap();
        store
            .update_metadata(&root_id(), ThreadMetadata::session("My Session"))
            .await
            .unwrap();
        let thread = store.get_thread(&root_id()).await.unwrap();
        assert_eq!(thread.metadata.name.as_deref(), Some("My Session"));
        assert!(thread.metadata.is_session);

        store
            .update_metadata(
                &root_id(),
                ThreadMetadata {
                    model_id: Some("gpt-4o".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let thread = store.get_thread(&root_id()).await.unwrap();
        // Earlier fields survive the second partial update.
        assert_eq!(thread.metadata.name.as_deref(), Some("My Session"));
        assert_eq!(thread.metadata.model_id.as_deref(), Some("gpt-4o"));
    }

    #[tokio::test]
    async fn delete_thread_cascades_to_descendants() {
        let store = ThreadStore::open_in_memory().unwrap();
        let root = root_id();
        let child = root.child(1);
        store.create_thread(root.clone(), None, None).await.unwrap();
        store
            .create_thread(child.clone(), Some(root.clone()), None)
            .await
            .unwrap();
        store
            .append_event(&child, EventType::UserMessage, json!({}))
            .await
            .unwrap();

        store.delete_thread(&root).await.unwrap();

        assert!(store.get_thread(&root).await.is_err());
        assert!(store.get_thread(&child).await.is_err());
        assert!(store.list_events(&child).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_thread_does_not_affect_unrelated_threads() {
        let store = ThreadStore::open_in_memory().unwrap();
        let root = root_id();
        let other = ThreadId::root("sess2").unwrap();
        store.create_thread(root.clone(), None, None).await.unwrap();
        store.create_thread(other.clone(), None, None).await.unwrap();

        store.delete_thread(&root).await.unwrap();

        assert!(store.get_thread(&other).await.is_ok());
    }

    #[tokio::test]
    async fn subscribers_observe_appended_events() {
        let store = ThreadStore::open_in_memory().unwrap();
        store.create_thread(root_id(), None, None).await.unwrap();
        let mut rx = store.subscribe();
        store
            .append_event(&root_id(), EventType::UserMessage, json!({"text": "hi"}))
            .await
            .unwrap();
        let notification = rx.try_recv().expect("notification should be queued");
        assert_eq!(notification.thread_id, root_id());
        assert_eq!(notification.event.event_type, EventType::UserMessage);
    }
}
