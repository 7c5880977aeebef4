// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! `sessions` table CRUD (spec §4.F). Shares its connection with
//! `sven-memory::ThreadStore` and `sven-scheduler::TaskStore` rather than
//! opening a third one — see `sven_memory::store` for the schema all three
//! crates read/write.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use sven_memory::SharedConnection;

use crate::error::{Result, TeamError};
use crate::types::{SessionRecord, SessionStatus};

async fn with_busy_retry<F, T>(f: F) -> Result<T>
where
    F: Fn() -> rusqlite::Result<T> + Send + Sync + 'static,
    T: Send + 'static,
{
    sven_memory::with_busy_retry(move || f().map_err(sven_memory::MemoryError::from))
        .await
        .map_err(TeamError::Memory)
}

/// `sessions` table persistence, sharing the single connection
/// `ThreadStore`/`TaskStore` already hold.
pub struct SessionStore {
    conn: SharedConnection,
}

impl SessionStore {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    pub async fn create(
        &self,
        id: String,
        project_id: Option<String>,
        name: String,
        description: String,
        configuration: serde_json::Value,
    ) -> Result<SessionRecord> {
        let conn = self.conn.clone();
        let now = Utc::now();
        let record = SessionRecord {
            id,
            project_id,
            name,
            description,
            configuration,
            status: SessionStatus::Active,
            created_at: now,
            updated_at: now,
        };
        let row = record.clone();
        with_busy_retry(move || {
            let conn = conn.lock().expect("session store mutex poisoned");
            conn.execute(
                "INSERT INTO sessions (id, project_id, name, description, configuration, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    row.id,
                    row.project_id,
                    row.name,
                    row.description,
                    serde_json::to_string(&row.configuration).expect("json serialization"),
                    row.status.as_str(),
                    row.created_at.to_rfc3339(),
                    row.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await?;
        Ok(record)
    }

    pub async fn get(&self, id: &str) -> Result<SessionRecord> {
        let conn = self.conn.clone();
        let id_owned = id.to_string();
        let id_for_err = id_owned.clone();
        let row = with_busy_retry(move || {
            let conn = conn.lock().expect("session store mutex poisoned");
            query_session(&conn, &id_owned)
        })
        .await?;
        row.ok_or(TeamError::SessionNotFound(id_for_err))
    }

    pub async fn list(&self, project_id: Option<&str>) -> Result<Vec<SessionRecord>> {
        let conn = self.conn.clone();
        let project_id = project_id.map(str::to_string);
        with_busy_retry(move || {
            let conn = conn.lock().expect("session store mutex poisoned");
            let (sql, params): (&str, Vec<Box<dyn rusqlite::ToSql>>) = match &project_id {
                Some(pid) => (
                    "SELECT id, project_id, name, description, configuration, status, created_at, updated_at \
                     FROM sessions WHERE project_id = ?1 ORDER BY created_at DESC",
                    vec![Box::new(pid.clone())],
                ),
                None => (
                    "SELECT id, project_id, name, description, configuration, status, created_at, updated_at \
                     FROM sessions ORDER BY created_at DESC",
                    vec![],
                ),
            };
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), row_to_session)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
        .await
    }

    pub async fn update_status(&self, id: &str, status: SessionStatus) -> Result<SessionRecord> {
        let conn = self.conn.clone();
        let id = id.to_string();
        with_busy_retry(move || {
            let conn = conn.lock().expect("session store mutex poisoned");
            conn.execute(
                "UPDATE sessions SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), Utc::now().to_rfc3339(), id],
            )?;
            Ok(())
        })
        .await?;
        self.get(&id).await
    }

    pub async fn update_configuration(
        &self,
        id: &str,
        configuration: serde_json::Value,
    ) -> Result<SessionRecord> {
        let conn = self.conn.clone();
        let id = id.to_string();
        let config_json = serde_json::to_string(&configuration).map_err(TeamError::Serialization)?;
        with_busy_retry(move || {
            let conn = conn.lock().expect("session store mutex poisoned");
            conn.execute(
                "UPDATE sessions SET configuration = ?1, updated_at = ?2 WHERE id = ?3",
                params![config_json, Utc::now().to_rfc3339(), id],
            )?;
            Ok(())
        })
        .await?;
        self.get(&id).await
    }
}

fn query_session(
    conn: &rusqlite::Connection,
    id: &str,
) -> rusqlite::Result<Option<SessionRecord>> {
    conn.query_row(
        "SELECT id, project_id, name, description, configuration, status, created_at, updated_at \
         FROM sessions WHERE id = ?1",
        params![id],
        row_to_session,
    )
    .optional()
}

fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<SessionRecord> {
    let configuration_json: String = row.get(4)?;
    let status_s: String = row.get(5)?;
    let created_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;
    Ok(SessionRecord {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        configuration: serde_json::from_str(&configuration_json).unwrap_or(serde_json::Value::Null),
        status: SessionStatus::from_str(&status_s).unwrap_or(SessionStatus::Active),
        created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
        updated_at: updated_at.parse().unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use std::sync::{Arc, Mutex};

    fn store() -> SessionStore {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE sessions (
                id TEXT PRIMARY KEY,
                project_id TEXT,
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                configuration TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )
        .unwrap();
        SessionStore::new(Arc::new(Mutex::new(conn)))
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = store();
        let created = store
            .create(
                "sess1".into(),
                Some("proj1".into()),
                "My Session".into(),
                "desc".into(),
                serde_json::json!({"model": {"name": "gpt-4o-mini"}}),
            )
            .await
            .unwrap();
        let fetched = store.get(&created.id).await.unwrap();
        assert_eq!(fetched.name, "My Session");
        assert_eq!(fetched.status, SessionStatus::Active);
        assert_eq!(fetched.configuration["model"]["name"], "gpt-4o-mini");
    }

    #[tokio::test]
    async fn update_status_persists() {
        let store = store();
        store
            .create("sess1".into(), None, "n".into(), "d".into(), serde_json::json!({}))
            .await
            .unwrap();
        let updated = store.update_status("sess1", SessionStatus::Archived).await.unwrap();
        assert_eq!(updated.status, SessionStatus::Archived);
    }

    #[tokio::test]
    async fn list_filters_by_project() {
        let store = store();
        store
            .create("s1".into(), Some("p1".into()), "a".into(), "".into(), serde_json::json!({}))
            .await
            .unwrap();
        store
            .create("s2".into(), Some("p2".into()), "b".into(), "".into(), serde_json::json!({}))
            .await
            .unwrap();
        let p1 = store.list(Some("p1")).await.unwrap();
        assert_eq!(p1.len(), 1);
        assert_eq!(p1[0].id, "s1");
        let all = store.list(None).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
