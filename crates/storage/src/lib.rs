use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_create::{RecordAccessor, StackStore};
use serde_json::{Map, Value};
use shared::{
    domain::{EntityType, RecordId, RecordRef, SessionId},
    naming::STACK_SLOT,
    protocol::WorkflowState,
};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

const MEMORY_URL: &str = "sqlite::memory:";

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub id: RecordId,
    pub entity_type: EntityType,
    pub fields: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredRecord {
    pub fn record_ref(&self) -> RecordRef {
        RecordRef::new(self.entity_type.clone(), self.id)
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every connection to an in-memory database sees its own empty database.
        let max_connections = if database_url.starts_with(MEMORY_URL) { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn get_attribute(&self, session: &SessionId, name: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM session_attributes WHERE session_id = ? AND name = ?")
            .bind(session.as_str())
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to read attribute '{name}'"))?;
        Ok(row.map(|r| r.get::<String, _>(0)))
    }

    pub async fn set_attribute(&self, session: &SessionId, name: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO session_attributes (session_id, name, value, updated_at) VALUES (?, ?, ?, CURRENT_TIMESTAMP)
             ON CONFLICT(session_id, name) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
        )
        .bind(session.as_str())
        .bind(name)
        .bind(value)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to write attribute '{name}'"))?;
        Ok(())
    }

    pub async fn remove_attribute(&self, session: &SessionId, name: &str) -> Result<()> {
        sqlx::query("DELETE FROM session_attributes WHERE session_id = ? AND name = ?")
            .bind(session.as_str())
            .bind(name)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to remove attribute '{name}'"))?;
        Ok(())
    }

    /// Sessions that currently hold attribute `name`, oldest write first.
    pub async fn list_sessions_with(&self, name: &str) -> Result<Vec<SessionId>> {
        let rows = sqlx::query(
            "SELECT session_id FROM session_attributes WHERE name = ? ORDER BY updated_at, session_id",
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| SessionId(r.get::<String, _>(0)))
            .collect())
    }

    pub async fn insert_record(
        &self,
        entity_type: &EntityType,
        fields: &Map<String, Value>,
    ) -> Result<RecordId> {
        let encoded = serde_json::to_string(fields)?;
        let rec = sqlx::query("INSERT INTO records (entity_type, fields) VALUES (?, ?) RETURNING id")
            .bind(entity_type.as_str())
            .bind(encoded)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("failed to insert {entity_type} record"))?;
        Ok(RecordId(rec.get::<i64, _>(0)))
    }

    /// Returns false when no record of `entity_type` has this id.
    pub async fn update_record(
        &self,
        entity_type: &EntityType,
        id: RecordId,
        fields: &Map<String, Value>,
    ) -> Result<bool> {
        let encoded = serde_json::to_string(fields)?;
        let result = sqlx::query(
            "UPDATE records SET fields = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ? AND entity_type = ?",
        )
        .bind(encoded)
        .bind(id.0)
        .bind(entity_type.as_str())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to update {entity_type} record {id}"))?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn load_record(
        &self,
        entity_type: &EntityType,
        id: RecordId,
    ) -> Result<Option<StoredRecord>> {
        let row = sqlx::query(
            "SELECT id, entity_type, fields, created_at, updated_at FROM records WHERE id = ? AND entity_type = ?",
        )
        .bind(id.0)
        .bind(entity_type.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| stored_record(&r)).transpose()
    }

    pub async fn list_records(&self, entity_type: &EntityType) -> Result<Vec<StoredRecord>> {
        let rows = sqlx::query(
            "SELECT id, entity_type, fields, created_at, updated_at FROM records WHERE entity_type = ? ORDER BY id",
        )
        .bind(entity_type.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(stored_record).collect()
    }
}

fn stored_record(r: &SqliteRow) -> Result<StoredRecord> {
    let fields: Map<String, Value> = serde_json::from_str(&r.get::<String, _>(2))
        .context("record fields are not a JSON object")?;
    Ok(StoredRecord {
        id: RecordId(r.get::<i64, _>(0)),
        entity_type: EntityType::new(r.get::<String, _>(1)),
        fields,
        created_at: r.get::<DateTime<Utc>, _>(3),
        updated_at: r.get::<DateTime<Utc>, _>(4),
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with(MEMORY_URL) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[async_trait]
impl StackStore for Storage {
    async fn load(&self, session: &SessionId) -> Result<WorkflowState> {
        let Some(raw) = self.get_attribute(session, STACK_SLOT).await? else {
            return Ok(WorkflowState::new());
        };
        serde_json::from_str(&raw)
            .with_context(|| format!("corrupt quick create stack for session {session}"))
    }

    async fn save(&self, session: &SessionId, state: &WorkflowState) -> Result<()> {
        if !state.is_active() {
            debug!(%session, "clearing quick create stack");
            return self.remove_attribute(session, STACK_SLOT).await;
        }
        let encoded = serde_json::to_string(state)?;
        self.set_attribute(session, STACK_SLOT, &encoded).await
    }
}

/// Record accessor for one entity type backed by the `records` table.
#[derive(Clone)]
pub struct StorageRecordAccessor {
    storage: Storage,
    entity_type: EntityType,
}

impl StorageRecordAccessor {
    pub fn new(storage: Storage, entity_type: EntityType) -> Self {
        Self {
            storage,
            entity_type,
        }
    }
}

#[async_trait]
impl RecordAccessor for StorageRecordAccessor {
    async fn retrieve_by_primary_key(&self, id: RecordId) -> Result<Option<RecordRef>> {
        Ok(self
            .storage
            .load_record(&self.entity_type, id)
            .await?
            .map(|record| record.record_ref()))
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
