// ABOUTME: SQLite persistence for sandbox records
// ABOUTME: Provides create, get, list, status update and delete over the sandboxes table

use chrono::Utc;
use serde_json::{Map, Value as JsonValue};
use sqlx::{Row, SqlitePool};

use crate::error::{Result, SandboxError};
use crate::types::{Sandbox, SandboxStatus};

pub struct SandboxStore {
    pool: SqlitePool,
}

impl SandboxStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the `sandboxes` table if it does not exist.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sandboxes (
                id TEXT PRIMARY KEY,
                scope_path TEXT NOT NULL,
                project_root TEXT NOT NULL,
                owner TEXT NOT NULL,
                owner_type TEXT NOT NULL,
                status TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn create(&self, sandbox: &Sandbox) -> Result<()> {
        let metadata_json = serde_json::to_string(&sandbox.metadata)?;

        sqlx::query(
            r#"
            INSERT INTO sandboxes (
                id, scope_path, project_root, owner, owner_type, status,
                metadata, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&sandbox.id)
        .bind(&sandbox.scope_path)
        .bind(&sandbox.project_root)
        .bind(&sandbox.owner)
        .bind(sandbox.owner_type)
        .bind(sandbox.status)
        .bind(&metadata_json)
        .bind(sandbox.created_at)
        .bind(sandbox.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Sandbox> {
        let row = sqlx::query("SELECT * FROM sandboxes WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Self::row_to_sandbox(&row),
            None => Err(SandboxError::NotFound(id.to_string())),
        }
    }

    /// Newest first, optionally filtered by status.
    pub async fn list(&self, status: Option<SandboxStatus>) -> Result<Vec<Sandbox>> {
        let rows = match status {
            Some(status) => {
                sqlx::query("SELECT * FROM sandboxes WHERE status = ?1 ORDER BY created_at DESC")
                    .bind(status)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT * FROM sandboxes ORDER BY created_at DESC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.iter().map(Self::row_to_sandbox).collect()
    }

    pub async fn update_status(&self, id: &str, status: SandboxStatus) -> Result<()> {
        let result = sqlx::query("UPDATE sandboxes SET status = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(status)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(SandboxError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Returns whether a row was removed.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sandboxes WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    fn row_to_sandbox(row: &sqlx::sqlite::SqliteRow) -> Result<Sandbox> {
        let metadata_json: String = row.try_get("metadata")?;
        let metadata: Map<String, JsonValue> = serde_json::from_str(&metadata_json)?;

        Ok(Sandbox {
            id: row.try_get("id")?,
            scope_path: row.try_get("scope_path")?,
            project_root: row.try_get("project_root")?,
            owner: row.try_get("owner")?,
            owner_type: row.try_get("owner_type")?,
            status: row.try_get("status")?,
            metadata,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}
