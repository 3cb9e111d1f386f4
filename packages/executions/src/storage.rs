// ABOUTME: Execution index trait and its SQLite implementation
// ABOUTME: Tracks status, result path and terminal error per execution

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::debug;
use vrooli_core::ExecutionPlan;

use crate::error::{IndexError, IndexResult};
use crate::types::{ExecutionRecord, ExecutionStatus};

/// Database record kept alongside each result bundle.
#[async_trait]
pub trait ExecutionIndex: Send + Sync {
    async fn upsert_running(&self, plan: &ExecutionPlan) -> IndexResult<()>;

    async fn update_result_path(&self, execution_id: &str, result_path: &str) -> IndexResult<()>;

    /// Move to `failed`. The first completion time wins on repeated calls.
    async fn mark_failed(
        &self,
        execution_id: &str,
        message: &str,
        completed_at: DateTime<Utc>,
    ) -> IndexResult<()>;

    async fn mark_completed(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        completed_at: DateTime<Utc>,
    ) -> IndexResult<()>;

    async fn get(&self, execution_id: &str) -> IndexResult<Option<ExecutionRecord>>;
}

pub struct SqliteExecutionIndex {
    pool: SqlitePool,
}

impl SqliteExecutionIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the `executions` table if it does not exist.
    pub async fn init(&self) -> IndexResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS executions (
                id TEXT PRIMARY KEY,
                workflow_id TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL,
                result_path TEXT,
                error_message TEXT,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> IndexResult<ExecutionRecord> {
        Ok(ExecutionRecord {
            id: row.try_get("id")?,
            workflow_id: row.try_get("workflow_id")?,
            status: row.try_get("status")?,
            result_path: row.try_get("result_path")?,
            error_message: row.try_get("error_message")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl ExecutionIndex for SqliteExecutionIndex {
    async fn upsert_running(&self, plan: &ExecutionPlan) -> IndexResult<()> {
        debug!("Marking execution running: {}", plan.execution_id);
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO executions (id, workflow_id, status, started_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                workflow_id = excluded.workflow_id,
                status = excluded.status,
                error_message = NULL,
                completed_at = NULL,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&plan.execution_id)
        .bind(&plan.workflow_id)
        .bind(ExecutionStatus::Running)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_result_path(&self, execution_id: &str, result_path: &str) -> IndexResult<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO executions (id, status, result_path, started_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                result_path = excluded.result_path,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(execution_id)
        .bind(ExecutionStatus::Running)
        .bind(result_path)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_failed(
        &self,
        execution_id: &str,
        message: &str,
        completed_at: DateTime<Utc>,
    ) -> IndexResult<()> {
        debug!("Marking execution failed: {}", execution_id);
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO executions (id, status, error_message, started_at, completed_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                error_message = excluded.error_message,
                completed_at = COALESCE(executions.completed_at, excluded.completed_at),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(execution_id)
        .bind(ExecutionStatus::Failed)
        .bind(message)
        .bind(completed_at)
        .bind(completed_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_completed(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        completed_at: DateTime<Utc>,
    ) -> IndexResult<()> {
        if !status.is_terminal() {
            return Err(IndexError::InvalidStatus(status.as_str().to_string()));
        }
        debug!("Marking execution {}: {}", status.as_str(), execution_id);

        let result = sqlx::query(
            "UPDATE executions SET status = ?, completed_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status)
        .bind(completed_at)
        .bind(Utc::now())
        .bind(execution_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(IndexError::NotFound(execution_id.to_string()));
        }
        Ok(())
    }

    async fn get(&self, execution_id: &str) -> IndexResult<Option<ExecutionRecord>> {
        let row = sqlx::query("SELECT * FROM executions WHERE id = ?")
            .bind(execution_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_record).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup() -> SqliteExecutionIndex {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let index = SqliteExecutionIndex::new(pool);
        index.init().await.unwrap();
        index
    }

    #[tokio::test]
    async fn test_upsert_then_complete() {
        let index = setup().await;
        let plan = ExecutionPlan::new("exec-1", "wf-1");

        index.upsert_running(&plan).await.unwrap();
        index
            .update_result_path("exec-1", "/data/exec-1/result.json")
            .await
            .unwrap();
        index
            .mark_completed("exec-1", ExecutionStatus::Completed, Utc::now())
            .await
            .unwrap();

        let record = index.get("exec-1").await.unwrap().unwrap();
        assert_eq!(record.workflow_id, "wf-1");
        assert_eq!(record.status, ExecutionStatus::Completed);
        assert_eq!(record.result_path.as_deref(), Some("/data/exec-1/result.json"));
        assert!(record.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_mark_failed_is_stable_across_calls() {
        let index = setup().await;
        index
            .upsert_running(&ExecutionPlan::new("exec-2", "wf"))
            .await
            .unwrap();

        let first = Utc::now();
        index.mark_failed("exec-2", "boom", first).await.unwrap();
        let after_first = index.get("exec-2").await.unwrap().unwrap();

        index
            .mark_failed("exec-2", "boom", first + chrono::Duration::seconds(5))
            .await
            .unwrap();
        let after_second = index.get("exec-2").await.unwrap().unwrap();

        assert_eq!(after_second.status, ExecutionStatus::Failed);
        assert_eq!(after_second.error_message.as_deref(), Some("boom"));
        assert_eq!(after_first.completed_at, after_second.completed_at);
    }

    #[tokio::test]
    async fn test_mark_completed_rejects_non_terminal_and_unknown() {
        let index = setup().await;
        assert!(matches!(
            index
                .mark_completed("x", ExecutionStatus::Running, Utc::now())
                .await,
            Err(IndexError::InvalidStatus(_))
        ));
        assert!(matches!(
            index
                .mark_completed("x", ExecutionStatus::Completed, Utc::now())
                .await,
            Err(IndexError::NotFound(_))
        ));
        assert!(index.get("x").await.unwrap().is_none());
    }
}
