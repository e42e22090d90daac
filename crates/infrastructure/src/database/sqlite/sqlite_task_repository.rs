use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::{debug, instrument};
use tutor_core::{
    models::{Task, TaskStatus},
    traits::TaskRepository,
    TutorError, TutorResult,
};

const TASK_COLUMNS: &str =
    "task_id, user_id, school_id, status, result, error_message, attempts, created_at, updated_at";

pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &SqliteRow) -> TutorResult<Task> {
        Ok(Task {
            task_id: row.try_get("task_id")?,
            user_id: row.try_get("user_id")?,
            school_id: row.try_get("school_id")?,
            status: row.try_get("status")?,
            result: row.try_get("result")?,
            error_message: row.try_get("error_message")?,
            attempts: row.try_get("attempts")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    #[instrument(skip(self, task), fields(task_id = %task.task_id, user_id = %task.user_id))]
    async fn create(&self, task: &Task) -> TutorResult<Task> {
        sqlx::query(
            r#"
            INSERT INTO tasks (task_id, user_id, school_id, status, result, error_message, attempts, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&task.task_id)
        .bind(&task.user_id)
        .bind(&task.school_id)
        .bind(task.status)
        .bind(&task.result)
        .bind(&task.error_message)
        .bind(task.attempts)
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await?;

        debug!("创建任务成功: {}", task.task_id);
        Ok(task.clone())
    }

    #[instrument(skip(self, task), fields(task_id = %task.task_id, status = %task.status))]
    async fn update(&self, task: &Task) -> TutorResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = $2, result = $3, error_message = $4, attempts = $5, updated_at = $6
            WHERE task_id = $1
            "#,
        )
        .bind(&task.task_id)
        .bind(task.status)
        .bind(&task.result)
        .bind(&task.error_message)
        .bind(task.attempts)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(TutorError::TaskNotFound {
                id: task.task_id.clone(),
            });
        }

        debug!("更新任务状态成功: {} -> {}", task.task_id, task.status);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_by_id(&self, task_id: &str) -> TutorResult<Option<Task>> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE task_id = $1"))
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_task(&row)?)),
            None => {
                debug!("查询任务不存在: {}", task_id);
                Ok(None)
            }
        }
    }

    #[instrument(skip(self))]
    async fn list_by_user(&self, user_id: &str, limit: i64, offset: i64) -> TutorResult<Vec<Task>> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = $1 \
             ORDER BY created_at DESC, rowid DESC LIMIT $2 OFFSET $3"
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_task).collect()
    }

    #[instrument(skip(self))]
    async fn delete_finished_before(&self, cutoff: DateTime<Utc>) -> TutorResult<u64> {
        let result = sqlx::query(
            "DELETE FROM tasks WHERE status IN ($1, $2) AND created_at < $3",
        )
        .bind(TaskStatus::Completed)
        .bind(TaskStatus::Failed)
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn health_check(&self) -> TutorResult<bool> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(true)
    }
}
