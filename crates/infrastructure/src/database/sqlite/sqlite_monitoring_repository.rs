use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};
use tutor_core::{
    models::{ErrorLogEntry, MetricsSnapshot, MonitoringRecord},
    traits::MonitoringRepository,
    TutorResult,
};

/// 监控日志与错误日志，与任务表共用同一个数据库
pub struct SqliteMonitoringRepository {
    pool: SqlitePool,
}

impl SqliteMonitoringRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MonitoringRepository for SqliteMonitoringRepository {
    #[instrument(skip(self, snapshot))]
    async fn record_snapshot(&self, snapshot: &MetricsSnapshot) -> TutorResult<()> {
        let metrics_json = serde_json::to_string(snapshot)?;

        sqlx::query("INSERT INTO monitoring_logs (metrics, recorded_at) VALUES ($1, $2)")
            .bind(metrics_json)
            .bind(snapshot.timestamp)
            .execute(&self.pool)
            .await?;

        debug!("写入指标快照成功");
        Ok(())
    }

    #[instrument(skip(self, entry), fields(task_id = ?entry.task_id, error_type = %entry.error_type))]
    async fn record_error(&self, entry: &ErrorLogEntry) -> TutorResult<()> {
        let details = entry
            .details
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO error_logs (task_id, error_type, message, details, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&entry.task_id)
        .bind(&entry.error_type)
        .bind(&entry.message)
        .bind(details)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent_snapshots(&self, limit: i64) -> TutorResult<Vec<MonitoringRecord>> {
        let rows = sqlx::query(
            "SELECT id, metrics, recorded_at FROM monitoring_logs ORDER BY recorded_at DESC, id DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let metrics_json: String = row.try_get("metrics")?;
            let recorded_at: DateTime<Utc> = row.try_get("recorded_at")?;
            records.push(MonitoringRecord {
                id: row.try_get("id")?,
                snapshot: serde_json::from_str(&metrics_json)?,
                recorded_at,
            });
        }
        Ok(records)
    }

    async fn recent_errors(&self, limit: i64) -> TutorResult<Vec<ErrorLogEntry>> {
        let rows = sqlx::query(
            "SELECT task_id, error_type, message, details, created_at FROM error_logs ORDER BY created_at DESC, id DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let details: Option<String> = row.try_get("details")?;
            entries.push(ErrorLogEntry {
                task_id: row.try_get("task_id")?,
                error_type: row.try_get("error_type")?,
                message: row.try_get("message")?,
                details: details.as_deref().map(serde_json::from_str).transpose()?,
                created_at: row.try_get("created_at")?,
            });
        }
        Ok(entries)
    }
}
