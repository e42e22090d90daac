pub mod manager;
pub mod sqlite;

pub use manager::{run_migrations, DatabaseManager};
pub use sqlite::{SqliteMonitoringRepository, SqliteTaskRepository};

/// 测试用的单连接内存数据库
#[cfg(test)]
pub(crate) async fn memory_pool() -> sqlx::SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}
