pub mod sqlite_monitoring_repository;
pub mod sqlite_task_repository;

pub use sqlite_monitoring_repository::SqliteMonitoringRepository;
pub use sqlite_task_repository::SqliteTaskRepository;
