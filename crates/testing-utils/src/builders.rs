//! Test data builders

use chrono::{DateTime, Duration, Utc};
use tutor_core::models::{AnalysisJob, Task, TaskStatus};

/// Smallest byte sequence carrying a JPEG signature
pub fn sample_jpeg() -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00];
    bytes.extend_from_slice(&[0u8; 32]);
    bytes.extend_from_slice(&[0xFF, 0xD9]);
    bytes
}

/// PNG signature followed by padding
pub fn sample_png() -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.extend_from_slice(&[0u8; 32]);
    bytes
}

/// Builder for creating test Task instances
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn new() -> Self {
        Self {
            task: Task::new_pending("test_user", "test_school"),
        }
    }

    pub fn with_id(mut self, task_id: &str) -> Self {
        self.task.task_id = task_id.to_string();
        self
    }

    pub fn with_user(mut self, user_id: &str) -> Self {
        self.task.user_id = user_id.to_string();
        self
    }

    pub fn with_school(mut self, school_id: &str) -> Self {
        self.task.school_id = school_id.to_string();
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.task.status = status;
        self
    }

    pub fn with_attempts(mut self, attempts: i32) -> Self {
        self.task.attempts = attempts;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.task.created_at = created_at;
        self.task.updated_at = created_at;
        self
    }

    pub fn created_days_ago(self, days: i64) -> Self {
        self.with_created_at(Utc::now() - Duration::days(days))
    }

    pub fn processing(mut self, attempts: i32) -> Self {
        self.task.status = TaskStatus::Processing;
        self.task.attempts = attempts;
        self
    }

    pub fn completed(mut self, result: &str) -> Self {
        self.task.status = TaskStatus::Completed;
        self.task.result = Some(result.to_string());
        self.task.error_message = None;
        self.task.attempts = self.task.attempts.max(1);
        self
    }

    pub fn failed(mut self, error_message: &str) -> Self {
        self.task.status = TaskStatus::Failed;
        self.task.error_message = Some(error_message.to_string());
        self.task.result = None;
        self.task.attempts = self.task.attempts.max(1);
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test AnalysisJob instances
pub struct AnalysisJobBuilder {
    job: AnalysisJob,
}

impl AnalysisJobBuilder {
    /// Job for an existing task, first attempt, JPEG payload
    pub fn for_task(task: &Task) -> Self {
        Self {
            job: AnalysisJob::first_attempt(
                task.task_id.clone(),
                task.user_id.clone(),
                task.school_id.clone(),
                sample_jpeg(),
            ),
        }
    }

    pub fn with_attempt(mut self, attempt: i32) -> Self {
        self.job.attempt = attempt;
        self
    }

    pub fn with_image(mut self, image: Vec<u8>) -> Self {
        self.job.image = image;
        self
    }

    pub fn build(self) -> AnalysisJob {
        self.job
    }
}
