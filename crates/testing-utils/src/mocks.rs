//! Mock implementations for repository and service traits
//!
//! In-memory doubles usable from unit and integration tests without a
//! database, Redis or the external vision service.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tutor_core::errors::AnalysisError;
use tutor_core::models::{ErrorLogEntry, Message, MetricsSnapshot, MonitoringRecord, Task};
use tutor_core::traits::{MessageQueue, MonitoringRepository, TaskRepository, VisionApi};
use tutor_core::{TutorError, TutorResult};
use tutor_infrastructure::cache::{CacheService, CacheStats};

/// Mock implementation of TaskRepository for testing
#[derive(Debug, Clone, Default)]
pub struct MockTaskRepository {
    tasks: Arc<Mutex<HashMap<String, Task>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MockTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let repo = Self::new();
        for task in tasks {
            repo.insert(task);
        }
        repo
    }

    /// Insert or replace a task without going through the trait
    pub fn insert(&self, task: Task) {
        self.tasks.lock().unwrap().insert(task.task_id.clone(), task);
    }

    /// Make every subsequent create/update fail with a store error
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    pub fn get_all_tasks(&self) -> Vec<Task> {
        self.tasks.lock().unwrap().values().cloned().collect()
    }

    fn check_writable(&self) -> TutorResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TutorError::DatabaseOperation("mock store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TaskRepository for MockTaskRepository {
    async fn create(&self, task: &Task) -> TutorResult<Task> {
        self.check_writable()?;
        let mut tasks = self.tasks.lock().unwrap();
        if tasks.contains_key(&task.task_id) {
            return Err(TutorError::DatabaseOperation(format!(
                "duplicate task id {}",
                task.task_id
            )));
        }
        tasks.insert(task.task_id.clone(), task.clone());
        Ok(task.clone())
    }

    async fn update(&self, task: &Task) -> TutorResult<()> {
        self.check_writable()?;
        let mut tasks = self.tasks.lock().unwrap();
        match tasks.get_mut(&task.task_id) {
            Some(existing) => {
                *existing = task.clone();
                Ok(())
            }
            None => Err(TutorError::TaskNotFound {
                id: task.task_id.clone(),
            }),
        }
    }

    async fn get_by_id(&self, task_id: &str) -> TutorResult<Option<Task>> {
        Ok(self.tasks.lock().unwrap().get(task_id).cloned())
    }

    async fn list_by_user(&self, user_id: &str, limit: i64, offset: i64) -> TutorResult<Vec<Task>> {
        let tasks = self.tasks.lock().unwrap();
        let mut owned: Vec<Task> = tasks
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(owned
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn delete_finished_before(&self, cutoff: DateTime<Utc>) -> TutorResult<u64> {
        let mut tasks = self.tasks.lock().unwrap();
        let before = tasks.len();
        tasks.retain(|_, t| !(t.is_terminal() && t.created_at < cutoff));
        Ok((before - tasks.len()) as u64)
    }

    async fn health_check(&self) -> TutorResult<bool> {
        Ok(!self.fail_writes.load(Ordering::SeqCst))
    }
}

/// Mock implementation of MonitoringRepository for testing
#[derive(Debug, Clone, Default)]
pub struct MockMonitoringRepository {
    snapshots: Arc<Mutex<Vec<MetricsSnapshot>>>,
    errors: Arc<Mutex<Vec<ErrorLogEntry>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MockMonitoringRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let repo = Self::default();
        repo.fail_writes.store(true, Ordering::SeqCst);
        repo
    }

    pub fn snapshots(&self) -> Vec<MetricsSnapshot> {
        self.snapshots.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<ErrorLogEntry> {
        self.errors.lock().unwrap().clone()
    }

    pub fn errors_for(&self, task_id: &str) -> Vec<ErrorLogEntry> {
        self.errors()
            .into_iter()
            .filter(|e| e.task_id.as_deref() == Some(task_id))
            .collect()
    }
}

#[async_trait]
impl MonitoringRepository for MockMonitoringRepository {
    async fn record_snapshot(&self, snapshot: &MetricsSnapshot) -> TutorResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TutorError::DatabaseOperation("mock monitoring log unavailable".to_string()));
        }
        self.snapshots.lock().unwrap().push(snapshot.clone());
        Ok(())
    }

    async fn record_error(&self, entry: &ErrorLogEntry) -> TutorResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TutorError::DatabaseOperation("mock error log unavailable".to_string()));
        }
        self.errors.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn recent_snapshots(&self, limit: i64) -> TutorResult<Vec<MonitoringRecord>> {
        let snapshots = self.snapshots.lock().unwrap();
        Ok(snapshots
            .iter()
            .enumerate()
            .rev()
            .take(limit.max(0) as usize)
            .map(|(i, s)| MonitoringRecord {
                id: i as i64 + 1,
                snapshot: s.clone(),
                recorded_at: s.timestamp,
            })
            .collect())
    }

    async fn recent_errors(&self, limit: i64) -> TutorResult<Vec<ErrorLogEntry>> {
        let errors = self.errors.lock().unwrap();
        Ok(errors.iter().rev().take(limit.max(0) as usize).cloned().collect())
    }
}

/// One scripted response of [`ScriptedVisionApi`]
#[derive(Debug, Clone)]
pub enum VisionStep {
    Reply(String),
    Fail(AnalysisError),
    /// Sleep before replying, used to drive client timeouts
    Delay(Duration, Box<VisionStep>),
}

/// Vision API double that plays back a script, repeating the last step
#[derive(Debug, Clone)]
pub struct ScriptedVisionApi {
    steps: Arc<Mutex<VecDeque<VisionStep>>>,
    fallback: VisionStep,
    calls: Arc<AtomicUsize>,
}

impl ScriptedVisionApi {
    pub fn new(steps: Vec<VisionStep>) -> Self {
        let fallback = steps
            .last()
            .cloned()
            .unwrap_or_else(|| VisionStep::Fail(AnalysisError::Fatal("empty script".to_string())));
        Self {
            steps: Arc::new(Mutex::new(steps.into())),
            fallback,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn always_reply(text: &str) -> Self {
        Self::new(vec![VisionStep::Reply(text.to_string())])
    }

    pub fn always_fail(error: AnalysisError) -> Self {
        Self::new(vec![VisionStep::Fail(error)])
    }

    /// Every call sleeps for `delay` first
    pub fn always_slow(delay: Duration) -> Self {
        Self::new(vec![VisionStep::Delay(
            delay,
            Box::new(VisionStep::Reply("too late".to_string())),
        )])
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> VisionStep {
        self.steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl VisionApi for ScriptedVisionApi {
    async fn explain(&self, _image: &[u8]) -> Result<String, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut step = self.next_step();
        loop {
            match step {
                VisionStep::Reply(text) => return Ok(text),
                VisionStep::Fail(error) => return Err(error),
                VisionStep::Delay(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    step = *inner;
                }
            }
        }
    }
}

/// A published message together with the delay it was scheduled with
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub queue: String,
    pub message: Message,
    pub delay: Option<Duration>,
}

/// Message queue double that records publishes and delivers them immediately
#[derive(Debug, Clone, Default)]
pub struct MockMessageQueue {
    queues: Arc<Mutex<HashMap<String, VecDeque<Message>>>>,
    published: Arc<Mutex<Vec<PublishedMessage>>>,
    fail_publish: Arc<AtomicBool>,
}

impl MockMessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().unwrap().clone()
    }

    /// Pop the next message regardless of its delay
    pub fn pop(&self, queue: &str) -> Option<Message> {
        self.queues
            .lock()
            .unwrap()
            .get_mut(queue)
            .and_then(|q| q.pop_front())
    }

    fn push(&self, queue: &str, message: &Message, delay: Option<Duration>) -> TutorResult<()> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(TutorError::MessageQueue("mock queue unavailable".to_string()));
        }
        self.queues
            .lock()
            .unwrap()
            .entry(queue.to_string())
            .or_default()
            .push_back(message.clone());
        self.published.lock().unwrap().push(PublishedMessage {
            queue: queue.to_string(),
            message: message.clone(),
            delay,
        });
        Ok(())
    }
}

#[async_trait]
impl MessageQueue for MockMessageQueue {
    async fn publish_message(&self, queue: &str, message: &Message) -> TutorResult<()> {
        self.push(queue, message, None)
    }

    async fn publish_after(&self, queue: &str, message: &Message, delay: Duration) -> TutorResult<()> {
        self.push(queue, message, Some(delay))
    }

    async fn consume_messages(&self, queue: &str, max_messages: usize) -> TutorResult<Vec<Message>> {
        let mut queues = self.queues.lock().unwrap();
        let Some(pending) = queues.get_mut(queue) else {
            return Ok(Vec::new());
        };
        let take = max_messages.min(pending.len());
        Ok(pending.drain(..take).collect())
    }

    async fn get_queue_size(&self, queue: &str) -> TutorResult<u32> {
        let queues = self.queues.lock().unwrap();
        Ok(queues.get(queue).map(|q| q.len() as u32).unwrap_or(0))
    }
}

/// Cache whose every operation fails
#[derive(Debug, Clone, Default)]
pub struct FailingCache {
    calls: Arc<AtomicUsize>,
}

impl FailingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> TutorResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(TutorError::Cache("cache backend unavailable".to_string()))
    }
}

#[async_trait]
impl CacheService for FailingCache {
    async fn get(&self, _key: &str) -> TutorResult<Option<Vec<u8>>> {
        self.fail()
    }

    async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> TutorResult<()> {
        self.fail()
    }

    async fn delete(&self, _key: &str) -> TutorResult<bool> {
        self.fail()
    }

    async fn exists(&self, _key: &str) -> TutorResult<bool> {
        self.fail()
    }

    async fn get_stats(&self) -> CacheStats {
        CacheStats {
            errors: self.call_count() as u64,
            ..CacheStats::default()
        }
    }

    async fn clear_prefix(&self, _prefix: &str) -> TutorResult<usize> {
        self.fail()
    }

    async fn health_check(&self) -> TutorResult<bool> {
        Ok(false)
    }
}
