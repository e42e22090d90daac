use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use tutor_core::{config::WorkerConfig, traits::MessageQueue, TutorError, TutorResult};
use tutor_dispatcher::{ExecutionOutcome, TaskDispatcher};

/// 停止时等待在途作业的默认上限
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Worker服务构建器
pub struct WorkerServiceBuilder {
    worker_id: String,
    dispatcher: Arc<TaskDispatcher>,
    message_queue: Arc<dyn MessageQueue>,
    task_queue: String,
    max_concurrent_tasks: usize,
    poll_interval_ms: u64,
    shutdown_timeout: Duration,
}

impl WorkerServiceBuilder {
    pub fn new(
        worker_id: String,
        dispatcher: Arc<TaskDispatcher>,
        message_queue: Arc<dyn MessageQueue>,
        task_queue: String,
    ) -> Self {
        Self {
            worker_id,
            dispatcher,
            message_queue,
            task_queue,
            max_concurrent_tasks: 4,
            poll_interval_ms: 200,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// 从配置设置并发数和轮询间隔
    pub fn with_config(self, config: &WorkerConfig) -> Self {
        self.max_concurrent_tasks(config.max_concurrent_tasks)
            .poll_interval_ms(config.poll_interval_ms)
    }

    /// 设置最大并发任务数
    pub fn max_concurrent_tasks(mut self, max_concurrent_tasks: usize) -> Self {
        self.max_concurrent_tasks = max_concurrent_tasks.max(1);
        self
    }

    /// 设置轮询间隔
    pub fn poll_interval_ms(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms.max(1);
        self
    }

    pub fn shutdown_timeout(mut self, shutdown_timeout: Duration) -> Self {
        self.shutdown_timeout = shutdown_timeout;
        self
    }

    pub fn build(self) -> WorkerService {
        WorkerService {
            worker_id: self.worker_id,
            dispatcher: self.dispatcher,
            message_queue: self.message_queue,
            task_queue: self.task_queue,
            max_concurrent_tasks: self.max_concurrent_tasks,
            poll_interval_ms: self.poll_interval_ms,
            shutdown_timeout: self.shutdown_timeout,
            permits: Arc::new(Semaphore::new(self.max_concurrent_tasks)),
            shutdown_tx: Arc::new(RwLock::new(None)),
            is_running: Arc::new(RwLock::new(false)),
            poll_handle: Arc::new(Mutex::new(None)),
        }
    }
}

/// Worker服务
///
/// 从作业队列拉取分析作业并交给 [`TaskDispatcher::execute`]，
/// 同时在途的作业数由信号量限制为 `max_concurrent_tasks`。
#[derive(Clone)]
pub struct WorkerService {
    /// Worker唯一标识
    worker_id: String,

    dispatcher: Arc<TaskDispatcher>,

    /// 消息队列客户端
    message_queue: Arc<dyn MessageQueue>,

    /// 任务队列名称
    task_queue: String,

    /// 最大并发任务数
    max_concurrent_tasks: usize,

    /// 任务轮询间隔（毫秒）
    poll_interval_ms: u64,

    shutdown_timeout: Duration,

    /// 在途作业许可
    permits: Arc<Semaphore>,

    /// 停止信号
    shutdown_tx: Arc<RwLock<Option<broadcast::Sender<()>>>>,

    /// 是否正在运行
    is_running: Arc<RwLock<bool>>,

    poll_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl WorkerService {
    pub fn builder(
        worker_id: String,
        dispatcher: Arc<TaskDispatcher>,
        message_queue: Arc<dyn MessageQueue>,
        task_queue: String,
    ) -> WorkerServiceBuilder {
        WorkerServiceBuilder::new(worker_id, dispatcher, message_queue, task_queue)
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// 当前在途的作业数量
    pub fn in_flight(&self) -> usize {
        self.max_concurrent_tasks - self.permits.available_permits()
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// 启动Worker服务
    pub async fn start(&self) -> TutorResult<()> {
        let mut is_running = self.is_running.write().await;
        if *is_running {
            return Err(TutorError::Internal("Worker服务已在运行".to_string()));
        }

        info!(
            "启动Worker服务: {}，最大并发 {}",
            self.worker_id, self.max_concurrent_tasks
        );

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        {
            let mut tx_guard = self.shutdown_tx.write().await;
            *tx_guard = Some(shutdown_tx);
        }

        let polling_service = self.clone();
        let handle = tokio::spawn(async move {
            polling_service.start_task_polling(shutdown_rx).await;
        });
        *self.poll_handle.lock().await = Some(handle);

        *is_running = true;
        info!("Worker服务启动成功: {}", self.worker_id);
        Ok(())
    }

    /// 停止拉取新作业，并等待在途作业完成
    pub async fn stop(&self) -> TutorResult<()> {
        let mut is_running = self.is_running.write().await;
        if !*is_running {
            return Ok(());
        }

        info!("停止Worker服务: {}", self.worker_id);

        {
            let tx_guard = self.shutdown_tx.read().await;
            if let Some(ref shutdown_tx) = *tx_guard {
                let _ = shutdown_tx.send(());
            }
        }

        if let Some(handle) = self.poll_handle.lock().await.take() {
            if let Err(e) = handle.await {
                warn!("等待任务轮询退出失败: {}", e);
            }
        }

        let in_flight = self.in_flight();
        if in_flight > 0 {
            info!("等待 {} 个任务完成...", in_flight);
        }
        // 拿到全部许可即说明没有在途作业
        match tokio::time::timeout(
            self.shutdown_timeout,
            self.permits.acquire_many(self.max_concurrent_tasks as u32),
        )
        .await
        {
            Ok(Ok(_all)) => {}
            Ok(Err(e)) => warn!("等待在途任务失败: {}", e),
            Err(_) => warn!(
                "{:?} 内仍有 {} 个任务未完成，放弃等待",
                self.shutdown_timeout,
                self.in_flight()
            ),
        }

        *is_running = false;
        info!("Worker服务已停止: {}", self.worker_id);
        Ok(())
    }

    async fn start_task_polling(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut poll_interval = interval(Duration::from_millis(self.poll_interval_ms));

        loop {
            tokio::select! {
                _ = poll_interval.tick() => {
                    if let Err(e) = self.poll_and_execute_tasks().await {
                        error!("任务轮询失败: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("任务轮询收到停止信号");
                    break;
                }
            }
        }
    }

    /// 按空闲许可数拉取作业并派发，返回本次派发的作业数
    pub async fn poll_and_execute_tasks(&self) -> TutorResult<usize> {
        let available = self.permits.available_permits();
        if available == 0 {
            return Ok(0);
        }

        let messages = self
            .message_queue
            .consume_messages(&self.task_queue, available)
            .await?;

        let mut dispatched = 0;
        for message in messages {
            let permit = match self.permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!("获取执行许可失败: {}", e);
                    break;
                }
            };

            let dispatcher = self.dispatcher.clone();
            let worker_id = self.worker_id.clone();
            tokio::spawn(async move {
                let _permit = permit;
                let task_id = message.job.task_id.clone();
                match dispatcher.execute(message.job).await {
                    Ok(ExecutionOutcome::Skipped) => {
                        debug!("[{}] 跳过任务 {}", worker_id, task_id);
                    }
                    Ok(outcome) => {
                        debug!("[{}] 任务 {} 执行结果: {:?}", worker_id, task_id, outcome);
                    }
                    Err(e) => {
                        error!("[{}] 任务 {} 执行失败: {}", worker_id, task_id, e);
                    }
                }
            });
            dispatched += 1;
        }

        Ok(dispatched)
    }
}
