use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::{net::TcpListener, sync::broadcast};
use tracing::{error, info, warn};
use tutor_api::{create_app, AppState};
use tutor_core::{
    config::{AppConfig, DatabaseConfig},
    traits::{MessageQueue, MonitoringRepository, TaskRepository, VisionApi},
    TutorError,
};
use tutor_dispatcher::{ImageValidator, RetryPolicy, RetryingAnalysisClient, TaskDispatcher};
use tutor_infrastructure::{
    create_cache_service, CleanupService, CleanupStats, DatabaseManager, InMemoryJobQueue,
    MetricsCollector, OpenAiVisionClient, RateLimiter, ResourceMonitor, SnapshotFlusher,
    TaskStore,
};
use tutor_worker::WorkerService;

/// 应用运行模式
///
/// 作业队列在进程内，API 和 Worker 必须运行在同一进程中。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// 运行API服务器和Worker
    All,
    /// 执行一次数据清理后退出
    Cleanup,
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    mode: AppMode,
    database: DatabaseManager,
    task_repository: Arc<dyn TaskRepository>,
    monitoring: Arc<dyn MonitoringRepository>,
    message_queue: Arc<dyn MessageQueue>,
    rate_limiter: Arc<RateLimiter>,
    metrics: Arc<MetricsCollector>,
    dispatcher: Arc<TaskDispatcher>,
    prometheus: Option<PrometheusHandle>,
}

impl Application {
    /// 创建新的应用实例，视觉服务使用配置中的 OpenAI 兼容接口
    pub async fn new(
        config: AppConfig,
        mode: AppMode,
        prometheus: Option<PrometheusHandle>,
    ) -> Result<Self> {
        let vision = OpenAiVisionClient::new(&config.analysis).context("创建视觉服务客户端失败")?;
        info!("视觉服务接口: {}", vision.endpoint());
        Self::with_vision(config, mode, Arc::new(vision), prometheus).await
    }

    /// 使用指定的视觉服务创建应用实例
    pub async fn with_vision(
        config: AppConfig,
        mode: AppMode,
        vision: Arc<dyn VisionApi>,
        prometheus: Option<PrometheusHandle>,
    ) -> Result<Self> {
        info!("初始化应用程序，模式: {:?}", mode);

        // 没有 Worker 时提交的任务永远不会被消费
        if mode == AppMode::All && !config.worker.enabled {
            return Err(TutorError::Configuration(
                "作业队列只在进程内共享，必须启用 worker".to_string(),
            )
            .into());
        }

        let database = create_database(&config.database).await?;
        let task_repository: Arc<dyn TaskRepository> = Arc::new(database.task_repository());
        let monitoring: Arc<dyn MonitoringRepository> =
            Arc::new(database.monitoring_repository());

        let cache = create_cache_service(&config.cache)
            .await
            .context("创建缓存服务失败")?;
        let store = Arc::new(TaskStore::new(
            task_repository.clone(),
            cache,
            Duration::from_secs(config.cache.result_ttl_seconds),
        ));

        let message_queue: Arc<dyn MessageQueue> = Arc::new(InMemoryJobQueue::new());

        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limiting.clone()));
        let metrics = Arc::new(MetricsCollector::new(
            config.observability.response_time_window,
        ));

        let client = RetryingAnalysisClient::new(
            vision,
            metrics.clone(),
            Duration::from_secs(config.analysis.timeout_seconds),
        );
        let dispatcher = Arc::new(TaskDispatcher::new(
            store,
            message_queue.clone(),
            config.queue.task_queue.clone(),
            rate_limiter.clone(),
            ImageValidator::new(config.analysis.max_image_bytes),
            client,
            RetryPolicy::from_config(&config.analysis),
            monitoring.clone(),
            metrics.clone(),
        ));

        Ok(Self {
            config,
            mode,
            database,
            task_repository,
            monitoring,
            message_queue,
            rate_limiter,
            metrics,
            dispatcher,
            prometheus,
        })
    }

    pub fn dispatcher(&self) -> &Arc<TaskDispatcher> {
        &self.dispatcher
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// 构建HTTP路由，便于不监听端口直接测试
    pub fn router(&self) -> axum::Router {
        let state = AppState {
            dispatcher: self.dispatcher.clone(),
            rate_limiter: self.rate_limiter.clone(),
            metrics: self.metrics.clone(),
            prometheus: self.prometheus.clone(),
            admin_token: self.config.api.admin_token.clone(),
        };
        create_app(state, &self.config.api)
    }

    /// 运行应用程序直到收到关闭信号
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动应用程序，模式: {:?}", self.mode);

        let housekeeping = tokio::spawn(
            self.rate_limiter
                .clone()
                .run_housekeeping(shutdown_rx.resubscribe()),
        );

        let observability = &self.config.observability;
        let mut resource_monitor = ResourceMonitor::new(Duration::from_secs(
            observability.resource_sample_interval_seconds,
        ));
        let mut flusher = SnapshotFlusher::new(
            self.metrics.clone(),
            self.monitoring.clone(),
            Duration::from_secs(observability.metrics_flush_interval_seconds),
        );
        if observability.metrics_enabled {
            resource_monitor.start(self.metrics.clone());
            flusher.start();
        }

        let mut cleanup = CleanupService::new(
            self.task_repository.clone(),
            self.config.retention.clone(),
        );
        cleanup.start().await.context("启动数据清理服务失败")?;

        let result = match self.mode {
            AppMode::All => self.run_services(shutdown_rx).await,
            AppMode::Cleanup => Err(anyhow::anyhow!("清理模式请使用 run_cleanup_once")),
        };

        // 先停后台任务，再关闭数据库
        if let Err(e) = cleanup.stop().await {
            warn!("停止数据清理服务失败: {}", e);
        }
        flusher.stop().await;
        resource_monitor.stop().await;
        if let Err(e) = housekeeping.await {
            warn!("等待限流器清理任务退出失败: {}", e);
        }

        // 关闭前落盘一次，保留最后一段运行数据
        if observability.metrics_enabled {
            if let Err(e) = flusher.flush_once().await {
                warn!("关闭前写入指标快照失败: {}", e);
            }
        }
        self.database.close().await;

        info!("应用程序已停止");
        result
    }

    /// 启动Worker后运行API，API退出时（包括出错）总会停止Worker
    async fn run_services(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let worker = WorkerService::builder(
            self.config.worker.worker_id.clone(),
            self.dispatcher.clone(),
            self.message_queue.clone(),
            self.config.queue.task_queue.clone(),
        )
        .with_config(&self.config.worker)
        .build();

        worker.start().await.context("启动Worker服务失败")?;

        let result = self.run_api(shutdown_rx).await;
        if let Err(e) = &result {
            error!("API服务器异常退出，停止Worker: {:#}", e);
        }

        if let Err(e) = worker.stop().await {
            error!("停止Worker服务失败: {}", e);
        }
        info!("Worker服务已停止");
        result
    }

    /// 运行API服务器直到收到关闭信号；未启用时只等待关闭信号
    async fn run_api(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        if !self.config.api.enabled {
            info!("API服务器未启用");
            let _ = shutdown_rx.recv().await;
            return Ok(());
        }

        let bind_address = &self.config.api.bind_address;
        let listener = TcpListener::bind(bind_address)
            .await
            .with_context(|| format!("绑定地址失败: {}", bind_address))?;

        info!("API服务器启动在 http://{}", bind_address);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("API服务器收到关闭信号");
            })
            .await
            .context("API服务器运行失败")?;

        info!("API服务器已停止");
        Ok(())
    }
}

/// 执行一次保留期清理后退出
pub async fn run_cleanup_once(config: &AppConfig) -> Result<CleanupStats> {
    let database = create_database(&config.database).await?;
    let cleanup = CleanupService::new(
        Arc::new(database.task_repository()),
        config.retention.clone(),
    );

    let stats = cleanup.cleanup_once().await.context("执行数据清理失败")?;
    database.close().await;
    Ok(stats)
}

/// 连接数据库并执行迁移
async fn create_database(config: &DatabaseConfig) -> Result<DatabaseManager> {
    ensure_database_dir(&config.url)?;

    let database = DatabaseManager::new(config).await?;
    database.migrate().await?;
    info!("数据库连接成功");
    Ok(database)
}

/// SQLite 只会创建数据库文件，不会创建所在目录
fn ensure_database_dir(url: &str) -> Result<()> {
    let path = url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() || path.starts_with(":memory:") {
        return Ok(());
    }

    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("创建数据库目录失败: {}", parent.display()))?;
        }
    }
    Ok(())
}
