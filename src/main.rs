use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Arg, Command};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info, warn};
use tutor::app::{run_cleanup_once, AppMode, Application};
use tutor::shutdown::{wait_for_shutdown_signal, ShutdownManager, SHUTDOWN_GRACE_PERIOD};
use tutor_core::{init_logging, AppConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let matches = Command::new("tutor")
        .version(env!("CARGO_PKG_VERSION"))
        .about("图片解题讲解服务")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，默认查找 config/tutor.toml"),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .value_name("MODE")
                .help("运行模式")
                .value_parser(["all", "cleanup"])
                .default_value("all"),
        )
        .arg(
            Arg::new("worker-id")
                .long("worker-id")
                .value_name("ID")
                .help("Worker ID，覆盖配置文件"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，覆盖配置文件")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，覆盖配置文件")
                .value_parser(["json", "pretty"]),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").map(String::as_str);
    let mode_str = matches
        .get_one::<String>("mode")
        .map(String::as_str)
        .unwrap_or("all");

    // 加载配置
    let mut config = AppConfig::load(config_path)
        .with_context(|| format!("加载配置失败: {}", config_path.unwrap_or("<默认路径>")))?;

    if let Some(level) = matches.get_one::<String>("log-level") {
        config.observability.log_level = level.clone();
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.observability.log_format = format.clone();
    }
    if let Some(id) = matches.get_one::<String>("worker-id") {
        config.worker.worker_id = id.clone();
    }

    // 初始化日志系统
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    )?;

    info!("启动图片解题讲解服务");
    info!("运行模式: {mode_str}");

    let app_mode = parse_app_mode(mode_str)?;

    if app_mode == AppMode::Cleanup {
        let stats = run_cleanup_once(&config).await?;
        info!(
            "清理完成，删除 {} 个任务，耗时 {:?}",
            stats.tasks_deleted, stats.duration
        );
        return Ok(());
    }

    let prometheus = if config.observability.metrics_enabled {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("安装Prometheus指标记录器失败")?;
        Some(handle)
    } else {
        None
    };

    // 创建应用实例
    let app = Arc::new(Application::new(config, app_mode, prometheus).await?);

    // 创建优雅关闭管理器
    let shutdown_manager = ShutdownManager::new();

    // 启动应用
    let mut app_handle = {
        let shutdown_rx = shutdown_manager.subscribe().await;
        let app = Arc::clone(&app);

        tokio::spawn(async move { app.run(shutdown_rx).await })
    };

    // 等待关闭信号，应用提前退出时不再等待
    tokio::select! {
        _ = wait_for_shutdown_signal() => {
            info!("收到关闭信号，开始优雅关闭...");
        }
        result = &mut app_handle => {
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e),
                Err(e) => Err(anyhow::anyhow!("应用任务异常退出: {e}")),
            };
        }
    }

    shutdown_manager.shutdown().await;

    // 等待应用关闭，设置超时
    match tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, app_handle).await {
        Ok(Ok(Ok(()))) => info!("应用已优雅关闭"),
        Ok(Ok(Err(e))) => error!("应用运行失败: {e}"),
        Ok(Err(e)) => error!("应用关闭时发生错误: {e}"),
        Err(_) => warn!("应用关闭超时，强制退出"),
    }

    info!("图片解题讲解服务已退出");
    Ok(())
}

/// 解析应用运行模式
///
/// 作业队列在进程内，API 和 Worker 不能拆成独立进程运行。
fn parse_app_mode(mode_str: &str) -> Result<AppMode> {
    match mode_str {
        "all" => Ok(AppMode::All),
        "cleanup" => Ok(AppMode::Cleanup),
        _ => Err(anyhow::anyhow!("不支持的运行模式: {mode_str}")),
    }
}
