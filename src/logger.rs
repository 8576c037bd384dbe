// 日志初始化 - 同时输出到控制台和按天轮转的日志文件

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// 日志文件名前缀
const LOG_FILE_NAME: &str = "production-tracker.log";

/// 平台默认日志目录
pub fn default_log_dir() -> PathBuf {
    if cfg!(target_os = "macos") {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join("Library/Logs/production-tracker")
    } else if cfg!(target_os = "windows") {
        let appdata = std::env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(appdata).join("production-tracker").join("logs")
    } else {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".local/share/production-tracker/logs")
    }
}

/// 解析日志过滤规则，空字符串视为 info
pub fn build_filter(level: &str) -> Result<EnvFilter> {
    let level = match level.trim() {
        "" => "info",
        other => other,
    };
    EnvFilter::try_new(level).with_context(|| format!("无效的日志过滤规则: {}", level))
}

/// 初始化日志系统
///
/// 返回的 guard 需要在程序生命周期内持有，丢弃后文件日志停止写入。
pub fn init(log_dir: &Path, level: &str) -> Result<WorkerGuard> {
    use tracing_subscriber::fmt::time::LocalTime;
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    // 创建日志目录
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("创建日志目录失败: {:?}", log_dir))?;

    // 配置日志输出到文件（每天轮转）
    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // 使用 MultiWriter 同时输出到控制台和文件
    let writer = std::io::stdout.and(non_blocking);

    // 使用本地时区
    let timer = LocalTime::new(time::format_description::parse(
        "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]",
    )?);

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(build_filter(level)?)
        .with_writer(writer)
        .with_timer(timer)
        .with_ansi(cfg!(debug_assertions)) // release 版本不使用颜色代码
        .finish();

    tracing::subscriber::set_global_default(subscriber).context("日志系统已初始化")?;

    tracing::info!("日志文件位置: {:?}", log_dir);
    Ok(guard)
}
