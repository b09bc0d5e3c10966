//! 日志系统模块
//!
//! 基于 `tracing` 提供结构化的日志记录功能。
//!
//! # 日志级别约定
//!
//! - 分发成功：trace
//! - 发生回退：debug
//! - 处理器失败：warn
//! - 所有处理器耗尽、快照栈失衡：error
//!
//! # 使用示例
//!
//! ```no_run
//! use dist_router::core::log;
//! use dist_router::core::config::LogLevel;
//!
//! log::init_logger(LogLevel::Info, false, None).unwrap();
//! dist_router::router_info!(frames = 120, "Router started");
//! ```

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use std::path::Path;

use super::config::LogLevel;
use super::error::{Result, RouterError};

/// 初始化日志系统
///
/// 重复调用（或测试中已有全局订阅者）时返回 `RouterError::Log`，不会 panic。
///
/// # 参数
///
/// * `level` - 日志级别
/// * `file_output` - 是否输出到文件
/// * `log_file_path` - 日志文件路径（可选，默认为 "dist_router.log"）
pub fn init_logger(level: LogLevel, file_output: bool, log_file_path: Option<&str>) -> Result<()> {
    let filter = EnvFilter::new(filter_directive(level));

    if file_output {
        // 解析日志文件路径
        let log_path = log_file_path.unwrap_or("dist_router.log");
        let path = Path::new(log_path);
        let directory = path.parent().unwrap_or(Path::new("."));
        let filename = path.file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("dist_router.log");

        // 创建滚动文件 appender（每天滚动）
        let file_appender = RollingFileAppender::new(
            Rotation::DAILY,
            directory,
            filename
        );

        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_ansi(true);

        let file_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_ansi(false)  // 文件不需要 ANSI 颜色
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .with(file_layer)
            .try_init()
            .map_err(|e| RouterError::Log(e.to_string()))
    } else {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_ansi(true);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| RouterError::Log(e.to_string()))
    }
}

/// `RUST_LOG` 优先于配置文件中的级别
fn filter_directive(level: LogLevel) -> String {
    std::env::var("RUST_LOG").unwrap_or_else(|_| {
        match level {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
        .to_string()
    })
}

/// 路由器日志 - Info 级别
#[macro_export]
macro_rules! router_info {
    ($($arg:tt)*) => {
        tracing::info!(target: "dist_router::router", $($arg)*)
    };
}

/// 路由器日志 - Warn 级别
#[macro_export]
macro_rules! router_warn {
    ($($arg:tt)*) => {
        tracing::warn!(target: "dist_router::router", $($arg)*)
    };
}

/// 路由器日志 - Error 级别
#[macro_export]
macro_rules! router_error {
    ($($arg:tt)*) => {
        tracing::error!(target: "dist_router::router", $($arg)*)
    };
}

/// 路由器日志 - Debug 级别
#[macro_export]
macro_rules! router_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "dist_router::router", $($arg)*)
    };
}

/// 日志级别转换
impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}
