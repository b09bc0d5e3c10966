//! 核心功能模块
//!
//! 本模块提供路由器的基础设施：日志系统、配置管理、错误处理和帧节奏。
//! 这些模块与具体的图形 API 无关。
//!
//! # 模块组织
//!
//! - `log`：日志系统，提供结构化的日志记录功能
//! - `config`：配置管理，支持从配置文件加载路由器设置
//! - `error`：错误处理，定义统一的错误类型
//! - `frame`：帧计数与周期校验节拍

pub mod config;
pub mod error;
pub mod frame;
pub mod log;

// 重新导出常用类型，方便使用
pub use config::{LogLevel, LoggingConfig, RouterConfig, RoutingConfig};
pub use error::{BackendError, ConfigError, DeviceError, DispatchError, Result, RouterError, SnapshotError};
pub use frame::FrameClock;
