//! 错误处理模块
//!
//! 定义了路由器中使用的统一错误类型。
//!
//! # 设计原则
//!
//! - 为每种错误类型提供清晰的上下文信息
//! - 支持错误链（error source）
//! - 易于模式匹配和错误处理
//!
//! 注意：热路径（`dispatch`）从不把这些错误作为 panic 抛出，
//! 失败只以 `DispatchOutcome` 的形式返回给调用者。

use std::fmt;

use crate::dispatch::operation::OperationKind;

/// 路由器统一的 Result 类型
pub type Result<T> = std::result::Result<T, RouterError>;

/// 路由器的顶层错误类型
#[derive(Debug)]
pub enum RouterError {
    /// 配置错误
    Config(ConfigError),

    /// 设备调用错误
    Device(DeviceError),

    /// 分发错误
    Dispatch(DispatchError),

    /// 状态快照错误
    Snapshot(SnapshotError),

    /// IO 错误
    Io(std::io::Error),

    /// 日志系统错误
    Log(String),
}

/// 配置相关的错误
#[derive(Debug)]
pub enum ConfigError {
    /// 配置文件未找到
    FileNotFound(String),

    /// 配置文件解析失败
    ParseError(String),

    /// 配置值无效
    InvalidValue { field: String, reason: String },
}

/// 设备（图形 API）调用错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// 矩阵栈溢出
    StackOverflow,

    /// 矩阵栈下溢
    StackUnderflow,

    /// 非法的枚举值
    InvalidEnum(u32),

    /// 设备丢失或其他不可恢复错误
    Lost(String),
}

/// 后端管理器执行失败
///
/// `transient` 为真表示重试同一对主/备后端可能成功（例如设备暂时丢失）；
/// 不支持的操作和非法参数都不是瞬时错误。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    pub backend: &'static str,
    pub cause: String,
    pub transient: bool,
}

impl BackendError {
    pub fn unsupported(backend: &'static str, operation: &str) -> Self {
        Self {
            backend,
            cause: format!("{} is not supported by this tier", operation),
            transient: false,
        }
    }

    pub fn from_device(backend: &'static str, err: DeviceError) -> Self {
        let transient = matches!(err, DeviceError::Lost(_));
        Self {
            backend,
            cause: err.to_string(),
            transient,
        }
    }
}

/// 分发相关的错误
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchError {
    /// 参数结构无效（数量或类型不匹配）
    InvalidParams {
        kind: OperationKind,
        reason: String,
    },

    /// 所有处理器（包括终端回退）都失败了
    Exhausted {
        kind: OperationKind,
        attempts: usize,
        cause: String,
    },

    /// 尝试注销保留的内置处理器
    ReservedOwner(String),
}

/// 状态快照相关的错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    /// push/pop 未严格嵌套，丢弃了泄漏的快照
    Unbalanced { expected_depth: usize, actual_depth: usize },

    /// 受保护的操作返回了错误
    OperationFailed { name: String, cause: String },

    /// 受保护的操作发生了 panic
    OperationPanicked { name: String, message: String },
}

impl fmt::Display for RouterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouterError::Config(e) => write!(f, "Configuration error: {}", e),
            RouterError::Device(e) => write!(f, "Device error: {}", e),
            RouterError::Dispatch(e) => write!(f, "Dispatch error: {}", e),
            RouterError::Snapshot(e) => write!(f, "Snapshot error: {}", e),
            RouterError::Io(e) => write!(f, "IO error: {}", e),
            RouterError::Log(msg) => write!(f, "Log error: {}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {}", path),
            ConfigError::ParseError(msg) => write!(f, "Failed to parse config: {}", msg),
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "Invalid value for '{}': {}", field, reason)
            }
        }
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::StackOverflow => write!(f, "Matrix stack overflow"),
            DeviceError::StackUnderflow => write!(f, "Matrix stack underflow"),
            DeviceError::InvalidEnum(value) => write!(f, "Invalid enum value: {:#x}", value),
            DeviceError::Lost(msg) => write!(f, "Device lost: {}", msg),
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.backend, self.cause)?;
        if self.transient {
            write!(f, " (transient)")?;
        }
        Ok(())
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::InvalidParams { kind, reason } => {
                write!(f, "Invalid parameters for {}: {}", kind.name(), reason)
            }
            DispatchError::Exhausted { kind, attempts, cause } => write!(
                f,
                "All {} handlers failed for {}: {}",
                attempts,
                kind.name(),
                cause
            ),
            DispatchError::ReservedOwner(owner) => {
                write!(f, "Owner '{}' is reserved and cannot be unregistered", owner)
            }
        }
    }
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotError::Unbalanced { expected_depth, actual_depth } => write!(
                f,
                "Unbalanced state stack: expected depth {}, found {}",
                expected_depth, actual_depth
            ),
            SnapshotError::OperationFailed { name, cause } => {
                write!(f, "Guarded operation '{}' failed: {}", name, cause)
            }
            SnapshotError::OperationPanicked { name, message } => {
                write!(f, "Guarded operation '{}' panicked: {}", name, message)
            }
        }
    }
}

impl std::error::Error for RouterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RouterError::Io(e) => Some(e),
            RouterError::Config(e) => Some(e),
            RouterError::Device(e) => Some(e),
            RouterError::Dispatch(e) => Some(e),
            RouterError::Snapshot(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for ConfigError {}
impl std::error::Error for DeviceError {}
impl std::error::Error for BackendError {}
impl std::error::Error for DispatchError {}
impl std::error::Error for SnapshotError {}

impl From<std::io::Error> for RouterError {
    fn from(err: std::io::Error) -> Self {
        RouterError::Io(err)
    }
}

impl From<ConfigError> for RouterError {
    fn from(err: ConfigError) -> Self {
        RouterError::Config(err)
    }
}

impl From<DeviceError> for RouterError {
    fn from(err: DeviceError) -> Self {
        RouterError::Device(err)
    }
}

impl From<DispatchError> for RouterError {
    fn from(err: DispatchError) -> Self {
        RouterError::Dispatch(err)
    }
}

impl From<SnapshotError> for RouterError {
    fn from(err: SnapshotError) -> Self {
        RouterError::Snapshot(err)
    }
}
