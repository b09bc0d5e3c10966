//! 调用分发模块
//!
//! - `operation`：操作类型、有类型的参数与调用构造器
//! - `context`：每次调用的执行上下文
//! - `handler`：按优先级排序的处理器注册表
//! - `builtin`：路由器内置的终端处理器与后端处理器
//! - `metrics`：分发统计
//! - `diagnostics`：诊断记录与输出
//! - `dispatcher`：分发流程本身

pub mod builtin;
pub mod context;
pub mod diagnostics;
pub mod dispatcher;
pub mod handler;
pub mod metrics;
pub mod operation;

pub use context::ExecutionContext;
pub use diagnostics::{
    AttemptRecord, AttemptResult, DiagnosticRecord, DiagnosticSink, MemorySink, TracingSink,
};
pub use dispatcher::{DispatchEnv, DispatchOutcome, Dispatcher};
pub use handler::{HandlerOutcome, HandlerRegistry};
pub use metrics::{KindMetrics, MetricsSnapshot};
pub use operation::{Call, Operation, OperationKind, Value};
