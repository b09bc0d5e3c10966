//! 执行上下文
//!
//! 每次分发创建一个，调用结束并发出诊断记录后丢弃。

use std::sync::Arc;
use std::time::Instant;

use crate::gfx::device::GraphicsDevice;
use crate::routing::decision::RoutingDecision;
use crate::state::cache::ShadowStateCache;

use super::operation::{Operation, OperationKind, Value};

/// 一次分发调用的上下文
///
/// 处理器通过它读取参数、访问设备和影子缓存、写入结果值。
/// 每次尝试前分发器都会清空结果与失败槽，
/// 因此上一个处理器留下的半成品不会影响下一个。
pub struct ExecutionContext<'a> {
    kind: OperationKind,
    params: &'a [Value],
    operation: Operation,
    origin: &'a str,
    seq: u64,
    timestamp: Instant,
    decision: Arc<RoutingDecision>,
    max_fallback_attempts: u32,
    device: &'a mut dyn GraphicsDevice,
    cache: &'a ShadowStateCache,
    result: Option<Value>,
    failure: Option<String>,
}

impl<'a> ExecutionContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        operation: Operation,
        params: &'a [Value],
        origin: &'a str,
        seq: u64,
        decision: Arc<RoutingDecision>,
        max_fallback_attempts: u32,
        device: &'a mut dyn GraphicsDevice,
        cache: &'a ShadowStateCache,
    ) -> Self {
        Self {
            kind: operation.kind(),
            params,
            operation,
            origin,
            seq,
            timestamp: Instant::now(),
            decision,
            max_fallback_attempts,
            device,
            cache,
            result: None,
            failure: None,
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// 原始的位置参数
    pub fn params(&self) -> &[Value] {
        self.params
    }

    /// 已通过结构校验的操作
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// 调用方身份
    pub fn origin(&self) -> &str {
        self.origin
    }

    /// 单调递增的序号
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    pub fn decision(&self) -> &RoutingDecision {
        &self.decision
    }

    pub fn max_fallback_attempts(&self) -> u32 {
        self.max_fallback_attempts
    }

    pub fn device(&mut self) -> &mut dyn GraphicsDevice {
        &mut *self.device
    }

    pub fn cache(&self) -> &ShadowStateCache {
        self.cache
    }

    pub fn set_result(&mut self, value: Value) {
        self.result = Some(value);
    }

    pub fn result(&self) -> Option<Value> {
        self.result
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub(crate) fn record_failure(&mut self, cause: String) {
        self.failure = Some(cause);
    }

    /// 为下一次尝试准备干净的槽位
    pub(crate) fn reset_attempt(&mut self) {
        self.result = None;
        self.failure = None;
    }
}

impl std::fmt::Debug for ExecutionContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("kind", &self.kind)
            .field("operation", &self.operation)
            .field("origin", &self.origin)
            .field("seq", &self.seq)
            .field("result", &self.result)
            .field("failure", &self.failure)
            .finish()
    }
}
