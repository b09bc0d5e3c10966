//! 诊断记录与输出
//!
//! 每次分发恰好产生一条 [`DiagnosticRecord`]，交给外部的 [`DiagnosticSink`]。
//! 输出失败不影响分发：分发器记录一条警告后继续。

use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::Level;

use crate::core::error::Result;

use super::operation::OperationKind;

/// 单次处理器尝试的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptResult {
    Handled,
    Declined,
    Failed(String),
    Panicked(String),
}

impl AttemptResult {
    pub fn is_failure(&self) -> bool {
        matches!(self, AttemptResult::Failed(_) | AttemptResult::Panicked(_))
    }
}

/// 单次处理器尝试
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub owner: String,
    pub priority: i32,
    pub result: AttemptResult,
}

impl fmt::Display for AttemptRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.result {
            AttemptResult::Handled => write!(f, "{}@{}: handled", self.owner, self.priority),
            AttemptResult::Declined => write!(f, "{}@{}: declined", self.owner, self.priority),
            AttemptResult::Failed(cause) => {
                write!(f, "{}@{}: failed ({})", self.owner, self.priority, cause)
            }
            AttemptResult::Panicked(message) => {
                write!(f, "{}@{}: panicked ({})", self.owner, self.priority, message)
            }
        }
    }
}

/// 一次分发调用的结构化描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticRecord {
    pub seq: u64,
    pub kind: OperationKind,
    pub origin: String,
    /// 所采用的路由决策摘要；参数无效时为空
    pub decision: Option<String>,
    pub attempts: Vec<AttemptRecord>,
    /// 成功前被拒绝或失败的尝试数
    pub fallback_count: usize,
    pub eliminated: bool,
    pub success: bool,
    pub cause: Option<String>,
    pub duration: Duration,
}

impl DiagnosticRecord {
    /// 记录应使用的日志级别：失败为 error，回退为 debug，其余为 trace
    pub fn level(&self) -> Level {
        if !self.success {
            Level::ERROR
        } else if self.fallback_count > 0 {
            Level::DEBUG
        } else {
            Level::TRACE
        }
    }

    /// 成功处理该调用的处理器
    pub fn handled_by(&self) -> Option<&str> {
        self.attempts
            .iter()
            .find(|a| a.result == AttemptResult::Handled)
            .map(|a| a.owner.as_str())
    }

    fn attempts_summary(&self) -> String {
        self.attempts
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// 诊断记录的接收方
pub trait DiagnosticSink: Send + Sync {
    fn deliver(&self, record: &DiagnosticRecord) -> Result<()>;
}

/// 写入 `tracing` 的默认输出
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn deliver(&self, record: &DiagnosticRecord) -> Result<()> {
        let attempts = record.attempts_summary();
        let decision = record.decision.as_deref().unwrap_or("-");
        let duration_us = record.duration.as_micros() as u64;

        match record.level() {
            Level::ERROR => tracing::error!(
                target: "dist_router::diagnostics",
                seq = record.seq,
                kind = record.kind.name(),
                origin = %record.origin,
                decision,
                attempts = %attempts,
                cause = record.cause.as_deref().unwrap_or("unknown"),
                duration_us,
                "Dispatch failed after exhausting all handlers"
            ),
            Level::DEBUG => tracing::debug!(
                target: "dist_router::diagnostics",
                seq = record.seq,
                kind = record.kind.name(),
                origin = %record.origin,
                decision,
                attempts = %attempts,
                fallback_count = record.fallback_count,
                duration_us,
                "Dispatch succeeded after fallback"
            ),
            _ => tracing::trace!(
                target: "dist_router::diagnostics",
                seq = record.seq,
                kind = record.kind.name(),
                eliminated = record.eliminated,
                handled_by = record.handled_by().unwrap_or("-"),
                duration_us,
                "Dispatch succeeded"
            ),
        }
        Ok(())
    }
}

/// 保存在内存中的输出，测试与演示使用
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<DiagnosticRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<DiagnosticRecord> {
        self.records.lock().clone()
    }

    pub fn last(&self) -> Option<DiagnosticRecord> {
        self.records.lock().last().cloned()
    }

    /// 取出并清空所有记录
    pub fn take(&self) -> Vec<DiagnosticRecord> {
        std::mem::take(&mut *self.records.lock())
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl DiagnosticSink for MemorySink {
    fn deliver(&self, record: &DiagnosticRecord) -> Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}
