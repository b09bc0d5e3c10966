//! 分发器
//!
//! 一次分发的完整流程：
//! 1. 结构校验参数（无效参数直接失败，不进入处理器链）
//! 2. 查询（或计算并缓存）路由决策
//! 3. 决策要求时先同步校验影子状态
//! 4. 能力开关与缓存一致时消除该调用
//! 5. 按优先级逐个尝试处理器，每次尝试都在失败边界内
//! 6. 更新统计，发出一条诊断记录

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::backend::detector::CapabilityDetector;
use crate::core::config::RoutingConfig;
use crate::core::error::DispatchError;
use crate::gfx::device::GraphicsDevice;
use crate::routing::table::RoutingTable;
use crate::state::cache::ShadowStateCache;
use crate::state::snapshot::panic_message;
use crate::state::validator::{self, ValidationOutcome};
use crate::{router_debug, router_error, router_warn};

use super::context::ExecutionContext;
use super::diagnostics::{AttemptRecord, AttemptResult, DiagnosticRecord, DiagnosticSink};
use super::handler::{HandlerOutcome, HandlerRegistry};
use super::metrics::Metrics;
use super::operation::{Call, Operation, Value};

/// 分发时需要的外部状态
pub struct DispatchEnv<'a> {
    pub cache: &'a ShadowStateCache,
    pub detector: &'a dyn CapabilityDetector,
    pub config: &'a RoutingConfig,
    pub config_generation: u64,
}

/// 一次分发的结果
///
/// 失败从不以 panic 或 `Err` 传播，调用方检查 `success` 即可。
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub seq: u64,
    pub success: bool,
    /// 查询类操作的结果
    pub result: Option<Value>,
    pub eliminated: bool,
    /// 实际尝试的处理器数量
    pub attempts: usize,
    pub fallback_count: usize,
    pub handled_by: Option<String>,
    pub error: Option<DispatchError>,
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        self.success
    }
}

/// 分发器
pub struct Dispatcher {
    registry: HandlerRegistry,
    table: RoutingTable,
    metrics: Metrics,
    sink: Arc<dyn DiagnosticSink>,
    next_seq: AtomicU64,
}

impl Dispatcher {
    pub fn new(sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            registry: HandlerRegistry::new(),
            table: RoutingTable::new(),
            metrics: Metrics::new(),
            sink,
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// 校验影子缓存并计入统计
    pub fn validate(&self, cache: &ShadowStateCache, device: &dyn GraphicsDevice) -> ValidationOutcome {
        let outcome = validator::validate(cache, device);
        self.metrics.record_validation(!outcome.is_clean());
        outcome
    }

    /// 分发一次调用
    pub fn dispatch(
        &self,
        env: &DispatchEnv<'_>,
        device: &mut dyn GraphicsDevice,
        call: &Call,
    ) -> DispatchOutcome {
        let started = Instant::now();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let kind = call.kind;

        let op = match Operation::parse(kind, &call.params) {
            Ok(op) => op,
            Err(err) => {
                self.metrics.record_call(kind, false, false, true);
                self.emit(DiagnosticRecord {
                    seq,
                    kind,
                    origin: call.origin.clone(),
                    decision: None,
                    attempts: Vec::new(),
                    fallback_count: 0,
                    eliminated: false,
                    success: false,
                    cause: Some(err.to_string()),
                    duration: started.elapsed(),
                });
                return DispatchOutcome {
                    seq,
                    success: false,
                    result: None,
                    eliminated: false,
                    attempts: 0,
                    fallback_count: 0,
                    handled_by: None,
                    error: Some(err),
                };
            }
        };

        let decision = self
            .table
            .decision(kind, env.detector, env.config, env.config_generation);

        if decision.requires_validation {
            self.validate(env.cache, &*device);
        }

        if env.config.eliminate_redundant {
            if let Operation::SetCapability(cap, enabled) = op {
                if env.cache.get(cap) == Some(enabled) {
                    self.metrics.record_call(kind, false, true, false);
                    self.emit(DiagnosticRecord {
                        seq,
                        kind,
                        origin: call.origin.clone(),
                        decision: Some(decision.summary()),
                        attempts: Vec::new(),
                        fallback_count: 0,
                        eliminated: true,
                        success: true,
                        cause: None,
                        duration: started.elapsed(),
                    });
                    return DispatchOutcome {
                        seq,
                        success: true,
                        result: None,
                        eliminated: true,
                        attempts: 0,
                        fallback_count: 0,
                        handled_by: None,
                        error: None,
                    };
                }
            }
        }

        let chain = self.registry.chain(kind);
        let mut ctx = ExecutionContext::new(
            op,
            &call.params,
            &call.origin,
            seq,
            Arc::clone(&decision),
            env.config.max_fallback_attempts,
            device,
            env.cache,
        );

        let mut attempts = Vec::with_capacity(chain.len());
        let mut handled_by = None;
        let mut last_cause = None;

        for handler in chain.iter() {
            ctx.reset_attempt();

            let result = match catch_unwind(AssertUnwindSafe(|| handler.call(&mut ctx))) {
                Ok(HandlerOutcome::Handled) => AttemptResult::Handled,
                Ok(HandlerOutcome::Declined) => {
                    router_debug!(kind = kind.name(), owner = handler.owner(), "Handler declined");
                    AttemptResult::Declined
                }
                Ok(HandlerOutcome::Failed(cause)) => {
                    router_warn!(
                        kind = kind.name(),
                        owner = handler.owner(),
                        cause = %cause,
                        "Handler failed, trying next"
                    );
                    ctx.record_failure(cause.clone());
                    last_cause = Some(cause.clone());
                    AttemptResult::Failed(cause)
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    router_warn!(
                        kind = kind.name(),
                        owner = handler.owner(),
                        panic = %message,
                        "Handler panicked, trying next"
                    );
                    ctx.record_failure(message.clone());
                    last_cause = Some(format!("{} panicked: {}", handler.owner(), message));
                    AttemptResult::Panicked(message)
                }
            };

            let handled = result == AttemptResult::Handled;
            attempts.push(AttemptRecord {
                owner: handler.owner().to_string(),
                priority: handler.priority(),
                result,
            });
            if handled {
                handled_by = Some(handler.owner().to_string());
                break;
            }
        }

        let result = ctx.result();
        let success = handled_by.is_some();
        let fallback_count = if success { attempts.len() - 1 } else { attempts.len() };

        if success {
            if let Operation::SetCapability(cap, enabled) = op {
                env.cache.set(cap, enabled);
            } else if let Some(category) = kind.category() {
                env.cache.mark_dirty(category);
            }
        }

        let error = (!success).then(|| DispatchError::Exhausted {
            kind,
            attempts: attempts.len(),
            cause: last_cause
                .clone()
                .unwrap_or_else(|| "every handler declined".to_string()),
        });

        if let Some(e) = &error {
            router_error!(seq, origin = %call.origin, error = %e, "Dispatch exhausted the handler chain");
        }
        self.metrics
            .record_call(kind, fallback_count > 0, false, !success);

        let attempt_count = attempts.len();
        self.emit(DiagnosticRecord {
            seq,
            kind,
            origin: call.origin.clone(),
            decision: Some(decision.summary()),
            attempts,
            fallback_count,
            eliminated: false,
            success,
            cause: error.as_ref().map(|e| e.to_string()),
            duration: started.elapsed(),
        });

        DispatchOutcome {
            seq,
            success,
            result,
            eliminated: false,
            attempts: attempt_count,
            fallback_count,
            handled_by,
            error,
        }
    }

    fn emit(&self, record: DiagnosticRecord) {
        if let Err(e) = self.sink.deliver(&record) {
            router_warn!(seq = record.seq, error = %e, "Diagnostic sink rejected record");
        }
    }
}
