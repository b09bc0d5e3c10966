//! 路由器内置处理器
//!
//! - 终端处理器：最朴素的设备调用，对结构有效的参数不会拒绝
//! - 后端处理器：按路由决策先主后备地执行，瞬时失败时重试整对后端

use std::sync::Arc;

use tracing::debug;

use crate::backend::manager::BackendSet;
use crate::gfx::direct;

use super::context::ExecutionContext;
use super::handler::{HandlerFn, HandlerOutcome};

/// 终端直接执行处理器
pub fn direct_handler() -> HandlerFn {
    Arc::new(execute_direct)
}

fn execute_direct(ctx: &mut ExecutionContext<'_>) -> HandlerOutcome {
    let op = ctx.operation();
    match direct::apply(op, ctx.device()) {
        Ok(result) => {
            if let Some(value) = result {
                ctx.set_result(value);
            }
            HandlerOutcome::Handled
        }
        Err(e) => HandlerOutcome::Failed(e.to_string()),
    }
}

/// 后端路由处理器
///
/// 主/备两个后端都不支持该操作时返回 `Declined`；
/// 真正执行过但失败时返回最后一个错误。
pub fn backend_handler(backends: Arc<BackendSet>) -> HandlerFn {
    Arc::new(move |ctx: &mut ExecutionContext<'_>| {
        let kind = ctx.kind();
        let op = ctx.operation();
        let (primary, fallback) = (ctx.decision().primary, ctx.decision().fallback);
        let pair = if primary == fallback {
            vec![primary]
        } else {
            vec![primary, fallback]
        };

        let rounds = ctx.max_fallback_attempts().max(1);
        let mut last_error = None;

        for round in 1..=rounds {
            let mut transient = false;

            for &tag in &pair {
                let Some(manager) = backends.get(tag) else {
                    continue;
                };
                if !manager.supports(kind) {
                    continue;
                }

                match manager.execute_for_call_with_result(ctx.device(), op) {
                    Ok(result) => {
                        if let Some(value) = result {
                            ctx.set_result(value);
                        }
                        return HandlerOutcome::Handled;
                    }
                    Err(e) => {
                        debug!(
                            kind = kind.name(),
                            backend = tag.name(),
                            round,
                            error = %e,
                            "Backend attempt failed"
                        );
                        transient |= e.transient;
                        last_error = Some(e.to_string());
                    }
                }
            }

            if !transient {
                break;
            }
        }

        match last_error {
            Some(cause) => HandlerOutcome::Failed(cause),
            None => HandlerOutcome::Declined,
        }
    })
}
