//! 处理器注册演示
//!
//! 一个外部系统（"shader_mod"）在默认处理器之前拦截混合函数和着色器绑定，
//! 另一个（"flaky_mod"）总是出错。演示回退链、诊断记录和按身份注销。
//!
//! ```bash
//! cargo run --example routing_demo
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};

use dist_router::backend::{BackendSet, BackendTag};
use dist_router::core::{log, LogLevel};
use dist_router::dispatch::MemorySink;
use dist_router::gfx::device::GraphicsDevice;
use dist_router::{Call, HandlerOutcome, OperationKind, Router, SoftwareDevice};

fn main() -> Result<()> {
    log::init_logger(LogLevel::Debug, false, None).context("failed to initialise logging")?;

    let sink = Arc::new(MemorySink::new());
    let router = Router::builder()
        .backends(BackendSet::tiered([BackendTag::Legacy, BackendTag::Gl33]))
        .sink(sink.clone())
        .build()
        .context("failed to build router")?;

    let mut device = SoftwareDevice::with_name("demo");
    router.init(&mut device);

    // 只接管预乘 alpha 混合，其余交给后续处理器
    router.register_handler(
        "shader_mod",
        100,
        |ctx| match ctx.operation() {
            dist_router::dispatch::Operation::BlendFunc(1, 0x0303) => {
                match ctx.device().blend_func(1, 0x0303) {
                    Ok(()) => HandlerOutcome::Handled,
                    Err(e) => HandlerOutcome::failed(e.to_string()),
                }
            }
            _ => HandlerOutcome::Declined,
        },
        &[OperationKind::BlendFunc],
    )?;

    router.register_handler(
        "flaky_mod",
        50,
        |_ctx| HandlerOutcome::failed("flaky_mod is not ready"),
        &[OperationKind::BlendFunc, OperationKind::UseShaderProgram],
    )?;

    println!("BLEND_FUNC chain: {:?}", router.handler_owners(OperationKind::BlendFunc));

    for call in [
        Call::blend_func(1, 0x0303),
        Call::blend_func(0x0302, 0x0303),
        Call::use_program(7).from_origin("material_system"),
    ] {
        let outcome = router.dispatch(&mut device, &call);
        println!(
            "{:<20} success={} handled_by={:<16} fallbacks={}",
            call.kind.name(),
            outcome.success,
            outcome.handled_by.as_deref().unwrap_or("-"),
            outcome.fallback_count
        );
    }

    let removed = router.unregister_mod("flaky_mod")?;
    println!("unregistered {} flaky_mod handler(s)", removed);
    println!("BLEND_FUNC chain: {:?}", router.handler_owners(OperationKind::BlendFunc));

    for record in sink.records() {
        let attempts: Vec<String> = record.attempts.iter().map(|a| a.to_string()).collect();
        println!(
            "#{} {} [{}] {}",
            record.seq,
            record.kind.name(),
            record.decision.as_deref().unwrap_or("-"),
            attempts.join(" -> ")
        );
    }

    println!("{}", router.metrics());
    router.shutdown();
    Ok(())
}
