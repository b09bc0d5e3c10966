//! DistRouter 演示程序
//!
//! 在软件参考设备上驱动若干模拟帧，展示路由、冗余消除、回退、
//! 快照恢复和周期校验，最后输出统计。
//!
//! # 使用方法
//!
//! ```bash
//! # 使用配置文件（router.toml，不存在时使用默认配置）
//! cargo run
//!
//! # 命令行覆盖
//! cargo run -- --backend legacy --validate-every 30 --frames 240
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use dist_router::backend::{BackendSet, BackendTag, StaticDetector};
use dist_router::core::{log, RouterConfig};
use dist_router::gfx::device::{clear_bits, compare, MatrixCommand};
use dist_router::math::Color;
use dist_router::state::Capability;
use dist_router::{Call, GraphicsDevice, Router, SoftwareDevice};

/// 默认模拟帧数
const DEFAULT_FRAMES: u64 = 180;

/// 每隔多少帧模拟一次外部系统绕过路由器修改设备
const OUT_OF_BAND_EVERY: u64 = 50;

/// 应用程序入口点
///
/// # 初始化流程
///
/// 1. 加载配置文件（router.toml）
/// 2. 应用命令行参数覆盖
/// 3. 初始化日志系统
/// 4. 构造路由器与软件设备
/// 5. 驱动模拟帧
fn main() -> Result<()> {
    // 1. 加载配置（在初始化日志之前）
    let mut config = RouterConfig::from_file_or_default("router.toml");

    // 2. 应用命令行参数
    let args: Vec<String> = std::env::args().collect();
    config.apply_args(&args);
    config.validate().context("invalid router configuration")?;

    // 3. 初始化日志系统
    let log_file = config
        .logging
        .file_output
        .then(|| config.logging.log_file.clone());
    log::init_logger(config.logging.level, config.logging.file_output, log_file.as_deref())
        .context("failed to initialise logging")?;
    info!(version = env!("CARGO_PKG_VERSION"), "DistRouter starting...");

    let frames = frame_count(&args);

    // 4. 构造路由器
    let tiers = [
        BackendTag::Legacy,
        BackendTag::Gl21,
        BackendTag::Gl33,
        BackendTag::ShaderPipeline,
    ];
    let detector = Arc::new(StaticDetector::new(BackendTag::Gl33, tiers));
    let router = Router::builder()
        .config(config)
        .detector(detector)
        .backends(BackendSet::tiered(tiers))
        .build()
        .context("failed to build router")?;

    let mut device = SoftwareDevice::with_name("software");
    router.init(&mut device);

    // 5. 主循环
    for frame in 1..=frames {
        render_frame(&router, &mut device, frame);

        if frame % OUT_OF_BAND_EVERY == 0 {
            // 外部系统直接打开雾效，只有周期校验能发现
            device
                .set_capability(Capability::Fog, true)
                .context("out-of-band device mutation failed")?;
        }

        if let Some(outcome) = router.end_frame(&device) {
            if !outcome.is_clean() {
                warn!(frame, "Periodic validation found drift");
            }
        }
    }

    let fog = router.dispatch(&mut device, &Call::is_enabled(Capability::Fog));
    info!(fog = ?fog.result.and_then(|v| v.as_bool()), "Final fog state");

    let metrics = router.metrics();
    println!("{}", metrics);
    router.shutdown();
    Ok(())
}

fn frame_count(args: &[String]) -> u64 {
    args.iter()
        .position(|a| a == "--frames")
        .and_then(|idx| args.get(idx + 1))
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_FRAMES)
}

/// 一帧：不透明通道、透明通道（快照保护）和一个可能失败的叠加层
fn render_frame(router: &Router, device: &mut SoftwareDevice, frame: u64) {
    let opaque = [
        Call::clear(clear_bits::ALL),
        Call::enable(Capability::DepthTest),
        Call::depth_func(compare::LEQUAL),
        Call::enable(Capability::CullFace),
        Call::use_program(1),
        Call::bind_vertex_array(1),
        Call::bind_texture(3),
        Call::matrix(MatrixCommand::LoadIdentity),
        Call::matrix(MatrixCommand::Rotate(frame as f32, 0.0, 1.0, 0.0)),
    ];
    for call in &opaque {
        let outcome = router.dispatch(device, call);
        if !outcome.success {
            warn!(frame, kind = %call.kind, "Opaque pass call failed");
        }
    }

    {
        let mut guard = router.push_state(&mut *device);
        for call in [
            Call::enable(Capability::Blend),
            Call::blend_func(0x0302, 0x0303),
            Call::depth_mask(false),
            Call::color(Color::new(1.0, 1.0, 1.0, 0.5)),
        ] {
            router.dispatch(&mut *guard, &call);
        }
    }

    // 每 60 帧叠加层失败一次，状态仍被恢复
    let result = router.execute_with_safety(device, "overlay", |dev| {
        dev.set_capability(Capability::ScissorTest, true)?;
        if frame % 60 == 0 {
            return Err(dist_router::core::DeviceError::Lost("overlay context reset".into()));
        }
        dev.set_capability(Capability::ScissorTest, false)
    });
    if let Err(e) = result {
        info!(frame, error = %e, "Overlay skipped");
    }
}
