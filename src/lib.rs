//! DistRouter - 按能力分层的图形状态调用路由器
//!
//! 位于高频的图形状态修改请求（开关能力、设置混合/深度/剔除函数、绑定资源、
//! 矩阵变换）与若干可互换的后端实现之间。对每个请求：选择最合适的后端执行，
//! 失败时透明地降级，消除冗余的状态切换，并保证中途失败不会让影子状态
//! 与真实设备状态永久不一致。
//!
//! # 模块结构
//!
//! - `core`: 基础设施（日志、配置、错误处理、帧节奏）
//! - `math`: 颜色与矩阵工具
//! - `state`: 影子状态缓存、周期校验、状态快照
//! - `gfx`: 设备接口与软件参考设备
//! - `backend`: 后端管理器与能力检测接口
//! - `routing`: 路由决策
//! - `dispatch`: 操作类型、处理器链与分发器
//! - `router`: 组合以上模块的 `Router`
//!
//! # 使用示例
//!
//! ```
//! use dist_router::{Call, HandlerOutcome, OperationKind, Router, SoftwareDevice};
//!
//! let router = Router::builder().build().unwrap();
//! let mut device = SoftwareDevice::new();
//! router.init(&mut device);
//!
//! // 外部系统在默认处理器之前拦截混合函数
//! router
//!     .register_handler("my_mod", 100, |_ctx| HandlerOutcome::Declined, &[OperationKind::BlendFunc])
//!     .unwrap();
//!
//! let outcome = router.dispatch(&mut device, &Call::blend_func(0x0302, 0x0303));
//! assert!(outcome.success);
//! assert_eq!(outcome.fallback_count, 1);
//! ```

pub mod backend;
pub mod core;
pub mod dispatch;
pub mod gfx;
pub mod math;
pub mod router;
pub mod routing;
pub mod state;

pub use backend::{BackendManager, BackendSet, BackendTag, CapabilityDetector, StaticDetector, TierBackend};
pub use dispatch::{Call, DispatchOutcome, ExecutionContext, HandlerOutcome, OperationKind, Value};
pub use gfx::{GraphicsDevice, SoftwareDevice};
pub use router::{Router, RouterBuilder};
