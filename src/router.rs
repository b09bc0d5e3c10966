//! 路由器
//!
//! `Router` 把影子缓存、处理器注册表、路由表、统计和诊断输出组合在一起，
//! 由调用方（通常是渲染器）构造并持有，显式 `init` / `shutdown`。
//! 路由器不持有设备：每次调用都由渲染线程传入 `&mut dyn GraphicsDevice`，
//! 因此路由器本身是 `Send + Sync`，可以被后台校验线程共享读取。
//!
//! # 使用示例
//!
//! ```
//! use dist_router::{Call, Router, SoftwareDevice};
//! use dist_router::state::Capability;
//!
//! let router = Router::builder().build().unwrap();
//! let mut device = SoftwareDevice::new();
//! router.init(&mut device);
//!
//! let outcome = router.dispatch(&mut device, &Call::enable(Capability::Blend));
//! assert!(outcome.success);
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::backend::detector::{CapabilityDetector, StaticDetector};
use crate::backend::manager::BackendSet;
use crate::backend::tag::BackendTag;
use crate::core::config::RouterConfig;
use crate::core::error::{DispatchError, Result, SnapshotError};
use crate::core::frame::FrameClock;
use crate::dispatch::builtin;
use crate::dispatch::context::ExecutionContext;
use crate::dispatch::diagnostics::{DiagnosticSink, TracingSink};
use crate::dispatch::dispatcher::{DispatchEnv, DispatchOutcome, Dispatcher};
use crate::dispatch::handler::{
    HandlerOutcome, BACKEND_OWNER, BACKEND_PRIORITY, DIRECT_OWNER, DIRECT_PRIORITY,
};
use crate::dispatch::metrics::MetricsSnapshot;
use crate::dispatch::operation::{Call, OperationKind};
use crate::gfx::device::GraphicsDevice;
use crate::routing::decision::RoutingDecision;
use crate::state::cache::ShadowStateCache;
use crate::state::snapshot::{self, StateGuard};
use crate::state::validator::ValidationOutcome;
use crate::{router_info, router_warn};

/// 路由器构造器
#[derive(Default)]
pub struct RouterBuilder {
    config: Option<RouterConfig>,
    detector: Option<Arc<dyn CapabilityDetector>>,
    backends: Option<BackendSet>,
    sink: Option<Arc<dyn DiagnosticSink>>,
}

impl RouterBuilder {
    pub fn config(mut self, config: RouterConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn detector(mut self, detector: Arc<dyn CapabilityDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// 提供后端管理器后，路由器会安装 `router:backend` 处理器
    pub fn backends(mut self, backends: BackendSet) -> Self {
        self.backends = Some(backends);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// 校验配置并构造路由器
    ///
    /// 未提供检测器时，以已注册后端中层级最高的通用后端为激活后端
    /// （没有后端时为 `Legacy`）。
    pub fn build(self) -> Result<Router> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let backends = self.backends.filter(|set| !set.is_empty()).map(Arc::new);

        let detector = self.detector.unwrap_or_else(|| {
            let tags = backends.as_ref().map(|b| b.tags()).unwrap_or_default();
            let active = tags
                .iter()
                .copied()
                .filter(|tag| !tag.is_shader_pipeline())
                .max_by_key(|tag| tag.rank())
                .unwrap_or(BackendTag::Legacy);
            Arc::new(StaticDetector::new(active, tags)) as Arc<dyn CapabilityDetector>
        });

        let sink = self
            .sink
            .unwrap_or_else(|| Arc::new(TracingSink) as Arc<dyn DiagnosticSink>);
        let dispatcher = Dispatcher::new(sink);
        dispatcher.registry().register_builtin(
            DIRECT_OWNER,
            DIRECT_PRIORITY,
            true,
            builtin::direct_handler(),
            &[],
        );
        if let Some(backends) = &backends {
            dispatcher.registry().register_builtin(
                BACKEND_OWNER,
                BACKEND_PRIORITY,
                false,
                builtin::backend_handler(Arc::clone(backends)),
                &[],
            );
        }

        let cache = ShadowStateCache::with_tracked(config.router.tracked_capabilities.iter().copied());

        Ok(Router {
            config: RwLock::new(VersionedConfig {
                generation: 0,
                config: Arc::new(config),
            }),
            cache,
            detector,
            backends,
            dispatcher,
            frames: FrameClock::new(),
            initialized: AtomicBool::new(false),
        })
    }
}

/// 当前配置及其代数
///
/// 两者放在同一把锁下，路由表的缓存标记永远对应实际用于计算的配置。
struct VersionedConfig {
    generation: u64,
    config: Arc<RouterConfig>,
}

/// 调用路由与状态一致性引擎
pub struct Router {
    config: RwLock<VersionedConfig>,
    cache: ShadowStateCache,
    detector: Arc<dyn CapabilityDetector>,
    backends: Option<Arc<BackendSet>>,
    dispatcher: Dispatcher,
    frames: FrameClock,
    initialized: AtomicBool,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::default()
    }

    /// 使用给定配置、默认检测器和 `TracingSink` 构造
    pub fn new(config: RouterConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    /// 从设备整体同步影子缓存
    pub fn init(&self, device: &mut dyn GraphicsDevice) -> ValidationOutcome {
        let outcome = self.dispatcher.validate(&self.cache, &*device);
        self.initialized.store(true, Ordering::Release);

        let config = self.config();
        router_info!(
            device = device.name(),
            active_backend = %self.detector.active_backend(),
            backends = self.backends.as_ref().map(|b| b.len()).unwrap_or(0),
            max_fallback_attempts = config.router.max_fallback_attempts,
            validation_interval = config.router.validation_interval_frames,
            "Router initialised"
        );
        outcome
    }

    /// 输出最终统计并丢弃缓存状态
    pub fn shutdown(&self) {
        if !self.initialized.swap(false, Ordering::AcqRel) {
            return;
        }
        let metrics = self.metrics();
        let totals = metrics.totals();
        router_info!(
            frames = self.frames.frame_count(),
            calls = totals.calls,
            fallbacks = totals.fallbacks,
            eliminated = totals.eliminated,
            failures = totals.failures,
            validations = metrics.validations,
            resyncs = metrics.resyncs,
            "Router shut down"
        );
        self.dispatcher.table().invalidate();
        self.cache.invalidate();
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// 分发一次调用；失败只体现在返回值中
    pub fn dispatch(&self, device: &mut dyn GraphicsDevice, call: &Call) -> DispatchOutcome {
        let (generation, config) = self.versioned_config();
        let env = DispatchEnv {
            cache: &self.cache,
            detector: self.detector.as_ref(),
            config: &config.router,
            config_generation: generation,
        };
        self.dispatcher.dispatch(&env, device, call)
    }

    /// 注册外部处理器
    ///
    /// `kinds` 为空表示服务所有操作类型。优先级高于 10 的处理器排在后端处理器之前，
    /// 0 以下的只在终端处理器失败后才会被尝试。
    pub fn register_handler<F>(
        &self,
        owner: &str,
        priority: i32,
        handler: F,
        kinds: &[OperationKind],
    ) -> std::result::Result<(), DispatchError>
    where
        F: Fn(&mut ExecutionContext<'_>) -> HandlerOutcome + Send + Sync + 'static,
    {
        self.dispatcher.registry().register(owner, priority, handler, kinds)?;
        router_info!(owner, priority, kinds = kinds.len(), "Handler registered");
        Ok(())
    }

    /// 注销某个外部系统注册的所有处理器
    pub fn unregister_mod(&self, owner: &str) -> std::result::Result<usize, DispatchError> {
        let removed = self.dispatcher.registry().unregister(owner)?;
        if removed == 0 {
            router_warn!(owner, "No handlers registered for owner");
        } else {
            router_info!(owner, removed, "Handlers unregistered");
        }
        Ok(removed)
    }

    /// 某类操作当前的处理器链（按尝试顺序）
    pub fn handler_owners(&self, kind: OperationKind) -> Vec<String> {
        self.dispatcher.registry().owners(kind)
    }

    /// 立即校验影子缓存
    pub fn validate_state(&self, device: &dyn GraphicsDevice) -> ValidationOutcome {
        self.dispatcher.validate(&self.cache, device)
    }

    /// 标记帧结束；到达校验节拍时运行周期校验
    pub fn end_frame(&self, device: &dyn GraphicsDevice) -> Option<ValidationOutcome> {
        let interval = self.config().router.validation_interval_frames;
        if self.frames.record_frame(interval) {
            Some(self.validate_state(device))
        } else {
            None
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frames.frame_count()
    }

    pub fn fps(&self) -> f32 {
        self.frames.fps()
    }

    /// 压入状态快照，返回的守卫析构时恢复设备并重新同步缓存
    pub fn push_state<'a, D: GraphicsDevice + ?Sized>(&'a self, device: &'a mut D) -> StateGuard<'a, D> {
        snapshot::push_state(device, Some(&self.cache))
    }

    /// 在快照保护下执行操作（捕获 `Err` 与 panic，总是恢复）
    pub fn execute_with_safety<D, T, E, F>(
        &self,
        device: &mut D,
        name: &str,
        operation: F,
    ) -> std::result::Result<T, SnapshotError>
    where
        D: GraphicsDevice + ?Sized,
        E: std::fmt::Display,
        F: FnOnce(&mut D) -> std::result::Result<T, E>,
    {
        snapshot::execute_with_safety(device, Some(&self.cache), name, operation)
    }

    /// 运行时替换配置
    ///
    /// 路由表失效；参与哈希的能力集合变化时，新加入的能力在下次校验时同步。
    pub fn reconfigure(&self, config: RouterConfig) -> Result<()> {
        config.validate()?;
        self.cache
            .set_tracked(config.router.tracked_capabilities.iter().copied());
        {
            let mut current = self.config.write();
            current.generation += 1;
            current.config = Arc::new(config);
        }
        self.dispatcher.table().invalidate();
        router_info!("Router reconfigured");
        Ok(())
    }

    pub fn config(&self) -> Arc<RouterConfig> {
        Arc::clone(&self.config.read().config)
    }

    /// 原子地读取 (代数, 配置)
    fn versioned_config(&self) -> (u64, Arc<RouterConfig>) {
        let current = self.config.read();
        (current.generation, Arc::clone(&current.config))
    }

    /// 某类操作当前的路由决策
    pub fn decision(&self, kind: OperationKind) -> Arc<RoutingDecision> {
        let (generation, config) = self.versioned_config();
        self.dispatcher
            .table()
            .decision(kind, self.detector.as_ref(), &config.router, generation)
    }

    pub fn detector(&self) -> &Arc<dyn CapabilityDetector> {
        &self.detector
    }

    pub fn cache(&self) -> &ShadowStateCache {
        &self.cache
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.dispatcher.metrics().snapshot()
    }

    pub fn reset_metrics(&self) {
        self.dispatcher.metrics().reset();
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("active_backend", &self.detector.active_backend())
            .field("backends", &self.backends)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::diagnostics::MemorySink;
    use crate::gfx::software::SoftwareDevice;
    use crate::state::capability::Capability;

    fn router_with_sink() -> (Router, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let router = Router::builder().sink(sink.clone()).build().unwrap();
        (router, sink)
    }

    #[test]
    fn test_router_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Router>();
    }

    #[test]
    fn test_builtin_handlers() {
        let router = Router::builder().build().unwrap();
        assert_eq!(router.handler_owners(OperationKind::Clear), vec![DIRECT_OWNER]);

        let router = Router::builder()
            .backends(BackendSet::tiered([BackendTag::Legacy, BackendTag::Gl33]))
            .build()
            .unwrap();
        assert_eq!(
            router.handler_owners(OperationKind::Clear),
            vec![BACKEND_OWNER, DIRECT_OWNER]
        );
        assert_eq!(router.detector().active_backend(), BackendTag::Gl33);
        assert!(router.unregister_mod(DIRECT_OWNER).is_err());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = RouterConfig::default();
        config.router.max_fallback_attempts = 0;
        assert!(Router::new(config).is_err());
    }

    #[test]
    fn test_dispatch_updates_cache_and_emits_record() {
        let (router, sink) = router_with_sink();
        let mut device = SoftwareDevice::new();
        router.init(&mut device);

        let outcome = router.dispatch(&mut device, &Call::enable(Capability::DepthTest));
        assert!(outcome.success);
        assert_eq!(outcome.handled_by.as_deref(), Some(DIRECT_OWNER));
        assert_eq!(router.cache().get(Capability::DepthTest), Some(true));
        assert!(device.is_enabled(Capability::DepthTest));
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_invalid_params_fail_without_touching_device() {
        let (router, sink) = router_with_sink();
        let mut device = SoftwareDevice::new();

        let call = Call::new(OperationKind::BlendFunc).with(crate::dispatch::operation::Value::Bool(true));
        let outcome = router.dispatch(&mut device, &call);
        assert!(!outcome.success);
        assert!(matches!(outcome.error, Some(DispatchError::InvalidParams { .. })));
        assert_eq!(device.mutation_count(), 0);
        assert_eq!(router.metrics().kind(OperationKind::BlendFunc).failures, 1);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_query_returns_value() {
        let router = Router::builder().build().unwrap();
        let mut device = SoftwareDevice::new();
        let outcome = router.dispatch(&mut device, &Call::is_enabled(Capability::Multisample));
        assert_eq!(outcome.result, Some(crate::dispatch::operation::Value::Bool(true)));
        assert_eq!(outcome.result.and_then(|v| v.as_bool()), Some(true));

        let outcome = router.dispatch(&mut device, &Call::is_enabled(Capability::Fog));
        assert_eq!(outcome.result.and_then(|v| v.as_bool()), Some(false));
    }

    #[test]
    fn test_end_frame_cadence() {
        let mut config = RouterConfig::default();
        config.router.validation_interval_frames = 2;
        let router = Router::new(config).unwrap();
        let device = SoftwareDevice::new();

        assert!(router.end_frame(&device).is_none());
        assert!(router.end_frame(&device).is_some());
        assert!(router.end_frame(&device).is_none());
        assert_eq!(router.metrics().validations, 1);
        assert_eq!(router.frame_count(), 3);
    }

    #[test]
    fn test_reconfigure_invalidates_routing() {
        let router = Router::builder()
            .backends(BackendSet::tiered([BackendTag::Legacy, BackendTag::Gl33]))
            .build()
            .unwrap();
        assert_eq!(router.decision(OperationKind::Color).primary, BackendTag::Gl33);

        let mut config = RouterConfig::default();
        config.router.preferred_backend = Some(BackendTag::Legacy);
        router.reconfigure(config).unwrap();
        assert_eq!(router.decision(OperationKind::Color).primary, BackendTag::Legacy);

        let mut bad = RouterConfig::default();
        bad.router.validation_interval_frames = 0;
        assert!(router.reconfigure(bad).is_err());
        assert_eq!(router.config().router.preferred_backend, Some(BackendTag::Legacy));
    }

    #[test]
    fn test_concurrent_reconfigure_never_leaves_stale_decision() {
        let router = Router::builder()
            .backends(BackendSet::tiered([BackendTag::Legacy, BackendTag::Gl33]))
            .build()
            .unwrap();
        let preferred = |tag| {
            let mut config = RouterConfig::default();
            config.router.preferred_backend = Some(tag);
            config
        };

        for round in 0..20 {
            std::thread::scope(|scope| {
                for _ in 0..3 {
                    scope.spawn(|| {
                        for _ in 0..200 {
                            for kind in OperationKind::ALL {
                                router.decision(kind);
                            }
                        }
                    });
                }
                scope.spawn(|| {
                    for i in 0..50 {
                        let tag = if i % 2 == 0 { BackendTag::Legacy } else { BackendTag::Gl33 };
                        router.reconfigure(preferred(tag)).unwrap();
                    }
                });
            });

            // 最后一次写入的是 Gl33；读者留下的任何缓存都必须与之一致
            for kind in [OperationKind::Color, OperationKind::BlendFunc, OperationKind::Clear] {
                assert_eq!(router.decision(kind).primary, BackendTag::Gl33, "round {}", round);
            }
        }
    }

    #[test]
    fn test_shutdown_clears_cache() {
        let router = Router::builder().build().unwrap();
        let mut device = SoftwareDevice::new();
        router.init(&mut device);
        assert!(router.is_initialized());
        assert_eq!(router.cache().get(Capability::Blend), Some(false));

        router.shutdown();
        assert!(!router.is_initialized());
        assert_eq!(router.cache().get(Capability::Blend), None);
    }
}
