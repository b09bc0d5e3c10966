//! 记忆化的路由决策表
//!
//! 每类操作的决策首次使用时计算并缓存。检测器或配置的代数变化时整表失效。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::backend::detector::CapabilityDetector;
use crate::core::config::RoutingConfig;
use crate::dispatch::operation::OperationKind;

use super::decision::{compute_decision, RoutingDecision};

/// (检测器代数, 配置代数)
type Stamp = (u64, u64);

struct Entries {
    stamp: Option<Stamp>,
    decisions: [Option<Arc<RoutingDecision>>; OperationKind::COUNT],
}

impl Entries {
    fn empty() -> Self {
        Self {
            stamp: None,
            decisions: std::array::from_fn(|_| None),
        }
    }
}

/// 路由决策表
pub struct RoutingTable {
    entries: RwLock<Entries>,
    computations: AtomicU64,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Entries::empty()),
            computations: AtomicU64::new(0),
        }
    }

    /// 查询决策；缓存失效时重新计算
    pub fn decision(
        &self,
        kind: OperationKind,
        detector: &dyn CapabilityDetector,
        config: &RoutingConfig,
        config_generation: u64,
    ) -> Arc<RoutingDecision> {
        let stamp = (detector.generation(), config_generation);

        {
            let entries = self.entries.read();
            if entries.stamp == Some(stamp) {
                if let Some(decision) = &entries.decisions[kind.index()] {
                    return Arc::clone(decision);
                }
            }
        }

        let decision = Arc::new(compute_decision(
            kind,
            detector.active_backend(),
            &detector.available_backends(),
            config,
        ));
        self.computations.fetch_add(1, Ordering::Relaxed);

        let mut entries = self.entries.write();
        if entries.stamp != Some(stamp) {
            if entries.stamp.is_some() {
                debug!(
                    detector_generation = stamp.0,
                    config_generation = stamp.1,
                    "Routing table invalidated"
                );
            }
            *entries = Entries::empty();
            entries.stamp = Some(stamp);
        }
        entries.decisions[kind.index()] = Some(Arc::clone(&decision));
        decision
    }

    /// 丢弃所有缓存的决策
    pub fn invalidate(&self) {
        *self.entries.write() = Entries::empty();
    }

    /// 当前缓存的决策数量
    pub fn cached(&self) -> usize {
        self.entries.read().decisions.iter().filter(|d| d.is_some()).count()
    }

    /// 累计计算次数
    pub fn computations(&self) -> u64 {
        self.computations.load(Ordering::Relaxed)
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::detector::StaticDetector;
    use crate::backend::tag::BackendTag;

    #[test]
    fn test_decisions_are_memoized() {
        let table = RoutingTable::new();
        let detector = StaticDetector::new(BackendTag::Gl33, [BackendTag::Legacy]);
        let config = RoutingConfig::default();

        let first = table.decision(OperationKind::BlendFunc, &detector, &config, 0);
        let second = table.decision(OperationKind::BlendFunc, &detector, &config, 0);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(table.computations(), 1);
        assert_eq!(table.cached(), 1);
    }

    #[test]
    fn test_detector_change_invalidates() {
        let table = RoutingTable::new();
        let detector = StaticDetector::new(BackendTag::Gl33, [BackendTag::Legacy]);
        let config = RoutingConfig::default();

        let before = table.decision(OperationKind::UseShaderProgram, &detector, &config, 0);
        assert_eq!(before.primary, BackendTag::Gl33);

        detector.set_available([BackendTag::Legacy, BackendTag::ShaderPipeline]);
        let after = table.decision(OperationKind::UseShaderProgram, &detector, &config, 0);
        assert_eq!(after.primary, BackendTag::ShaderPipeline);
        assert_eq!(table.computations(), 2);
    }

    #[test]
    fn test_config_generation_invalidates() {
        let table = RoutingTable::new();
        let detector = StaticDetector::new(BackendTag::Gl33, []);
        let mut config = RoutingConfig::default();

        assert!(table.decision(OperationKind::CapabilityEnable, &detector, &config, 0).requires_validation);
        table.decision(OperationKind::Clear, &detector, &config, 0);
        assert_eq!(table.cached(), 2);

        config.validate_state_toggles = false;
        assert!(!table.decision(OperationKind::CapabilityEnable, &detector, &config, 1).requires_validation);
        assert_eq!(table.cached(), 1);
    }

    #[test]
    fn test_explicit_invalidate() {
        let table = RoutingTable::new();
        let detector = StaticDetector::new(BackendTag::Legacy, []);
        let config = RoutingConfig::default();
        table.decision(OperationKind::Color, &detector, &config, 0);
        table.invalidate();
        assert_eq!(table.cached(), 0);
        table.decision(OperationKind::Color, &detector, &config, 0);
        assert_eq!(table.computations(), 2);
    }
}
