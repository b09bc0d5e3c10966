//! 能力检测接口
//!
//! 检测本身不在路由器职责之内；路由器只消费检测结果，
//! 并通过 `generation` 的变化得知需要重新计算路由决策。

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::tag::BackendTag;

/// 能力检测器
pub trait CapabilityDetector: Send + Sync {
    /// 当前激活的后端
    fn active_backend(&self) -> BackendTag;

    /// 检测到的可用后端集合
    fn available_backends(&self) -> Vec<BackendTag>;

    /// 变更计数；检测结果每变化一次递增一次
    fn generation(&self) -> u64;
}

#[derive(Debug)]
struct Detected {
    active: BackendTag,
    available: Vec<BackendTag>,
}

/// 由调用方直接给定检测结果的检测器
#[derive(Debug)]
pub struct StaticDetector {
    detected: RwLock<Detected>,
    generation: AtomicU64,
}

impl StaticDetector {
    /// 激活后端总会出现在可用集合中
    pub fn new<I: IntoIterator<Item = BackendTag>>(active: BackendTag, available: I) -> Self {
        Self {
            detected: RwLock::new(Detected {
                active,
                available: normalize(active, available),
            }),
            generation: AtomicU64::new(0),
        }
    }

    pub fn set_active(&self, active: BackendTag) {
        {
            let mut detected = self.detected.write();
            detected.active = active;
            if !detected.available.contains(&active) {
                detected.available.push(active);
                detected.available.sort();
            }
        }
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub fn set_available<I: IntoIterator<Item = BackendTag>>(&self, available: I) {
        {
            let mut detected = self.detected.write();
            let active = detected.active;
            detected.available = normalize(active, available);
        }
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}

fn normalize<I: IntoIterator<Item = BackendTag>>(active: BackendTag, available: I) -> Vec<BackendTag> {
    let mut tags: Vec<BackendTag> = available.into_iter().collect();
    tags.push(active);
    tags.sort();
    tags.dedup();
    tags
}

impl CapabilityDetector for StaticDetector {
    fn active_backend(&self) -> BackendTag {
        self.detected.read().active
    }

    fn available_backends(&self) -> Vec<BackendTag> {
        self.detected.read().available.clone()
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}
