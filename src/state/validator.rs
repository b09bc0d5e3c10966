//! 周期性状态校验
//!
//! 先做廉价的预检查：比较缓存哈希与设备直接读数的哈希。
//! 只有不一致时才付出完整重新同步的代价。
//!
//! 这是发现"合作系统绕过路由器直接修改设备状态"的唯一机制，
//! 因此它能发现的漂移范围取决于参与哈希的能力集合（可配置）。

use tracing::{trace, warn};

use crate::gfx::device::GraphicsDevice;

use super::cache::{state_hash, ShadowStateCache};
use super::capability::Capability;

/// 一次校验的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// 缓存与设备一致
    Clean { hash: u64 },
    /// 发现漂移，已从设备整体重新同步
    Resynced { hash: u64, drifted: Vec<Capability> },
}

impl ValidationOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, ValidationOutcome::Clean { .. })
    }

    pub fn hash(&self) -> u64 {
        match self {
            ValidationOutcome::Clean { hash } | ValidationOutcome::Resynced { hash, .. } => *hash,
        }
    }
}

/// 直接读取设备上参与校验的能力并计算哈希
pub fn device_hash<D: GraphicsDevice + ?Sized>(cache: &ShadowStateCache, device: &D) -> u64 {
    let tracked = cache.tracked();
    state_hash(
        device
            .read_capabilities(&tracked)
            .into_iter()
            .map(|(cap, value)| (cap, Some(value))),
        cache.tracked_mask(),
    )
}

/// 校验缓存；不一致时重新同步并清除所有脏位
pub fn validate<D: GraphicsDevice + ?Sized>(
    cache: &ShadowStateCache,
    device: &D,
) -> ValidationOutcome {
    let tracked = cache.tracked();
    let readings = device.read_capabilities(&tracked);
    let observed = state_hash(
        readings.iter().map(|&(cap, value)| (cap, Some(value))),
        cache.tracked_mask(),
    );

    if observed == cache.compute_hash() {
        trace!(hash = observed, "State validation clean");
        cache.record_sync(observed);
        return ValidationOutcome::Clean { hash: observed };
    }

    let drifted = cache.resync(readings);
    if !drifted.is_empty() {
        warn!(
            device = device.name(),
            drifted = ?drifted.iter().map(|cap| cap.name()).collect::<Vec<_>>(),
            "Detected out-of-band state changes, shadow cache resynchronised"
        );
    }
    ValidationOutcome::Resynced {
        hash: cache.last_sync_hash(),
        drifted,
    }
}
