//! 影子状态缓存
//!
//! 路由器对设备当前状态的本地认知：能力标识符 → 最后一次观察到的布尔值，
//! 外加每个状态类别一位的脏位掩码。
//!
//! # 并发模型
//!
//! 写入只来自渲染线程，读取可能来自任意线程（例如后台校验线程），
//! 因此所有字段都是原子量，读写都不加锁：
//!
//! - 每个能力一个 `AtomicU8`：0 = 未知，1 = 关闭，2 = 开启
//! - 脏位掩码是一个 `AtomicU32`
//! - 参与哈希的能力集合是一个 `AtomicU64` 位掩码
//!
//! 缓存条目只在下一次周期校验之前是权威的；外部直接修改设备状态时，
//! 由校验器通过哈希比较发现并重新同步。

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

use super::capability::{Capability, StateCategory};

const UNKNOWN: u8 = 0;
const DISABLED: u8 = 1;
const ENABLED: u8 = 2;

fn encode(value: Option<bool>) -> u8 {
    match value {
        None => UNKNOWN,
        Some(false) => DISABLED,
        Some(true) => ENABLED,
    }
}

fn decode(raw: u8) -> Option<bool> {
    match raw {
        DISABLED => Some(false),
        ENABLED => Some(true),
        _ => None,
    }
}

/// splitmix64 终结步，用作 (能力, 值) 对的混合函数
fn mix(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// 计算顺序无关的状态哈希
///
/// 只统计 `tracked` 位掩码中的能力。每一对 (能力, 值) 先独立混合，
/// 再用回绕加法合并，因此结果与迭代顺序无关。未知值也参与哈希，
/// 这样缓存中的未知条目一定会与设备的实际读数不一致。
pub fn state_hash<I>(entries: I, tracked: u64) -> u64
where
    I: IntoIterator<Item = (Capability, Option<bool>)>,
{
    entries
        .into_iter()
        .filter(|(cap, _)| tracked & cap.bit() != 0)
        .fold(0u64, |acc, (cap, value)| {
            let key = ((cap.id() as u64) << 8) | encode(value) as u64;
            acc.wrapping_add(mix(key))
        })
}

/// 影子状态缓存
#[derive(Debug)]
pub struct ShadowStateCache {
    values: [AtomicU8; Capability::COUNT],
    dirty: AtomicU32,
    tracked: AtomicU64,
    last_sync_hash: AtomicU64,
}

impl ShadowStateCache {
    /// 创建缓存，参与校验的能力为默认的九个经典能力
    pub fn new() -> Self {
        Self::with_tracked(Capability::DEFAULT_TRACKED)
    }

    /// 使用自定义的校验能力集合创建缓存
    pub fn with_tracked<I>(tracked: I) -> Self
    where
        I: IntoIterator<Item = Capability>,
    {
        let cache = Self {
            values: std::array::from_fn(|_| AtomicU8::new(UNKNOWN)),
            dirty: AtomicU32::new(0),
            tracked: AtomicU64::new(0),
            last_sync_hash: AtomicU64::new(0),
        };
        cache.set_tracked(tracked);
        cache
    }

    /// 最后已知值，`None` 表示未知
    pub fn get(&self, cap: Capability) -> Option<bool> {
        decode(self.values[cap.id()].load(Ordering::Acquire))
    }

    /// 写入新值并返回旧值，同时标记所属类别为脏
    pub fn set(&self, cap: Capability, value: bool) -> Option<bool> {
        let previous = self.values[cap.id()].swap(encode(Some(value)), Ordering::AcqRel);
        self.mark_dirty(cap.category());
        decode(previous)
    }

    /// 将所有条目标记为未知
    pub fn invalidate(&self) {
        for value in &self.values {
            value.store(UNKNOWN, Ordering::Release);
        }
        self.dirty.store(StateCategory::all_bits(), Ordering::Release);
    }

    pub fn mark_dirty(&self, category: StateCategory) {
        self.dirty.fetch_or(category.bit(), Ordering::AcqRel);
    }

    pub fn is_dirty(&self, category: StateCategory) -> bool {
        self.dirty.load(Ordering::Acquire) & category.bit() != 0
    }

    /// 原始脏位掩码
    pub fn dirty_bits(&self) -> u32 {
        self.dirty.load(Ordering::Acquire)
    }

    pub fn clear_dirty(&self) {
        self.dirty.store(0, Ordering::Release);
    }

    /// 对所有参与校验的能力计算状态哈希
    pub fn compute_hash(&self) -> u64 {
        let tracked = self.tracked_mask();
        state_hash(
            Capability::ALL.iter().map(|&cap| (cap, self.get(cap))),
            tracked,
        )
    }

    /// 用设备的直接读数整体覆盖缓存，并清除所有脏位
    ///
    /// 返回与设备读数不一致的能力列表（包括之前为未知的条目）。
    pub fn resync<I>(&self, device_values: I) -> Vec<Capability>
    where
        I: IntoIterator<Item = (Capability, bool)>,
    {
        let mut drifted = Vec::new();
        for (cap, value) in device_values {
            let previous = self.values[cap.id()].swap(encode(Some(value)), Ordering::AcqRel);
            if decode(previous) != Some(value) {
                drifted.push(cap);
            }
        }
        self.last_sync_hash.store(self.compute_hash(), Ordering::Release);
        self.clear_dirty();
        drifted
    }

    /// 上一次同步时记录的哈希
    pub fn last_sync_hash(&self) -> u64 {
        self.last_sync_hash.load(Ordering::Acquire)
    }

    /// 记录一次干净校验的哈希（缓存与设备一致）
    pub fn record_sync(&self, hash: u64) {
        self.last_sync_hash.store(hash, Ordering::Release);
        self.clear_dirty();
    }

    /// 替换参与校验的能力集合
    pub fn set_tracked<I>(&self, tracked: I)
    where
        I: IntoIterator<Item = Capability>,
    {
        let mask = tracked.into_iter().fold(0u64, |mask, cap| mask | cap.bit());
        self.tracked.store(mask, Ordering::Release);
    }

    pub fn tracked_mask(&self) -> u64 {
        self.tracked.load(Ordering::Acquire)
    }

    pub fn is_tracked(&self, cap: Capability) -> bool {
        self.tracked_mask() & cap.bit() != 0
    }

    /// 参与校验的能力，按标识符排序
    pub fn tracked(&self) -> Vec<Capability> {
        let mask = self.tracked_mask();
        Capability::ALL
            .iter()
            .copied()
            .filter(|cap| mask & cap.bit() != 0)
            .collect()
    }
}

impl Default for ShadowStateCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_get_set_returns_previous() {
        let cache = ShadowStateCache::new();
        assert_eq!(cache.get(Capability::Blend), None);

        assert_eq!(cache.set(Capability::Blend, true), None);
        assert_eq!(cache.set(Capability::Blend, false), Some(true));
        assert_eq!(cache.get(Capability::Blend), Some(false));
    }

    #[test]
    fn test_set_marks_owning_category_dirty() {
        let cache = ShadowStateCache::new();
        assert!(!cache.is_dirty(StateCategory::Depth));

        cache.set(Capability::DepthTest, true);
        assert!(cache.is_dirty(StateCategory::Depth));
        assert!(!cache.is_dirty(StateCategory::Blend));

        cache.clear_dirty();
        assert_eq!(cache.dirty_bits(), 0);
    }

    #[test]
    fn test_hash_is_order_independent() {
        let tracked = Capability::Blend.bit() | Capability::Fog.bit() | Capability::CullFace.bit();
        let forward = [
            (Capability::Blend, Some(true)),
            (Capability::Fog, Some(false)),
            (Capability::CullFace, Some(true)),
        ];
        let mut reversed = forward;
        reversed.reverse();
        assert_eq!(state_hash(forward, tracked), state_hash(reversed, tracked));
    }

    #[test]
    fn test_hash_ignores_untracked() {
        let cache = ShadowStateCache::with_tracked([Capability::Blend]);
        let before = cache.compute_hash();
        cache.set(Capability::Fog, true);
        assert_eq!(cache.compute_hash(), before);

        cache.set(Capability::Blend, true);
        assert_ne!(cache.compute_hash(), before);
    }

    #[test]
    fn test_hash_distinguishes_values() {
        let tracked = Capability::Blend.bit();
        let on = state_hash([(Capability::Blend, Some(true))], tracked);
        let off = state_hash([(Capability::Blend, Some(false))], tracked);
        let unknown = state_hash([(Capability::Blend, None)], tracked);
        assert_ne!(on, off);
        assert_ne!(on, unknown);
        assert_ne!(off, unknown);
    }

    #[test]
    fn test_resync_reports_drift_and_clears_dirty() {
        let cache = ShadowStateCache::new();
        cache.set(Capability::Blend, true);
        cache.set(Capability::Fog, false);

        let drifted = cache.resync([
            (Capability::Blend, true),
            (Capability::Fog, true),
            (Capability::Lighting, false),
        ]);

        assert_eq!(drifted, vec![Capability::Fog, Capability::Lighting]);
        assert_eq!(cache.dirty_bits(), 0);
        assert_eq!(cache.last_sync_hash(), cache.compute_hash());
    }

    #[test]
    fn test_invalidate_forgets_everything() {
        let cache = ShadowStateCache::new();
        cache.resync(Capability::ALL.iter().map(|&cap| (cap, false)));
        cache.invalidate();
        for cap in Capability::ALL {
            assert_eq!(cache.get(cap), None);
        }
        assert_eq!(cache.dirty_bits(), StateCategory::all_bits());
    }

    #[test]
    fn test_concurrent_readers_never_block() {
        let cache = Arc::new(ShadowStateCache::new());
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    let mut observed = 0usize;
                    for _ in 0..10_000 {
                        if cache.get(Capability::Blend).is_some() {
                            observed += 1;
                        }
                        let _ = cache.compute_hash();
                    }
                    observed
                })
            })
            .collect();

        for i in 0..10_000 {
            cache.set(Capability::Blend, i % 2 == 0);
        }

        for reader in readers {
            assert!(reader.join().is_ok());
        }
        assert_eq!(cache.get(Capability::Blend), Some(false));
    }
}
