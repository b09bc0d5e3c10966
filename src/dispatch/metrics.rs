//! 分发统计
//!
//! 计数器全部是原子量，热路径上只有 `fetch_add`。

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::operation::OperationKind;

#[derive(Default)]
struct KindCounters {
    calls: AtomicU64,
    fallbacks: AtomicU64,
    eliminated: AtomicU64,
    failures: AtomicU64,
}

impl KindCounters {
    fn read(&self) -> KindMetrics {
        KindMetrics {
            calls: self.calls.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            eliminated: self.eliminated.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.calls.store(0, Ordering::Relaxed);
        self.fallbacks.store(0, Ordering::Relaxed);
        self.eliminated.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
    }
}

/// 一类操作的计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindMetrics {
    /// 分发次数
    pub calls: u64,
    /// 至少回退过一次的调用数
    pub fallbacks: u64,
    /// 被消除的冗余调用数
    pub eliminated: u64,
    /// 终端失败次数
    pub failures: u64,
}

impl std::ops::Add for KindMetrics {
    type Output = KindMetrics;

    fn add(self, rhs: KindMetrics) -> KindMetrics {
        KindMetrics {
            calls: self.calls + rhs.calls,
            fallbacks: self.fallbacks + rhs.fallbacks,
            eliminated: self.eliminated + rhs.eliminated,
            failures: self.failures + rhs.failures,
        }
    }
}

/// 路由器运行统计
pub struct Metrics {
    per_kind: [KindCounters; OperationKind::COUNT],
    validations: AtomicU64,
    resyncs: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            per_kind: std::array::from_fn(|_| KindCounters::default()),
            validations: AtomicU64::new(0),
            resyncs: AtomicU64::new(0),
        }
    }

    pub fn record_call(&self, kind: OperationKind, fell_back: bool, eliminated: bool, failed: bool) {
        let counters = &self.per_kind[kind.index()];
        counters.calls.fetch_add(1, Ordering::Relaxed);
        if fell_back {
            counters.fallbacks.fetch_add(1, Ordering::Relaxed);
        }
        if eliminated {
            counters.eliminated.fetch_add(1, Ordering::Relaxed);
        }
        if failed {
            counters.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_validation(&self, resynced: bool) {
        self.validations.fetch_add(1, Ordering::Relaxed);
        if resynced {
            self.resyncs.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// 某一时刻的统计快照（各计数器分别读取，不保证跨计数器一致）
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            per_kind: std::array::from_fn(|i| self.per_kind[i].read()),
            validations: self.validations.load(Ordering::Relaxed),
            resyncs: self.resyncs.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for counters in &self.per_kind {
            counters.reset();
        }
        self.validations.store(0, Ordering::Relaxed);
        self.resyncs.store(0, Ordering::Relaxed);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// 统计快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    per_kind: [KindMetrics; OperationKind::COUNT],
    pub validations: u64,
    pub resyncs: u64,
}

impl MetricsSnapshot {
    pub fn kind(&self, kind: OperationKind) -> KindMetrics {
        self.per_kind[kind.index()]
    }

    /// 所有操作类型的合计
    pub fn totals(&self) -> KindMetrics {
        self.per_kind.iter().copied().fold(KindMetrics::default(), |acc, m| acc + m)
    }

    /// 有过调用的操作类型
    pub fn active_kinds(&self) -> impl Iterator<Item = (OperationKind, KindMetrics)> + '_ {
        OperationKind::ALL
            .into_iter()
            .map(|kind| (kind, self.kind(kind)))
            .filter(|(_, m)| m.calls > 0)
    }
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let totals = self.totals();
        writeln!(
            f,
            "calls={} fallbacks={} eliminated={} failures={} validations={} resyncs={}",
            totals.calls,
            totals.fallbacks,
            totals.eliminated,
            totals.failures,
            self.validations,
            self.resyncs
        )?;
        for (kind, m) in self.active_kinds() {
            writeln!(
                f,
                "  {:<20} calls={:<6} fallbacks={:<4} eliminated={:<6} failures={}",
                kind.name(),
                m.calls,
                m.fallbacks,
                m.eliminated,
                m.failures
            )?;
        }
        Ok(())
    }
}
