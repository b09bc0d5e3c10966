//! 处理器注册表
//!
//! 每类操作一条按优先级排序的处理器链。链以写时复制的方式保存：
//! 分发只需在读锁下克隆一个 `Arc`，注册与注销重建受影响的链。
//!
//! 排序规则（全序，与插入顺序无关）：
//! 1. 优先级高者在前
//! 2. 同优先级时，终端处理器排在最后
//! 3. 其余按注册顺序，先注册先尝试

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::error::DispatchError;
use crate::router_warn;

use super::context::ExecutionContext;
use super::operation::OperationKind;

/// 路由器内置的终端直接执行处理器
pub const DIRECT_OWNER: &str = "router:direct";
/// 路由器内置的后端路由处理器
pub const BACKEND_OWNER: &str = "router:backend";

/// 终端处理器的优先级
pub const DIRECT_PRIORITY: i32 = 0;
/// 后端路由处理器的优先级
pub const BACKEND_PRIORITY: i32 = 10;

/// 处理器的三态结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// 已处理并完成
    Handled,
    /// 不适用，交给下一个处理器；不是错误
    Declined,
    /// 出错，记录原因后交给下一个处理器
    Failed(String),
}

impl HandlerOutcome {
    pub fn failed(cause: impl Into<String>) -> Self {
        HandlerOutcome::Failed(cause.into())
    }

    pub fn is_handled(&self) -> bool {
        matches!(self, HandlerOutcome::Handled)
    }
}

/// 处理器函数
pub type HandlerFn = Arc<dyn Fn(&mut ExecutionContext<'_>) -> HandlerOutcome + Send + Sync>;

/// 一个已注册的处理器
pub struct Handler {
    owner: String,
    priority: i32,
    seq: u64,
    terminal: bool,
    kinds: u32,
    func: HandlerFn,
}

impl Handler {
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// 注册序号
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn serves(&self, kind: OperationKind) -> bool {
        self.kinds & kind_bit(kind) != 0
    }

    pub fn call(&self, ctx: &mut ExecutionContext<'_>) -> HandlerOutcome {
        (self.func)(ctx)
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("owner", &self.owner)
            .field("priority", &self.priority)
            .field("seq", &self.seq)
            .field("terminal", &self.terminal)
            .finish()
    }
}

fn kind_bit(kind: OperationKind) -> u32 {
    1 << kind.index()
}

fn kinds_mask(kinds: &[OperationKind]) -> u32 {
    if kinds.is_empty() {
        return (1u32 << OperationKind::COUNT) - 1;
    }
    kinds.iter().fold(0, |mask, kind| mask | kind_bit(*kind))
}

/// 一类操作的处理器链（不可变快照）
pub type Chain = Arc<[Arc<Handler>]>;

/// 处理器注册表
pub struct HandlerRegistry {
    chains: RwLock<[Chain; OperationKind::COUNT]>,
    next_seq: AtomicU64,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            chains: RwLock::new(std::array::from_fn(|_| Arc::from(Vec::new()))),
            next_seq: AtomicU64::new(0),
        }
    }

    /// 注册处理器
    ///
    /// `kinds` 为空表示服务所有操作类型。以 `router:` 开头的身份保留给路由器自身。
    pub fn register<F>(
        &self,
        owner: &str,
        priority: i32,
        func: F,
        kinds: &[OperationKind],
    ) -> Result<(), DispatchError>
    where
        F: Fn(&mut ExecutionContext<'_>) -> HandlerOutcome + Send + Sync + 'static,
    {
        if is_reserved(owner) {
            return Err(DispatchError::ReservedOwner(owner.to_string()));
        }
        if priority < DIRECT_PRIORITY {
            router_warn!(
                owner,
                priority,
                "Handler registered below the terminal fallback, it only runs if direct execution fails"
            );
        }
        self.insert(owner, priority, false, Arc::new(func), kinds);
        Ok(())
    }

    /// 注册路由器内置处理器（不检查保留身份）
    pub(crate) fn register_builtin(
        &self,
        owner: &str,
        priority: i32,
        terminal: bool,
        func: HandlerFn,
        kinds: &[OperationKind],
    ) {
        self.insert(owner, priority, terminal, func, kinds);
    }

    fn insert(&self, owner: &str, priority: i32, terminal: bool, func: HandlerFn, kinds: &[OperationKind]) {
        let handler = Arc::new(Handler {
            owner: owner.to_string(),
            priority,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            terminal,
            kinds: kinds_mask(kinds),
            func,
        });

        let mut chains = self.chains.write();
        for kind in OperationKind::ALL {
            if !handler.serves(kind) {
                continue;
            }
            let slot = &mut chains[kind.index()];
            let mut handlers: Vec<Arc<Handler>> = slot.iter().cloned().collect();
            handlers.push(Arc::clone(&handler));
            handlers.sort_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then(a.terminal.cmp(&b.terminal))
                    .then(a.seq.cmp(&b.seq))
            });
            *slot = Arc::from(handlers);
        }
    }

    /// 注销某个身份注册的所有处理器，返回被移除的数量
    pub fn unregister(&self, owner: &str) -> Result<usize, DispatchError> {
        if is_reserved(owner) {
            return Err(DispatchError::ReservedOwner(owner.to_string()));
        }
        Ok(self.remove(owner))
    }

    pub(crate) fn remove(&self, owner: &str) -> usize {
        let mut removed = std::collections::HashSet::new();
        let mut chains = self.chains.write();
        for slot in chains.iter_mut() {
            if !slot.iter().any(|h| h.owner == owner) {
                continue;
            }
            let kept: Vec<Arc<Handler>> = slot
                .iter()
                .filter(|h| {
                    if h.owner == owner {
                        removed.insert(h.seq);
                        false
                    } else {
                        true
                    }
                })
                .cloned()
                .collect();
            *slot = Arc::from(kept);
        }
        removed.len()
    }

    /// 某类操作当前的处理器链
    pub fn chain(&self, kind: OperationKind) -> Chain {
        Arc::clone(&self.chains.read()[kind.index()])
    }

    /// 链上各处理器的身份（按尝试顺序）
    pub fn owners(&self, kind: OperationKind) -> Vec<String> {
        self.chain(kind).iter().map(|h| h.owner.clone()).collect()
    }

    /// 某类操作是否有终端处理器兜底
    pub fn has_terminal(&self, kind: OperationKind) -> bool {
        self.chain(kind).iter().any(|h| h.terminal)
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub fn is_reserved(owner: &str) -> bool {
    owner.starts_with("router:")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decline(_: &mut ExecutionContext<'_>) -> HandlerOutcome {
        HandlerOutcome::Declined
    }

    #[test]
    fn test_priority_then_registration_order() {
        let registry = HandlerRegistry::new();
        registry.register("low", 1, decline, &[OperationKind::Clear]).unwrap();
        registry.register("high-a", 10, decline, &[OperationKind::Clear]).unwrap();
        registry.register("high-b", 10, decline, &[OperationKind::Clear]).unwrap();
        registry.register("mid", 5, decline, &[OperationKind::Clear]).unwrap();

        assert_eq!(
            registry.owners(OperationKind::Clear),
            vec!["high-a", "high-b", "mid", "low"]
        );
        assert!(registry.owners(OperationKind::Color).is_empty());
    }

    #[test]
    fn test_terminal_is_last_among_equal_priority() {
        let registry = HandlerRegistry::new();
        registry.register_builtin(DIRECT_OWNER, DIRECT_PRIORITY, true, Arc::new(decline), &[]);
        registry.register("late", 0, decline, &[OperationKind::BlendFunc]).unwrap();
        registry.register("below", -1, decline, &[OperationKind::BlendFunc]).unwrap();

        assert_eq!(
            registry.owners(OperationKind::BlendFunc),
            vec!["late", DIRECT_OWNER, "below"]
        );
        for kind in OperationKind::ALL {
            assert!(registry.has_terminal(kind));
        }
    }

    #[test]
    fn test_empty_kinds_serve_everything() {
        let registry = HandlerRegistry::new();
        registry.register("all", 3, decline, &[]).unwrap();
        for kind in OperationKind::ALL {
            assert_eq!(registry.owners(kind), vec!["all"]);
        }
    }

    #[test]
    fn test_unregister_by_owner() {
        let registry = HandlerRegistry::new();
        registry.register("mod", 5, decline, &[OperationKind::Clear, OperationKind::Color]).unwrap();
        registry.register("mod", 7, decline, &[OperationKind::Clear]).unwrap();
        registry.register("other", 1, decline, &[OperationKind::Clear]).unwrap();

        assert_eq!(registry.unregister("mod").unwrap(), 2);
        assert_eq!(registry.owners(OperationKind::Clear), vec!["other"]);
        assert!(registry.owners(OperationKind::Color).is_empty());
        assert_eq!(registry.unregister("mod").unwrap(), 0);
    }

    #[test]
    fn test_reserved_owners_are_protected() {
        let registry = HandlerRegistry::new();
        registry.register_builtin(DIRECT_OWNER, DIRECT_PRIORITY, true, Arc::new(decline), &[]);

        assert_eq!(
            registry.unregister(DIRECT_OWNER),
            Err(DispatchError::ReservedOwner(DIRECT_OWNER.to_string()))
        );
        assert!(registry.register(BACKEND_OWNER, 99, decline, &[]).is_err());
        assert!(registry.has_terminal(OperationKind::Clear));
    }

    #[test]
    fn test_chain_snapshot_is_unaffected_by_later_writes() {
        let registry = HandlerRegistry::new();
        registry.register("first", 1, decline, &[OperationKind::Clear]).unwrap();
        let snapshot = registry.chain(OperationKind::Clear);

        registry.register("second", 2, decline, &[OperationKind::Clear]).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.chain(OperationKind::Clear).len(), 2);
    }
}
