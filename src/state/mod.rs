//! 状态一致性模块
//!
//! - `capability`：能力标志与脏标记类别
//! - `cache`：影子状态缓存（无锁、读多写少）
//! - `validator`：基于哈希预检查的周期校验
//! - `snapshot`：状态快照、线程局部嵌套栈与作用域守卫

pub mod cache;
pub mod capability;
pub mod snapshot;
pub mod validator;

pub use cache::ShadowStateCache;
pub use capability::{Capability, StateCategory};
pub use snapshot::{execute_with_safety, push_state, StateGuard, StateSnapshot};
pub use validator::{validate, ValidationOutcome};
