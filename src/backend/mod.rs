//! 后端抽象层
//!
//! - `tag`：图形 API 层级标签
//! - `manager`：后端管理器接口与按层级转发的参考实现
//! - `detector`：能力检测接口（结果由外部提供）

pub mod detector;
pub mod manager;
pub mod tag;

pub use detector::{CapabilityDetector, StaticDetector};
pub use manager::{BackendManager, BackendSet, TierBackend};
pub use tag::BackendTag;
