//! 图形设备模块
//!
//! 本模块定义路由器与真实设备之间的接缝：
//! - `device`：直接设备接口 `GraphicsDevice` 及相关状态类型
//! - `direct`：把已校验的操作映射为朴素的设备调用
//! - `software`：内存中的参考设备实现（演示与测试使用）
//!
//! 具体图形 API 的实现（各版本的后端管理器）不在本 crate 内，
//! 只需实现 `GraphicsDevice` 即可接入。

pub mod device;
pub mod direct;
pub mod software;

pub use device::{GraphicsDevice, MatrixCommand, MatrixMode, StencilFunc, Viewport};
pub use software::SoftwareDevice;
