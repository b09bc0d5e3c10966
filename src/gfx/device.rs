//! 图形设备的统一抽象接口
//!
//! `GraphicsDevice` 是"已知可用"的直接设备 API：终端回退处理器、
//! 后端管理器以及快照的捕获/恢复都通过它访问设备状态。
//!
//! 设备只属于渲染线程，因此所有修改方法都接收 `&mut self`；
//! 路由器本身不持有设备，每次调用时由调用者传入。

use crate::core::error::DeviceError;
use crate::math::{Color, Matrix4};
use crate::state::capability::Capability;

/// 视口矩形
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Viewport {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }
}

/// 模板测试函数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StencilFunc {
    pub func: u32,
    pub reference: i32,
    pub mask: u32,
}

impl Default for StencilFunc {
    fn default() -> Self {
        Self {
            func: compare::ALWAYS,
            reference: 0,
            mask: u32::MAX,
        }
    }
}

/// 矩阵模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatrixMode {
    ModelView,
    Projection,
    Texture,
}

/// 矩阵栈操作
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatrixCommand {
    /// 切换当前矩阵模式
    Mode(MatrixMode),
    Push,
    Pop,
    LoadIdentity,
    Translate(f32, f32, f32),
    Scale(f32, f32, f32),
    /// 角度制旋转（angle, x, y, z）
    Rotate(f32, f32, f32, f32),
    Load(Matrix4),
    Mult(Matrix4),
}

/// 比较函数常量（与 GL 的取值一致）
pub mod compare {
    pub const NEVER: u32 = 0x0200;
    pub const LESS: u32 = 0x0201;
    pub const EQUAL: u32 = 0x0202;
    pub const LEQUAL: u32 = 0x0203;
    pub const GREATER: u32 = 0x0204;
    pub const NOTEQUAL: u32 = 0x0205;
    pub const GEQUAL: u32 = 0x0206;
    pub const ALWAYS: u32 = 0x0207;

    pub fn is_valid(func: u32) -> bool {
        (NEVER..=ALWAYS).contains(&func)
    }
}

/// 面剔除模式常量
pub mod cull {
    pub const FRONT: u32 = 0x0404;
    pub const BACK: u32 = 0x0405;
    pub const FRONT_AND_BACK: u32 = 0x0408;

    pub fn is_valid(mode: u32) -> bool {
        matches!(mode, FRONT | BACK | FRONT_AND_BACK)
    }
}

/// 清屏位
pub mod clear_bits {
    pub const DEPTH: u32 = 0x0000_0100;
    pub const STENCIL: u32 = 0x0000_0400;
    pub const COLOR: u32 = 0x0000_4000;
    pub const ALL: u32 = DEPTH | STENCIL | COLOR;
}

/// 直接设备接口
///
/// 每个方法对应一个最朴素的设备调用，不做缓存也不做校验。
/// 查询方法必须是纯读取，不能改变设备状态。
pub trait GraphicsDevice {
    /// 设备名称，用于日志输出
    fn name(&self) -> &str;

    fn set_capability(&mut self, cap: Capability, enabled: bool) -> Result<(), DeviceError>;
    fn is_enabled(&self, cap: Capability) -> bool;

    fn blend_func(&mut self, src: u32, dst: u32) -> Result<(), DeviceError>;
    fn blend_func_state(&self) -> (u32, u32);

    fn depth_func(&mut self, func: u32) -> Result<(), DeviceError>;
    fn depth_func_state(&self) -> u32;

    fn depth_mask(&mut self, write: bool) -> Result<(), DeviceError>;
    fn depth_mask_state(&self) -> bool;

    fn stencil_func(&mut self, stencil: StencilFunc) -> Result<(), DeviceError>;
    fn stencil_func_state(&self) -> StencilFunc;

    fn cull_face(&mut self, mode: u32) -> Result<(), DeviceError>;
    fn cull_face_state(&self) -> u32;

    fn color(&mut self, color: Color) -> Result<(), DeviceError>;
    fn current_color(&self) -> Color;

    fn viewport(&mut self, viewport: Viewport) -> Result<(), DeviceError>;
    fn viewport_state(&self) -> Viewport;

    fn bind_texture(&mut self, texture: u32) -> Result<(), DeviceError>;
    fn bound_texture(&self) -> u32;

    fn use_program(&mut self, program: u32) -> Result<(), DeviceError>;
    fn current_program(&self) -> u32;

    fn bind_buffer(&mut self, buffer: u32) -> Result<(), DeviceError>;
    fn bound_buffer(&self) -> u32;

    fn bind_vertex_array(&mut self, vao: u32) -> Result<(), DeviceError>;
    fn bound_vertex_array(&self) -> u32;

    fn bind_framebuffer(&mut self, framebuffer: u32) -> Result<(), DeviceError>;
    fn bound_framebuffer(&self) -> u32;

    fn clear(&mut self, mask: u32) -> Result<(), DeviceError>;

    fn matrix(&mut self, command: MatrixCommand) -> Result<(), DeviceError>;
    fn current_matrix(&self, mode: MatrixMode) -> Matrix4;

    /// 读取一组能力的当前值（校验器使用）
    fn read_capabilities(&self, caps: &[Capability]) -> Vec<(Capability, bool)> {
        caps.iter().map(|&cap| (cap, self.is_enabled(cap))).collect()
    }

    /// 所有能力组成的位掩码
    fn capability_mask(&self) -> u64 {
        Capability::ALL
            .iter()
            .filter(|&&cap| self.is_enabled(cap))
            .fold(0u64, |mask, cap| mask | cap.bit())
    }
}
