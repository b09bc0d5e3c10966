//! 软件参考设备
//!
//! 完全在内存中模拟设备状态的 `GraphicsDevice` 实现。
//! 演示程序和测试都使用它：它把"修改"和"读取"分开计数，
//! 方便验证冗余调用消除是否真的没有触碰设备。

use std::collections::HashMap;

use crate::core::error::DeviceError;
use crate::math::{matrix, Color, Matrix4};
use crate::state::capability::Capability;

use super::device::{compare, cull, GraphicsDevice, MatrixCommand, MatrixMode, StencilFunc, Viewport};

/// 每种矩阵模式的最大栈深度
pub const MAX_MATRIX_STACK_DEPTH: usize = 32;

/// 软件参考设备
#[derive(Debug)]
pub struct SoftwareDevice {
    name: String,
    capabilities: u64,
    blend: (u32, u32),
    depth_func: u32,
    depth_mask: bool,
    stencil: StencilFunc,
    cull_mode: u32,
    color: Color,
    viewport: Viewport,
    texture: u32,
    program: u32,
    buffer: u32,
    vertex_array: u32,
    framebuffer: u32,
    matrix_mode: MatrixMode,
    matrices: HashMap<MatrixMode, Vec<Matrix4>>,
    clears: u64,

    mutations: u64,
    capability_mutations: [u64; Capability::COUNT],
    pending_failure: Option<DeviceError>,
}

impl SoftwareDevice {
    /// 创建处于 GL 默认状态的设备
    pub fn new() -> Self {
        Self::with_name("software")
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        let matrices = [MatrixMode::ModelView, MatrixMode::Projection, MatrixMode::Texture]
            .into_iter()
            .map(|mode| (mode, vec![Matrix4::identity()]))
            .collect();

        Self {
            name: name.into(),
            capabilities: Capability::Multisample.bit(),
            blend: (1, 0),
            depth_func: compare::LESS,
            depth_mask: true,
            stencil: StencilFunc::default(),
            cull_mode: cull::BACK,
            color: Color::WHITE,
            viewport: Viewport::new(0, 0, 800, 600),
            texture: 0,
            program: 0,
            buffer: 0,
            vertex_array: 0,
            framebuffer: 0,
            matrix_mode: MatrixMode::ModelView,
            matrices,
            clears: 0,
            mutations: 0,
            capability_mutations: [0; Capability::COUNT],
            pending_failure: None,
        }
    }

    /// 所有修改调用的次数
    pub fn mutation_count(&self) -> u64 {
        self.mutations
    }

    /// 某个能力被修改的次数
    pub fn capability_mutations(&self, cap: Capability) -> u64 {
        self.capability_mutations[cap.id()]
    }

    /// 清屏次数
    pub fn clear_count(&self) -> u64 {
        self.clears
    }

    pub fn matrix_depth(&self, mode: MatrixMode) -> usize {
        self.matrices.get(&mode).map_or(0, Vec::len)
    }

    /// 让下一次修改调用失败（模拟设备错误）
    pub fn fail_next(&mut self, error: DeviceError) {
        self.pending_failure = Some(error);
    }

    fn begin_mutation(&mut self) -> Result<(), DeviceError> {
        if let Some(error) = self.pending_failure.take() {
            return Err(error);
        }
        self.mutations += 1;
        Ok(())
    }

    fn stack_mut(&mut self) -> &mut Vec<Matrix4> {
        self.matrices
            .entry(self.matrix_mode)
            .or_insert_with(|| vec![Matrix4::identity()])
    }

    fn top_mut(&mut self) -> &mut Matrix4 {
        let stack = self.stack_mut();
        if stack.is_empty() {
            stack.push(Matrix4::identity());
        }
        let last = stack.len() - 1;
        &mut stack[last]
    }
}

impl Default for SoftwareDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsDevice for SoftwareDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_capability(&mut self, cap: Capability, enabled: bool) -> Result<(), DeviceError> {
        self.begin_mutation()?;
        self.capability_mutations[cap.id()] += 1;
        if enabled {
            self.capabilities |= cap.bit();
        } else {
            self.capabilities &= !cap.bit();
        }
        Ok(())
    }

    fn is_enabled(&self, cap: Capability) -> bool {
        self.capabilities & cap.bit() != 0
    }

    fn blend_func(&mut self, src: u32, dst: u32) -> Result<(), DeviceError> {
        self.begin_mutation()?;
        self.blend = (src, dst);
        Ok(())
    }

    fn blend_func_state(&self) -> (u32, u32) {
        self.blend
    }

    fn depth_func(&mut self, func: u32) -> Result<(), DeviceError> {
        if !compare::is_valid(func) {
            return Err(DeviceError::InvalidEnum(func));
        }
        self.begin_mutation()?;
        self.depth_func = func;
        Ok(())
    }

    fn depth_func_state(&self) -> u32 {
        self.depth_func
    }

    fn depth_mask(&mut self, write: bool) -> Result<(), DeviceError> {
        self.begin_mutation()?;
        self.depth_mask = write;
        Ok(())
    }

    fn depth_mask_state(&self) -> bool {
        self.depth_mask
    }

    fn stencil_func(&mut self, stencil: StencilFunc) -> Result<(), DeviceError> {
        if !compare::is_valid(stencil.func) {
            return Err(DeviceError::InvalidEnum(stencil.func));
        }
        self.begin_mutation()?;
        self.stencil = stencil;
        Ok(())
    }

    fn stencil_func_state(&self) -> StencilFunc {
        self.stencil
    }

    fn cull_face(&mut self, mode: u32) -> Result<(), DeviceError> {
        if !cull::is_valid(mode) {
            return Err(DeviceError::InvalidEnum(mode));
        }
        self.begin_mutation()?;
        self.cull_mode = mode;
        Ok(())
    }

    fn cull_face_state(&self) -> u32 {
        self.cull_mode
    }

    fn color(&mut self, color: Color) -> Result<(), DeviceError> {
        self.begin_mutation()?;
        self.color = color;
        Ok(())
    }

    fn current_color(&self) -> Color {
        self.color
    }

    fn viewport(&mut self, viewport: Viewport) -> Result<(), DeviceError> {
        self.begin_mutation()?;
        self.viewport = viewport;
        Ok(())
    }

    fn viewport_state(&self) -> Viewport {
        self.viewport
    }

    fn bind_texture(&mut self, texture: u32) -> Result<(), DeviceError> {
        self.begin_mutation()?;
        self.texture = texture;
        Ok(())
    }

    fn bound_texture(&self) -> u32 {
        self.texture
    }

    fn use_program(&mut self, program: u32) -> Result<(), DeviceError> {
        self.begin_mutation()?;
        self.program = program;
        Ok(())
    }

    fn current_program(&self) -> u32 {
        self.program
    }

    fn bind_buffer(&mut self, buffer: u32) -> Result<(), DeviceError> {
        self.begin_mutation()?;
        self.buffer = buffer;
        Ok(())
    }

    fn bound_buffer(&self) -> u32 {
        self.buffer
    }

    fn bind_vertex_array(&mut self, vao: u32) -> Result<(), DeviceError> {
        self.begin_mutation()?;
        self.vertex_array = vao;
        Ok(())
    }

    fn bound_vertex_array(&self) -> u32 {
        self.vertex_array
    }

    fn bind_framebuffer(&mut self, framebuffer: u32) -> Result<(), DeviceError> {
        self.begin_mutation()?;
        self.framebuffer = framebuffer;
        Ok(())
    }

    fn bound_framebuffer(&self) -> u32 {
        self.framebuffer
    }

    fn clear(&mut self, mask: u32) -> Result<(), DeviceError> {
        if mask & !super::device::clear_bits::ALL != 0 {
            return Err(DeviceError::InvalidEnum(mask));
        }
        self.begin_mutation()?;
        self.clears += 1;
        Ok(())
    }

    fn matrix(&mut self, command: MatrixCommand) -> Result<(), DeviceError> {
        // 栈溢出/下溢在计数之前检查，失败的调用不算修改
        match command {
            MatrixCommand::Push if self.matrix_depth(self.matrix_mode) >= MAX_MATRIX_STACK_DEPTH => {
                return Err(DeviceError::StackOverflow);
            }
            MatrixCommand::Pop if self.matrix_depth(self.matrix_mode) <= 1 => {
                return Err(DeviceError::StackUnderflow);
            }
            _ => {}
        }
        self.begin_mutation()?;

        match command {
            MatrixCommand::Mode(mode) => self.matrix_mode = mode,
            MatrixCommand::Push => {
                let top = *self.top_mut();
                self.stack_mut().push(top);
            }
            MatrixCommand::Pop => {
                self.stack_mut().pop();
            }
            MatrixCommand::LoadIdentity => *self.top_mut() = Matrix4::identity(),
            MatrixCommand::Translate(x, y, z) => {
                let top = self.top_mut();
                *top *= matrix::translation(x, y, z);
            }
            MatrixCommand::Scale(x, y, z) => {
                let top = self.top_mut();
                *top *= matrix::scaling(x, y, z);
            }
            MatrixCommand::Rotate(angle, x, y, z) => {
                let top = self.top_mut();
                *top *= matrix::rotation_degrees(angle, x, y, z);
            }
            MatrixCommand::Load(m) => *self.top_mut() = m,
            MatrixCommand::Mult(m) => {
                let top = self.top_mut();
                *top *= m;
            }
        }
        Ok(())
    }

    fn current_matrix(&self, mode: MatrixMode) -> Matrix4 {
        self.matrices
            .get(&mode)
            .and_then(|stack| stack.last().copied())
            .unwrap_or_else(Matrix4::identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_gl() {
        let device = SoftwareDevice::new();
        assert!(!device.is_enabled(Capability::Blend));
        assert!(device.is_enabled(Capability::Multisample));
        assert_eq!(device.depth_func_state(), compare::LESS);
        assert_eq!(device.cull_face_state(), cull::BACK);
        assert!(device.depth_mask_state());
        assert_eq!(device.mutation_count(), 0);
    }

    #[test]
    fn test_reads_do_not_count_as_mutations() {
        let mut device = SoftwareDevice::new();
        device.set_capability(Capability::Fog, true).unwrap();
        for _ in 0..10 {
            assert!(device.is_enabled(Capability::Fog));
            let _ = device.capability_mask();
        }
        assert_eq!(device.mutation_count(), 1);
        assert_eq!(device.capability_mutations(Capability::Fog), 1);
    }

    #[test]
    fn test_invalid_enums_are_rejected() {
        let mut device = SoftwareDevice::new();
        assert_eq!(device.depth_func(0x1234), Err(DeviceError::InvalidEnum(0x1234)));
        assert_eq!(device.cull_face(7), Err(DeviceError::InvalidEnum(7)));
        assert_eq!(device.mutation_count(), 0);
    }

    #[test]
    fn test_matrix_stack_limits() {
        let mut device = SoftwareDevice::new();
        assert_eq!(device.matrix(MatrixCommand::Pop), Err(DeviceError::StackUnderflow));

        for _ in 1..MAX_MATRIX_STACK_DEPTH {
            device.matrix(MatrixCommand::Push).unwrap();
        }
        assert_eq!(device.matrix(MatrixCommand::Push), Err(DeviceError::StackOverflow));
        assert_eq!(device.matrix_depth(MatrixMode::ModelView), MAX_MATRIX_STACK_DEPTH);
    }

    #[test]
    fn test_matrix_push_pop_restores_top() {
        let mut device = SoftwareDevice::new();
        device.matrix(MatrixCommand::Push).unwrap();
        device.matrix(MatrixCommand::Translate(1.0, 2.0, 3.0)).unwrap();
        assert_ne!(device.current_matrix(MatrixMode::ModelView), Matrix4::identity());

        device.matrix(MatrixCommand::Pop).unwrap();
        assert_eq!(device.current_matrix(MatrixMode::ModelView), Matrix4::identity());
    }

    #[test]
    fn test_matrix_modes_are_independent() {
        let mut device = SoftwareDevice::new();
        device.matrix(MatrixCommand::Mode(MatrixMode::Projection)).unwrap();
        device.matrix(MatrixCommand::Scale(2.0, 2.0, 2.0)).unwrap();
        assert_eq!(device.current_matrix(MatrixMode::ModelView), Matrix4::identity());
        assert_eq!(device.current_matrix(MatrixMode::Projection)[(0, 0)], 2.0);
    }

    #[test]
    fn test_injected_failure_is_consumed_once() {
        let mut device = SoftwareDevice::new();
        device.fail_next(DeviceError::Lost("reset".to_string()));
        assert!(device.bind_texture(3).is_err());
        assert!(device.bind_texture(3).is_ok());
        assert_eq!(device.bound_texture(), 3);
    }
}
