//! 直接执行
//!
//! 把一个已校验的 [`Operation`] 映射为最朴素的设备调用。
//! 终端回退处理器和直通后端都走这里：没有缓存，没有校验，没有重试。

use crate::core::error::DeviceError;
use crate::dispatch::operation::{Operation, Value};

use super::device::GraphicsDevice;

/// 在设备上直接执行一个操作
///
/// 只有查询类操作（`IsEnabled`）会返回结果值。
pub fn apply(op: Operation, device: &mut dyn GraphicsDevice) -> Result<Option<Value>, DeviceError> {
    match op {
        Operation::SetCapability(cap, enabled) => device.set_capability(cap, enabled)?,
        Operation::IsEnabled(cap) => return Ok(Some(Value::Bool(device.is_enabled(cap)))),
        Operation::BlendFunc(src, dst) => device.blend_func(src, dst)?,
        Operation::DepthFunc(func) => device.depth_func(func)?,
        Operation::DepthMask(write) => device.depth_mask(write)?,
        Operation::StencilFunc(stencil) => device.stencil_func(stencil)?,
        Operation::CullMode(mode) => device.cull_face(mode)?,
        Operation::Color(color) => device.color(color)?,
        Operation::Viewport(viewport) => device.viewport(viewport)?,
        Operation::BindTexture(texture) => device.bind_texture(texture)?,
        Operation::UseProgram(program) => device.use_program(program)?,
        Operation::BindBuffer(buffer) => device.bind_buffer(buffer)?,
        Operation::BindVertexArray(vao) => device.bind_vertex_array(vao)?,
        Operation::BindFramebuffer(framebuffer) => device.bind_framebuffer(framebuffer)?,
        Operation::Clear(mask) => device.clear(mask)?,
        Operation::Matrix(command) => device.matrix(command)?,
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::device::MatrixMode;
    use crate::gfx::software::SoftwareDevice;
    use crate::gfx::device::MatrixCommand;
    use crate::math::Color;
    use crate::state::capability::Capability;

    #[test]
    fn test_apply_mutations() {
        let mut device = SoftwareDevice::new();
        apply(Operation::SetCapability(Capability::Blend, true), &mut device).unwrap();
        apply(Operation::BlendFunc(0x0302, 0x0303), &mut device).unwrap();
        apply(Operation::Color(Color::RED), &mut device).unwrap();
        apply(Operation::BindTexture(9), &mut device).unwrap();

        assert!(device.is_enabled(Capability::Blend));
        assert_eq!(device.blend_func_state(), (0x0302, 0x0303));
        assert_eq!(device.current_color(), Color::RED);
        assert_eq!(device.bound_texture(), 9);
        assert_eq!(device.mutation_count(), 4);
    }

    #[test]
    fn test_query_returns_value_without_mutating() {
        let mut device = SoftwareDevice::new();
        let result = apply(Operation::IsEnabled(Capability::Multisample), &mut device).unwrap();
        assert_eq!(result, Some(Value::Bool(true)));
        assert_eq!(device.mutation_count(), 0);
    }

    #[test]
    fn test_device_errors_propagate() {
        let mut device = SoftwareDevice::new();
        let err = apply(Operation::Matrix(MatrixCommand::Pop), &mut device).unwrap_err();
        assert_eq!(err, DeviceError::StackUnderflow);
        assert_eq!(device.matrix_depth(MatrixMode::ModelView), 1);
    }
}
