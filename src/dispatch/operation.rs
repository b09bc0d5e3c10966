//! 操作类型与参数
//!
//! `OperationKind` 是封闭枚举，作为所有路由查表的键；
//! `Value` 是有类型的位置参数；`Call` 是一次调用请求。

use std::fmt;

use crate::core::error::DispatchError;
use crate::gfx::device::{clear_bits, compare, cull, MatrixCommand, StencilFunc, Viewport};
use crate::math::Color;
use crate::state::capability::{Capability, StateCategory};

/// 操作类型
///
/// 与 `EventType` 一样使用枚举而非整数常量，路由表按 [`OperationKind::index`]
/// 用定长数组索引。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationKind {
    CapabilityEnable,
    CapabilityDisable,
    IsEnabled,
    BlendFunc,
    DepthFunc,
    DepthMask,
    StencilFunc,
    CullMode,
    Color,
    Viewport,
    BindTexture,
    UseShaderProgram,
    BindBuffer,
    BindVertexArray,
    BindFramebuffer,
    Clear,
    MatrixOp,
}

impl OperationKind {
    pub const COUNT: usize = 17;

    pub const ALL: [OperationKind; OperationKind::COUNT] = [
        OperationKind::CapabilityEnable,
        OperationKind::CapabilityDisable,
        OperationKind::IsEnabled,
        OperationKind::BlendFunc,
        OperationKind::DepthFunc,
        OperationKind::DepthMask,
        OperationKind::StencilFunc,
        OperationKind::CullMode,
        OperationKind::Color,
        OperationKind::Viewport,
        OperationKind::BindTexture,
        OperationKind::UseShaderProgram,
        OperationKind::BindBuffer,
        OperationKind::BindVertexArray,
        OperationKind::BindFramebuffer,
        OperationKind::Clear,
        OperationKind::MatrixOp,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            OperationKind::CapabilityEnable => "CAPABILITY_ENABLE",
            OperationKind::CapabilityDisable => "CAPABILITY_DISABLE",
            OperationKind::IsEnabled => "IS_ENABLED",
            OperationKind::BlendFunc => "BLEND_FUNC",
            OperationKind::DepthFunc => "DEPTH_FUNC",
            OperationKind::DepthMask => "DEPTH_MASK",
            OperationKind::StencilFunc => "STENCIL_FUNC",
            OperationKind::CullMode => "CULL_MODE",
            OperationKind::Color => "COLOR",
            OperationKind::Viewport => "VIEWPORT",
            OperationKind::BindTexture => "BIND_TEXTURE",
            OperationKind::UseShaderProgram => "USE_SHADER_PROGRAM",
            OperationKind::BindBuffer => "BIND_BUFFER",
            OperationKind::BindVertexArray => "BIND_VERTEX_ARRAY",
            OperationKind::BindFramebuffer => "BIND_FRAMEBUFFER",
            OperationKind::Clear => "CLEAR",
            OperationKind::MatrixOp => "MATRIX_OP",
        }
    }

    /// 布尔能力开关（冗余消除与执行前校验的对象）
    pub fn is_state_toggle(self) -> bool {
        matches!(
            self,
            OperationKind::CapabilityEnable | OperationKind::CapabilityDisable
        )
    }

    /// 着色器相关操作（优先路由到专用着色器后端）
    pub fn is_shader_related(self) -> bool {
        matches!(
            self,
            OperationKind::UseShaderProgram | OperationKind::BindVertexArray
        )
    }

    /// 该操作修改的状态类别；查询、清屏和矩阵操作不对应任何类别
    pub fn category(self) -> Option<StateCategory> {
        match self {
            OperationKind::CapabilityEnable | OperationKind::CapabilityDisable => {
                Some(StateCategory::Capabilities)
            }
            OperationKind::BlendFunc => Some(StateCategory::Blend),
            OperationKind::DepthFunc | OperationKind::DepthMask => Some(StateCategory::Depth),
            OperationKind::StencilFunc => Some(StateCategory::Stencil),
            OperationKind::CullMode => Some(StateCategory::Cull),
            OperationKind::Color => Some(StateCategory::Color),
            OperationKind::Viewport => Some(StateCategory::Viewport),
            OperationKind::BindTexture
            | OperationKind::UseShaderProgram
            | OperationKind::BindBuffer
            | OperationKind::BindVertexArray
            | OperationKind::BindFramebuffer => Some(StateCategory::Bindings),
            OperationKind::IsEnabled | OperationKind::Clear | OperationKind::MatrixOp => None,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 有类型的位置参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i32),
    UInt(u32),
    Float(f32),
    Capability(Capability),
    Matrix(MatrixCommand),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::Capability(_) => "capability",
            Value::Matrix(_) => "matrix",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(v) => Some(v),
            _ => None,
        }
    }
}

/// 一次调用请求：操作类型 + 参数 + 来源
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub kind: OperationKind,
    pub params: Vec<Value>,
    pub origin: String,
}

impl Call {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            params: Vec::new(),
            origin: String::from("renderer"),
        }
    }

    /// 追加一个位置参数
    pub fn with(mut self, value: Value) -> Self {
        self.params.push(value);
        self
    }

    /// 设置调用来源（发起调用的子系统）
    pub fn from_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn enable(cap: Capability) -> Self {
        Self::new(OperationKind::CapabilityEnable).with(Value::Capability(cap))
    }

    pub fn disable(cap: Capability) -> Self {
        Self::new(OperationKind::CapabilityDisable).with(Value::Capability(cap))
    }

    pub fn is_enabled(cap: Capability) -> Self {
        Self::new(OperationKind::IsEnabled).with(Value::Capability(cap))
    }

    pub fn blend_func(src: u32, dst: u32) -> Self {
        Self::new(OperationKind::BlendFunc)
            .with(Value::UInt(src))
            .with(Value::UInt(dst))
    }

    pub fn depth_func(func: u32) -> Self {
        Self::new(OperationKind::DepthFunc).with(Value::UInt(func))
    }

    pub fn depth_mask(write: bool) -> Self {
        Self::new(OperationKind::DepthMask).with(Value::Bool(write))
    }

    pub fn stencil_func(stencil: StencilFunc) -> Self {
        Self::new(OperationKind::StencilFunc)
            .with(Value::UInt(stencil.func))
            .with(Value::Int(stencil.reference))
            .with(Value::UInt(stencil.mask))
    }

    pub fn cull_mode(mode: u32) -> Self {
        Self::new(OperationKind::CullMode).with(Value::UInt(mode))
    }

    pub fn color(color: Color) -> Self {
        Self::new(OperationKind::Color)
            .with(Value::Float(color.r))
            .with(Value::Float(color.g))
            .with(Value::Float(color.b))
            .with(Value::Float(color.a))
    }

    pub fn viewport(viewport: Viewport) -> Self {
        Self::new(OperationKind::Viewport)
            .with(Value::Int(viewport.x))
            .with(Value::Int(viewport.y))
            .with(Value::Int(viewport.width))
            .with(Value::Int(viewport.height))
    }

    pub fn bind_texture(texture: u32) -> Self {
        Self::new(OperationKind::BindTexture).with(Value::UInt(texture))
    }

    pub fn use_program(program: u32) -> Self {
        Self::new(OperationKind::UseShaderProgram).with(Value::UInt(program))
    }

    pub fn bind_buffer(buffer: u32) -> Self {
        Self::new(OperationKind::BindBuffer).with(Value::UInt(buffer))
    }

    pub fn bind_vertex_array(vao: u32) -> Self {
        Self::new(OperationKind::BindVertexArray).with(Value::UInt(vao))
    }

    pub fn bind_framebuffer(framebuffer: u32) -> Self {
        Self::new(OperationKind::BindFramebuffer).with(Value::UInt(framebuffer))
    }

    pub fn clear(mask: u32) -> Self {
        Self::new(OperationKind::Clear).with(Value::UInt(mask))
    }

    pub fn matrix(command: MatrixCommand) -> Self {
        Self::new(OperationKind::MatrixOp).with(Value::Matrix(command))
    }

    /// 能力开关调用的目标能力与目标值
    pub fn toggle_target(&self) -> Option<(Capability, bool)> {
        let enabled = match self.kind {
            OperationKind::CapabilityEnable => true,
            OperationKind::CapabilityDisable => false,
            _ => return None,
        };
        match self.params.first() {
            Some(Value::Capability(cap)) => Some((*cap, enabled)),
            _ => None,
        }
    }
}

/// 已通过结构校验的参数
///
/// 终端回退处理器只接受这种形式，因此"结构有效"与"能够执行"是同一回事。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operation {
    SetCapability(Capability, bool),
    IsEnabled(Capability),
    BlendFunc(u32, u32),
    DepthFunc(u32),
    DepthMask(bool),
    StencilFunc(StencilFunc),
    CullMode(u32),
    Color(Color),
    Viewport(Viewport),
    BindTexture(u32),
    UseProgram(u32),
    BindBuffer(u32),
    BindVertexArray(u32),
    BindFramebuffer(u32),
    Clear(u32),
    Matrix(MatrixCommand),
}

fn invalid(kind: OperationKind, reason: impl Into<String>) -> DispatchError {
    DispatchError::InvalidParams {
        kind,
        reason: reason.into(),
    }
}

fn expect_arity(kind: OperationKind, params: &[Value], arity: usize) -> Result<(), DispatchError> {
    if params.len() != arity {
        return Err(invalid(
            kind,
            format!("expected {} parameter(s), got {}", arity, params.len()),
        ));
    }
    Ok(())
}

fn mismatch(kind: OperationKind, index: usize, expected: &str, got: &Value) -> DispatchError {
    invalid(
        kind,
        format!("parameter {} must be {}, got {}", index, expected, got.type_name()),
    )
}

fn uint_at(kind: OperationKind, params: &[Value], index: usize) -> Result<u32, DispatchError> {
    match params[index] {
        Value::UInt(v) => Ok(v),
        ref other => Err(mismatch(kind, index, "uint", other)),
    }
}

fn compare_at(kind: OperationKind, params: &[Value], index: usize) -> Result<u32, DispatchError> {
    let func = uint_at(kind, params, index)?;
    if !compare::is_valid(func) {
        return Err(invalid(kind, format!("unknown compare function {:#x}", func)));
    }
    Ok(func)
}

fn int_at(kind: OperationKind, params: &[Value], index: usize) -> Result<i32, DispatchError> {
    match params[index] {
        Value::Int(v) => Ok(v),
        ref other => Err(mismatch(kind, index, "int", other)),
    }
}

fn float_at(kind: OperationKind, params: &[Value], index: usize) -> Result<f32, DispatchError> {
    match params[index] {
        Value::Float(v) => Ok(v),
        ref other => Err(mismatch(kind, index, "float", other)),
    }
}

fn capability_at(
    kind: OperationKind,
    params: &[Value],
    index: usize,
) -> Result<Capability, DispatchError> {
    match params[index] {
        Value::Capability(cap) => Ok(cap),
        ref other => Err(mismatch(kind, index, "capability", other)),
    }
}

impl Operation {
    /// 按操作类型检查参数的数量、类型和枚举取值
    ///
    /// 枚举参数（比较函数、剔除模式、清除位）在这里就拒绝越界值，
    /// 终端处理器因此不会因参数而失败。
    pub fn parse(kind: OperationKind, params: &[Value]) -> Result<Self, DispatchError> {
        let op = match kind {
            OperationKind::CapabilityEnable | OperationKind::CapabilityDisable => {
                expect_arity(kind, params, 1)?;
                let cap = capability_at(kind, params, 0)?;
                Operation::SetCapability(cap, kind == OperationKind::CapabilityEnable)
            }
            OperationKind::IsEnabled => {
                expect_arity(kind, params, 1)?;
                Operation::IsEnabled(capability_at(kind, params, 0)?)
            }
            OperationKind::BlendFunc => {
                expect_arity(kind, params, 2)?;
                Operation::BlendFunc(uint_at(kind, params, 0)?, uint_at(kind, params, 1)?)
            }
            OperationKind::DepthFunc => {
                expect_arity(kind, params, 1)?;
                Operation::DepthFunc(compare_at(kind, params, 0)?)
            }
            OperationKind::DepthMask => {
                expect_arity(kind, params, 1)?;
                match params[0] {
                    Value::Bool(write) => Operation::DepthMask(write),
                    ref other => return Err(mismatch(kind, 0, "bool", other)),
                }
            }
            OperationKind::StencilFunc => {
                expect_arity(kind, params, 3)?;
                Operation::StencilFunc(StencilFunc {
                    func: compare_at(kind, params, 0)?,
                    reference: int_at(kind, params, 1)?,
                    mask: uint_at(kind, params, 2)?,
                })
            }
            OperationKind::CullMode => {
                expect_arity(kind, params, 1)?;
                let mode = uint_at(kind, params, 0)?;
                if !cull::is_valid(mode) {
                    return Err(invalid(kind, format!("unknown cull mode {:#x}", mode)));
                }
                Operation::CullMode(mode)
            }
            OperationKind::Color => {
                expect_arity(kind, params, 4)?;
                Operation::Color(Color::new(
                    float_at(kind, params, 0)?,
                    float_at(kind, params, 1)?,
                    float_at(kind, params, 2)?,
                    float_at(kind, params, 3)?,
                ))
            }
            OperationKind::Viewport => {
                expect_arity(kind, params, 4)?;
                let viewport = Viewport::new(
                    int_at(kind, params, 0)?,
                    int_at(kind, params, 1)?,
                    int_at(kind, params, 2)?,
                    int_at(kind, params, 3)?,
                );
                if viewport.width < 0 || viewport.height < 0 {
                    return Err(invalid(kind, "viewport size must not be negative"));
                }
                Operation::Viewport(viewport)
            }
            OperationKind::BindTexture => {
                expect_arity(kind, params, 1)?;
                Operation::BindTexture(uint_at(kind, params, 0)?)
            }
            OperationKind::UseShaderProgram => {
                expect_arity(kind, params, 1)?;
                Operation::UseProgram(uint_at(kind, params, 0)?)
            }
            OperationKind::BindBuffer => {
                expect_arity(kind, params, 1)?;
                Operation::BindBuffer(uint_at(kind, params, 0)?)
            }
            OperationKind::BindVertexArray => {
                expect_arity(kind, params, 1)?;
                Operation::BindVertexArray(uint_at(kind, params, 0)?)
            }
            OperationKind::BindFramebuffer => {
                expect_arity(kind, params, 1)?;
                Operation::BindFramebuffer(uint_at(kind, params, 0)?)
            }
            OperationKind::Clear => {
                expect_arity(kind, params, 1)?;
                let mask = uint_at(kind, params, 0)?;
                let unknown = mask & !clear_bits::ALL;
                if unknown != 0 {
                    return Err(invalid(kind, format!("unknown clear bits {:#x}", unknown)));
                }
                Operation::Clear(mask)
            }
            OperationKind::MatrixOp => {
                expect_arity(kind, params, 1)?;
                match params[0] {
                    Value::Matrix(command) => Operation::Matrix(command),
                    ref other => return Err(mismatch(kind, 0, "matrix", other)),
                }
            }
        };
        Ok(op)
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::SetCapability(_, true) => OperationKind::CapabilityEnable,
            Operation::SetCapability(_, false) => OperationKind::CapabilityDisable,
            Operation::IsEnabled(_) => OperationKind::IsEnabled,
            Operation::BlendFunc(..) => OperationKind::BlendFunc,
            Operation::DepthFunc(_) => OperationKind::DepthFunc,
            Operation::DepthMask(_) => OperationKind::DepthMask,
            Operation::StencilFunc(_) => OperationKind::StencilFunc,
            Operation::CullMode(_) => OperationKind::CullMode,
            Operation::Color(_) => OperationKind::Color,
            Operation::Viewport(_) => OperationKind::Viewport,
            Operation::BindTexture(_) => OperationKind::BindTexture,
            Operation::UseProgram(_) => OperationKind::UseShaderProgram,
            Operation::BindBuffer(_) => OperationKind::BindBuffer,
            Operation::BindVertexArray(_) => OperationKind::BindVertexArray,
            Operation::BindFramebuffer(_) => OperationKind::BindFramebuffer,
            Operation::Clear(_) => OperationKind::Clear,
            Operation::Matrix(_) => OperationKind::MatrixOp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_indices_are_dense() {
        for (index, kind) in OperationKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), index);
        }
    }

    #[test]
    fn test_toggle_and_shader_classification() {
        assert!(OperationKind::CapabilityEnable.is_state_toggle());
        assert!(OperationKind::CapabilityDisable.is_state_toggle());
        assert!(!OperationKind::BlendFunc.is_state_toggle());
        assert!(OperationKind::UseShaderProgram.is_shader_related());
        assert!(!OperationKind::BindTexture.is_shader_related());
    }

    #[test]
    fn test_builders_parse() {
        let op = Operation::parse(OperationKind::BlendFunc, &Call::blend_func(1, 2).params).unwrap();
        assert_eq!(op, Operation::BlendFunc(1, 2));

        let call = Call::enable(Capability::Fog);
        assert_eq!(call.toggle_target(), Some((Capability::Fog, true)));
        let op = Operation::parse(call.kind, &call.params).unwrap();
        assert_eq!(op, Operation::SetCapability(Capability::Fog, true));

        let call = Call::depth_func(compare::LEQUAL);
        assert_eq!(
            Operation::parse(call.kind, &call.params).unwrap(),
            Operation::DepthFunc(compare::LEQUAL)
        );
    }

    #[test]
    fn test_wrong_arity_is_rejected() {
        let err = Operation::parse(OperationKind::BlendFunc, &[Value::UInt(1)]).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidParams { kind: OperationKind::BlendFunc, .. }));
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        let err = Operation::parse(OperationKind::CapabilityEnable, &[Value::UInt(3)]).unwrap_err();
        match err {
            DispatchError::InvalidParams { reason, .. } => assert!(reason.contains("capability")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_negative_viewport_is_rejected() {
        let call = Call::viewport(Viewport::new(0, 0, -1, 10));
        assert!(Operation::parse(call.kind, &call.params).is_err());
    }

    #[test]
    fn test_out_of_range_enums_are_rejected() {
        for call in [
            Call::depth_func(0x1234),
            Call::stencil_func(StencilFunc { func: 7, reference: 0, mask: 0xFF }),
            Call::cull_mode(7),
            Call::clear(clear_bits::COLOR | 0x1),
        ] {
            let err = Operation::parse(call.kind, &call.params).unwrap_err();
            assert!(matches!(err, DispatchError::InvalidParams { .. }), "{:?}", call);
        }

        let call = Call::clear(clear_bits::ALL);
        assert_eq!(Operation::parse(call.kind, &call.params).unwrap(), Operation::Clear(clear_bits::ALL));
        let call = Call::cull_mode(cull::FRONT_AND_BACK);
        assert!(Operation::parse(call.kind, &call.params).is_ok());
    }

    #[test]
    fn test_origin_defaults_to_renderer() {
        assert_eq!(Call::clear(0).origin, "renderer");
        assert_eq!(Call::clear(0).from_origin("minimap").origin, "minimap");
    }
}
