//! 能力标志与状态类别
//!
//! `Capability` 是可以被启用/禁用的渲染功能开关（类似 glEnable 的参数）。
//! `StateCategory` 是脏标记的粒度：每个类别占用脏位掩码中的一位。

use serde::{Deserialize, Serialize};

/// 布尔能力标志
///
/// 标识符是一个小整数（见 [`Capability::id`]），用于影子缓存的数组索引
/// 以及快照中的能力位掩码。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Blend,
    DepthTest,
    CullFace,
    AlphaTest,
    Texture2d,
    Fog,
    Lighting,
    ScissorTest,
    StencilTest,
    PolygonOffsetFill,
    ColorMaterial,
    Normalize,
    RescaleNormal,
    LineSmooth,
    Multisample,
    ColorLogicOp,
}

impl Capability {
    /// 能力总数
    pub const COUNT: usize = 16;

    /// 所有能力，按标识符排序
    pub const ALL: [Capability; Capability::COUNT] = [
        Capability::Blend,
        Capability::DepthTest,
        Capability::CullFace,
        Capability::AlphaTest,
        Capability::Texture2d,
        Capability::Fog,
        Capability::Lighting,
        Capability::ScissorTest,
        Capability::StencilTest,
        Capability::PolygonOffsetFill,
        Capability::ColorMaterial,
        Capability::Normalize,
        Capability::RescaleNormal,
        Capability::LineSmooth,
        Capability::Multisample,
        Capability::ColorLogicOp,
    ];

    /// 默认参与状态哈希校验的九个经典能力
    pub const DEFAULT_TRACKED: [Capability; 9] = [
        Capability::Blend,
        Capability::DepthTest,
        Capability::CullFace,
        Capability::AlphaTest,
        Capability::Texture2d,
        Capability::Fog,
        Capability::Lighting,
        Capability::ScissorTest,
        Capability::StencilTest,
    ];

    /// 小整数标识符
    pub fn id(self) -> usize {
        self as usize
    }

    /// 从标识符还原能力
    pub fn from_id(id: usize) -> Option<Self> {
        Self::ALL.get(id).copied()
    }

    /// 在能力位掩码中对应的位
    pub fn bit(self) -> u64 {
        1u64 << self.id()
    }

    /// 该能力所属的状态类别
    pub fn category(self) -> StateCategory {
        match self {
            Capability::Blend | Capability::ColorLogicOp => StateCategory::Blend,
            Capability::DepthTest | Capability::PolygonOffsetFill => StateCategory::Depth,
            Capability::StencilTest => StateCategory::Stencil,
            Capability::CullFace => StateCategory::Cull,
            Capability::ScissorTest => StateCategory::Viewport,
            Capability::ColorMaterial => StateCategory::Color,
            _ => StateCategory::Capabilities,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Capability::Blend => "blend",
            Capability::DepthTest => "depth_test",
            Capability::CullFace => "cull_face",
            Capability::AlphaTest => "alpha_test",
            Capability::Texture2d => "texture_2d",
            Capability::Fog => "fog",
            Capability::Lighting => "lighting",
            Capability::ScissorTest => "scissor_test",
            Capability::StencilTest => "stencil_test",
            Capability::PolygonOffsetFill => "polygon_offset_fill",
            Capability::ColorMaterial => "color_material",
            Capability::Normalize => "normalize",
            Capability::RescaleNormal => "rescale_normal",
            Capability::LineSmooth => "line_smooth",
            Capability::Multisample => "multisample",
            Capability::ColorLogicOp => "color_logic_op",
        }
    }
}

/// 脏标记类别
///
/// 固定八类，对应脏位掩码中的低八位。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateCategory {
    Capabilities,
    Blend,
    Depth,
    Stencil,
    Cull,
    Color,
    Viewport,
    Bindings,
}

impl StateCategory {
    pub const COUNT: usize = 8;

    pub const ALL: [StateCategory; StateCategory::COUNT] = [
        StateCategory::Capabilities,
        StateCategory::Blend,
        StateCategory::Depth,
        StateCategory::Stencil,
        StateCategory::Cull,
        StateCategory::Color,
        StateCategory::Viewport,
        StateCategory::Bindings,
    ];

    /// 在脏位掩码中对应的位
    pub fn bit(self) -> u32 {
        1u32 << (self as u32)
    }

    /// 所有类别的位掩码
    pub fn all_bits() -> u32 {
        (1u32 << Self::COUNT) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_ids_are_dense() {
        for (index, cap) in Capability::ALL.iter().enumerate() {
            assert_eq!(cap.id(), index);
            assert_eq!(Capability::from_id(index), Some(*cap));
        }
        assert_eq!(Capability::from_id(Capability::COUNT), None);
    }

    #[test]
    fn test_capability_categories() {
        assert_eq!(Capability::Blend.category(), StateCategory::Blend);
        assert_eq!(Capability::DepthTest.category(), StateCategory::Depth);
        assert_eq!(Capability::StencilTest.category(), StateCategory::Stencil);
        assert_eq!(Capability::CullFace.category(), StateCategory::Cull);
        assert_eq!(Capability::Fog.category(), StateCategory::Capabilities);
    }

    #[test]
    fn test_category_bits_are_distinct() {
        let mut seen = 0u32;
        for category in StateCategory::ALL {
            assert_eq!(seen & category.bit(), 0);
            seen |= category.bit();
        }
        assert_eq!(seen, StateCategory::all_bits());
    }
}
