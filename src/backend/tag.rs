//! 后端层级标签

use std::fmt;

use serde::{Deserialize, Serialize};

/// 图形 API 层级
///
/// 每个标签对应一个外部后端管理器。`rank` 越高能力越强；
/// `ShaderPipeline` 是专门的着色器后端，只服务着色器相关操作。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendTag {
    /// 固定管线（1.x）
    Legacy,
    Gl21,
    Gles30,
    Gl33,
    Gl45,
    /// 专门的着色器管线后端
    ShaderPipeline,
}

impl BackendTag {
    pub const ALL: [BackendTag; 6] = [
        BackendTag::Legacy,
        BackendTag::Gl21,
        BackendTag::Gles30,
        BackendTag::Gl33,
        BackendTag::Gl45,
        BackendTag::ShaderPipeline,
    ];

    pub fn rank(self) -> u8 {
        match self {
            BackendTag::Legacy => 0,
            BackendTag::Gl21 => 1,
            BackendTag::Gles30 => 2,
            BackendTag::Gl33 => 3,
            BackendTag::Gl45 => 4,
            BackendTag::ShaderPipeline => 5,
        }
    }

    /// 是否为专门的着色器后端
    pub fn is_shader_pipeline(self) -> bool {
        matches!(self, BackendTag::ShaderPipeline)
    }

    /// 配置文件与日志中使用的名称
    pub fn name(self) -> &'static str {
        match self {
            BackendTag::Legacy => "legacy",
            BackendTag::Gl21 => "gl21",
            BackendTag::Gles30 => "gles30",
            BackendTag::Gl33 => "gl33",
            BackendTag::Gl45 => "gl45",
            BackendTag::ShaderPipeline => "shaderpipeline",
        }
    }

    /// 解析命令行中的后端名称（不区分大小写）
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        BackendTag::ALL.into_iter().find(|tag| tag.name() == name)
    }
}

impl fmt::Display for BackendTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
