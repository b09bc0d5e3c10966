//! 后端管理器接口
//!
//! 具体的后端管理器（每个图形 API 层级一个）在本 crate 之外实现，
//! 路由器只通过 [`BackendManager`] 使用它们。`TierBackend` 是一个
//! 按层级声明支持范围、把操作直接转发到设备的参考实现。

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::error::BackendError;
use crate::dispatch::operation::{Operation, OperationKind, Value};
use crate::gfx::device::GraphicsDevice;
use crate::gfx::direct;

use super::tag::BackendTag;

/// 后端管理器的统一接口
///
/// 路由器从渲染线程调用，但管理器本身可能被多个路由器实例共享，
/// 因此要求 `Send + Sync`。
pub trait BackendManager: Send + Sync {
    /// 后端层级标签
    fn tag(&self) -> BackendTag;

    /// 是否支持某类操作；不支持的操作按一次失败尝试计
    fn supports(&self, kind: OperationKind) -> bool;

    /// 执行一个不产生结果的操作
    fn execute_for_call(
        &self,
        device: &mut dyn GraphicsDevice,
        op: Operation,
    ) -> Result<(), BackendError> {
        self.execute_for_call_with_result(device, op).map(|_| ())
    }

    /// 执行一个操作，查询类操作返回结果值
    fn execute_for_call_with_result(
        &self,
        device: &mut dyn GraphicsDevice,
        op: Operation,
    ) -> Result<Option<Value>, BackendError>;
}

/// 按层级能力转发到设备的后端
#[derive(Debug, Clone)]
pub struct TierBackend {
    tag: BackendTag,
}

impl TierBackend {
    pub fn new(tag: BackendTag) -> Self {
        Self { tag }
    }

    /// 各层级的支持范围
    ///
    /// - 固定管线没有着色器、VAO 和帧缓冲对象
    /// - 2.1 有着色器，但 VAO 与 FBO 只是扩展
    /// - ES 3.0 没有固定功能矩阵栈
    /// - 着色器管线后端只接管着色器相关操作
    pub fn tier_supports(tag: BackendTag, kind: OperationKind) -> bool {
        match tag {
            BackendTag::Legacy => !matches!(
                kind,
                OperationKind::UseShaderProgram
                    | OperationKind::BindVertexArray
                    | OperationKind::BindFramebuffer
            ),
            BackendTag::Gl21 => !matches!(
                kind,
                OperationKind::BindVertexArray | OperationKind::BindFramebuffer
            ),
            BackendTag::Gles30 => kind != OperationKind::MatrixOp,
            BackendTag::Gl33 | BackendTag::Gl45 => true,
            BackendTag::ShaderPipeline => kind.is_shader_related(),
        }
    }
}

impl BackendManager for TierBackend {
    fn tag(&self) -> BackendTag {
        self.tag
    }

    fn supports(&self, kind: OperationKind) -> bool {
        Self::tier_supports(self.tag, kind)
    }

    fn execute_for_call_with_result(
        &self,
        device: &mut dyn GraphicsDevice,
        op: Operation,
    ) -> Result<Option<Value>, BackendError> {
        let kind = op.kind();
        if !self.supports(kind) {
            return Err(BackendError::unsupported(self.tag.name(), kind.name()));
        }
        direct::apply(op, device).map_err(|e| BackendError::from_device(self.tag.name(), e))
    }
}

/// 已注册的后端管理器集合
#[derive(Clone, Default)]
pub struct BackendSet {
    managers: HashMap<BackendTag, Arc<dyn BackendManager>>,
}

impl BackendSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为每个标签创建一个 `TierBackend`
    pub fn tiered<I: IntoIterator<Item = BackendTag>>(tags: I) -> Self {
        let mut set = Self::new();
        for tag in tags {
            set.insert(Arc::new(TierBackend::new(tag)));
        }
        set
    }

    /// 注册管理器；同一标签的旧管理器被替换并返回
    pub fn insert(&mut self, manager: Arc<dyn BackendManager>) -> Option<Arc<dyn BackendManager>> {
        self.managers.insert(manager.tag(), manager)
    }

    pub fn get(&self, tag: BackendTag) -> Option<&Arc<dyn BackendManager>> {
        self.managers.get(&tag)
    }

    pub fn contains(&self, tag: BackendTag) -> bool {
        self.managers.contains_key(&tag)
    }

    /// 按层级升序排列的标签
    pub fn tags(&self) -> Vec<BackendTag> {
        let mut tags: Vec<BackendTag> = self.managers.keys().copied().collect();
        tags.sort();
        tags
    }

    pub fn len(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }
}

impl std::fmt::Debug for BackendSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendSet").field("tags", &self.tags()).finish()
    }
}
