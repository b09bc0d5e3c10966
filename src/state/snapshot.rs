//! 状态快照与异常安全
//!
//! 在可能失败的操作之前捕获一份设备状态，作用域结束时无条件写回。
//!
//! # 作用域守卫
//!
//! [`push_state`] 返回一个 [`StateGuard`]：守卫解引用为设备本身，
//! 析构时恢复快照。因此不存在"push 之后忘记 pop"的写法，
//! 嵌套作用域通过对守卫再次 `push_state(&mut *guard, ..)` 实现。
//!
//! # 线程局部嵌套栈
//!
//! 每个线程维护一个守卫令牌栈，用来验证 push/pop 严格嵌套。
//! 如果某个守卫被 `mem::forget` 泄漏，外层守卫出栈时会发现栈顶不是自己，
//! 丢弃泄漏的令牌并记录错误，然后照常恢复自己的快照。

use std::cell::{Cell, RefCell};
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, error, warn};

use crate::core::error::{DeviceError, SnapshotError};
use crate::gfx::device::{GraphicsDevice, StencilFunc, Viewport};
use crate::math::Color;

use super::cache::ShadowStateCache;
use super::capability::Capability;

thread_local! {
    static GUARD_STACK: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
    static NEXT_GUARD_ID: Cell<u64> = const { Cell::new(1) };
}

/// 当前线程上活动的快照数量
pub fn depth() -> usize {
    GUARD_STACK.with(|stack| stack.borrow().len())
}

/// 设备状态的一次不可变捕获
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateSnapshot {
    /// 已启用能力的位掩码
    pub capabilities: u64,
    pub blend: (u32, u32),
    pub depth_func: u32,
    pub depth_mask: bool,
    pub stencil: StencilFunc,
    pub cull_mode: u32,
    pub color: Color,
    pub viewport: Viewport,
    pub texture: u32,
    pub program: u32,
    pub buffer: u32,
    pub vertex_array: u32,
    pub framebuffer: u32,
}

impl StateSnapshot {
    /// 直接从设备读取当前状态
    pub fn capture<D: GraphicsDevice + ?Sized>(device: &D) -> Self {
        Self {
            capabilities: device.capability_mask(),
            blend: device.blend_func_state(),
            depth_func: device.depth_func_state(),
            depth_mask: device.depth_mask_state(),
            stencil: device.stencil_func_state(),
            cull_mode: device.cull_face_state(),
            color: device.current_color(),
            viewport: device.viewport_state(),
            texture: device.bound_texture(),
            program: device.current_program(),
            buffer: device.bound_buffer(),
            vertex_array: device.bound_vertex_array(),
            framebuffer: device.bound_framebuffer(),
        }
    }

    pub fn is_enabled(&self, cap: Capability) -> bool {
        self.capabilities & cap.bit() != 0
    }

    /// 把每个字段无条件写回设备
    ///
    /// 单个字段失败不会中断其余字段的恢复；返回遇到的第一个错误。
    pub fn apply<D: GraphicsDevice + ?Sized>(&self, device: &mut D) -> Result<(), DeviceError> {
        let mut first_error = None;
        let mut record = |result: Result<(), DeviceError>| {
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        };

        for cap in Capability::ALL {
            record(device.set_capability(cap, self.is_enabled(cap)));
        }
        record(device.blend_func(self.blend.0, self.blend.1));
        record(device.depth_func(self.depth_func));
        record(device.depth_mask(self.depth_mask));
        record(device.stencil_func(self.stencil));
        record(device.cull_face(self.cull_mode));
        record(device.color(self.color));
        record(device.viewport(self.viewport));
        record(device.bind_texture(self.texture));
        record(device.use_program(self.program));
        record(device.bind_buffer(self.buffer));
        record(device.bind_vertex_array(self.vertex_array));
        record(device.bind_framebuffer(self.framebuffer));

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// 快照作用域守卫
///
/// 解引用为被保护的设备；析构（或显式 [`StateGuard::pop`]）时恢复快照。
/// 令牌记录在创建线程的栈上，所以守卫不能跨线程移动。
pub struct StateGuard<'a, D: GraphicsDevice + ?Sized> {
    device: &'a mut D,
    cache: Option<&'a ShadowStateCache>,
    snapshot: StateSnapshot,
    id: u64,
    restored: bool,
    _thread_bound: PhantomData<*const ()>,
}

/// 捕获设备状态并压入当前线程的嵌套栈
///
/// 传入影子缓存时，恢复后会用快照中的能力值重新同步缓存。
pub fn push_state<'a, D: GraphicsDevice + ?Sized>(
    device: &'a mut D,
    cache: Option<&'a ShadowStateCache>,
) -> StateGuard<'a, D> {
    let snapshot = StateSnapshot::capture(&*device);
    let id = NEXT_GUARD_ID.with(|next| {
        let id = next.get();
        next.set(id.wrapping_add(1));
        id
    });
    GUARD_STACK.with(|stack| stack.borrow_mut().push(id));

    StateGuard {
        device,
        cache,
        snapshot,
        id,
        restored: false,
        _thread_bound: PhantomData,
    }
}

impl<'a, D: GraphicsDevice + ?Sized> StateGuard<'a, D> {
    /// 守卫持有的快照
    pub fn snapshot(&self) -> &StateSnapshot {
        &self.snapshot
    }

    /// 显式出栈并恢复，报告恢复过程中的问题
    ///
    /// 即使返回错误，快照也已经写回设备。
    pub fn pop(mut self) -> Result<(), SnapshotError> {
        self.restore()
    }

    fn restore(&mut self) -> Result<(), SnapshotError> {
        self.restored = true;
        let balance = Self::unwind_stack(self.id);

        if let Err(e) = self.snapshot.apply(&mut *self.device) {
            warn!(error = %e, "Failed to restore part of a state snapshot");
        }
        if let Some(cache) = self.cache {
            cache.resync(
                Capability::ALL
                    .iter()
                    .map(|&cap| (cap, self.snapshot.is_enabled(cap))),
            );
        }
        balance
    }

    /// 从线程局部栈中移除自己的令牌，检查嵌套是否平衡
    fn unwind_stack(id: u64) -> Result<(), SnapshotError> {
        GUARD_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let actual_depth = stack.len();
            match stack.iter().rposition(|&entry| entry == id) {
                Some(position) if position + 1 == actual_depth => {
                    stack.pop();
                    Ok(())
                }
                Some(position) => {
                    error!(
                        leaked = actual_depth - position - 1,
                        "Unbalanced state stack: discarding leaked snapshots"
                    );
                    stack.truncate(position);
                    Err(SnapshotError::Unbalanced {
                        expected_depth: position + 1,
                        actual_depth,
                    })
                }
                None => {
                    error!(depth = actual_depth, "State guard token missing from stack");
                    Err(SnapshotError::Unbalanced {
                        expected_depth: 0,
                        actual_depth,
                    })
                }
            }
        })
    }
}

impl<'a, D: GraphicsDevice + ?Sized> Deref for StateGuard<'a, D> {
    type Target = D;

    fn deref(&self) -> &D {
        &*self.device
    }
}

impl<'a, D: GraphicsDevice + ?Sized> DerefMut for StateGuard<'a, D> {
    fn deref_mut(&mut self) -> &mut D {
        &mut *self.device
    }
}

impl<'a, D: GraphicsDevice + ?Sized> Drop for StateGuard<'a, D> {
    fn drop(&mut self) {
        if !self.restored {
            // 错误已在 restore 内部记录
            let _ = self.restore();
        }
    }
}

impl<'a, D: GraphicsDevice + ?Sized> fmt::Debug for StateGuard<'a, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateGuard")
            .field("id", &self.id)
            .field("snapshot", &self.snapshot)
            .finish()
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// 在快照保护下执行操作
///
/// 压栈、执行（同时捕获 `Err` 和 panic）、无论结果如何都出栈恢复。
/// 失败被记录为 [`SnapshotError`] 返回，不会继续向上传播 panic。
pub fn execute_with_safety<D, T, E, F>(
    device: &mut D,
    cache: Option<&ShadowStateCache>,
    name: &str,
    operation: F,
) -> Result<T, SnapshotError>
where
    D: GraphicsDevice + ?Sized,
    E: fmt::Display,
    F: FnOnce(&mut D) -> Result<T, E>,
{
    let mut guard = push_state(device, cache);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| operation(&mut *guard)));
    let balance = guard.pop();

    let result = match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            warn!(operation = name, error = %e, "Guarded operation failed, state restored");
            Err(SnapshotError::OperationFailed {
                name: name.to_string(),
                cause: e.to_string(),
            })
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(operation = name, panic = %message, "Guarded operation panicked, state restored");
            Err(SnapshotError::OperationPanicked {
                name: name.to_string(),
                message,
            })
        }
    };

    if let Err(e) = balance {
        debug!(operation = name, error = %e, "State stack was unbalanced inside guarded operation");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::device::{compare, cull};
    use crate::gfx::software::SoftwareDevice;

    fn scramble(device: &mut SoftwareDevice) {
        device.set_capability(Capability::Blend, true).unwrap();
        device.set_capability(Capability::Multisample, false).unwrap();
        device.blend_func(0x0302, 0x0303).unwrap();
        device.depth_func(compare::ALWAYS).unwrap();
        device.depth_mask(false).unwrap();
        device
            .stencil_func(StencilFunc { func: compare::EQUAL, reference: 1, mask: 0xFF })
            .unwrap();
        device.cull_face(cull::FRONT).unwrap();
        device.color(Color::RED).unwrap();
        device.viewport(Viewport::new(10, 10, 64, 64)).unwrap();
        device.bind_texture(7).unwrap();
        device.use_program(3).unwrap();
        device.bind_buffer(11).unwrap();
        device.bind_vertex_array(5).unwrap();
        device.bind_framebuffer(2).unwrap();
    }

    #[test]
    fn test_guard_restores_on_drop() {
        let mut device = SoftwareDevice::new();
        let before = StateSnapshot::capture(&device);
        {
            let mut guard = push_state(&mut device, None);
            scramble(&mut guard);
            assert_ne!(StateSnapshot::capture(&*guard), before);
            assert_eq!(depth(), 1);
        }
        assert_eq!(StateSnapshot::capture(&device), before);
        assert_eq!(depth(), 0);
    }

    #[test]
    fn test_nested_guards_restore_in_order() {
        let mut device = SoftwareDevice::new();
        let outer_state = StateSnapshot::capture(&device);
        {
            let mut outer = push_state(&mut device, None);
            outer.bind_texture(1).unwrap();
            let middle_state = StateSnapshot::capture(&*outer);
            {
                let mut inner = push_state(&mut *outer, None);
                inner.bind_texture(2).unwrap();
                assert_eq!(depth(), 2);
            }
            assert_eq!(StateSnapshot::capture(&*outer), middle_state);
        }
        assert_eq!(StateSnapshot::capture(&device), outer_state);
    }

    #[test]
    fn test_leaked_guard_is_detected_by_outer_pop() {
        let mut device = SoftwareDevice::new();
        let before = StateSnapshot::capture(&device);

        let mut outer = push_state(&mut device, None);
        {
            let mut inner = push_state(&mut *outer, None);
            inner.bind_texture(42).unwrap();
            std::mem::forget(inner);
        }
        assert_eq!(depth(), 2);

        let result = outer.pop();
        assert_eq!(
            result,
            Err(SnapshotError::Unbalanced { expected_depth: 1, actual_depth: 2 })
        );
        assert_eq!(depth(), 0);
        assert_eq!(StateSnapshot::capture(&device), before);
    }

    #[test]
    fn test_guard_is_not_send() {
        // 守卫实现 Send 时两个 impl 同时适用，类型推断失败，编译不通过
        trait AmbiguousIfSend<A> {
            fn check() {}
        }
        impl<T: ?Sized> AmbiguousIfSend<()> for T {}
        impl<T: ?Sized + Send> AmbiguousIfSend<u8> for T {}

        <StateGuard<'static, SoftwareDevice> as AmbiguousIfSend<_>>::check();
        fn assert_send<T: Send>() {}
        assert_send::<SoftwareDevice>();
    }

    #[test]
    fn test_restore_resyncs_cache() {
        let mut device = SoftwareDevice::new();
        let cache = ShadowStateCache::new();
        {
            let mut guard = push_state(&mut device, Some(&cache));
            guard.set_capability(Capability::Fog, true).unwrap();
            cache.set(Capability::Fog, true);
        }
        assert_eq!(cache.get(Capability::Fog), Some(false));
        assert!(!device.is_enabled(Capability::Fog));
    }

    #[test]
    fn test_execute_with_safety_catches_errors() {
        let mut device = SoftwareDevice::new();
        let before = StateSnapshot::capture(&device);

        let result: Result<(), SnapshotError> =
            execute_with_safety(&mut device, None, "bad_draw", |dev| {
                dev.set_capability(Capability::DepthTest, true)?;
                dev.matrix(crate::gfx::device::MatrixCommand::Pop)
            });

        assert!(matches!(result, Err(SnapshotError::OperationFailed { .. })));
        assert_eq!(StateSnapshot::capture(&device), before);
        assert_eq!(depth(), 0);
    }

    #[test]
    fn test_execute_with_safety_catches_panics() {
        let mut device = SoftwareDevice::new();
        let before = StateSnapshot::capture(&device);

        let result: Result<(), SnapshotError> =
            execute_with_safety(&mut device, None, "third_party", |dev| -> Result<(), String> {
                dev.cull_face(cull::FRONT).map_err(|e| e.to_string())?;
                panic!("third-party renderer exploded");
            });

        match result {
            Err(SnapshotError::OperationPanicked { name, message }) => {
                assert_eq!(name, "third_party");
                assert!(message.contains("exploded"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(StateSnapshot::capture(&device), before);
    }

    #[test]
    fn test_execute_with_safety_returns_value() {
        let mut device = SoftwareDevice::new();
        let value = execute_with_safety(&mut device, None, "query", |dev| {
            Ok::<_, DeviceError>(dev.bound_texture() + 1)
        });
        assert_eq!(value, Ok(1));
    }
}
