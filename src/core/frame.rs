//! 帧节奏
//!
//! FrameClock 统计帧数并决定哪些帧需要运行周期校验。
//! 生命周期钩子（帧边界）在外部，这里只负责计数。

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// 帧计数与帧率统计
pub struct FrameClock {
    frame_count: AtomicU64,
    window: Mutex<FrameWindow>,
}

struct FrameWindow {
    frames: u32,
    last_update: Instant,
    fps: f32,
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            frame_count: AtomicU64::new(0),
            window: Mutex::new(FrameWindow {
                frames: 0,
                last_update: Instant::now(),
                fps: 0.0,
            }),
        }
    }

    /// 记录一帧，返回本帧是否到了校验节拍
    ///
    /// `interval` 为 0 时视为 1。
    pub fn record_frame(&self, interval: u32) -> bool {
        let frame = self.frame_count.fetch_add(1, Ordering::AcqRel) + 1;

        let mut window = self.window.lock();
        window.frames += 1;
        let now = Instant::now();
        let elapsed = now.duration_since(window.last_update);

        // 每秒更新一次 FPS
        if elapsed >= Duration::from_secs(1) {
            window.fps = window.frames as f32 / elapsed.as_secs_f32();
            window.frames = 0;
            window.last_update = now;
        }

        frame % u64::from(interval.max(1)) == 0
    }

    /// 已记录的帧数
    pub fn frame_count(&self) -> u64 {
        self.frame_count.load(Ordering::Acquire)
    }

    /// 最近一秒窗口的帧率
    pub fn fps(&self) -> f32 {
        self.window.lock().fps
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cadence() {
        let clock = FrameClock::new();
        let due: Vec<bool> = (0..6).map(|_| clock.record_frame(3)).collect();
        assert_eq!(due, vec![false, false, true, false, false, true]);
        assert_eq!(clock.frame_count(), 6);
    }

    #[test]
    fn test_zero_interval_means_every_frame() {
        let clock = FrameClock::new();
        assert!(clock.record_frame(0));
        assert!(clock.record_frame(0));
    }
}
