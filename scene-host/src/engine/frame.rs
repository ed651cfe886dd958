//! 逐帧驱动
//!
//! 每帧顺序固定：
//!
//! ```text
//! 更新：图层 → 角色 → 粒子 → 光照
//! 绘制：清屏 → 背景 → 中景 → 角色 → 前景 → 粒子 → 光照 → 提交
//! ```

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

use scene_runtime::{EngineState, LayerDepth};
use tracing::error;

use super::SceneEngine;
use crate::renderer::Surface;

/// 无 zone 时角色脚底所在的高度比例
const FALLBACK_FEET_RATIO: f32 = 0.9;

impl<S: Surface> SceneEngine<S> {
    /// 帧回调，由宿主每帧调用一次
    ///
    /// `timestamp_ms` 为单调递增的时间戳；相邻两帧的差值截断到
    /// `max_frame_delta_ms` 后用于动画推进，自动昼夜则直接比较时间戳。
    /// 未注册（未加载或已销毁）时什么都不做。
    pub fn on_frame(&mut self, timestamp_ms: f64) {
        if !self.registered {
            return;
        }

        self.drain_inbox();

        let dt = match self.last_timestamp {
            Some(last) => ((timestamp_ms - last) as f32)
                .max(0.0)
                .min(self.config.engine.max_frame_delta_ms),
            None => 0.0,
        };
        self.last_timestamp = Some(timestamp_ms);

        if self.state != EngineState::Ready {
            return;
        }

        if self.auto_time {
            self.tick_auto_time(timestamp_ms);
        }

        if self.paused {
            return;
        }

        // 更新与绘制分开捕获：绘制失败不影响本帧已经产生的动画通知
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| self.update(dt))) {
            error!(panic = %panic_message(payload.as_ref()), "帧更新失败，下一帧继续");
        }
        self.flush_animator_events();

        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| self.draw())) {
            error!(panic = %panic_message(payload.as_ref()), "帧绘制失败，下一帧继续");
        }
    }

    /// 自动昼夜按宿主时间戳计时，不受帧间隔截断影响
    fn tick_auto_time(&mut self, timestamp_ms: f64) {
        let interval = f64::from(self.config.engine.auto_time_interval_ms);
        match self.auto_time_due {
            None => self.auto_time_due = Some(timestamp_ms + interval),
            Some(due) if timestamp_ms >= due => {
                self.auto_time_due = Some(timestamp_ms + interval);
                self.apply_auto_time();
            }
            Some(_) => {}
        }
    }

    fn update(&mut self, dt: f32) {
        self.compositor.update(dt);
        self.animator.update(dt);
        self.particles.update(dt);
        self.lighting.update(dt);
    }

    fn draw(&mut self) {
        self.surface.clear();
        self.compositor.draw(&mut self.surface, LayerDepth::Background);
        self.compositor.draw(&mut self.surface, LayerDepth::Midground);
        self.draw_character();
        self.compositor.draw(&mut self.surface, LayerDepth::Foreground);
        self.particles.draw(&mut self.surface);
        self.lighting.draw(&mut self.surface);
        self.surface.present();
    }

    fn draw_character(&mut self) {
        let Some((frame_w, frame_h)) = self.animator.frame_size() else {
            return;
        };
        let (x, y, scale) = self.character_position(frame_w, frame_h);
        self.animator.draw(&mut self.surface, x, y, scale);
    }

    /// 角色帧左上角位置与缩放
    ///
    /// 有 zone 时水平居中于 zone、底边对齐 zone 底边；
    /// 否则水平居中、脚底位于画布高度的 90%。
    pub(super) fn character_position(&self, frame_w: f32, frame_h: f32) -> (f32, f32, f32) {
        let placement = self
            .character_zone
            .as_deref()
            .filter(|id| self.zones.get(id).is_some_and(|z| z.visible))
            .and_then(|id| {
                self.zones
                    .resolve(id, self.surface.width(), self.surface.height())
            });

        match placement {
            Some(zone) => {
                let w = frame_w * zone.scale;
                let h = frame_h * zone.scale;
                (zone.center_x() - w / 2.0, zone.bottom() - h, zone.scale)
            }
            None => {
                let x = (self.surface.width() - frame_w) / 2.0;
                let y = self.surface.height() * FALLBACK_FEET_RATIO - frame_h;
                (x, y, 1.0)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "未知错误".to_string()
    }
}
