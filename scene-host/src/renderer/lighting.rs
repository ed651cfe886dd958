//! # Lighting Overlay 模块
//!
//! 时段光照：在整个画面上叠加一层纯色，颜色按指数衰减向目标预设靠近。
//!
//! `current += (target - current) * min(speed * dt, 1)`

use std::collections::HashMap;

use scene_runtime::TimeOfDay;
use tracing::warn;

use super::{Color, Surface};

/// alpha 低于该值时跳过绘制
pub const MIN_VISIBLE_ALPHA: f32 = 0.005;

/// 默认缓动速度（每毫秒）
pub const DEFAULT_EASE_SPEED: f32 = 0.002;

/// 内置时段预设
pub fn builtin_preset(time: TimeOfDay) -> Color {
    match time {
        TimeOfDay::Dawn => Color::rgba(255.0, 170.0, 120.0, 0.18),
        TimeOfDay::Day => Color::rgba(255.0, 255.0, 240.0, 0.0),
        TimeOfDay::Sunset => Color::rgba(255.0, 120.0, 60.0, 0.22),
        TimeOfDay::Night => Color::rgba(20.0, 30.0, 80.0, 0.45),
    }
}

#[derive(Debug)]
pub struct LightingOverlay {
    presets: HashMap<String, Color>,
    current: Color,
    target: Color,
    target_name: String,
    speed: f32,
}

impl LightingOverlay {
    pub fn new(time: TimeOfDay) -> Self {
        let presets = TimeOfDay::ALL
            .into_iter()
            .map(|t| (t.as_str().to_string(), builtin_preset(t)))
            .collect();
        let tint = builtin_preset(time);
        Self {
            presets,
            current: tint,
            target: tint,
            target_name: time.as_str().to_string(),
            speed: DEFAULT_EASE_SPEED,
        }
    }

    /// 添加或覆盖预设
    pub fn add_preset(&mut self, name: &str, tint: Color) {
        self.presets.insert(name.to_string(), tint);
    }

    pub fn has_preset(&self, name: &str) -> bool {
        self.presets.contains_key(name)
    }

    /// 只切换目标色，当前色在 `update` 中逐渐靠近
    pub fn set_time(&mut self, name: &str, speed: f32) -> bool {
        let Some(tint) = self.presets.get(name) else {
            warn!(preset = %name, "未知光照预设");
            return false;
        };
        self.target = *tint;
        self.target_name = name.to_string();
        self.speed = speed.max(0.0);
        true
    }

    /// 立即切换到预设
    pub fn set_immediate(&mut self, name: &str) -> bool {
        let Some(tint) = self.presets.get(name) else {
            warn!(preset = %name, "未知光照预设");
            return false;
        };
        self.target = *tint;
        self.current = *tint;
        self.target_name = name.to_string();
        true
    }

    pub fn update(&mut self, dt: f32) {
        let factor = (self.speed * dt.max(0.0)).min(1.0);
        self.current.approach(self.target, factor);
    }

    /// 覆盖整个画面；alpha 可忽略时不绘制
    pub fn draw(&self, surface: &mut dyn Surface) {
        if self.current.a < MIN_VISIBLE_ALPHA {
            return;
        }
        let bounds = surface.bounds();
        surface.fill_rect(bounds, self.current);
    }

    pub fn current(&self) -> Color {
        self.current
    }

    pub fn target(&self) -> Color {
        self.target
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::{DrawCall, RecordingSurface};

    #[test]
    fn test_set_time_swaps_target_only() {
        let mut overlay = LightingOverlay::new(TimeOfDay::Day);
        assert!(overlay.set_time("night", DEFAULT_EASE_SPEED));
        assert_eq!(overlay.current(), builtin_preset(TimeOfDay::Day));
        assert_eq!(overlay.target(), builtin_preset(TimeOfDay::Night));
        assert_eq!(overlay.target_name(), "night");
    }

    #[test]
    fn test_exponential_ease() {
        let mut overlay = LightingOverlay::new(TimeOfDay::Day);
        overlay.set_time("night", 0.002);
        overlay.update(250.0);

        // factor = 0.5
        let c = overlay.current();
        assert!((c.a - 0.225).abs() < 1e-5);
        assert!((c.r - 137.5).abs() < 1e-3);

        // 大步长截断为 1，直接到达目标
        overlay.update(10_000.0);
        assert_eq!(overlay.current(), builtin_preset(TimeOfDay::Night));
    }

    #[test]
    fn test_draw_skipped_when_transparent() {
        let overlay = LightingOverlay::new(TimeOfDay::Day);
        let mut surface = RecordingSurface::new(10, 10);
        overlay.draw(&mut surface);
        assert!(surface.calls().is_empty());

        let overlay = LightingOverlay::new(TimeOfDay::Night);
        overlay.draw(&mut surface);
        assert!(matches!(surface.calls(), [DrawCall::Rect { .. }]));
    }

    #[test]
    fn test_custom_and_unknown_presets() {
        let mut overlay = LightingOverlay::new(TimeOfDay::Day);
        assert!(!overlay.set_time("storm", 0.01));
        assert_eq!(overlay.target_name(), "day");

        overlay.add_preset("storm", Color::rgba(40.0, 40.0, 60.0, 0.5));
        assert!(overlay.set_immediate("storm"));
        assert_eq!(overlay.current().a, 0.5);
    }
}
