//! # Layer Compositor 模块
//!
//! 按深度（background / midground / foreground）存放各时段的图层图片，
//! 并驱动时段之间的淡入淡出。
//!
//! ## 过渡语义
//!
//! 所有深度共享同一个时段状态，因此任一图层同时最多只有一个过渡：
//! - 过渡中：先以完全不透明绘制旧时段图片，再以 `fade_progress` 绘制新时段图片
//! - 过渡完成（`fade_progress == 1`）：只绘制当前时段图片

use std::collections::HashMap;

use scene_runtime::{LayerDepth, TimeOfDay};
use tracing::debug;

use super::easing::EasingFunction;
use super::{Surface, cover_fit};
use crate::resources::ImageHandle;

/// 进行中的时段过渡
#[derive(Debug, Clone)]
struct TimeFade {
    from: TimeOfDay,
    elapsed: f32,
    duration: f32,
}

#[derive(Debug)]
pub struct LayerCompositor {
    images: HashMap<(LayerDepth, TimeOfDay), ImageHandle>,
    parallax: HashMap<LayerDepth, f32>,
    current: TimeOfDay,
    fade: Option<TimeFade>,
    fade_progress: f32,
    easing: EasingFunction,
}

impl LayerCompositor {
    pub fn new(time: TimeOfDay) -> Self {
        Self {
            images: HashMap::new(),
            parallax: HashMap::new(),
            current: time,
            fade: None,
            fade_progress: 1.0,
            easing: EasingFunction::EaseInOutQuad,
        }
    }

    pub fn with_easing(mut self, easing: EasingFunction) -> Self {
        self.easing = easing;
        self
    }

    /// 注册 (深度, 时段) 槽位的图片，已存在则替换
    pub fn add_layer(&mut self, depth: LayerDepth, time: TimeOfDay, image: ImageHandle) {
        self.images.insert((depth, time), image);
    }

    /// 记录图层的视差系数（目前不影响绘制位置）
    pub fn set_parallax(&mut self, depth: LayerDepth, factor: f32) {
        self.parallax.insert(depth, factor);
    }

    pub fn layer_parallax(&self, depth: LayerDepth) -> f32 {
        self.parallax.get(&depth).copied().unwrap_or(0.0)
    }

    pub fn has_image(&self, depth: LayerDepth, time: TimeOfDay) -> bool {
        self.images.contains_key(&(depth, time))
    }

    /// 立即切换到某时段，不做过渡
    pub fn set_time(&mut self, time: TimeOfDay) {
        self.current = time;
        self.fade = None;
        self.fade_progress = 1.0;
    }

    /// 开始过渡到新时段
    ///
    /// 已经稳定在该时段（或正在过渡到该时段）时不做任何事，返回 `false`。
    /// `duration_ms <= 0` 时立即完成。
    pub fn transition_to(&mut self, time: TimeOfDay, duration_ms: f32) -> bool {
        if time == self.current {
            return false;
        }

        let from = self.current;
        self.current = time;
        if duration_ms <= 0.0 {
            self.fade = None;
            self.fade_progress = 1.0;
        } else {
            self.fade = Some(TimeFade {
                from,
                elapsed: 0.0,
                duration: duration_ms,
            });
            self.fade_progress = 0.0;
        }
        debug!(from = %from, to = %time, duration_ms, "开始时段过渡");
        true
    }

    /// 推进过渡
    pub fn update(&mut self, dt: f32) {
        let Some(fade) = self.fade.as_mut() else {
            return;
        };

        fade.elapsed += dt.max(0.0);
        let t = (fade.elapsed / fade.duration).min(1.0);
        // 单调不减
        self.fade_progress = self.fade_progress.max(self.easing.apply(t));

        if t >= 1.0 {
            self.fade_progress = 1.0;
            self.fade = None;
        }
    }

    /// 绘制某个深度的图层，铺满整个画布（cover 适配）
    pub fn draw(&self, surface: &mut dyn Surface, depth: LayerDepth) {
        let dst = surface.bounds();

        if let Some(fade) = &self.fade
            && let Some(previous) = self.images.get(&(depth, fade.from))
        {
            let src = cover_fit(previous.width() as f32, previous.height() as f32, dst);
            surface.draw_image(previous, src, dst, 1.0);
        }

        if let Some(current) = self.images.get(&(depth, self.current)) {
            let alpha = if self.fade.is_some() {
                self.fade_progress
            } else {
                1.0
            };
            let src = cover_fit(current.width() as f32, current.height() as f32, dst);
            surface.draw_image(current, src, dst, alpha);
        }
    }

    pub fn fade_progress(&self) -> f32 {
        self.fade_progress
    }

    pub fn is_transitioning(&self) -> bool {
        self.fade.is_some()
    }

    pub fn current_time(&self) -> TimeOfDay {
        self.current
    }

    /// 过渡中的旧时段
    pub fn previous_time(&self) -> Option<TimeOfDay> {
        self.fade.as_ref().map(|f| f.from)
    }

    pub fn clear(&mut self) {
        self.images.clear();
        self.parallax.clear();
        self.fade = None;
        self.fade_progress = 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::{DrawCall, RecordingSurface};
    use std::sync::Arc;

    fn image() -> ImageHandle {
        Arc::new(image::RgbaImage::new(16, 9))
    }

    fn compositor() -> (LayerCompositor, ImageHandle, ImageHandle) {
        let day = image();
        let night = image();
        let mut c = LayerCompositor::new(TimeOfDay::Day);
        c.add_layer(LayerDepth::Background, TimeOfDay::Day, day.clone());
        c.add_layer(LayerDepth::Background, TimeOfDay::Night, night.clone());
        (c, day, night)
    }

    #[test]
    fn test_settled_draws_current_only() {
        let (c, day, _) = compositor();
        let mut surface = RecordingSurface::new(160, 90);
        c.draw(&mut surface, LayerDepth::Background);

        let calls = surface.calls();
        assert_eq!(calls.len(), 1);
        let (img, alpha) = calls[0].as_image().unwrap();
        assert!(Arc::ptr_eq(img, &day));
        assert_eq!(alpha, 1.0);
        assert_eq!(c.fade_progress(), 1.0);
    }

    #[test]
    fn test_midway_fade_draws_both() {
        let (mut c, day, night) = compositor();
        assert!(c.transition_to(TimeOfDay::Night, 1000.0));
        c.update(500.0);

        let expected = EasingFunction::EaseInOutQuad.apply(0.5);
        assert!((c.fade_progress() - expected).abs() < 1e-6);

        let mut surface = RecordingSurface::new(160, 90);
        c.draw(&mut surface, LayerDepth::Background);
        let images: Vec<_> = surface.calls().iter().filter_map(DrawCall::as_image).collect();
        assert_eq!(images.len(), 2);
        assert!(Arc::ptr_eq(images[0].0, &day));
        assert_eq!(images[0].1, 1.0);
        assert!(Arc::ptr_eq(images[1].0, &night));
        assert!((images[1].1 - expected).abs() < 1e-6);
    }

    #[test]
    fn test_progress_monotonic_and_reaches_one() {
        let (mut c, _, _) = compositor();
        c.transition_to(TimeOfDay::Night, 1000.0);

        let mut last = c.fade_progress();
        let mut total = 0.0;
        while total < 1000.0 {
            c.update(16.7);
            total += 16.7;
            assert!(c.fade_progress() >= last);
            last = c.fade_progress();
        }
        assert_eq!(c.fade_progress(), 1.0);
        assert!(!c.is_transitioning());
        assert_eq!(c.previous_time(), None);
    }

    #[test]
    fn test_transition_to_same_time_is_noop() {
        let (mut c, _, _) = compositor();
        assert!(!c.transition_to(TimeOfDay::Day, 1000.0));
        assert!(!c.is_transitioning());

        c.transition_to(TimeOfDay::Night, 1000.0);
        c.update(100.0);
        let progress = c.fade_progress();
        assert!(!c.transition_to(TimeOfDay::Night, 1000.0));
        assert_eq!(c.fade_progress(), progress);
    }

    #[test]
    fn test_zero_duration_settles_immediately() {
        let (mut c, _, _) = compositor();
        assert!(c.transition_to(TimeOfDay::Night, 0.0));
        assert_eq!(c.fade_progress(), 1.0);
        assert!(!c.is_transitioning());
    }

    #[test]
    fn test_missing_image_draws_nothing() {
        let (c, _, _) = compositor();
        let mut surface = RecordingSurface::new(160, 90);
        c.draw(&mut surface, LayerDepth::Foreground);
        assert!(surface.calls().is_empty());
        assert!(!c.has_image(LayerDepth::Foreground, TimeOfDay::Day));
    }

    #[test]
    fn test_parallax_is_stored() {
        let (mut c, _, _) = compositor();
        c.set_parallax(LayerDepth::Midground, 0.4);
        assert_eq!(c.layer_parallax(LayerDepth::Midground), 0.4);
        assert_eq!(c.layer_parallax(LayerDepth::Foreground), 0.0);
    }
}
