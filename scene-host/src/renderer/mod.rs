//! # Renderer 模块
//!
//! 绘制抽象与各个场景子系统。
//!
//! ## 设计说明
//!
//! 子系统只依赖 [`Surface`] trait，不关心最终画到哪里：
//! - [`SoftwareSurface`]：`vello_cpu` 光栅化到 `Pixmap`（headless 播放、导出 PNG）
//! - [`RecordingSurface`]：记录绘制调用（测试）
//!
//! 嵌入方可以为自己的窗口 / GPU 后端实现 `Surface`。

pub mod character;
pub mod compositor;
pub mod easing;
pub mod lighting;
pub mod particles;
pub mod recording;
pub mod rng;
pub mod software;

pub use character::{
    AnimatorEvent, AnimatorState, CharacterAnimator, ClipSpec, CrossfadeOptions, TransitionOptions,
};
pub use compositor::LayerCompositor;
pub use easing::EasingFunction;
pub use lighting::LightingOverlay;
pub use particles::{Particle, ParticleConfig, ParticleKind, ParticleSystem, SunRay};
pub use recording::{DrawCall, RecordingSurface};
pub use rng::ParticleRng;
pub use software::SoftwareSurface;

use crate::resources::ImageHandle;

/// 矩形（像素坐标）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// 从原点开始的矩形
    pub const fn from_size(w: f32, h: f32) -> Self {
        Self::new(0.0, 0.0, w, h)
    }

    pub fn right(&self) -> f32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.h
    }
}

/// 颜色
///
/// `r/g/b` 为 0-255，`a` 为 0.0-1.0。使用浮点存储以便逐通道插值。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::rgba(255.0, 255.0, 255.0, 1.0);
    pub const BLACK: Color = Color::rgba(0.0, 0.0, 0.0, 1.0);
    pub const TRANSPARENT: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self::rgba(r, g, b, 1.0)
    }

    pub fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }

    /// 每个通道向目标靠近 `factor`（0.0-1.0）
    pub fn approach(&mut self, target: Color, factor: f32) {
        if factor >= 1.0 {
            *self = target;
            return;
        }
        self.r += (target.r - self.r) * factor;
        self.g += (target.g - self.g) * factor;
        self.b += (target.b - self.b) * factor;
        self.a += (target.a - self.a) * factor;
    }

    /// 转为 RGBA8（alpha 乘以 255）
    pub fn to_rgba8(&self) -> [u8; 4] {
        let channel = |v: f32| v.round().clamp(0.0, 255.0) as u8;
        [
            channel(self.r),
            channel(self.g),
            channel(self.b),
            channel(self.a * 255.0),
        ]
    }
}

/// 绘制目标
///
/// 所有 alpha 参数为 0.0-1.0，与图片自身的 alpha 相乘。
pub trait Surface {
    fn width(&self) -> f32;

    fn height(&self) -> f32;

    /// 调整画布尺寸（内容可丢弃）
    fn resize(&mut self, width: u32, height: u32);

    /// 清空画布
    fn clear(&mut self);

    /// 把图片的 `src` 区域绘制到 `dst` 区域
    fn draw_image(&mut self, image: &ImageHandle, src: Rect, dst: Rect, alpha: f32);

    fn fill_rect(&mut self, rect: Rect, color: Color);

    /// 填充轴对齐椭圆
    fn fill_ellipse(&mut self, cx: f32, cy: f32, rx: f32, ry: f32, color: Color);

    /// 填充多边形（顶点按顺序给出）
    fn fill_polygon(&mut self, points: &[(f32, f32)], color: Color);

    /// 一帧绘制结束，提交到目标
    ///
    /// 延迟光栅化的实现在这里把记录的绘制落到像素上。
    fn present(&mut self) {}

    /// 整个画布对应的矩形
    fn bounds(&self) -> Rect {
        Rect::from_size(self.width(), self.height())
    }
}

/// cover 适配：返回图片中需要采样的源矩形
///
/// 等比缩放至完全覆盖目标区域，较长的一边居中裁剪。
pub fn cover_fit(image_width: f32, image_height: f32, dst: Rect) -> Rect {
    if image_width <= 0.0 || image_height <= 0.0 || dst.w <= 0.0 || dst.h <= 0.0 {
        return Rect::from_size(image_width.max(0.0), image_height.max(0.0));
    }

    let scale = (dst.w / image_width).max(dst.h / image_height);
    let src_w = dst.w / scale;
    let src_h = dst.h / scale;
    Rect::new(
        (image_width - src_w) / 2.0,
        (image_height - src_h) / 2.0,
        src_w,
        src_h,
    )
}

/// 以中心点、尺寸、旋转角构造矩形的四个顶点
pub fn rotated_rect(cx: f32, cy: f32, w: f32, h: f32, rotation: f32) -> [(f32, f32); 4] {
    let (sin, cos) = rotation.sin_cos();
    let hw = w / 2.0;
    let hh = h / 2.0;
    [(-hw, -hh), (hw, -hh), (hw, hh), (-hw, hh)]
        .map(|(x, y)| (cx + x * cos - y * sin, cy + x * sin + y * cos))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cover_fit_wide_image() {
        // 2:1 的图片放进 1:1 区域，左右裁剪
        let src = cover_fit(200.0, 100.0, Rect::from_size(50.0, 50.0));
        assert_eq!(src, Rect::new(50.0, 0.0, 100.0, 100.0));
    }

    #[test]
    fn test_cover_fit_tall_image() {
        let src = cover_fit(100.0, 400.0, Rect::from_size(200.0, 100.0));
        assert_eq!(src, Rect::new(0.0, 175.0, 100.0, 50.0));
    }

    #[test]
    fn test_cover_fit_same_aspect() {
        let src = cover_fit(1920.0, 1080.0, Rect::from_size(1280.0, 720.0));
        assert!((src.w - 1920.0).abs() < 1e-3);
        assert!((src.h - 1080.0).abs() < 1e-3);
        assert!(src.x.abs() < 1e-3 && src.y.abs() < 1e-3);
    }

    #[test]
    fn test_color_approach() {
        let mut c = Color::rgba(0.0, 0.0, 0.0, 0.0);
        c.approach(Color::rgba(100.0, 200.0, 50.0, 1.0), 0.5);
        assert_eq!(c, Color::rgba(50.0, 100.0, 25.0, 0.5));
        assert_eq!(Color::WHITE.to_rgba8(), [255, 255, 255, 255]);
    }

    #[test]
    fn test_rotated_rect_quarter_turn() {
        let pts = rotated_rect(0.0, 0.0, 2.0, 4.0, std::f32::consts::FRAC_PI_2);
        // (-1,-2) 旋转 90° -> (2,-1)
        assert!((pts[0].0 - 2.0).abs() < 1e-5);
        assert!((pts[0].1 + 1.0).abs() < 1e-5);
    }
}
