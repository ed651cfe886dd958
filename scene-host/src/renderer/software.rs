//! # Software Surface 模块
//!
//! 基于 `vello_cpu` 的 CPU 绘制目标。
//!
//! 一帧内的绘制调用先记录到 `RenderContext`，[`Surface::present`] 时统一光栅化到
//! `Pixmap`。`Pixmap` 内部是预乘 alpha 的 RGBA8，读回像素时再还原为直通 alpha。
//! headless 播放器用它逐帧绘制并导出 PNG。

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use image::RgbaImage;
use vello_cpu::kurbo::{Affine, BezPath, Ellipse, Shape};

use super::{Color, Rect, Surface};
use crate::resources::ImageHandle;

/// 曲线展平精度（像素）
const PATH_TOLERANCE: f64 = 0.1;

pub struct SoftwareSurface {
    width: u16,
    height: u16,
    pixmap: vello_cpu::Pixmap,
    ctx: vello_cpu::RenderContext,
    clear_color: Color,
    /// 以 `Arc` 指针为键；条目持有一份句柄，指针在缓存期间不会被复用
    image_cache: HashMap<usize, (ImageHandle, vello_cpu::Image)>,
}

impl SoftwareSurface {
    pub fn new(width: u32, height: u32) -> Self {
        let (width, height) = (clamp_dim(width), clamp_dim(height));
        Self {
            width,
            height,
            pixmap: vello_cpu::Pixmap::new(width, height),
            ctx: vello_cpu::RenderContext::new(width, height),
            clear_color: Color::BLACK,
            image_cache: HashMap::new(),
        }
    }

    pub fn with_clear_color(mut self, color: Color) -> Self {
        self.clear_color = color;
        self
    }

    /// 读取一个像素（直通 alpha）
    ///
    /// 反映的是最近一次 `present` 之后的内容。
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= u32::from(self.width) || y >= u32::from(self.height) {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let data = self.pixmap.data_as_u8_slice();
        let px = data.get(offset..offset + 4)?;
        Some(unpremul_rgba8(px[0], px[1], px[2], px[3]))
    }

    /// 把当前画面复制为直通 alpha 的 `RgbaImage`
    pub fn to_rgba_image(&self) -> RgbaImage {
        let data = self.pixmap.data_as_u8_slice();
        let mut out = Vec::with_capacity(data.len());
        for px in data.chunks_exact(4) {
            out.extend_from_slice(&unpremul_rgba8(px[0], px[1], px[2], px[3]));
        }
        RgbaImage::from_raw(u32::from(self.width), u32::from(self.height), out)
            .unwrap_or_else(|| RgbaImage::new(u32::from(self.width), u32::from(self.height)))
    }

    pub fn save_png(&self, path: impl AsRef<Path>) -> image::ImageResult<()> {
        self.to_rgba_image()
            .save_with_format(path, image::ImageFormat::Png)
    }

    fn image_paint_for(&mut self, image: &ImageHandle) -> Option<vello_cpu::Image> {
        let key = Arc::as_ptr(image) as usize;
        if let Some((_, paint)) = self.image_cache.get(&key) {
            return Some(paint.clone());
        }

        let pixmap = image_to_pixmap(image)?;
        let paint = vello_cpu::Image {
            image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap)),
            sampler: vello_cpu::peniko::ImageSampler::default(),
        };
        self.image_cache
            .insert(key, (Arc::clone(image), paint.clone()));
        Some(paint)
    }

    /// 用纯色填充路径
    fn fill_solid(&mut self, path: &BezPath, color: Color) {
        if color.a <= 0.0 {
            return;
        }
        let [r, g, b, a] = color.to_rgba8();
        self.ctx.set_transform(Affine::IDENTITY);
        self.ctx.set_paint_transform(Affine::IDENTITY);
        self.ctx
            .set_paint(vello_cpu::peniko::Color::from_rgba8(r, g, b, a));
        self.ctx.fill_path(path);
    }
}

impl fmt::Debug for SoftwareSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftwareSurface")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("clear_color", &self.clear_color)
            .field("cached_images", &self.image_cache.len())
            .finish()
    }
}

impl Surface for SoftwareSurface {
    fn width(&self) -> f32 {
        f32::from(self.width)
    }

    fn height(&self) -> f32 {
        f32::from(self.height)
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = clamp_dim(width);
        self.height = clamp_dim(height);
        self.pixmap = vello_cpu::Pixmap::new(self.width, self.height);
        self.ctx = vello_cpu::RenderContext::new(self.width, self.height);
    }

    fn clear(&mut self) {
        // 丢弃上一帧未提交的绘制
        self.ctx = vello_cpu::RenderContext::new(self.width, self.height);
        self.ctx.set_transform(Affine::IDENTITY);
        self.ctx.set_paint_transform(Affine::IDENTITY);
        let [r, g, b, a] = self.clear_color.to_rgba8();
        self.ctx
            .set_paint(vello_cpu::peniko::Color::from_rgba8(r, g, b, a));
        self.ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
            0.0,
            0.0,
            f64::from(self.width),
            f64::from(self.height),
        ));
    }

    fn draw_image(&mut self, image: &ImageHandle, src: Rect, dst: Rect, alpha: f32) {
        if alpha <= 0.0 || dst.w <= 0.0 || dst.h <= 0.0 || src.w <= 0.0 || src.h <= 0.0 {
            return;
        }
        let Some(paint) = self.image_paint_for(image) else {
            return;
        };

        // 图片坐标系下的 src 区域映射到画布上的 dst 区域
        let transform = Affine::translate((f64::from(dst.x), f64::from(dst.y)))
            * Affine::scale_non_uniform(
                f64::from(dst.w / src.w),
                f64::from(dst.h / src.h),
            )
            * Affine::translate((-f64::from(src.x), -f64::from(src.y)));

        self.ctx.set_transform(transform);
        self.ctx.set_paint_transform(Affine::IDENTITY);
        self.ctx.set_paint(paint);

        let alpha = alpha.min(1.0);
        if alpha < 1.0 {
            self.ctx.push_opacity_layer(alpha);
        }
        self.ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
            f64::from(src.x),
            f64::from(src.y),
            f64::from(src.right()),
            f64::from(src.bottom()),
        ));
        if alpha < 1.0 {
            self.ctx.pop_layer();
        }
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        if rect.w <= 0.0 || rect.h <= 0.0 {
            return;
        }
        let shape = vello_cpu::kurbo::Rect::new(
            f64::from(rect.x),
            f64::from(rect.y),
            f64::from(rect.right()),
            f64::from(rect.bottom()),
        );
        self.fill_solid(&shape.to_path(PATH_TOLERANCE), color);
    }

    fn fill_ellipse(&mut self, cx: f32, cy: f32, rx: f32, ry: f32, color: Color) {
        if rx <= 0.0 || ry <= 0.0 {
            return;
        }
        let shape = Ellipse::new(
            (f64::from(cx), f64::from(cy)),
            (f64::from(rx), f64::from(ry)),
            0.0,
        );
        self.fill_solid(&shape.to_path(PATH_TOLERANCE), color);
    }

    fn fill_polygon(&mut self, points: &[(f32, f32)], color: Color) {
        let [first, rest @ ..] = points else {
            return;
        };
        if rest.len() < 2 {
            return;
        }
        let mut path = BezPath::new();
        path.move_to((f64::from(first.0), f64::from(first.1)));
        for &(x, y) in rest {
            path.line_to((f64::from(x), f64::from(y)));
        }
        path.close_path();
        self.fill_solid(&path, color);
    }

    fn present(&mut self) {
        clear_pixmap(&mut self.pixmap, [0, 0, 0, 0]);
        self.ctx.flush();
        self.ctx.render_to_pixmap(&mut self.pixmap);
    }
}

fn clamp_dim(v: u32) -> u16 {
    v.clamp(1, u32::from(u16::MAX)) as u16
}

fn clear_pixmap(pixmap: &mut vello_cpu::Pixmap, rgba: [u8; 4]) {
    let data = pixmap.data_as_u8_slice_mut();
    for px in data.chunks_exact_mut(4) {
        px.copy_from_slice(&rgba);
    }
}

fn premul_rgba8(r: u8, g: u8, b: u8, a: u8) -> [u8; 4] {
    let af = (a as u16) + 1;
    let premul = |c: u8| -> u8 { (((c as u16) * af) >> 8) as u8 };
    [premul(r), premul(g), premul(b), a]
}

fn unpremul_rgba8(r: u8, g: u8, b: u8, a: u8) -> [u8; 4] {
    if a == 0 {
        return [0, 0, 0, 0];
    }
    let unpremul = |c: u8| -> u8 {
        ((c as u32 * 255 + a as u32 / 2) / a as u32).min(255) as u8
    };
    [unpremul(r), unpremul(g), unpremul(b), a]
}

/// 解码后的直通 alpha 图片转为预乘 `Pixmap`
fn image_to_pixmap(image: &RgbaImage) -> Option<vello_cpu::Pixmap> {
    let (w, h) = image.dimensions();
    let w: u16 = w.try_into().ok()?;
    let h: u16 = h.try_into().ok()?;
    if w == 0 || h == 0 {
        return None;
    }

    let mut may_have_opacities = false;
    let mut pixels = Vec::with_capacity(w as usize * h as usize);
    for px in image.pixels() {
        let [r, g, b, a] = premul_rgba8(px[0], px[1], px[2], px[3]);
        may_have_opacities |= a != 255;
        pixels.push(vello_cpu::peniko::color::PremulRgba8 { r, g, b, a });
    }

    Some(vello_cpu::Pixmap::from_parts_with_opacity(
        pixels,
        w,
        h,
        may_have_opacities,
    ))
}
