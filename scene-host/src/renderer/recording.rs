//! 记录绘制调用的 Surface，用于在没有真实画布的环境下验证绘制顺序与透明度。

use super::{Color, Rect, Surface};
use crate::resources::ImageHandle;

/// 一次绘制调用
#[derive(Debug, Clone)]
pub enum DrawCall {
    Clear,
    Image {
        image: ImageHandle,
        src: Rect,
        dst: Rect,
        alpha: f32,
    },
    Rect {
        rect: Rect,
        color: Color,
    },
    Ellipse {
        cx: f32,
        cy: f32,
        rx: f32,
        ry: f32,
        color: Color,
    },
    Polygon {
        points: Vec<(f32, f32)>,
        color: Color,
    },
}

impl DrawCall {
    /// 图片调用的 (图片, alpha)
    pub fn as_image(&self) -> Option<(&ImageHandle, f32)> {
        match self {
            Self::Image { image, alpha, .. } => Some((image, *alpha)),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct RecordingSurface {
    width: f32,
    height: f32,
    calls: Vec<DrawCall>,
}

impl RecordingSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width as f32,
            height: height as f32,
            calls: Vec::new(),
        }
    }

    pub fn calls(&self) -> &[DrawCall] {
        &self.calls
    }

    /// 取出并清空已记录的调用
    pub fn take_calls(&mut self) -> Vec<DrawCall> {
        std::mem::take(&mut self.calls)
    }

    /// 最近一次 `clear()` 之后的调用（即最后一帧）
    pub fn last_frame(&self) -> &[DrawCall] {
        match self.calls.iter().rposition(|c| matches!(c, DrawCall::Clear)) {
            Some(idx) => &self.calls[idx + 1..],
            None => &self.calls,
        }
    }

    pub fn clear_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, DrawCall::Clear))
            .count()
    }
}

impl Surface for RecordingSurface {
    fn width(&self) -> f32 {
        self.width
    }

    fn height(&self) -> f32 {
        self.height
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width as f32;
        self.height = height as f32;
    }

    fn clear(&mut self) {
        self.calls.push(DrawCall::Clear);
    }

    fn draw_image(&mut self, image: &ImageHandle, src: Rect, dst: Rect, alpha: f32) {
        self.calls.push(DrawCall::Image {
            image: image.clone(),
            src,
            dst,
            alpha,
        });
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        self.calls.push(DrawCall::Rect { rect, color });
    }

    fn fill_ellipse(&mut self, cx: f32, cy: f32, rx: f32, ry: f32, color: Color) {
        self.calls.push(DrawCall::Ellipse {
            cx,
            cy,
            rx,
            ry,
            color,
        });
    }

    fn fill_polygon(&mut self, points: &[(f32, f32)], color: Color) {
        self.calls.push(DrawCall::Polygon {
            points: points.to_vec(),
            color,
        });
    }
}
