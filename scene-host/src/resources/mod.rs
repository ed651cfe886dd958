//! # Resources 模块
//!
//! 场景资源的读取、解码、缓存与加载。
//!
//! ## 组成
//!
//! - [`source`]：资源来源抽象（文件系统 / ZIP / 内存）
//! - [`path`]：相对路径解析
//! - [`cache`]：按 URL 缓存已解码的图片
//! - [`loader`]：描述文件与图片的加载器

pub mod cache;
mod error;
pub mod loader;
pub mod path;
pub mod source;

use std::sync::Arc;

use image::RgbaImage;

pub use cache::{CacheStats, ImageCache};
pub use error::ResourceError;
pub use loader::{AssetLoader, LoadedScene, LoaderOptions, TimeAssets};
pub use path::{PathKind, normalize_logical_path, resolve_asset_path};
pub use source::{AssetSource, FsSource, MemorySource, ZipSource, decode_data_uri};

/// 已解码图片的共享句柄
///
/// 同一 URL 的所有引用共享同一个句柄，可用 `Arc::ptr_eq` 判断是否为同一张图。
pub type ImageHandle = Arc<RgbaImage>;

/// 使用 image crate 解码图片字节为 RGBA8
///
/// 支持 PNG、JPEG、WebP。
pub fn decode_image(path: &str, bytes: &[u8]) -> Result<ImageHandle, ResourceError> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| ResourceError::invalid_format(path, format!("无法解码图片: {}", e)))?;
    Ok(Arc::new(img.to_rgba8()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_png() {
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(RgbaImage::from_pixel(3, 2, image::Rgba([1, 2, 3, 255])))
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();

        let decoded = decode_image("x.png", &bytes).unwrap();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.get_pixel(0, 0).0, [1, 2, 3, 255]);
    }

    #[test]
    fn test_decode_garbage_is_invalid_format() {
        assert!(matches!(
            decode_image("x.png", b"not an image"),
            Err(ResourceError::InvalidFormat { .. })
        ));
    }
}
