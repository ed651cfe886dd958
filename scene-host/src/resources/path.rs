//! # 路径解析模块
//!
//! 场景描述文件中的资源路径都相对于描述文件自身所在位置。
//!
//! ## 规则
//!
//! - `data:` 内嵌数据、`scheme://` 协议路径、`/` 开头的绝对路径原样透传
//! - 描述文件本身是 URL（如 `file:///scenes/room/scene.json`）时，用 `url` crate 做 RFC 3986 解析
//! - 否则按逻辑路径处理：统一 `/` 分隔符，处理 `.` / `..`

use url::Url;

/// 资源路径的分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    /// `data:` 内嵌数据
    Embedded,
    /// 带协议的路径（`scheme://...`）
    Qualified,
    /// `/` 开头的绝对路径
    Absolute,
    /// 相对路径
    Relative,
}

impl PathKind {
    pub fn of(path: &str) -> Self {
        if path.starts_with("data:") {
            Self::Embedded
        } else if has_scheme(path) {
            Self::Qualified
        } else if path.starts_with('/') {
            Self::Absolute
        } else {
            Self::Relative
        }
    }

    /// 是否无需解析直接透传
    pub fn is_pass_through(&self) -> bool {
        !matches!(self, Self::Relative)
    }
}

/// 是否以 `scheme://` 开头
fn has_scheme(path: &str) -> bool {
    let Some((scheme, _)) = path.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// 规范化逻辑路径
///
/// - 统一使用 `/` 分隔符
/// - 跳过空组件与 `.`
/// - `..` 弹出上一级（越过根时忽略）
pub fn normalize_logical_path(path: &str) -> String {
    let normalized = path.replace('\\', "/");

    let mut components = Vec::new();
    for component in normalized.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                components.pop();
            }
            _ => components.push(component),
        }
    }

    components.join("/")
}

/// 提取所在目录（逻辑路径）
///
/// `scenes/room/scene.json` -> `scenes/room`，`scene.json` -> 空字符串
pub fn extract_base_dir(path: &str) -> String {
    let normalized = normalize_logical_path(path);

    match normalized.rfind('/') {
        Some(last_slash) => normalized[..last_slash].to_string(),
        None => String::new(),
    }
}

/// 把描述文件中的资源路径解析为可直接交给 [`AssetSource`](super::AssetSource) 的路径
///
/// # 参数
///
/// - `descriptor_url`: 描述文件自身的位置
/// - `asset_path`: 描述文件中写的资源路径
pub fn resolve_asset_path(descriptor_url: &str, asset_path: &str) -> String {
    if PathKind::of(asset_path).is_pass_through() {
        return asset_path.to_string();
    }

    if PathKind::of(descriptor_url) == PathKind::Qualified
        && let Ok(base) = Url::parse(descriptor_url)
        && let Ok(joined) = base.join(asset_path)
    {
        return joined.to_string();
    }

    let base = extract_base_dir(descriptor_url);
    if base.is_empty() {
        normalize_logical_path(asset_path)
    } else {
        normalize_logical_path(&format!("{}/{}", base, asset_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(PathKind::of("data:image/png;base64,AAAA"), PathKind::Embedded);
        assert_eq!(PathKind::of("https://cdn.example.com/bg.png"), PathKind::Qualified);
        assert_eq!(PathKind::of("file:///tmp/bg.png"), PathKind::Qualified);
        assert_eq!(PathKind::of("/static/bg.png"), PathKind::Absolute);
        assert_eq!(PathKind::of("backgrounds/bg.png"), PathKind::Relative);
        // 冒号但不是协议
        assert_eq!(PathKind::of("odd:name.png"), PathKind::Relative);
        assert_eq!(PathKind::of("1abc://x"), PathKind::Relative);
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_logical_path("./backgrounds/bg.png"), "backgrounds/bg.png");
        assert_eq!(normalize_logical_path("backgrounds\\bg.png"), "backgrounds/bg.png");
        assert_eq!(normalize_logical_path("a/b/../../c/d.png"), "c/d.png");
        assert_eq!(normalize_logical_path("../bg.png"), "bg.png");
        assert_eq!(normalize_logical_path("/root/bg.png"), "root/bg.png");
    }

    #[test]
    fn test_extract_base_dir() {
        assert_eq!(extract_base_dir("scenes/room/scene.json"), "scenes/room");
        assert_eq!(extract_base_dir("scene.json"), "");
    }

    #[test]
    fn test_resolve_relative_to_logical_descriptor() {
        assert_eq!(
            resolve_asset_path("scenes/room/scene.json", "backgrounds/bg_day.png"),
            "scenes/room/backgrounds/bg_day.png"
        );
        assert_eq!(
            resolve_asset_path("scenes/room/scene.json", "../shared/rain.png"),
            "scenes/shared/rain.png"
        );
        assert_eq!(
            resolve_asset_path("scene.json", "./characters/idle.png"),
            "characters/idle.png"
        );
    }

    #[test]
    fn test_resolve_relative_to_url_descriptor() {
        assert_eq!(
            resolve_asset_path("https://cdn.example.com/scenes/room/scene.json", "bg/day.png"),
            "https://cdn.example.com/scenes/room/bg/day.png"
        );
        assert_eq!(
            resolve_asset_path("file:///srv/room/scene.json", "../shared/a.png"),
            "file:///srv/shared/a.png"
        );
    }

    #[test]
    fn test_pass_through() {
        let data = "data:image/png;base64,iVBORw0KGgo=";
        assert_eq!(resolve_asset_path("scenes/scene.json", data), data);
        assert_eq!(
            resolve_asset_path("scenes/scene.json", "https://a.example/b.png"),
            "https://a.example/b.png"
        );
        assert_eq!(
            resolve_asset_path("https://cdn.example.com/s/scene.json", "/abs/bg.png"),
            "/abs/bg.png"
        );
    }
}
