//! # Error 模块
//!
//! 定义 scene-runtime 中使用的错误类型。

use thiserror::Error;

/// 场景错误
///
/// - `Fetch`: 描述文件或图片无法获取。描述文件失败时整个加载失败；
///   单张图片失败只记录日志并跳过该槽位。
/// - `Validation`: 描述文件不是合法的对象，`load()` 直接失败。
/// - `Configuration`: 公共接口收到非法枚举值或未注册的 zone / 动画，
///   只警告并忽略，不会向调用方抛出。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SceneError {
    /// 资源获取失败
    #[error("无法获取 {url}: {message}")]
    Fetch { url: String, message: String },

    /// 描述文件校验失败
    #[error("场景描述无效: {message}")]
    Validation { message: String },

    /// 非法配置值
    #[error("非法配置: {message}")]
    Configuration { message: String },
}

impl SceneError {
    pub fn fetch(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// 是否为致命错误（中止加载）
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Configuration { .. })
    }
}

/// Result 类型别名
pub type SceneResult<T> = Result<T, SceneError>;
