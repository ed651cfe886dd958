//! # Resource Error 模块
//!
//! 资源来源层的错误类型，在加载器边界转换为 `SceneError::Fetch`。

use scene_runtime::SceneError;
use thiserror::Error;

/// 资源读取错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResourceError {
    /// 读取失败（IO、ZIP 条目损坏、协议不支持等）
    #[error("加载 {kind} 资源失败: {path} - {message}")]
    LoadFailed {
        /// 资源路径
        path: String,
        /// 来源类型（file, zip, data 等）
        kind: String,
        /// 错误消息
        message: String,
    },

    /// 资源未找到
    #[error("资源未找到: {path}")]
    NotFound {
        /// 资源路径
        path: String,
    },

    /// 无效的资源格式（图片解码失败、data URI 格式错误）
    #[error("无效的资源格式: {path} - {message}")]
    InvalidFormat {
        /// 资源路径
        path: String,
        /// 错误消息
        message: String,
    },
}

impl ResourceError {
    pub fn load_failed(
        path: impl Into<String>,
        kind: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::LoadFailed {
            path: path.into(),
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn invalid_format(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            path: path.into(),
            message: message.into(),
        }
    }

    /// 出错的资源路径
    pub fn path(&self) -> &str {
        match self {
            Self::LoadFailed { path, .. }
            | Self::NotFound { path }
            | Self::InvalidFormat { path, .. } => path,
        }
    }
}

impl From<ResourceError> for SceneError {
    fn from(err: ResourceError) -> Self {
        SceneError::fetch(err.path().to_string(), err.to_string())
    }
}
