//! # Config 模块
//!
//! 播放器配置，集中管理所有配置项。
//!
//! ## 配置优先级
//!
//! 1. 命令行参数（最高）
//! 2. 配置文件 (player.json)
//! 3. 默认值（最低）

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::renderer::{EasingFunction, ParticleConfig};
use crate::resources::{AssetSource, FsSource, ZipSource};

/// 资源来源类型
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AssetSourceType {
    /// 文件系统
    #[default]
    Fs,
    /// ZIP 场景包
    Zip,
}

/// 播放器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// 资源来源类型（fs/zip）
    #[serde(default)]
    pub asset_source: AssetSourceType,

    /// 资源根目录（仅 Fs 模式使用）
    #[serde(default = "default_assets_root")]
    pub assets_root: PathBuf,

    /// ZIP 文件路径（仅 Zip 模式使用）
    #[serde(default)]
    pub zip_path: Option<PathBuf>,

    /// 描述文件路径（相对于资源根目录）
    #[serde(default = "default_descriptor")]
    pub descriptor: String,

    /// 画布配置
    #[serde(default)]
    pub canvas: CanvasConfig,

    /// 引擎配置
    #[serde(default)]
    pub engine: EngineConfig,

    /// 粒子配置
    #[serde(default)]
    pub particles: ParticleConfig,

    /// 光照配置
    #[serde(default)]
    pub lighting: LightingConfig,
}

/// 画布配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasConfig {
    #[serde(default = "default_canvas_width")]
    pub width: u32,

    #[serde(default = "default_canvas_height")]
    pub height: u32,
}

/// 引擎配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// 懒加载：初始只加载当前时段及相邻时段
    #[serde(default)]
    pub lazy_load: bool,

    /// 单帧 dt 上限（毫秒）
    #[serde(default = "default_max_frame_delta_ms")]
    pub max_frame_delta_ms: f32,

    /// 自动昼夜的重新评估间隔（毫秒）
    #[serde(default = "default_auto_time_interval_ms")]
    pub auto_time_interval_ms: f32,

    /// `play_animation` 默认交叉淡入时长
    #[serde(default = "default_crossfade_ms")]
    pub default_crossfade_ms: f32,

    /// `transition` 默认时长
    #[serde(default = "default_transition_ms")]
    pub default_transition_ms: f32,

    /// `set_time` 默认淡入淡出时长
    #[serde(default = "default_time_fade_ms")]
    pub default_time_fade_ms: f32,

    /// 时段淡入淡出的缓动曲线
    #[serde(default)]
    pub time_fade_easing: EasingFunction,
}

/// 光照配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightingConfig {
    /// 缓动速度（每毫秒）
    #[serde(default = "default_lighting_speed")]
    pub ease_speed: f32,
}

// 默认值函数
fn default_assets_root() -> PathBuf {
    PathBuf::from("assets")
}

fn default_descriptor() -> String {
    "scene.json".to_string()
}

fn default_canvas_width() -> u32 {
    1280
}

fn default_canvas_height() -> u32 {
    720
}

fn default_max_frame_delta_ms() -> f32 {
    100.0
}

fn default_auto_time_interval_ms() -> f32 {
    60_000.0
}

fn default_crossfade_ms() -> f32 {
    300.0
}

fn default_transition_ms() -> f32 {
    500.0
}

fn default_time_fade_ms() -> f32 {
    2000.0
}

fn default_lighting_speed() -> f32 {
    crate::renderer::lighting::DEFAULT_EASE_SPEED
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            asset_source: AssetSourceType::default(),
            assets_root: default_assets_root(),
            zip_path: None,
            descriptor: default_descriptor(),
            canvas: CanvasConfig::default(),
            engine: EngineConfig::default(),
            particles: ParticleConfig::default(),
            lighting: LightingConfig::default(),
        }
    }
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: default_canvas_width(),
            height: default_canvas_height(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lazy_load: false,
            max_frame_delta_ms: default_max_frame_delta_ms(),
            auto_time_interval_ms: default_auto_time_interval_ms(),
            default_crossfade_ms: default_crossfade_ms(),
            default_transition_ms: default_transition_ms(),
            default_time_fade_ms: default_time_fade_ms(),
            time_fade_easing: EasingFunction::default(),
        }
    }
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            ease_speed: default_lighting_speed(),
        }
    }
}

impl PlayerConfig {
    /// 加载配置文件
    ///
    /// 文件不存在或解析失败时返回默认配置并记录警告。
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            warn!(path = ?path, "配置文件不存在，使用默认配置");
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => {
                    info!(path = ?path, "配置文件加载成功");
                    config
                }
                Err(e) => {
                    warn!(path = ?path, error = %e, "配置文件解析失败，使用默认配置");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = ?path, error = %e, "配置文件读取失败，使用默认配置");
                Self::default()
            }
        }
    }

    /// 保存配置到文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializationFailed(e.to_string()))?;

        fs::write(path, json).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.asset_source {
            AssetSourceType::Fs => {
                if !self.assets_root.exists() {
                    return Err(ConfigError::ValidationFailed(format!(
                        "资源目录不存在: {:?}",
                        self.assets_root
                    )));
                }
            }
            AssetSourceType::Zip => {
                let zip_path = self.zip_path.as_ref().ok_or_else(|| {
                    ConfigError::ValidationFailed("Zip 模式必须配置 zip_path".to_string())
                })?;

                if !zip_path.exists() {
                    return Err(ConfigError::ValidationFailed(format!(
                        "ZIP 文件不存在: {:?}",
                        zip_path
                    )));
                }
            }
        }

        if self.descriptor.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "必须配置 descriptor（描述文件路径）".to_string(),
            ));
        }

        if self.canvas.width == 0 || self.canvas.height == 0 {
            return Err(ConfigError::ValidationFailed(
                "画布尺寸必须大于 0".to_string(),
            ));
        }

        if self.engine.max_frame_delta_ms <= 0.0 {
            return Err(ConfigError::ValidationFailed(
                "max_frame_delta_ms 必须大于 0".to_string(),
            ));
        }

        if self.engine.auto_time_interval_ms <= 0.0 {
            return Err(ConfigError::ValidationFailed(
                "auto_time_interval_ms 必须大于 0".to_string(),
            ));
        }

        if self.particles.capacity == 0 {
            return Err(ConfigError::ValidationFailed(
                "粒子池容量必须大于 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.particles.fog_opacity) {
            return Err(ConfigError::ValidationFailed(
                "雾的不透明度必须在 0.0 - 1.0 之间".to_string(),
            ));
        }

        Ok(())
    }

    /// 按配置创建资源来源
    pub fn build_source(&self) -> Result<Arc<dyn AssetSource>, ConfigError> {
        match self.asset_source {
            AssetSourceType::Fs => Ok(Arc::new(FsSource::new(&self.assets_root))),
            AssetSourceType::Zip => {
                let zip_path = self.zip_path.as_ref().ok_or_else(|| {
                    ConfigError::ValidationFailed("Zip 模式必须配置 zip_path".to_string())
                })?;
                Ok(Arc::new(ZipSource::new(zip_path)))
            }
        }
    }
}

/// 配置错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// 序列化失败
    #[error("配置序列化失败: {0}")]
    SerializationFailed(String),
    /// IO 错误
    #[error("配置 IO 错误: {0}")]
    IoError(String),
    /// 验证失败
    #[error("配置验证失败: {0}")]
    ValidationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PlayerConfig::default();
        assert_eq!(config.canvas.width, 1280);
        assert_eq!(config.canvas.height, 720);
        assert_eq!(config.engine.max_frame_delta_ms, 100.0);
        assert_eq!(config.particles.capacity, 300);
        assert_eq!(config.particles.rain_interval_ms, 8.0);
        assert_eq!(config.lighting.ease_speed, 0.002);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: PlayerConfig = serde_json::from_str(
            r#"{ "descriptor": "room/scene.json", "engine": { "lazy_load": true }, "particles": { "capacity": 64 } }"#,
        )
        .unwrap();

        assert_eq!(config.descriptor, "room/scene.json");
        assert!(config.engine.lazy_load);
        assert_eq!(config.engine.default_crossfade_ms, 300.0);
        assert_eq!(config.engine.time_fade_easing, EasingFunction::EaseInOutQuad);
        assert_eq!(config.particles.capacity, 64);
        assert_eq!(config.particles.snow_interval_ms, 40.0);
        assert_eq!(config.canvas.width, 1280);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("player.json");

        let mut config = PlayerConfig::default();
        config.canvas.width = 640;
        config.save(&path).unwrap();

        assert_eq!(PlayerConfig::load(&path), config);
    }

    #[test]
    fn test_load_missing_or_broken_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            PlayerConfig::load(dir.path().join("missing.json")),
            PlayerConfig::default()
        );

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ not json").unwrap();
        assert_eq!(PlayerConfig::load(&broken), PlayerConfig::default());
    }

    #[test]
    fn test_config_validation() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PlayerConfig {
            assets_root: dir.path().to_path_buf(),
            ..PlayerConfig::default()
        };
        assert!(config.validate().is_ok());

        config.particles.fog_opacity = 2.0;
        assert!(config.validate().is_err());
        config.particles.fog_opacity = 0.35;

        config.asset_source = AssetSourceType::Zip;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationFailed(_))
        ));
        assert!(config.build_source().is_err());
    }
}
