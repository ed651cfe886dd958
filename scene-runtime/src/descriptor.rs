//! # Descriptor 模块
//!
//! 场景描述文件（scene.json）的数据模型与校验。
//!
//! ## 文档结构
//!
//! ```text
//! { version, meta,
//!   layers:     [{ depth, parallax_factor, images: { <time>: <url> } }],
//!   zones:      [{ id, x, y, width, height, type, scale }],
//!   animations: [{ name, sprite_sheet, frame_width, frame_height, frame_count, fps, loop }],
//!   effects:    [{ id, type, sprite_sheet, weather_trigger?, season_trigger?, particle_config? }],
//!   initial:    { time, weather, season, animation } }
//! ```
//!
//! 只有"不是合法 JSON 对象 / 字段类型不符"才是致命的 `Validation` 错误；
//! 其余问题（版本不支持、未知 depth 等）作为 [`DescriptorWarning`] 返回，由调用方记录。

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SceneError, SceneResult};
use crate::state::{Season, TimeOfDay, Weather};

/// 当前支持的描述文件版本
pub const SUPPORTED_VERSION: u32 = 1;

/// 图层深度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerDepth {
    Background,
    Midground,
    Foreground,
}

impl LayerDepth {
    /// 绘制顺序（从后到前）
    pub const ALL: [LayerDepth; 3] = [Self::Background, Self::Midground, Self::Foreground];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Background => "background",
            Self::Midground => "midground",
            Self::Foreground => "foreground",
        }
    }
}

impl fmt::Display for LayerDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LayerDepth {
    type Err = SceneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LayerDepth::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| SceneError::configuration(format!("未知图层深度 '{}'", s)))
    }
}

/// 场景元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

impl Default for SceneMeta {
    fn default() -> Self {
        Self {
            name: String::new(),
            width: default_width(),
            height: default_height(),
        }
    }
}

/// 图层定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerDef {
    /// 深度标签（background / midground / foreground）
    pub depth: String,
    /// 视差系数（保留字段，目前不影响绘制位置）
    #[serde(default)]
    pub parallax_factor: f32,
    /// 时段 -> 图片 URL
    #[serde(default)]
    pub images: BTreeMap<String, String>,
}

impl LayerDef {
    /// 解析后的深度，未知标签返回 `None`
    pub fn depth(&self) -> Option<LayerDepth> {
        self.depth.parse().ok()
    }

    /// 遍历可识别的 (时段, URL)，跳过未知时段键
    pub fn time_images(&self) -> impl Iterator<Item = (TimeOfDay, &str)> {
        self.images
            .iter()
            .filter_map(|(key, url)| key.parse().ok().map(|time| (time, url.as_str())))
    }

    /// 指定时段的图片 URL
    pub fn image_for(&self, time: TimeOfDay) -> Option<&str> {
        self.images.get(time.as_str()).map(String::as_str)
    }
}

/// Zone 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneKind {
    #[default]
    Character,
    Prop,
    Effect,
    /// 没有角色动画的环境区域
    Ambient,
}

/// Zone 定义（归一化坐标，0.0-1.0）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneDef {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(rename = "type", default)]
    pub kind: ZoneKind,
    #[serde(default = "default_scale")]
    pub scale: f32,
    #[serde(default = "default_true")]
    pub visible: bool,
}

/// 动画片段定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationDef {
    pub name: String,
    pub sprite_sheet: String,
    pub frame_width: u32,
    pub frame_height: u32,
    pub frame_count: u32,
    pub fps: f32,
    #[serde(rename = "loop", default = "default_true")]
    pub looping: bool,
}

/// 特效类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectKind {
    Particle,
    Overlay,
    Ambient,
}

/// 特效定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectDef {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EffectKind,
    pub sprite_sheet: String,
    #[serde(default)]
    pub weather_trigger: Option<Weather>,
    #[serde(default)]
    pub season_trigger: Option<Season>,
    #[serde(default)]
    pub particle_config: Option<serde_json::Map<String, Value>>,
}

/// 初始状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialState {
    #[serde(default = "default_time")]
    pub time: TimeOfDay,
    #[serde(default)]
    pub weather: Weather,
    #[serde(default)]
    pub season: Season,
    #[serde(default)]
    pub animation: Option<String>,
}

impl Default for InitialState {
    fn default() -> Self {
        Self {
            time: default_time(),
            weather: Weather::default(),
            season: Season::default(),
            animation: None,
        }
    }
}

/// 场景描述文件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDescriptor {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub meta: SceneMeta,
    #[serde(default)]
    pub layers: Vec<LayerDef>,
    #[serde(default)]
    pub zones: Vec<ZoneDef>,
    #[serde(default)]
    pub animations: Vec<AnimationDef>,
    #[serde(default)]
    pub effects: Vec<EffectDef>,
    #[serde(default)]
    pub initial: InitialState,
}

/// 描述文件校验警告
#[derive(Debug, Clone, PartialEq)]
pub enum DescriptorWarning {
    /// 版本号不受支持（仍继续加载）
    UnsupportedVersion { version: u32 },
    /// 未知图层深度，该图层会被忽略
    UnknownDepth { layer: usize, depth: String },
    /// 未知时段键，该图片会被忽略
    UnknownTimeKey { layer: usize, key: String },
    /// 动画片段参数无效（frame_count 为 0 或 fps <= 0）
    InvalidClip { name: String },
    /// zone 坐标超出 [0, 1]
    ZoneOutOfRange { id: String },
    /// zone id 重复，后出现的会被忽略
    DuplicateZone { id: String },
}

impl fmt::Display for DescriptorWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedVersion { version } => {
                write!(f, "不支持的描述文件版本 {}（支持 {}）", version, SUPPORTED_VERSION)
            }
            Self::UnknownDepth { layer, depth } => {
                write!(f, "图层 #{}: 未知深度 '{}'", layer, depth)
            }
            Self::UnknownTimeKey { layer, key } => {
                write!(f, "图层 #{}: 未知时段 '{}'", layer, key)
            }
            Self::InvalidClip { name } => {
                write!(f, "动画 '{}': frame_count 必须 > 0 且 fps 必须 > 0", name)
            }
            Self::ZoneOutOfRange { id } => write!(f, "zone '{}': 坐标超出 [0.0, 1.0]", id),
            Self::DuplicateZone { id } => write!(f, "zone '{}' 重复定义", id),
        }
    }
}

impl SceneDescriptor {
    /// 从字节解析描述文件
    ///
    /// 顶层不是 JSON 对象、或字段类型不符时返回 `SceneError::Validation`。
    pub fn from_slice(bytes: &[u8]) -> SceneResult<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| SceneError::validation(format!("JSON 解析失败: {}", e)))?;
        Self::from_value(value)
    }

    /// 从已解析的 JSON 值构建
    pub fn from_value(value: Value) -> SceneResult<Self> {
        if !value.is_object() {
            return Err(SceneError::validation("描述文件顶层必须是对象"));
        }
        serde_json::from_value(value).map_err(|e| SceneError::validation(e.to_string()))
    }

    /// 收集非致命的校验警告
    pub fn warnings(&self) -> Vec<DescriptorWarning> {
        let mut warnings = Vec::new();

        if self.version != SUPPORTED_VERSION {
            warnings.push(DescriptorWarning::UnsupportedVersion {
                version: self.version,
            });
        }

        for (index, layer) in self.layers.iter().enumerate() {
            if layer.depth().is_none() {
                warnings.push(DescriptorWarning::UnknownDepth {
                    layer: index,
                    depth: layer.depth.clone(),
                });
            }
            for key in layer.images.keys() {
                if key.parse::<TimeOfDay>().is_err() {
                    warnings.push(DescriptorWarning::UnknownTimeKey {
                        layer: index,
                        key: key.clone(),
                    });
                }
            }
        }

        for clip in &self.animations {
            if clip.frame_count == 0 || clip.fps <= 0.0 {
                warnings.push(DescriptorWarning::InvalidClip {
                    name: clip.name.clone(),
                });
            }
        }

        let mut seen = HashSet::new();
        for zone in &self.zones {
            if !seen.insert(zone.id.as_str()) {
                warnings.push(DescriptorWarning::DuplicateZone {
                    id: zone.id.clone(),
                });
            }
            let in_range = |v: f32| (0.0..=1.0).contains(&v);
            if !(in_range(zone.x)
                && in_range(zone.y)
                && in_range(zone.width)
                && in_range(zone.height))
            {
                warnings.push(DescriptorWarning::ZoneOutOfRange {
                    id: zone.id.clone(),
                });
            }
        }

        warnings
    }

    /// 按名称查找动画片段
    pub fn animation(&self, name: &str) -> Option<&AnimationDef> {
        self.animations.iter().find(|a| a.name == name)
    }

    /// 场景中出现过的所有时段
    pub fn available_times(&self) -> Vec<TimeOfDay> {
        let mut times: Vec<TimeOfDay> = self
            .layers
            .iter()
            .flat_map(|layer| layer.time_images().map(|(time, _)| time))
            .collect();
        times.sort();
        times.dedup();
        times
    }
}

// 默认值函数
fn default_version() -> u32 {
    SUPPORTED_VERSION
}

fn default_width() -> u32 {
    1920
}

fn default_height() -> u32 {
    1080
}

fn default_scale() -> f32 {
    1.0
}

fn default_true() -> bool {
    true
}

fn default_time() -> TimeOfDay {
    TimeOfDay::Day
}
