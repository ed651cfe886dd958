//! # State 模块
//!
//! 场景的可枚举状态（时段 / 天气 / 季节）与引擎状态快照。
//!
//! 公共接口接收的字符串都经过这里的 `FromStr` 校验，
//! 非法值返回 `SceneError::Configuration`。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SceneError;

/// 时段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    Dawn,
    #[default]
    Day,
    Sunset,
    Night,
}

impl TimeOfDay {
    /// 全部时段（按一天中的循环顺序）
    pub const ALL: [TimeOfDay; 4] = [Self::Dawn, Self::Day, Self::Sunset, Self::Night];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dawn => "dawn",
            Self::Day => "day",
            Self::Sunset => "sunset",
            Self::Night => "night",
        }
    }

    /// 循环相邻的两个时段
    ///
    /// dawn↔{night, day}, day↔{dawn, sunset}, sunset↔{day, night}, night↔{sunset, dawn}
    pub fn neighbors(&self) -> [TimeOfDay; 2] {
        match self {
            Self::Dawn => [Self::Night, Self::Day],
            Self::Day => [Self::Dawn, Self::Sunset],
            Self::Sunset => [Self::Day, Self::Night],
            Self::Night => [Self::Sunset, Self::Dawn],
        }
    }

    /// 当前时段加上两个相邻时段（懒加载的初始集合）
    pub fn with_neighbors(&self) -> [TimeOfDay; 3] {
        let [a, b] = self.neighbors();
        [*self, a, b]
    }

    /// 根据挂钟小时数（0-23）推导时段
    ///
    /// dawn 05–08, day 08–17, sunset 17–20, 其余为 night
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=7 => Self::Dawn,
            8..=16 => Self::Day,
            17..=19 => Self::Sunset,
            _ => Self::Night,
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeOfDay {
    type Err = SceneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dawn" => Ok(Self::Dawn),
            "day" => Ok(Self::Day),
            "sunset" => Ok(Self::Sunset),
            "night" => Ok(Self::Night),
            other => Err(SceneError::configuration(format!("未知时段 '{}'", other))),
        }
    }
}

/// 天气
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weather {
    #[default]
    Clear,
    Rain,
    Snow,
    Fog,
    Sun,
    Leaves,
}

impl Weather {
    pub const ALL: [Weather; 6] = [
        Self::Clear,
        Self::Rain,
        Self::Snow,
        Self::Fog,
        Self::Sun,
        Self::Leaves,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clear => "clear",
            Self::Rain => "rain",
            Self::Snow => "snow",
            Self::Fog => "fog",
            Self::Sun => "sun",
            Self::Leaves => "leaves",
        }
    }
}

impl fmt::Display for Weather {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Weather {
    type Err = SceneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Weather::ALL
            .into_iter()
            .find(|w| w.as_str() == s)
            .ok_or_else(|| SceneError::configuration(format!("未知天气 '{}'", s)))
    }
}

/// 季节
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    Spring,
    #[default]
    Summer,
    Fall,
    Winter,
}

impl Season {
    pub const ALL: [Season; 4] = [Self::Spring, Self::Summer, Self::Fall, Self::Winter];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spring => "spring",
            Self::Summer => "summer",
            Self::Fall => "fall",
            Self::Winter => "winter",
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Season {
    type Err = SceneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Season::ALL
            .into_iter()
            .find(|season| season.as_str() == s)
            .ok_or_else(|| SceneError::configuration(format!("未知季节 '{}'", s)))
    }
}

/// 引擎生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    /// 尚未加载
    #[default]
    Idle,
    /// 描述文件 / 图片加载中
    Loading,
    /// 可以播放
    Ready,
    /// 加载失败
    Error,
    /// 已销毁
    Destroyed,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Error => "error",
            Self::Destroyed => "destroyed",
        };
        f.write_str(s)
    }
}

/// 引擎状态的只读快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneSnapshot {
    pub state: EngineState,
    pub time: TimeOfDay,
    pub weather: Weather,
    pub season: Season,
    /// 当前播放的动画
    pub animation: Option<String>,
    /// 角色所在 zone
    pub zone: Option<String>,
    pub paused: bool,
    pub auto_time: bool,
    pub width: f32,
    pub height: f32,
}
