//! # Scene Runtime
//!
//! 分层 2D 场景播放引擎的纯逻辑核心。
//!
//! ## 架构概述
//!
//! `scene-runtime` 不做任何 IO 或绘制，只负责数据模型与状态：
//!
//! ```text
//! scene.json ──► SceneDescriptor ──► (Host) 加载图片 / 合成 / 绘制
//!                      │
//!                      ├── ZoneRegistry：zone -> 像素位置
//!                      └── EventBus<SceneEvent>：对外通知
//! ```
//!
//! ## 模块结构
//!
//! - [`descriptor`]：场景描述文件模型与校验
//! - [`state`]：时段 / 天气 / 季节枚举与状态快照
//! - [`event`]：类型化发布/订阅总线
//! - [`zone`]：zone 注册表
//! - [`error`]：错误类型定义

pub mod descriptor;
pub mod error;
pub mod event;
pub mod state;
pub mod zone;

// 重导出核心类型
pub use descriptor::{
    AnimationDef, DescriptorWarning, EffectDef, EffectKind, InitialState, LayerDef, LayerDepth,
    SUPPORTED_VERSION, SceneDescriptor, SceneMeta, ZoneDef, ZoneKind,
};
pub use error::{SceneError, SceneResult};
pub use event::{
    BusEvent, EventBus, LoadProgress, SceneEvent, SceneEventKind, Subscription, SubscriptionId,
};
pub use state::{EngineState, SceneSnapshot, Season, TimeOfDay, Weather};
pub use zone::{ZonePlacement, ZoneRegistry};
