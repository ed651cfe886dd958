//! # Host 层
//!
//! 分层 2D 场景播放引擎的宿主层实现。
//!
//! ## 架构说明
//!
//! Host 层负责：
//! - 资源读取与缓存（文件系统 / ZIP / 内嵌 data URI）
//! - 绘制抽象与各个场景子系统（图层、角色动画、粒子、光照）
//! - 逐帧调度与对外控制接口（[`SceneEngine`]）
//!
//! 描述文件模型、事件总线、zone 注册表等纯逻辑位于 `scene-runtime`。

pub mod config;
pub mod engine;
pub mod renderer;
pub mod resources;

pub use config::{
    AssetSourceType, CanvasConfig, ConfigError, EngineConfig, LightingConfig, PlayerConfig,
};
pub use engine::{FixedClock, LocalClock, SceneEngine, TimeOptions, WallClock};
pub use renderer::{
    CharacterAnimator, Color, CrossfadeOptions, DrawCall, LayerCompositor, LightingOverlay,
    ParticleConfig, ParticleSystem, Rect, RecordingSurface, SoftwareSurface, Surface,
    TransitionOptions,
};
pub use resources::{
    AssetLoader, AssetSource, CacheStats, FsSource, ImageHandle, LoadedScene, LoaderOptions,
    MemorySource, ResourceError, ZipSource,
};
