//! # Engine 模块
//!
//! 场景播放的总调度：持有所有子系统，负责加载、对外控制接口与逐帧驱动。
//!
//! ## 执行模型
//!
//! - 宿主的帧循环是唯一驱动者，每帧调用一次 [`SceneEngine::on_frame`]
//! - 资源读取在后台线程进行，结果经 channel 送回，只在 `on_frame` 中应用
//! - 所有子系统状态只在渲染线程上修改，因此不需要任何锁
//!
//! ## 公共接口
//!
//! setter 接受字符串并对照允许值校验：非法值记录警告、保持原状态、返回 `false`，
//! 从不 panic。

mod clock;
mod frame;
mod loading;

pub use clock::{FixedClock, LocalClock, WallClock};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};
use scene_runtime::{
    EngineState, EventBus, LayerDepth, SceneError, SceneEvent, SceneEventKind, SceneResult,
    SceneSnapshot, Season, Subscription, SubscriptionId, TimeOfDay, Weather, ZoneRegistry,
};
use tracing::{debug, error, info, warn};

use crate::config::PlayerConfig;
use crate::renderer::{
    AnimatorEvent, CharacterAnimator, ClipSpec, CrossfadeOptions, LayerCompositor,
    LightingOverlay, ParticleSystem, Surface, TransitionOptions,
};
use crate::resources::{
    AssetLoader, AssetSource, CacheStats, ImageHandle, LoadedScene, LoaderOptions, TimeAssets,
};
use loading::LoadMessage;

/// `set_time()` 选项
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeOptions {
    /// 图层淡入淡出时长，默认 2000ms
    pub duration_ms: f32,
}

impl Default for TimeOptions {
    fn default() -> Self {
        Self {
            duration_ms: 2000.0,
        }
    }
}

/// 场景播放引擎
pub struct SceneEngine<S: Surface> {
    config: PlayerConfig,
    loader: AssetLoader,
    surface: S,
    clock: Box<dyn WallClock>,
    bus: EventBus<SceneEvent>,

    state: EngineState,
    scene: Option<LoadedScene>,
    last_error: Option<SceneError>,

    // 子系统
    compositor: LayerCompositor,
    animator: CharacterAnimator,
    particles: ParticleSystem,
    lighting: LightingOverlay,
    zones: ZoneRegistry,

    time: TimeOfDay,
    weather: Weather,
    season: Season,
    /// 角色所在 zone，`None` 时使用默认位置
    character_zone: Option<String>,

    /// 帧回调是否仍在宿主调度器上
    registered: bool,
    paused: bool,
    last_timestamp: Option<f64>,
    auto_time: bool,
    /// 下一次自动昼夜评估的时间戳（宿主时间），第一帧到来前为 `None`
    auto_time_due: Option<f64>,

    /// 后台结果通道；销毁时丢弃
    inbox: Option<Receiver<LoadMessage>>,
    outbox: Option<Sender<LoadMessage>>,
    /// 正在懒加载的时段 -> 到达后使用的淡入时长
    pending_times: HashMap<TimeOfDay, f32>,
}

impl<S: Surface> SceneEngine<S> {
    pub fn new(surface: S, source: Arc<dyn AssetSource>, config: PlayerConfig) -> Self {
        let initial = TimeOfDay::default();
        let particles =
            ParticleSystem::new(config.particles.clone(), surface.width(), surface.height());

        Self {
            loader: AssetLoader::new(source),
            surface,
            clock: Box::new(LocalClock),
            bus: EventBus::new(),
            state: EngineState::Idle,
            scene: None,
            last_error: None,
            compositor: LayerCompositor::new(initial)
                .with_easing(config.engine.time_fade_easing),
            animator: CharacterAnimator::new(),
            particles,
            lighting: LightingOverlay::new(initial),
            zones: ZoneRegistry::new(),
            time: initial,
            weather: Weather::default(),
            season: Season::default(),
            character_zone: None,
            registered: false,
            paused: false,
            last_timestamp: None,
            auto_time: false,
            auto_time_due: None,
            inbox: None,
            outbox: None,
            pending_times: HashMap::new(),
            config,
        }
    }

    /// 替换挂钟（自动昼夜使用）
    pub fn with_clock(mut self, clock: impl WallClock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    // ===== 加载 =====

    /// 开始加载场景
    ///
    /// 立即返回；读取在后台进行，结果在之后的 `on_frame` 中应用。
    /// 再次调用会作废上一次尚未完成的加载。
    pub fn load(&mut self, descriptor_url: &str) -> SceneResult<()> {
        if self.state == EngineState::Destroyed {
            return Err(SceneError::configuration("引擎已销毁，无法加载"));
        }

        let (outbox, inbox) = unbounded();
        let options = LoaderOptions {
            lazy: self.config.engine.lazy_load,
        };
        let spawned = loading::spawn_scene_load(
            self.loader.clone(),
            descriptor_url.to_string(),
            options,
            outbox.clone(),
        );
        if let Err(e) = spawned {
            error!(url = %descriptor_url, error = %e, "无法开始加载");
            self.fail(e.clone());
            return Err(e);
        }

        self.inbox = Some(inbox);
        self.outbox = Some(outbox);
        self.pending_times.clear();
        self.last_error = None;
        self.registered = true;
        self.last_timestamp = None;
        self.set_state(EngineState::Loading);
        Ok(())
    }

    /// 阻塞等待进行中的加载（包括懒加载的时段）完成
    ///
    /// 返回 `false` 表示超时仍未完成。供 headless 宿主与测试使用。
    pub fn finish_loading(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.drain_inbox();

        while self.is_busy() {
            let Some(inbox) = self.inbox.as_ref() else {
                break;
            };
            let remaining = deadline.saturating_duration_since(Instant::now());
            match inbox.recv_timeout(remaining) {
                Ok(message) => self.apply_message(message),
                Err(_) => break,
            }
        }

        !self.is_busy()
    }

    fn is_busy(&self) -> bool {
        self.state == EngineState::Loading || !self.pending_times.is_empty()
    }

    fn drain_inbox(&mut self) {
        loop {
            let Some(message) = self.inbox.as_ref().and_then(|rx| rx.try_recv().ok()) else {
                break;
            };
            self.apply_message(message);
        }
    }

    fn apply_message(&mut self, message: LoadMessage) {
        match message {
            LoadMessage::Progress(progress) => {
                if self.state == EngineState::Loading {
                    self.bus.emit(&SceneEvent::LoadProgress(progress));
                }
            }
            LoadMessage::Loaded(scene) => {
                if self.state == EngineState::Loading {
                    self.hydrate(*scene);
                }
            }
            LoadMessage::Failed(e) => {
                if self.state == EngineState::Loading {
                    error!(error = %e, "场景加载失败");
                    self.fail(e);
                }
            }
            LoadMessage::TimeAssets(assets) => self.apply_time_assets(assets),
        }
    }

    fn fail(&mut self, e: SceneError) {
        self.last_error = Some(e);
        self.set_state(EngineState::Error);
    }

    /// 用加载结果初始化所有子系统
    fn hydrate(&mut self, scene: LoadedScene) {
        let descriptor = Arc::clone(&scene.descriptor);
        let initial = &descriptor.initial;

        self.zones.clear();
        for zone in &descriptor.zones {
            self.zones.register(zone.clone());
        }
        self.character_zone = self.zones.default_character_zone().map(str::to_string);

        self.compositor.clear();
        self.compositor.set_time(initial.time);
        for (index, layer) in descriptor.layers.iter().enumerate() {
            let Some(depth) = layer.depth() else {
                continue;
            };
            self.compositor.set_parallax(depth, layer.parallax_factor);
            for time in scene.hydrated_times() {
                if let Some(image) = scene.layer_image(index, time) {
                    self.compositor.add_layer(depth, time, image.clone());
                }
            }
        }

        self.animator.clear();
        for clip in &descriptor.animations {
            match scene.sprite_sheet(&clip.name) {
                Some(sheet) => {
                    self.animator
                        .add_animation(&clip.name, sheet.clone(), ClipSpec::from(clip));
                }
                None => warn!(animation = %clip.name, "精灵图缺失，动画不可用"),
            }
        }

        self.time = initial.time;
        self.weather = initial.weather;
        self.season = initial.season;
        self.particles.set_weather(initial.weather);
        self.particles.set_season(initial.season);
        self.lighting.set_immediate(initial.time.as_str());

        self.scene = Some(scene);
        info!(
            name = %descriptor.meta.name,
            layers = descriptor.layers.len(),
            zones = self.zones.len(),
            animations = descriptor.animations.len(),
            "场景就绪"
        );
        self.set_state(EngineState::Ready);
        self.bus
            .emit(&SceneEvent::Load(Box::new((*descriptor).clone())));

        if let Some(name) = &initial.animation {
            self.animator.play(
                name,
                CrossfadeOptions {
                    duration_ms: self.config.engine.default_crossfade_ms,
                },
            );
            self.flush_animator_events();
        }
    }

    /// 合并懒加载到的时段图片，必要时开始淡入
    fn apply_time_assets(&mut self, assets: TimeAssets) {
        let Some(scene) = self.scene.as_mut() else {
            return;
        };

        let time = assets.time;
        for (index, image) in &assets.images {
            if let Some(depth) = scene.descriptor.layers.get(*index).and_then(|l| l.depth()) {
                self.compositor.add_layer(depth, time, image.clone());
            }
        }
        let added = scene.apply_time_assets(assets);
        debug!(time = %time, images = added, "时段资源已到达");

        if let Some(duration) = self.pending_times.remove(&time)
            && self.time == time
        {
            self.compositor.transition_to(time, duration);
        }
    }

    // ===== 控制接口 =====

    /// 切换时段
    pub fn set_time(&mut self, time: &str, options: TimeOptions) -> bool {
        if !self.check_alive("set_time") {
            return false;
        }
        match time.parse::<TimeOfDay>() {
            Ok(time) => {
                self.apply_time(time, options.duration_ms);
                true
            }
            Err(e) => {
                warn!(value = %time, error = %e, "忽略非法时段");
                false
            }
        }
    }

    fn apply_time(&mut self, time: TimeOfDay, duration_ms: f32) {
        if time == self.time {
            return;
        }

        let old = std::mem::replace(&mut self.time, time);
        self.lighting
            .set_time(time.as_str(), self.config.lighting.ease_speed);

        let needs_fetch = self
            .scene
            .as_ref()
            .is_some_and(|scene| !scene.is_time_hydrated(time));
        if needs_fetch {
            self.request_time_assets(time, duration_ms);
        } else {
            self.compositor.transition_to(time, duration_ms);
        }

        debug!(from = %old, to = %time, "时段切换");
        self.bus.emit(&SceneEvent::TimeChange { new: time, old });
    }

    /// 后台读取某时段的图层图片，到达后再淡入
    fn request_time_assets(&mut self, time: TimeOfDay, duration_ms: f32) {
        if self.pending_times.insert(time, duration_ms).is_some() {
            return;
        }
        let (Some(scene), Some(outbox)) = (self.scene.as_ref(), self.outbox.as_ref()) else {
            self.pending_times.remove(&time);
            return;
        };

        debug!(time = %time, "请求懒加载时段资源");
        let result = loading::spawn_time_fetch(
            self.loader.clone(),
            scene.descriptor_url.clone(),
            Arc::clone(&scene.descriptor),
            time,
            outbox.clone(),
        );
        if let Err(e) = result {
            warn!(time = %time, error = %e, "无法懒加载时段资源，直接切换");
            self.pending_times.remove(&time);
            self.compositor.transition_to(time, duration_ms);
        }
    }

    /// 切换天气
    pub fn set_weather(&mut self, weather: &str) -> bool {
        if !self.check_alive("set_weather") {
            return false;
        }
        match weather.parse::<Weather>() {
            Ok(weather) => {
                let old = self.particles.set_weather(weather);
                self.weather = weather;
                self.bus.emit(&SceneEvent::WeatherChange { new: weather, old });
                true
            }
            Err(e) => {
                warn!(value = %weather, error = %e, "忽略非法天气");
                false
            }
        }
    }

    /// 切换季节
    pub fn set_season(&mut self, season: &str) -> bool {
        if !self.check_alive("set_season") {
            return false;
        }
        match season.parse::<Season>() {
            Ok(season) => {
                self.particles.set_season(season);
                self.season = season;
                self.bus.emit(&SceneEvent::SeasonChange(season));
                true
            }
            Err(e) => {
                warn!(value = %season, error = %e, "忽略非法季节");
                false
            }
        }
    }

    /// 播放动画（从当前片段交叉淡入）
    ///
    /// 该动画已在播放且未结束时不做任何事，仍返回 `true`。
    pub fn play_animation(&mut self, name: &str, options: CrossfadeOptions) -> bool {
        if !self.check_alive("play_animation") {
            return false;
        }
        if !self.animator.has_animation(name) {
            warn!(animation = %name, "忽略未注册的动画");
            return false;
        }
        self.animator.play(name, options);
        self.flush_animator_events();
        true
    }

    /// 确保 `from` 正在播放，下一帧切换到 `to`
    pub fn transition(&mut self, from: &str, to: &str, options: TransitionOptions) -> bool {
        if !self.check_alive("transition") {
            return false;
        }
        for name in [from, to] {
            if !self.animator.has_animation(name) {
                warn!(animation = %name, "忽略未注册的动画");
                return false;
            }
        }
        let lead_in = CrossfadeOptions {
            duration_ms: self.config.engine.default_crossfade_ms,
        };
        let accepted = self.animator.transition(from, to, lead_in, options);
        self.flush_animator_events();
        accepted
    }

    /// 把角色移到某个 zone 并播放动画
    pub fn set_zone_animation(&mut self, zone: &str, animation: &str) -> bool {
        if !self.check_alive("set_zone_animation") {
            return false;
        }
        if !self.zones.get(zone).is_some_and(|z| z.visible) {
            warn!(zone = %zone, "忽略未注册或已隐藏的 zone");
            return false;
        }
        if !self.animator.has_animation(animation) {
            warn!(animation = %animation, "忽略未注册的动画");
            return false;
        }

        self.character_zone = Some(zone.to_string());
        self.animator.play(
            animation,
            CrossfadeOptions {
                duration_ms: self.config.engine.default_crossfade_ms,
            },
        );
        self.flush_animator_events();
        true
    }

    /// 暂停更新与绘制（帧回调保持注册）
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// 恢复播放，下一帧的 dt 从 0 开始
    pub fn resume(&mut self) {
        self.paused = false;
        self.last_timestamp = None;
    }

    /// 开关自动昼夜
    ///
    /// 开启时立即按挂钟小时切换，之后每隔 `auto_time_interval_ms`（按 `on_frame` 的时间戳计）重新评估一次。
    pub fn set_auto_time(&mut self, enabled: bool) {
        if !self.check_alive("set_auto_time") {
            return;
        }
        self.auto_time = enabled;
        self.auto_time_due = None;
        if enabled {
            self.apply_auto_time();
        }
    }

    fn apply_auto_time(&mut self) {
        let hour = self.clock.hour();
        let time = TimeOfDay::from_hour(hour);
        debug!(hour, time = %time, "自动昼夜");
        self.apply_time(time, self.config.engine.default_time_fade_ms);
    }

    /// 订阅事件
    pub fn on(
        &self,
        kind: SceneEventKind,
        handler: impl Fn(&SceneEvent) + 'static,
    ) -> Subscription<SceneEvent> {
        self.bus.on(kind, handler)
    }

    /// 取消订阅
    pub fn off(&self, kind: SceneEventKind, id: SubscriptionId) -> bool {
        self.bus.off(kind, id)
    }

    /// 当前状态快照
    pub fn state(&self) -> SceneSnapshot {
        SceneSnapshot {
            state: self.state,
            time: self.time,
            weather: self.weather,
            season: self.season,
            animation: self.animator.current_animation().map(str::to_string),
            zone: self.character_zone.clone(),
            paused: self.paused,
            auto_time: self.auto_time,
            width: self.surface.width(),
            height: self.surface.height(),
        }
    }

    /// 调整画布尺寸
    pub fn resize(&mut self, width: u32, height: u32) {
        self.surface.resize(width, height);
        self.particles
            .resize(self.surface.width(), self.surface.height());
    }

    /// 销毁引擎
    ///
    /// 注销帧回调、停止自动昼夜、清空订阅并作废所有未完成的读取。可重复调用。
    pub fn destroy(&mut self) {
        if self.state == EngineState::Destroyed {
            return;
        }

        self.registered = false;
        self.auto_time = false;
        self.auto_time_due = None;
        self.inbox = None;
        self.outbox = None;
        self.pending_times.clear();
        self.set_state(EngineState::Destroyed);
        self.bus.clear();
        info!("引擎已销毁");
    }

    fn set_state(&mut self, state: EngineState) {
        if self.state == state {
            return;
        }
        debug!(from = %self.state, to = %state, "引擎状态变化");
        self.state = state;
        self.bus.emit(&SceneEvent::StateChange { state });
    }

    fn check_alive(&self, operation: &str) -> bool {
        if self.state == EngineState::Destroyed {
            warn!(operation, "引擎已销毁，忽略调用");
            return false;
        }
        true
    }

    fn flush_animator_events(&mut self) {
        let events = self.animator.take_events();
        self.emit_animator_events(events);
    }

    fn emit_animator_events(&self, events: Vec<AnimatorEvent>) {
        for event in events {
            let event = match event {
                AnimatorEvent::Started(name) => SceneEvent::AnimationStart(name),
                AnimatorEvent::Completed(name) => SceneEvent::AnimationComplete(name),
            };
            self.bus.emit(&event);
        }
    }

    // ===== 访问器 =====

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn engine_state(&self) -> EngineState {
        self.state
    }

    /// 最近一次加载失败的原因
    pub fn last_error(&self) -> Option<&SceneError> {
        self.last_error.as_ref()
    }

    /// 帧回调是否已注册
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    pub fn scene(&self) -> Option<&LoadedScene> {
        self.scene.as_ref()
    }

    /// 特效精灵图
    pub fn effect_sheet(&self, id: &str) -> Option<&ImageHandle> {
        self.scene.as_ref()?.effect_sheet(id)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.loader.cache_stats()
    }

    pub fn compositor(&self) -> &LayerCompositor {
        &self.compositor
    }

    pub fn animator(&self) -> &CharacterAnimator {
        &self.animator
    }

    pub fn particles(&self) -> &ParticleSystem {
        &self.particles
    }

    pub fn lighting(&self) -> &LightingOverlay {
        &self.lighting
    }

    pub fn zones(&self) -> &ZoneRegistry {
        &self.zones
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    /// 某个深度当前是否有可绘制的图层
    pub fn has_layer(&self, depth: LayerDepth) -> bool {
        self.compositor.has_image(depth, self.compositor.current_time())
    }
}

impl<S: Surface> std::fmt::Debug for SceneEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneEngine")
            .field("state", &self.state)
            .field("time", &self.time)
            .field("weather", &self.weather)
            .field("season", &self.season)
            .field("paused", &self.paused)
            .field("registered", &self.registered)
            .finish()
    }
}
