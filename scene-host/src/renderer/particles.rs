//! # Particle System 模块
//!
//! 固定容量粒子池驱动的天气效果。
//!
//! ## 天气类型
//!
//! | 天气 | 实现 |
//! |------|------|
//! | rain | 池粒子，快速下落，靠近底边时按概率溅起水花子粒子 |
//! | snow | 池粒子，慢速下落 + 正弦摆动 + 旋转 |
//! | leaves | 池粒子，摆动 + 终端速度 + 有限寿命（最后 20% 淡出）+ 季节配色 |
//! | fog | 不使用粒子池，单个全屏 alpha 向目标值缓动 |
//! | sun | 不使用粒子池，少量独立缓动的光束 |
//!
//! ## 背压策略
//!
//! 粒子池满时 `acquire()` 返回 `None`，新粒子直接丢弃，绝不回收旧粒子。
//! 每帧只积分一次，不做子步进。

use std::f32::consts::TAU;

use scene_runtime::{Season, Weather};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::rng::{DEFAULT_SEED, ParticleRng};
use super::{Color, Rect, Surface, rotated_rect};

/// 粒子离开画布多远后回收
pub const RETIRE_MARGIN: f32 = 50.0;

/// 雨滴溅起水花的判定带（距底边）
const SPLASH_BAND: f32 = 24.0;
const SPLASH_CHANCE: f32 = 0.3;

/// 落叶的重力加速度与终端速度（px/s）
const LEAF_GRAVITY: f32 = 40.0;
const LEAF_TERMINAL_SPEED: f32 = 90.0;

/// 水花子粒子的重力
const SPLASH_GRAVITY: f32 = 900.0;

const RAIN_COLOR: Color = Color::rgb(174.0, 194.0, 224.0);
const SNOW_COLOR: Color = Color::WHITE;
const FOG_COLOR: Color = Color::rgb(206.0, 212.0, 222.0);
const SUN_RAY_COLOR: Color = Color::rgb(255.0, 236.0, 179.0);

/// 粒子系统配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleConfig {
    /// 粒子池容量
    pub capacity: usize,
    /// 随机种子
    pub seed: u64,
    /// 雨的生成间隔（毫秒）
    pub rain_interval_ms: f32,
    /// 雪的生成间隔（毫秒）
    pub snow_interval_ms: f32,
    /// 落叶的生成间隔（毫秒）
    pub leaves_interval_ms: f32,
    /// 雾的目标不透明度
    pub fog_opacity: f32,
    /// 雾的缓动速度（每毫秒）
    pub fog_ease_speed: f32,
    /// 光束数量
    pub sun_ray_count: usize,
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            capacity: 300,
            seed: DEFAULT_SEED,
            rain_interval_ms: 8.0,
            snow_interval_ms: 40.0,
            leaves_interval_ms: 250.0,
            fog_opacity: 0.35,
            fog_ease_speed: 0.0015,
            sun_ray_count: 5,
        }
    }
}

impl ParticleConfig {
    /// 天气对应的生成间隔，不使用粒子池的天气返回 `None`
    pub fn spawn_interval(&self, weather: Weather) -> Option<f32> {
        match weather {
            Weather::Rain => Some(self.rain_interval_ms),
            Weather::Snow => Some(self.snow_interval_ms),
            Weather::Leaves => Some(self.leaves_interval_ms),
            Weather::Clear | Weather::Fog | Weather::Sun => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParticleKind {
    #[default]
    Rain,
    Snow,
    Leaf,
    RainSplash,
}

/// 池中的单个粒子
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub x: f32,
    pub y: f32,
    /// 速度（px/s）
    pub vx: f32,
    pub vy: f32,
    pub rotation: f32,
    /// 角速度（rad/s）
    pub rotation_speed: f32,
    pub opacity: f32,
    /// 已存活时间（毫秒）
    pub age: f32,
    /// 最大寿命（毫秒），0 表示只在离开画布时回收
    pub max_age: f32,
    pub active: bool,
    pub color: Color,
    pub kind: ParticleKind,
    pub size: f32,
    /// 摆动相位与幅度（px/s），雪和落叶使用
    pub sway_phase: f32,
    pub sway_amplitude: f32,
    /// 雨滴是否已经溅起过水花
    pub splashed: bool,
}

impl Default for Particle {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            vx: 0.0,
            vy: 0.0,
            rotation: 0.0,
            rotation_speed: 0.0,
            opacity: 1.0,
            age: 0.0,
            max_age: 0.0,
            active: false,
            color: Color::WHITE,
            kind: ParticleKind::default(),
            size: 1.0,
            sway_phase: 0.0,
            sway_amplitude: 0.0,
            splashed: false,
        }
    }
}

/// 阳光光束
#[derive(Debug, Clone, PartialEq)]
pub struct SunRay {
    /// 基准 x（顶部中心）
    pub x: f32,
    pub width: f32,
    pub phase: f32,
    /// 相位速度（rad/ms）
    pub speed: f32,
    pub opacity: f32,
    pub target_opacity: f32,
    /// 不透明度缓动速度（每毫秒）
    pub ease: f32,
}

impl SunRay {
    /// 当前水平偏移
    pub fn sway(&self) -> f32 {
        self.phase.sin() * 30.0
    }
}

pub struct ParticleSystem {
    pool: Vec<Particle>,
    config: ParticleConfig,
    weather: Weather,
    season: Season,
    spawn_timer: f32,
    fog_alpha: f32,
    rays: Vec<SunRay>,
    rng: ParticleRng,
    width: f32,
    height: f32,
    spawn_attempts: u64,
    dropped: u64,
}

impl ParticleSystem {
    pub fn new(config: ParticleConfig, width: f32, height: f32) -> Self {
        Self {
            pool: vec![Particle::default(); config.capacity],
            rng: ParticleRng::new(config.seed),
            config,
            weather: Weather::Clear,
            season: Season::default(),
            spawn_timer: 0.0,
            fog_alpha: 0.0,
            rays: Vec::new(),
            width,
            height,
            spawn_attempts: 0,
            dropped: 0,
        }
    }

    pub fn resize(&mut self, width: f32, height: f32) {
        self.width = width;
        self.height = height;
    }

    /// 切换天气，立即停用所有粒子并重置光束，返回之前的天气
    pub fn set_weather(&mut self, weather: Weather) -> Weather {
        for particle in &mut self.pool {
            particle.active = false;
        }
        self.rays.clear();
        self.spawn_timer = 0.0;

        let previous = std::mem::replace(&mut self.weather, weather);
        debug!(from = %previous, to = %weather, "切换天气");
        previous
    }

    pub fn weather(&self) -> Weather {
        self.weather
    }

    /// 设置季节（决定落叶配色）
    pub fn set_season(&mut self, season: Season) {
        self.season = season;
    }

    pub fn season(&self) -> Season {
        self.season
    }

    /// 取第一个空闲槽位并重置为默认值；池满时返回 `None`
    pub fn acquire(&mut self) -> Option<&mut Particle> {
        let slot = self.pool.iter_mut().find(|p| !p.active)?;
        *slot = Particle {
            active: true,
            ..Particle::default()
        };
        Some(slot)
    }

    pub fn capacity(&self) -> usize {
        self.pool.len()
    }

    pub fn active_count(&self) -> usize {
        self.pool.iter().filter(|p| p.active).count()
    }

    /// 活跃粒子（池顺序）
    pub fn particles(&self) -> impl Iterator<Item = &Particle> {
        self.pool.iter().filter(|p| p.active)
    }

    pub fn rays(&self) -> &[SunRay] {
        &self.rays
    }

    pub fn fog_alpha(&self) -> f32 {
        self.fog_alpha
    }

    /// 累计生成尝试次数
    pub fn spawn_attempts(&self) -> u64 {
        self.spawn_attempts
    }

    /// 因池满被丢弃的粒子数
    pub fn dropped_spawns(&self) -> u64 {
        self.dropped
    }

    pub fn config(&self) -> &ParticleConfig {
        &self.config
    }

    /// 推进一帧：积分现有粒子、生成新粒子、更新雾和光束
    pub fn update(&mut self, dt: f32) {
        let dt = dt.max(0.0);

        self.integrate(dt);

        if let Some(interval) = self.config.spawn_interval(self.weather)
            && interval > 0.0
        {
            self.spawn_timer += dt;
            while self.spawn_timer >= interval {
                self.spawn_timer -= interval;
                self.spawn_attempts += 1;
                match self.weather {
                    Weather::Rain => self.spawn_rain(),
                    Weather::Snow => self.spawn_snow(),
                    Weather::Leaves => self.spawn_leaf(),
                    _ => {}
                }
            }
        }

        let fog_target = if self.weather == Weather::Fog {
            self.config.fog_opacity
        } else {
            0.0
        };
        let factor = (self.config.fog_ease_speed * dt).min(1.0);
        self.fog_alpha += (fog_target - self.fog_alpha) * factor;

        self.update_rays(dt);
    }

    fn integrate(&mut self, dt: f32) {
        let secs = dt / 1000.0;
        let (width, height) = (self.width, self.height);
        let mut splashes = Vec::new();

        for p in self.pool.iter_mut().filter(|p| p.active) {
            p.age += dt;

            match p.kind {
                ParticleKind::Rain => {
                    p.x += p.vx * secs;
                    p.y += p.vy * secs;
                    if !p.splashed && p.y >= height - SPLASH_BAND {
                        p.splashed = true;
                        splashes.push(p.x);
                    }
                }
                ParticleKind::Snow => {
                    let sway = (p.sway_phase + p.age * 0.002).cos() * p.sway_amplitude;
                    p.x += (p.vx + sway) * secs;
                    p.y += p.vy * secs;
                    p.rotation += p.rotation_speed * secs;
                }
                ParticleKind::Leaf => {
                    p.vy = (p.vy + LEAF_GRAVITY * secs).min(LEAF_TERMINAL_SPEED);
                    let sway = (p.sway_phase + p.age * 0.0015).sin() * p.sway_amplitude;
                    p.x += (p.vx + sway) * secs;
                    p.y += p.vy * secs;
                    p.rotation += p.rotation_speed * secs;

                    // 最后 20% 寿命淡出
                    let fade_start = p.max_age * 0.8;
                    if p.max_age > 0.0 && p.age > fade_start {
                        p.opacity = (1.0 - (p.age - fade_start) / (p.max_age - fade_start)).max(0.0);
                    }
                }
                ParticleKind::RainSplash => {
                    p.vy += SPLASH_GRAVITY * secs;
                    p.x += p.vx * secs;
                    p.y += p.vy * secs;
                    if p.max_age > 0.0 {
                        p.opacity = (1.0 - p.age / p.max_age).max(0.0) * 0.6;
                    }
                }
            }

            let off_canvas = p.x < -RETIRE_MARGIN
                || p.x > width + RETIRE_MARGIN
                || p.y < -RETIRE_MARGIN
                || p.y > height + RETIRE_MARGIN;
            let expired = p.max_age > 0.0 && p.age > p.max_age;
            if off_canvas || expired {
                p.active = false;
            }
        }

        for x in splashes {
            if self.rng.chance(SPLASH_CHANCE) {
                self.spawn_splash(x);
            }
        }
    }

    /// 放入粒子；池满时计入丢弃数
    fn emit(&mut self, particle: Particle) {
        match self.acquire() {
            Some(slot) => *slot = particle,
            None => self.dropped += 1,
        }
    }

    fn spawn_rain(&mut self) {
        let particle = Particle {
            kind: ParticleKind::Rain,
            x: self.rng.range(-20.0, self.width + 20.0),
            y: -self.rng.range(0.0, 40.0),
            vx: self.rng.range(-60.0, -20.0),
            vy: self.rng.range(900.0, 1300.0),
            size: self.rng.range(12.0, 22.0),
            opacity: self.rng.range(0.35, 0.6),
            color: RAIN_COLOR,
            active: true,
            ..Particle::default()
        };
        self.emit(particle);
    }

    fn spawn_splash(&mut self, x: f32) {
        let particle = Particle {
            kind: ParticleKind::RainSplash,
            x,
            y: self.height - self.rng.range(2.0, SPLASH_BAND),
            vx: self.rng.range(-50.0, 50.0),
            vy: -self.rng.range(80.0, 160.0),
            size: self.rng.range(1.5, 2.5),
            max_age: self.rng.range(180.0, 320.0),
            opacity: 0.6,
            color: RAIN_COLOR,
            active: true,
            ..Particle::default()
        };
        self.emit(particle);
    }

    fn spawn_snow(&mut self) {
        let particle = Particle {
            kind: ParticleKind::Snow,
            x: self.rng.range(0.0, self.width),
            y: -10.0,
            vx: self.rng.range(-8.0, 8.0),
            vy: self.rng.range(30.0, 80.0),
            size: self.rng.range(2.0, 5.0),
            rotation_speed: self.rng.range(-1.0, 1.0),
            sway_phase: self.rng.range(0.0, TAU),
            sway_amplitude: self.rng.range(10.0, 30.0),
            opacity: self.rng.range(0.6, 1.0),
            color: SNOW_COLOR,
            active: true,
            ..Particle::default()
        };
        self.emit(particle);
    }

    fn spawn_leaf(&mut self) {
        let palette = leaf_palette(self.season);
        let color = palette[self.rng.index(palette.len())];
        let particle = Particle {
            kind: ParticleKind::Leaf,
            x: self.rng.range(0.0, self.width),
            y: -20.0,
            vx: self.rng.range(-15.0, 15.0),
            vy: self.rng.range(20.0, 50.0),
            size: self.rng.range(6.0, 10.0),
            rotation: self.rng.range(0.0, TAU),
            rotation_speed: self.rng.range(-2.0, 2.0),
            sway_phase: self.rng.range(0.0, TAU),
            sway_amplitude: self.rng.range(30.0, 60.0),
            max_age: self.rng.range(6000.0, 10000.0),
            opacity: 1.0,
            color,
            active: true,
            ..Particle::default()
        };
        self.emit(particle);
    }

    fn update_rays(&mut self, dt: f32) {
        if self.weather != Weather::Sun {
            return;
        }

        if self.rays.is_empty() {
            for _ in 0..self.config.sun_ray_count {
                let ray = SunRay {
                    x: self.rng.range(self.width * 0.1, self.width * 0.9),
                    width: self.rng.range(40.0, 120.0),
                    phase: self.rng.range(0.0, TAU),
                    speed: self.rng.range(0.0003, 0.0008),
                    opacity: 0.0,
                    target_opacity: self.rng.range(0.08, 0.2),
                    ease: self.rng.range(0.0005, 0.0015),
                };
                self.rays.push(ray);
            }
        }

        for ray in &mut self.rays {
            ray.phase = (ray.phase + ray.speed * dt) % TAU;
            ray.opacity += (ray.target_opacity - ray.opacity) * (ray.ease * dt).min(1.0);
            if (ray.target_opacity - ray.opacity).abs() < 0.005 {
                ray.target_opacity = self.rng.range(0.05, 0.2);
            }
        }
    }

    /// 绘制顺序：光束 -> 池粒子（池顺序）-> 雾
    pub fn draw(&self, surface: &mut dyn Surface) {
        let height = surface.height();

        for ray in &self.rays {
            let top = ray.x + ray.sway();
            // 光束从顶部向左下方倾斜展开
            let bottom = top - height * 0.35;
            surface.fill_polygon(
                &[
                    (top - ray.width * 0.3, 0.0),
                    (top + ray.width * 0.3, 0.0),
                    (bottom + ray.width, height),
                    (bottom - ray.width * 0.2, height),
                ],
                SUN_RAY_COLOR.with_alpha(ray.opacity),
            );
        }

        for p in self.particles() {
            let color = p.color.with_alpha(p.opacity);
            match p.kind {
                ParticleKind::Rain => {
                    // 沿速度方向的细长条
                    let angle = p.vx.atan2(p.vy);
                    let cx = p.x - angle.sin() * p.size / 2.0;
                    let cy = p.y - angle.cos() * p.size / 2.0;
                    surface.fill_polygon(&rotated_rect(cx, cy, 1.2, p.size, -angle), color);
                }
                ParticleKind::Snow | ParticleKind::RainSplash => {
                    surface.fill_ellipse(p.x, p.y, p.size, p.size, color);
                }
                ParticleKind::Leaf => {
                    surface.fill_polygon(
                        &rotated_rect(p.x, p.y, p.size, p.size * 0.55, p.rotation),
                        color,
                    );
                }
            }
        }

        if self.fog_alpha > 0.005 {
            surface.fill_rect(
                Rect::from_size(surface.width(), surface.height()),
                FOG_COLOR.with_alpha(self.fog_alpha),
            );
        }
    }
}

/// 季节落叶配色
fn leaf_palette(season: Season) -> &'static [Color] {
    const SPRING: [Color; 3] = [
        Color::rgb(255.0, 183.0, 197.0),
        Color::rgb(255.0, 214.0, 222.0),
        Color::rgb(150.0, 205.0, 120.0),
    ];
    const SUMMER: [Color; 3] = [
        Color::rgb(76.0, 153.0, 0.0),
        Color::rgb(102.0, 178.0, 51.0),
        Color::rgb(60.0, 130.0, 40.0),
    ];
    const FALL: [Color; 4] = [
        Color::rgb(210.0, 105.0, 30.0),
        Color::rgb(200.0, 60.0, 30.0),
        Color::rgb(230.0, 160.0, 40.0),
        Color::rgb(160.0, 82.0, 45.0),
    ];
    const WINTER: [Color; 3] = [
        Color::rgb(150.0, 120.0, 90.0),
        Color::rgb(170.0, 160.0, 150.0),
        Color::rgb(120.0, 100.0, 80.0),
    ];

    match season {
        Season::Spring => &SPRING,
        Season::Summer => &SUMMER,
        Season::Fall => &FALL,
        Season::Winter => &WINTER,
    }
}
