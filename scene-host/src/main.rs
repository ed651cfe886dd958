//! # Scene Host
//!
//! headless 场景播放器：按固定帧率驱动引擎，把最后一帧写成 PNG。
//!
//! ## 用法
//!
//! ```bash
//! cargo run -p scene-host -- --descriptor scene.json --frames 120 --output frame.png
//! cargo run -p scene-host -- --config player.json --time night --weather rain
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use scene_host::{
    CrossfadeOptions, PlayerConfig, SceneEngine, SoftwareSurface, TimeOptions, TransitionOptions,
};
use scene_runtime::{EngineState, SceneEvent, SceneEventKind};
use tracing::{info, warn};

/// 等待场景加载的最长时间
const LOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "scene-host")]
#[command(about = "分层场景播放器 - headless 渲染场景并导出 PNG")]
#[command(version)]
struct Cli {
    /// 配置文件（默认：player.json）
    #[arg(short, long, default_value = "player.json")]
    config: PathBuf,

    /// 描述文件路径（覆盖配置）
    #[arg(short, long)]
    descriptor: Option<String>,

    /// 渲染帧数
    #[arg(long, default_value = "60")]
    frames: u32,

    /// 帧率
    #[arg(long, default_value = "60")]
    fps: f32,

    /// 加载完成后切换的时段
    #[arg(long)]
    time: Option<String>,

    /// 加载完成后切换的天气
    #[arg(long)]
    weather: Option<String>,

    /// 加载完成后切换的季节
    #[arg(long)]
    season: Option<String>,

    /// 加载完成后播放的动画
    #[arg(long)]
    animation: Option<String>,

    /// 从当前动画过渡到的动画（在 --animation 之后执行）
    #[arg(long)]
    transition_to: Option<String>,

    /// 懒加载时段资源
    #[arg(long)]
    lazy: bool,

    /// 输出 PNG（默认：frame.png）
    #[arg(short, long, default_value = "frame.png")]
    output: PathBuf,

    /// 输出调试日志
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = PlayerConfig::load(&cli.config);
    if let Some(descriptor) = &cli.descriptor {
        config.descriptor = descriptor.clone();
    }
    if cli.lazy {
        config.engine.lazy_load = true;
    }
    config.validate().context("配置无效")?;

    let source = config.build_source().context("无法创建资源来源")?;
    let surface = SoftwareSurface::new(config.canvas.width, config.canvas.height);
    let descriptor = config.descriptor.clone();
    let mut engine = SceneEngine::new(surface, source, config);

    let _progress = engine.on(SceneEventKind::LoadProgress, |event| {
        if let SceneEvent::LoadProgress(p) = event {
            info!(loaded = p.loaded, total = p.total, percent = p.percent, "加载进度");
        }
    });

    engine.load(&descriptor).context("无法开始加载")?;
    if !engine.finish_loading(LOAD_TIMEOUT) {
        bail!("场景加载超时: {}", descriptor);
    }
    if engine.engine_state() == EngineState::Error {
        let reason = engine
            .last_error()
            .map(ToString::to_string)
            .unwrap_or_default();
        bail!("场景加载失败: {}", reason);
    }

    let defaults = engine.config().engine.clone();

    if let Some(time) = &cli.time
        && !engine.set_time(
            time,
            TimeOptions {
                duration_ms: defaults.default_time_fade_ms,
            },
        )
    {
        warn!(time = %time, "时段无效，保持初始时段");
    }
    if let Some(weather) = &cli.weather
        && !engine.set_weather(weather)
    {
        warn!(weather = %weather, "天气无效，保持初始天气");
    }
    if let Some(season) = &cli.season
        && !engine.set_season(season)
    {
        warn!(season = %season, "季节无效，保持初始季节");
    }
    if let Some(animation) = &cli.animation
        && !engine.play_animation(
            animation,
            CrossfadeOptions {
                duration_ms: defaults.default_crossfade_ms,
            },
        )
    {
        warn!(animation = %animation, "动画无效，保持当前动画");
    }
    if let Some(to) = &cli.transition_to {
        let from = engine.state().animation.unwrap_or_else(|| to.clone());
        let options = TransitionOptions {
            duration_ms: defaults.default_transition_ms,
        };
        if !engine.transition(&from, to, options) {
            warn!(from = %from, to = %to, "动画过渡无效，保持当前动画");
        }
    }
    // 懒加载的时段资源需要先到达
    if !engine.finish_loading(LOAD_TIMEOUT) {
        warn!("时段资源加载超时，继续渲染");
    }

    let frame_ms = 1000.0 / f64::from(cli.fps.max(1.0));
    for frame in 0..=cli.frames {
        engine.on_frame(f64::from(frame) * frame_ms);
    }

    engine
        .surface()
        .save_png(&cli.output)
        .with_context(|| format!("无法写入 {:?}", cli.output))?;
    info!(
        output = ?cli.output,
        frames = cli.frames,
        cache = %engine.cache_stats().format(),
        "渲染完成"
    );

    engine.destroy();
    Ok(())
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}
