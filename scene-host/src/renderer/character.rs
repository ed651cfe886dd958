//! # Character Animator 模块
//!
//! 精灵图动画的播放状态机。
//!
//! ## 状态
//!
//! ```text
//! Idle ──play──► Playing(name, frame, fading)
//!                   │  每 1000/fps 毫秒前进一帧
//!                   │  循环片段：末帧后回到 0
//!                   └─ 非循环片段到达末帧 ──► Finished(name)（直到下一次 play）
//! ```
//!
//! 片段切换时从上一个片段"最后绘制的帧"交叉淡入，同一时间最多一个交叉淡入。

use std::collections::HashMap;

use scene_runtime::AnimationDef;
use tracing::{debug, warn};

use super::{Rect, Surface};
use crate::resources::ImageHandle;

/// 片段参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipSpec {
    pub frame_width: u32,
    pub frame_height: u32,
    pub frame_count: u32,
    pub fps: f32,
    pub looping: bool,
}

impl ClipSpec {
    /// 每帧时长（毫秒）
    pub fn frame_interval(&self) -> f32 {
        1000.0 / self.fps
    }

    fn is_valid(&self) -> bool {
        self.frame_count > 0 && self.fps > 0.0 && self.fps.is_finite()
    }
}

impl From<&AnimationDef> for ClipSpec {
    fn from(def: &AnimationDef) -> Self {
        Self {
            frame_width: def.frame_width,
            frame_height: def.frame_height,
            frame_count: def.frame_count,
            fps: def.fps,
            looping: def.looping,
        }
    }
}

/// `play()` 选项
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossfadeOptions {
    /// 交叉淡入时长，默认 300ms
    pub duration_ms: f32,
}

impl Default for CrossfadeOptions {
    fn default() -> Self {
        Self { duration_ms: 300.0 }
    }
}

/// `transition()` 选项
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionOptions {
    /// 交叉淡入时长，默认 500ms
    pub duration_ms: f32,
}

impl Default for TransitionOptions {
    fn default() -> Self {
        Self { duration_ms: 500.0 }
    }
}

/// 动画通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnimatorEvent {
    Started(String),
    Completed(String),
}

/// 对外暴露的状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnimatorState {
    Idle,
    Playing {
        name: String,
        frame: u32,
        fading: bool,
    },
    Finished {
        name: String,
    },
}

struct Clip {
    sheet: ImageHandle,
    spec: ClipSpec,
}

#[derive(Debug, Clone)]
struct Playback {
    name: String,
    frame: u32,
    /// 当前帧已累计的时间
    elapsed: f32,
    finished: bool,
}

#[derive(Debug, Clone)]
struct Crossfade {
    /// 淡出的片段及其定格帧
    from: String,
    frame: u32,
    elapsed: f32,
    duration: f32,
    progress: f32,
}

#[derive(Debug, Clone)]
struct QueuedTransition {
    to: String,
    duration_ms: f32,
}

#[derive(Default)]
pub struct CharacterAnimator {
    clips: HashMap<String, Clip>,
    current: Option<Playback>,
    crossfade: Option<Crossfade>,
    queued: Option<QueuedTransition>,
    /// 尚未取走的通知
    pending: Vec<AnimatorEvent>,
}

impl CharacterAnimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册片段
    ///
    /// `frame_count == 0` 或 `fps <= 0` 的片段无法播放，拒绝注册。
    pub fn add_animation(&mut self, name: &str, sheet: ImageHandle, spec: ClipSpec) -> bool {
        if !spec.is_valid() {
            warn!(
                animation = %name,
                frame_count = spec.frame_count,
                fps = spec.fps,
                "动画片段参数无效，忽略"
            );
            return false;
        }
        self.clips.insert(name.to_string(), Clip { sheet, spec });
        true
    }

    pub fn has_animation(&self, name: &str) -> bool {
        self.clips.contains_key(name)
    }

    pub fn clip_spec(&self, name: &str) -> Option<ClipSpec> {
        self.clips.get(name).map(|c| c.spec)
    }

    /// 切换到指定片段
    ///
    /// - 未注册的名称：警告并忽略，返回 `false`
    /// - 已在播放且未结束：不做任何事，返回 `false`
    pub fn play(&mut self, name: &str, options: CrossfadeOptions) -> bool {
        if !self.clips.contains_key(name) {
            warn!(animation = %name, "动画未注册，忽略播放请求");
            return false;
        }

        if let Some(current) = &self.current
            && current.name == name
            && !current.finished
        {
            return false;
        }

        self.crossfade = match self.current.take() {
            Some(previous) if options.duration_ms > 0.0 => Some(Crossfade {
                from: previous.name,
                frame: previous.frame,
                elapsed: 0.0,
                duration: options.duration_ms,
                progress: 0.0,
            }),
            _ => None,
        };

        self.current = Some(Playback {
            name: name.to_string(),
            frame: 0,
            elapsed: 0.0,
            finished: false,
        });
        debug!(animation = %name, crossfade_ms = options.duration_ms, "开始播放动画");
        self.pending.push(AnimatorEvent::Started(name.to_string()));
        true
    }

    /// 确保 `from` 正在播放，并在下一次 `update` 开始时切换到 `to`
    ///
    /// `from` 不是当前片段时按 `lead_in` 交叉淡入。
    pub fn transition(
        &mut self,
        from: &str,
        to: &str,
        lead_in: CrossfadeOptions,
        options: TransitionOptions,
    ) -> bool {
        for name in [from, to] {
            if !self.clips.contains_key(name) {
                warn!(animation = %name, "动画未注册，忽略过渡请求");
                return false;
            }
        }

        self.play(from, lead_in);
        self.queued = Some(QueuedTransition {
            to: to.to_string(),
            duration_ms: options.duration_ms,
        });
        true
    }

    /// 推进时间；产生的通知留在队列里，由 [`take_events`](Self::take_events) 取走
    pub fn update(&mut self, dt: f32) {
        let dt = dt.max(0.0);

        if let Some(queued) = self.queued.take() {
            self.play(
                &queued.to,
                CrossfadeOptions {
                    duration_ms: queued.duration_ms,
                },
            );
        }

        if let Some(playback) = self.current.as_mut()
            && !playback.finished
            && let Some(clip) = self.clips.get(&playback.name)
        {
            let interval = clip.spec.frame_interval();
            playback.elapsed += dt;
            while playback.elapsed >= interval {
                playback.elapsed -= interval;
                playback.frame += 1;
                if playback.frame >= clip.spec.frame_count {
                    if clip.spec.looping {
                        playback.frame = 0;
                    } else {
                        playback.frame = clip.spec.frame_count - 1;
                        playback.finished = true;
                        playback.elapsed = 0.0;
                        self.pending
                            .push(AnimatorEvent::Completed(playback.name.clone()));
                        break;
                    }
                }
            }
        }

        if let Some(fade) = self.crossfade.as_mut() {
            fade.elapsed += dt;
            fade.progress = (fade.elapsed / fade.duration).min(1.0);
            if fade.progress >= 1.0 {
                self.crossfade = None;
            }
        }
    }

    /// 取走尚未处理的通知
    pub fn take_events(&mut self) -> Vec<AnimatorEvent> {
        std::mem::take(&mut self.pending)
    }

    /// 在 (x, y) 处（帧左上角）按 `scale` 绘制当前帧
    pub fn draw(&self, surface: &mut dyn Surface, x: f32, y: f32, scale: f32) {
        let Some(playback) = &self.current else {
            return;
        };

        match &self.crossfade {
            Some(fade) => {
                self.draw_frame(surface, &fade.from, fade.frame, x, y, scale, 1.0 - fade.progress);
                self.draw_frame(surface, &playback.name, playback.frame, x, y, scale, fade.progress);
            }
            None => self.draw_frame(surface, &playback.name, playback.frame, x, y, scale, 1.0),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_frame(
        &self,
        surface: &mut dyn Surface,
        name: &str,
        frame: u32,
        x: f32,
        y: f32,
        scale: f32,
        alpha: f32,
    ) {
        let Some(clip) = self.clips.get(name) else {
            return;
        };
        let fw = clip.spec.frame_width as f32;
        let fh = clip.spec.frame_height as f32;
        let src = Rect::new(frame as f32 * fw, 0.0, fw, fh);
        let dst = Rect::new(x, y, fw * scale, fh * scale);
        surface.draw_image(&clip.sheet, src, dst, alpha);
    }

    /// 当前片段的帧尺寸
    pub fn frame_size(&self) -> Option<(f32, f32)> {
        let playback = self.current.as_ref()?;
        let spec = self.clips.get(&playback.name)?.spec;
        Some((spec.frame_width as f32, spec.frame_height as f32))
    }

    pub fn state(&self) -> AnimatorState {
        match &self.current {
            None => AnimatorState::Idle,
            Some(p) if p.finished => AnimatorState::Finished {
                name: p.name.clone(),
            },
            Some(p) => AnimatorState::Playing {
                name: p.name.clone(),
                frame: p.frame,
                fading: self.crossfade.is_some(),
            },
        }
    }

    pub fn current_animation(&self) -> Option<&str> {
        self.current.as_ref().map(|p| p.name.as_str())
    }

    pub fn current_frame(&self) -> Option<u32> {
        self.current.as_ref().map(|p| p.frame)
    }

    pub fn is_finished(&self) -> bool {
        self.current.as_ref().is_some_and(|p| p.finished)
    }

    /// 交叉淡入进度，没有进行中的淡入时为 1
    pub fn crossfade_progress(&self) -> f32 {
        self.crossfade.as_ref().map(|f| f.progress).unwrap_or(1.0)
    }

    pub fn is_crossfading(&self) -> bool {
        self.crossfade.is_some()
    }

    pub fn has_queued_transition(&self) -> bool {
        self.queued.is_some()
    }

    pub fn clear(&mut self) {
        self.clips.clear();
        self.current = None;
        self.crossfade = None;
        self.queued = None;
        self.pending.clear();
    }
}
