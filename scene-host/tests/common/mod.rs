//! 集成测试共用的场景夹具
#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use scene_host::renderer::Surface;
use scene_host::{ImageHandle, MemorySource, PlayerConfig, RecordingSurface, SceneEngine};
use scene_runtime::{EngineState, SceneEvent, SceneEventKind};
use serde_json::{Value, json};

pub const CANVAS_W: u32 = 320;
pub const CANVAS_H: u32 = 180;
pub const DESCRIPTOR: &str = "room/scene.json";

// 每张图片尺寸不同，便于从绘制调用中辨认
pub const BG_DAWN: (u32, u32) = (8, 1);
pub const BG_DAY: (u32, u32) = (8, 2);
pub const BG_SUNSET: (u32, u32) = (8, 3);
pub const BG_NIGHT: (u32, u32) = (8, 4);
pub const MID_DAY: (u32, u32) = (7, 2);
pub const FG_DAY: (u32, u32) = (6, 2);
/// typing：3x5 帧 × 4，10fps，循环
pub const TYPING_SHEET: (u32, u32) = (12, 5);
/// reading：3x5 帧 × 2，4fps，不循环
pub const READING_SHEET: (u32, u32) = (6, 5);
pub const FX_RAIN: (u32, u32) = (4, 4);

/// 纯色 PNG
pub fn png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

pub fn dims(image: &ImageHandle) -> (u32, u32) {
    image.dimensions()
}

/// 完整的书房场景
pub fn scene_json(initial_time: &str) -> Value {
    json!({
        "version": 1,
        "meta": { "name": "study", "width": CANVAS_W, "height": CANVAS_H },
        "layers": [
            {
                "depth": "background",
                "parallax_factor": 0.1,
                "images": {
                    "dawn": "bg/dawn.png",
                    "day": "bg/day.png",
                    "sunset": "bg/sunset.png",
                    "night": "bg/night.png"
                }
            },
            { "depth": "midground", "images": { "day": "mid/day.png" } },
            { "depth": "foreground", "images": { "day": "fg/day.png" } }
        ],
        "zones": [
            { "id": "desk", "x": 0.5, "y": 0.5, "width": 0.25, "height": 0.4, "type": "character", "scale": 2.0 },
            { "id": "window", "x": 0.0, "y": 0.0, "width": 0.2, "height": 0.2, "type": "ambient", "scale": 1.0 }
        ],
        "animations": [
            { "name": "typing", "sprite_sheet": "chars/typing.png",
              "frame_width": 3, "frame_height": 5, "frame_count": 4, "fps": 10, "loop": true },
            { "name": "reading", "sprite_sheet": "chars/reading.png",
              "frame_width": 3, "frame_height": 5, "frame_count": 2, "fps": 4, "loop": false }
        ],
        "effects": [
            { "id": "rain_drops", "type": "particle", "sprite_sheet": "fx/rain.png", "weather_trigger": "rain" }
        ],
        "initial": { "time": initial_time, "weather": "clear", "season": "summer", "animation": "typing" }
    })
}

/// 内存来源，包含描述文件引用的全部图片
pub fn scene_source(descriptor: &Value) -> Arc<MemorySource> {
    let source = MemorySource::new()
        .with_file(DESCRIPTOR, serde_json::to_vec(descriptor).unwrap());
    let images = [
        ("bg/dawn.png", BG_DAWN),
        ("bg/day.png", BG_DAY),
        ("bg/sunset.png", BG_SUNSET),
        ("bg/night.png", BG_NIGHT),
        ("mid/day.png", MID_DAY),
        ("fg/day.png", FG_DAY),
        ("chars/typing.png", TYPING_SHEET),
        ("chars/reading.png", READING_SHEET),
        ("fx/rain.png", FX_RAIN),
    ];
    for (path, (w, h)) in images {
        source.insert(&format!("room/{}", path), png(w, h, [120, 80, 40, 255]));
    }
    Arc::new(source)
}

pub type EventLog = Rc<RefCell<Vec<SceneEvent>>>;

/// 订阅全部事件并按顺序记录
pub fn record_events<S: Surface>(engine: &SceneEngine<S>) -> EventLog {
    let log: EventLog = Rc::new(RefCell::new(Vec::new()));
    for kind in SceneEventKind::ALL {
        let log = Rc::clone(&log);
        let _ = engine.on(kind, move |event| log.borrow_mut().push(event.clone()));
    }
    log
}

/// 已加载的引擎（第一帧已在时间戳 0 处执行）
pub struct Harness {
    pub engine: SceneEngine<RecordingSurface>,
    pub source: Arc<MemorySource>,
    pub events: EventLog,
    pub now: f64,
}

impl Harness {
    pub fn with_config(descriptor: &Value, config: PlayerConfig) -> Self {
        let source = scene_source(descriptor);
        let mut engine = SceneEngine::new(
            RecordingSurface::new(CANVAS_W, CANVAS_H),
            source.clone(),
            config,
        );
        let events = record_events(&engine);

        engine.load(DESCRIPTOR).unwrap();
        assert!(engine.finish_loading(Duration::from_secs(5)));
        assert_eq!(engine.engine_state(), EngineState::Ready);
        engine.on_frame(0.0);

        Self {
            engine,
            source,
            events,
            now: 0.0,
        }
    }

    pub fn new(initial_time: &str) -> Self {
        Self::with_config(&scene_json(initial_time), PlayerConfig::default())
    }

    /// 以 100ms 一帧推进
    pub fn advance(&mut self, ms: f64) {
        let mut remaining = ms;
        while remaining > 0.0 {
            let step = remaining.min(100.0);
            self.now += step;
            self.engine.on_frame(self.now);
            remaining -= step;
        }
    }

    pub fn last_frame_images(&self) -> Vec<((u32, u32), f32)> {
        self.engine
            .surface()
            .last_frame()
            .iter()
            .filter_map(|call| call.as_image())
            .map(|(image, alpha)| (dims(image), alpha))
            .collect()
    }

    pub fn take_events(&self) -> Vec<SceneEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }
}
