//! # Asset Loader 模块
//!
//! 读取并解析场景描述文件，按需加载其中引用的全部图片。
//!
//! ## 加载流程
//!
//! 1. 读取描述文件，非法对象直接失败（`SceneError::Validation`）
//! 2. 收集图片槽位：每个图层的时段变体 + 每个动画片段 + 每个特效精灵图
//! 3. 解析相对路径并按 URL 去重；已在缓存中的直接命中
//! 4. 其余 URL 分发给工作线程并发读取，结果经 channel 汇总，每个槽位完成后回调进度
//!
//! 单张图片失败只记录警告并留空该槽位，不影响整体加载。
//! 加载器不设超时：某个读取一直不返回时，进度会停在未完成状态。

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crossbeam_channel::unbounded;
use parking_lot::Mutex;
use scene_runtime::{
    LoadProgress, SceneDescriptor, SceneError, SceneResult, TimeOfDay,
};
use tracing::{debug, info, warn};

use super::cache::{CacheStats, ImageCache};
use super::path::{PathKind, resolve_asset_path};
use super::source::{AssetSource, decode_data_uri};
use super::{ImageHandle, ResourceError, decode_image};

/// 同时进行的读取数量上限
pub const MAX_CONCURRENT_FETCHES: usize = 6;

/// 加载选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoaderOptions {
    /// 懒加载：初始只加载当前时段及两个相邻时段
    pub lazy: bool,
}

/// 图片槽位
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Slot {
    Layer { layer: usize, time: TimeOfDay },
    Clip(String),
    Effect(String),
}

/// 某个时段的图层图片（懒加载结果）
#[derive(Debug, Clone)]
pub struct TimeAssets {
    pub time: TimeOfDay,
    /// (图层索引, 图片)
    pub images: Vec<(usize, ImageHandle)>,
}

/// 加载完成的场景
#[derive(Debug, Clone)]
pub struct LoadedScene {
    /// 描述文件位置（相对路径的解析基准）
    pub descriptor_url: String,
    pub descriptor: Arc<SceneDescriptor>,
    layer_images: HashMap<(usize, TimeOfDay), ImageHandle>,
    sprite_sheets: HashMap<String, ImageHandle>,
    effect_sheets: HashMap<String, ImageHandle>,
    hydrated_times: BTreeSet<TimeOfDay>,
}

impl LoadedScene {
    fn new(descriptor_url: &str, descriptor: SceneDescriptor) -> Self {
        Self {
            descriptor_url: descriptor_url.to_string(),
            descriptor: Arc::new(descriptor),
            layer_images: HashMap::new(),
            sprite_sheets: HashMap::new(),
            effect_sheets: HashMap::new(),
            hydrated_times: BTreeSet::new(),
        }
    }

    /// 图层在某时段的图片
    pub fn layer_image(&self, layer: usize, time: TimeOfDay) -> Option<&ImageHandle> {
        self.layer_images.get(&(layer, time))
    }

    /// 动画片段的精灵图
    pub fn sprite_sheet(&self, clip: &str) -> Option<&ImageHandle> {
        self.sprite_sheets.get(clip)
    }

    /// 特效精灵图
    pub fn effect_sheet(&self, id: &str) -> Option<&ImageHandle> {
        self.effect_sheets.get(id)
    }

    /// 该时段是否已经加载过（无论成功与否）
    pub fn is_time_hydrated(&self, time: TimeOfDay) -> bool {
        self.hydrated_times.contains(&time)
    }

    pub fn hydrated_times(&self) -> impl Iterator<Item = TimeOfDay> + '_ {
        self.hydrated_times.iter().copied()
    }

    /// 合并懒加载结果，返回新增的图片数
    ///
    /// 已加载过的时段直接忽略。
    pub fn apply_time_assets(&mut self, assets: TimeAssets) -> usize {
        if !self.hydrated_times.insert(assets.time) {
            return 0;
        }
        let count = assets.images.len();
        for (layer, image) in assets.images {
            self.layer_images.insert((layer, assets.time), image);
        }
        count
    }

    fn store(&mut self, slot: &Slot, image: ImageHandle) {
        match slot {
            Slot::Layer { layer, time } => {
                self.layer_images.insert((*layer, *time), image);
            }
            Slot::Clip(name) => {
                self.sprite_sheets.insert(name.clone(), image);
            }
            Slot::Effect(id) => {
                self.effect_sheets.insert(id.clone(), image);
            }
        }
    }
}

/// 资源加载器
///
/// 可以廉价克隆：所有克隆共享同一个来源与同一个图片缓存，
/// 因此后台线程上的加载与渲染线程上的查询看到的是同一份缓存。
#[derive(Clone)]
pub struct AssetLoader {
    source: Arc<dyn AssetSource>,
    cache: Arc<Mutex<ImageCache>>,
}

impl AssetLoader {
    pub fn new(source: Arc<dyn AssetSource>) -> Self {
        Self {
            source,
            cache: Arc::new(Mutex::new(ImageCache::new())),
        }
    }

    pub fn source(&self) -> &Arc<dyn AssetSource> {
        &self.source
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.lock().stats()
    }

    /// 只读取并解析描述文件
    pub fn fetch_descriptor(&self, descriptor_url: &str) -> SceneResult<SceneDescriptor> {
        let bytes = self.read_bytes(descriptor_url).map_err(SceneError::from)?;
        let descriptor = SceneDescriptor::from_slice(&bytes)?;

        for warning in descriptor.warnings() {
            warn!(url = %descriptor_url, "{}", warning);
        }
        Ok(descriptor)
    }

    /// 加载描述文件及其引用的图片
    ///
    /// `progress` 在每个槽位完成（成功或失败）后调用一次。
    pub fn load(
        &self,
        descriptor_url: &str,
        options: LoaderOptions,
        mut progress: impl FnMut(LoadProgress),
    ) -> SceneResult<LoadedScene> {
        info!(url = %descriptor_url, lazy = options.lazy, "开始加载场景");
        let descriptor = self.fetch_descriptor(descriptor_url)?;

        let times: Vec<TimeOfDay> = if options.lazy {
            descriptor.initial.time.with_neighbors().to_vec()
        } else {
            TimeOfDay::ALL.to_vec()
        };

        let mut slots = Vec::new();
        for time in &times {
            slots.extend(layer_slots(&descriptor, descriptor_url, *time));
        }
        for clip in &descriptor.animations {
            slots.push((
                Slot::Clip(clip.name.clone()),
                resolve_asset_path(descriptor_url, &clip.sprite_sheet),
            ));
        }
        for effect in &descriptor.effects {
            slots.push((
                Slot::Effect(effect.id.clone()),
                resolve_asset_path(descriptor_url, &effect.sprite_sheet),
            ));
        }

        let mut scene = LoadedScene::new(descriptor_url, descriptor);
        scene.hydrated_times.extend(times);

        let resolved = self.fetch_slots(&slots, &mut progress);
        for (slot, image) in resolved {
            scene.store(&slot, image);
        }

        info!(
            url = %descriptor_url,
            images = slots.len(),
            stats = %self.cache_stats().format(),
            "场景加载完成"
        );
        Ok(scene)
    }

    /// 读取某个时段的图层图片，不修改场景
    ///
    /// 供后台线程使用，结果通过 [`LoadedScene::apply_time_assets`] 合并。
    pub fn fetch_time_assets(
        &self,
        descriptor_url: &str,
        descriptor: &SceneDescriptor,
        time: TimeOfDay,
    ) -> TimeAssets {
        let slots = layer_slots(descriptor, descriptor_url, time);
        let images = self
            .fetch_slots(&slots, &mut |_| {})
            .into_iter()
            .filter_map(|(slot, image)| match slot {
                Slot::Layer { layer, .. } => Some((layer, image)),
                _ => None,
            })
            .collect();

        TimeAssets { time, images }
    }

    /// 懒加载某个时段的图层图片
    ///
    /// 幂等：该时段已加载过时不做任何读取，返回 0。
    pub fn load_time_assets(&self, scene: &mut LoadedScene, time: TimeOfDay) -> usize {
        if scene.is_time_hydrated(time) {
            debug!(time = %time, "时段资源已加载，跳过");
            return 0;
        }
        let assets = self.fetch_time_assets(&scene.descriptor_url, &scene.descriptor, time);
        scene.apply_time_assets(assets)
    }

    /// 读取原始字节（`data:` URI 直接解码）
    fn read_bytes(&self, url: &str) -> Result<Vec<u8>, ResourceError> {
        if PathKind::of(url) == PathKind::Embedded {
            decode_data_uri(url)
        } else {
            self.source.read(url)
        }
    }

    fn fetch_image(&self, url: &str) -> Result<ImageHandle, ResourceError> {
        let bytes = self.read_bytes(url)?;
        decode_image(url, &bytes)
    }

    /// 并发读取所有槽位，返回成功的 (槽位, 图片)
    fn fetch_slots(
        &self,
        slots: &[(Slot, String)],
        progress: &mut dyn FnMut(LoadProgress),
    ) -> Vec<(Slot, ImageHandle)> {
        let total = slots.len();
        let mut loaded = 0;
        let mut resolved = Vec::with_capacity(total);

        // URL -> 引用它的槽位
        let mut by_url: HashMap<&str, Vec<&Slot>> = HashMap::new();
        let mut pending: Vec<&str> = Vec::new();
        for (slot, url) in slots {
            let refs = by_url.entry(url.as_str()).or_default();
            if refs.is_empty() {
                pending.push(url.as_str());
            }
            refs.push(slot);
        }

        // 缓存命中的直接完成
        let mut to_fetch = Vec::new();
        for url in pending {
            let cached = self.cache.lock().get(url);
            match cached {
                Some(image) => {
                    for slot in by_url.get(url).into_iter().flatten() {
                        resolved.push(((*slot).clone(), image.clone()));
                        loaded += 1;
                        progress(LoadProgress::new(loaded, total));
                    }
                }
                None => to_fetch.push(url),
            }
        }

        if to_fetch.is_empty() {
            return resolved;
        }

        let workers = to_fetch.len().min(MAX_CONCURRENT_FETCHES);
        let (job_tx, job_rx) = unbounded::<&str>();
        let (result_tx, result_rx) = unbounded::<(&str, Result<ImageHandle, ResourceError>)>();
        let expected = to_fetch.len();
        for url in to_fetch {
            // 接收端在作用域内一直存活
            let _ = job_tx.send(url);
        }
        drop(job_tx);

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    for url in job_rx.iter() {
                        let result = self.fetch_image(url);
                        if result_tx.send((url, result)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(result_tx);

            for _ in 0..expected {
                let Ok((url, result)) = result_rx.recv() else {
                    break;
                };

                let image = {
                    let mut cache = self.cache.lock();
                    if PathKind::of(url) != PathKind::Embedded {
                        cache.record_fetch();
                    }
                    match result {
                        Ok(image) => Some(cache.insert(url.to_string(), image)),
                        Err(e) => {
                            cache.record_failure();
                            warn!(url = %url, error = %e, "图片加载失败，跳过该槽位");
                            None
                        }
                    }
                };

                for slot in by_url.get(url).into_iter().flatten() {
                    if let Some(image) = &image {
                        resolved.push(((*slot).clone(), image.clone()));
                    }
                    loaded += 1;
                    progress(LoadProgress::new(loaded, total));
                }
            }
        });

        resolved
    }
}

impl std::fmt::Debug for AssetLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetLoader")
            .field("cache", &self.cache_stats())
            .finish()
    }
}

/// 某时段下所有可识别图层的槽位
fn layer_slots(descriptor: &SceneDescriptor, descriptor_url: &str, time: TimeOfDay) -> Vec<(Slot, String)> {
    descriptor
        .layers
        .iter()
        .enumerate()
        .filter(|(_, layer)| layer.depth().is_some())
        .filter_map(|(index, layer)| {
            layer.image_for(time).map(|path| {
                (
                    Slot::Layer { layer: index, time },
                    resolve_asset_path(descriptor_url, path),
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::MemorySource;
    use serde_json::json;

    fn png() -> Vec<u8> {
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(image::RgbaImage::new(2, 2))
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn scene_source(initial_time: &str) -> Arc<MemorySource> {
        let descriptor = json!({
            "version": 1,
            "layers": [{
                "depth": "background",
                "images": {
                    "dawn": "bg/dawn.png", "day": "bg/day.png",
                    "sunset": "bg/sunset.png", "night": "bg/night.png"
                }
            }],
            "animations": [
                { "name": "idle", "sprite_sheet": "chars/idle.png",
                  "frame_width": 1, "frame_height": 2, "frame_count": 2, "fps": 4 },
                { "name": "idle_copy", "sprite_sheet": "chars/idle.png",
                  "frame_width": 1, "frame_height": 2, "frame_count": 2, "fps": 4 }
            ],
            "initial": { "time": initial_time }
        });

        let source = MemorySource::new()
            .with_file("room/scene.json", serde_json::to_vec(&descriptor).unwrap());
        for path in ["bg/dawn.png", "bg/day.png", "bg/sunset.png", "bg/night.png", "chars/idle.png"] {
            source.insert(&format!("room/{}", path), png());
        }
        Arc::new(source)
    }

    #[test]
    fn test_full_load_reports_every_slot() {
        let source = scene_source("day");
        let loader = AssetLoader::new(source.clone());

        let mut reports = Vec::new();
        let scene = loader
            .load("room/scene.json", LoaderOptions::default(), |p| reports.push(p))
            .unwrap();

        // 4 个时段 + 2 个片段
        assert_eq!(reports.len(), 6);
        assert_eq!(reports.last().unwrap().percent, 100.0);
        for t in TimeOfDay::ALL {
            assert!(scene.layer_image(0, t).is_some());
        }

        // 两个片段共享同一张精灵图，只读取一次
        assert_eq!(source.fetch_count("room/chars/idle.png"), 1);
        assert!(Arc::ptr_eq(
            scene.sprite_sheet("idle").unwrap(),
            scene.sprite_sheet("idle_copy").unwrap()
        ));
    }

    #[test]
    fn test_lazy_load_skips_opposite_time() {
        let source = scene_source("night");
        let loader = AssetLoader::new(source.clone());

        let scene = loader
            .load("room/scene.json", LoaderOptions { lazy: true }, |_| {})
            .unwrap();

        assert_eq!(source.fetch_count("room/bg/day.png"), 0);
        for path in ["room/bg/night.png", "room/bg/sunset.png", "room/bg/dawn.png"] {
            assert_eq!(source.fetch_count(path), 1, "{}", path);
        }
        assert!(!scene.is_time_hydrated(TimeOfDay::Day));
        assert!(scene.layer_image(0, TimeOfDay::Day).is_none());
    }

    #[test]
    fn test_load_time_assets_is_idempotent() {
        let source = scene_source("night");
        let loader = AssetLoader::new(source.clone());
        let mut scene = loader
            .load("room/scene.json", LoaderOptions { lazy: true }, |_| {})
            .unwrap();

        assert_eq!(loader.load_time_assets(&mut scene, TimeOfDay::Day), 1);
        let first = scene.layer_image(0, TimeOfDay::Day).unwrap().clone();
        let fetches = source.total_fetches();

        assert_eq!(loader.load_time_assets(&mut scene, TimeOfDay::Day), 0);
        assert_eq!(source.total_fetches(), fetches);
        assert!(Arc::ptr_eq(&first, scene.layer_image(0, TimeOfDay::Day).unwrap()));
    }

    #[test]
    fn test_missing_descriptor_is_fetch_error() {
        let loader = AssetLoader::new(Arc::new(MemorySource::new()));
        let err = loader
            .load("nowhere/scene.json", LoaderOptions::default(), |_| {})
            .unwrap_err();
        assert!(matches!(err, SceneError::Fetch { .. }));
    }

    #[test]
    fn test_non_object_descriptor_is_validation_error() {
        let source = MemorySource::new().with_file("scene.json", b"[1, 2]".to_vec());
        let loader = AssetLoader::new(Arc::new(source));
        let err = loader
            .load("scene.json", LoaderOptions::default(), |_| {})
            .unwrap_err();
        assert!(matches!(err, SceneError::Validation { .. }));
    }

    #[test]
    fn test_failed_image_does_not_abort_load() {
        let descriptor = json!({
            "layers": [{ "depth": "background", "images": { "day": "ok.png", "night": "missing.png" } }]
        });
        let source = MemorySource::new()
            .with_file("scene.json", serde_json::to_vec(&descriptor).unwrap())
            .with_file("ok.png", png());
        let loader = AssetLoader::new(Arc::new(source));

        let mut reports = Vec::new();
        let scene = loader
            .load("scene.json", LoaderOptions::default(), |p| reports.push(p))
            .unwrap();

        assert_eq!(reports.len(), 2);
        assert!(reports.last().unwrap().is_complete());
        assert!(scene.layer_image(0, TimeOfDay::Day).is_some());
        assert!(scene.layer_image(0, TimeOfDay::Night).is_none());
        assert_eq!(loader.cache_stats().failures, 1);
    }

    #[test]
    fn test_cache_shared_across_loads() {
        let source = scene_source("day");
        let loader = AssetLoader::new(source.clone());
        loader.load("room/scene.json", LoaderOptions::default(), |_| {}).unwrap();
        loader.load("room/scene.json", LoaderOptions::default(), |_| {}).unwrap();

        // 描述文件读取两次，图片只读取一次
        assert_eq!(source.fetch_count("room/scene.json"), 2);
        assert_eq!(source.fetch_count("room/bg/day.png"), 1);
        assert!(loader.cache_stats().hits >= 5);
    }
}
