//! # 资源加载集成测试
//!
//! 测试 PlayerConfig → AssetSource → SceneEngine → SoftwareSurface 的链路，
//! 资源分别来自临时目录、ZIP 包与内嵌 data URI。

mod common;

use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use base64::Engine as _;
use common::png;
use scene_host::{
    AssetSourceType, MemorySource, PlayerConfig, SceneEngine, SoftwareSurface,
};
use scene_runtime::EngineState;
use serde_json::json;
use zip::write::SimpleFileOptions;

const RED: [u8; 4] = [200, 30, 30, 255];
const BLUE: [u8; 4] = [20, 40, 220, 255];

/// 光栅化经过预乘 alpha，允许每通道 ±2 的误差
fn assert_close(actual: Option<[u8; 4]>, expected: [u8; 4]) {
    let actual = actual.expect("pixel out of bounds");
    let close = actual
        .iter()
        .zip(expected.iter())
        .all(|(a, e)| (i16::from(*a) - i16::from(*e)).abs() <= 2);
    assert!(close, "pixel {:?} != {:?}", actual, expected);
}

fn descriptor() -> serde_json::Value {
    json!({
        "version": 1,
        "meta": { "name": "plain" },
        "layers": [{
            "depth": "background",
            "images": { "day": "bg/day.png", "night": "bg/night.png" }
        }],
        "initial": { "time": "day" }
    })
}

fn files() -> Vec<(&'static str, Vec<u8>)> {
    vec![
        ("scenes/plain/scene.json", serde_json::to_vec(&descriptor()).unwrap()),
        ("scenes/plain/bg/day.png", png(16, 9, RED)),
        ("scenes/plain/bg/night.png", png(16, 9, BLUE)),
    ]
}

fn render_first_frame(config: PlayerConfig) -> SceneEngine<SoftwareSurface> {
    config.validate().unwrap();
    let source = config.build_source().unwrap();
    let surface = SoftwareSurface::new(64, 36);
    let descriptor = config.descriptor.clone();

    let mut engine = SceneEngine::new(surface, source, config);
    engine.load(&descriptor).unwrap();
    assert!(engine.finish_loading(Duration::from_secs(5)));
    assert_eq!(engine.engine_state(), EngineState::Ready);
    engine.on_frame(0.0);
    engine
}

fn write_tree(root: &Path) {
    for (path, bytes) in files() {
        let full = root.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, bytes).unwrap();
    }
}

/// 测试从目录加载并绘制
#[test]
fn test_engine_loads_from_directory() {
    let dir = tempfile::tempdir().unwrap();
    write_tree(dir.path());

    let config = PlayerConfig {
        asset_source: AssetSourceType::Fs,
        assets_root: dir.path().to_path_buf(),
        descriptor: "scenes/plain/scene.json".to_string(),
        ..PlayerConfig::default()
    };
    let engine = render_first_frame(config);

    assert_close(engine.surface().pixel(32, 18), RED);
    assert_close(engine.surface().pixel(0, 0), RED);

    let stats = engine.cache_stats();
    assert_eq!(stats.entries, 2);
    assert_eq!(stats.fetches, 2);
    assert_eq!(stats.failures, 0);
}

/// 测试从 ZIP 包加载
#[test]
fn test_engine_loads_from_zip() {
    let dir = tempfile::tempdir().unwrap();
    let zip_path = dir.path().join("scenes.zip");
    {
        let file = fs::File::create(&zip_path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (path, bytes) in files() {
            let options =
                SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
            zip.start_file(path, options).unwrap();
            zip.write_all(&bytes).unwrap();
        }
        zip.finish().unwrap();
    }

    let config = PlayerConfig {
        asset_source: AssetSourceType::Zip,
        zip_path: Some(zip_path),
        descriptor: "scenes/plain/scene.json".to_string(),
        ..PlayerConfig::default()
    };
    let mut engine = render_first_frame(config);
    assert_close(engine.surface().pixel(10, 10), RED);

    // 立即切换（时长 0）后下一帧绘制 night
    assert!(engine.set_time("night", scene_host::TimeOptions { duration_ms: 0.0 }));
    engine.on_frame(16.0);
    let pixel = engine.surface().pixel(10, 10).unwrap();
    // night 光照叠加在蓝色背景上
    assert!(pixel[2] > pixel[0]);
}

/// 测试内嵌 data URI 的图层图片不经过资源来源
#[test]
fn test_embedded_layer_image() {
    let encoded = base64::engine::general_purpose::STANDARD.encode(png(4, 4, BLUE));
    let scene = json!({
        "layers": [{
            "depth": "background",
            "images": { "day": format!("data:image/png;base64,{}", encoded) }
        }],
        "initial": { "time": "day" }
    });
    let source = std::sync::Arc::new(
        MemorySource::new().with_file("inline/scene.json", serde_json::to_vec(&scene).unwrap()),
    );

    let mut engine = SceneEngine::new(
        SoftwareSurface::new(8, 8),
        source.clone(),
        PlayerConfig::default(),
    );
    engine.load("inline/scene.json").unwrap();
    assert!(engine.finish_loading(Duration::from_secs(5)));
    engine.on_frame(0.0);

    assert_close(engine.surface().pixel(4, 4), BLUE);
    assert_eq!(source.fetched_paths(), vec!["inline/scene.json".to_string()]);
    assert_eq!(engine.cache_stats().fetches, 0);
}

/// 测试相对路径按描述文件所在目录解析
#[test]
fn test_relative_paths_resolve_against_descriptor() {
    let scene = json!({
        "layers": [{
            "depth": "background",
            "images": { "day": "../shared/bg.png" }
        }],
        "initial": { "time": "day" }
    });
    let source = std::sync::Arc::new(
        MemorySource::new()
            .with_file("scenes/room/scene.json", serde_json::to_vec(&scene).unwrap())
            .with_file("scenes/shared/bg.png", png(2, 2, RED)),
    );

    let mut engine = SceneEngine::new(
        SoftwareSurface::new(8, 8),
        source.clone(),
        PlayerConfig::default(),
    );
    engine.load("scenes/room/scene.json").unwrap();
    assert!(engine.finish_loading(Duration::from_secs(5)));
    engine.on_frame(0.0);

    assert_eq!(source.fetch_count("scenes/shared/bg.png"), 1);
    assert_close(engine.surface().pixel(1, 1), RED);
}

/// 测试单张图片缺失不影响整体加载
#[test]
fn test_missing_image_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    write_tree(dir.path());
    fs::remove_file(dir.path().join("scenes/plain/bg/night.png")).unwrap();

    let config = PlayerConfig {
        assets_root: dir.path().to_path_buf(),
        descriptor: "scenes/plain/scene.json".to_string(),
        ..PlayerConfig::default()
    };
    let engine = render_first_frame(config);

    let scene = engine.scene().unwrap();
    assert!(scene.layer_image(0, scene_runtime::TimeOfDay::Night).is_none());
    assert!(scene.layer_image(0, scene_runtime::TimeOfDay::Day).is_some());
    assert_eq!(engine.cache_stats().failures, 1);
}
