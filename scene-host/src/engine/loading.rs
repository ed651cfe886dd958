//! 后台加载
//!
//! 读取在工作线程上进行，结果作为 [`LoadMessage`] 发回渲染线程，
//! 由 `on_frame` / `finish_loading` 统一应用。引擎销毁后接收端被丢弃，
//! 仍在路上的结果发送失败，直接作废。

use std::sync::Arc;
use std::thread;

use crossbeam_channel::Sender;
use scene_runtime::{LoadProgress, SceneDescriptor, SceneError, TimeOfDay};
use tracing::debug;

use crate::resources::{AssetLoader, LoadedScene, LoaderOptions, TimeAssets};

/// 工作线程发回的消息
#[derive(Debug)]
pub(crate) enum LoadMessage {
    Progress(LoadProgress),
    Loaded(Box<LoadedScene>),
    Failed(SceneError),
    TimeAssets(TimeAssets),
}

/// 启动场景加载线程
pub(crate) fn spawn_scene_load(
    loader: AssetLoader,
    descriptor_url: String,
    options: LoaderOptions,
    outbox: Sender<LoadMessage>,
) -> Result<(), SceneError> {
    let url = descriptor_url.clone();
    thread::Builder::new()
        .name("scene-loader".to_string())
        .spawn(move || {
            let result = loader.load(&url, options, |progress| {
                let _ = outbox.send(LoadMessage::Progress(progress));
            });
            let message = match result {
                Ok(scene) => LoadMessage::Loaded(Box::new(scene)),
                Err(e) => LoadMessage::Failed(e),
            };
            if outbox.send(message).is_err() {
                debug!(url = %url, "引擎已销毁，丢弃加载结果");
            }
        })
        .map(|_| ())
        .map_err(|e| SceneError::fetch(descriptor_url, format!("无法启动加载线程: {}", e)))
}

/// 启动某个时段的懒加载线程
pub(crate) fn spawn_time_fetch(
    loader: AssetLoader,
    descriptor_url: String,
    descriptor: Arc<SceneDescriptor>,
    time: TimeOfDay,
    outbox: Sender<LoadMessage>,
) -> Result<(), SceneError> {
    let url = descriptor_url.clone();
    thread::Builder::new()
        .name(format!("scene-time-{}", time))
        .spawn(move || {
            let assets = loader.fetch_time_assets(&url, &descriptor, time);
            if outbox.send(LoadMessage::TimeAssets(assets)).is_err() {
                debug!(time = %time, "引擎已销毁，丢弃时段资源");
            }
        })
        .map(|_| ())
        .map_err(|e| SceneError::fetch(descriptor_url, format!("无法启动加载线程: {}", e)))
}
