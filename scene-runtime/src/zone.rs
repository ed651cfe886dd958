//! # Zone 模块
//!
//! 归一化放置区域的注册表。
//!
//! 坐标均为相对画布的 0.0-1.0 值，解析时再乘以当前画布尺寸，
//! 因此 `resize` 之后不需要重新注册。

use std::collections::HashMap;

use tracing::warn;

use crate::descriptor::{ZoneDef, ZoneKind};

/// 解析后的像素放置结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZonePlacement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub scale: f32,
}

impl ZonePlacement {
    /// 区域水平中心
    pub fn center_x(&self) -> f32 {
        self.x + self.width / 2.0
    }

    /// 区域底边
    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }
}

/// Zone 注册表
///
/// 每个引擎实例持有自己的注册表；保留注册顺序用于查找默认角色 zone。
#[derive(Debug, Default)]
pub struct ZoneRegistry {
    zones: HashMap<String, ZoneDef>,
    order: Vec<String>,
}

impl ZoneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册 zone，id 重复时拒绝并返回 `false`
    pub fn register(&mut self, zone: ZoneDef) -> bool {
        if self.zones.contains_key(&zone.id) {
            warn!(zone = %zone.id, "zone id 重复，忽略后注册的定义");
            return false;
        }
        self.order.push(zone.id.clone());
        self.zones.insert(zone.id.clone(), zone);
        true
    }

    /// 解析为像素坐标
    ///
    /// 未注册或已隐藏的 zone 返回 `None`（记录警告）。
    pub fn resolve(
        &self,
        id: &str,
        canvas_width: f32,
        canvas_height: f32,
    ) -> Option<ZonePlacement> {
        let Some(zone) = self.zones.get(id) else {
            warn!(zone = %id, "zone 未注册");
            return None;
        };
        if !zone.visible {
            warn!(zone = %id, "zone 已隐藏");
            return None;
        }

        Some(ZonePlacement {
            x: zone.x * canvas_width,
            y: zone.y * canvas_height,
            width: zone.width * canvas_width,
            height: zone.height * canvas_height,
            scale: zone.scale,
        })
    }

    /// 第一个 `character` 类型的 zone
    pub fn default_character_zone(&self) -> Option<&str> {
        self.order
            .iter()
            .find(|id| {
                self.zones
                    .get(id.as_str())
                    .is_some_and(|z| z.kind == ZoneKind::Character)
            })
            .map(String::as_str)
    }

    /// 设置可见性，返回 zone 是否存在
    pub fn set_visible(&mut self, id: &str, visible: bool) -> bool {
        match self.zones.get_mut(id) {
            Some(zone) => {
                zone.visible = visible;
                true
            }
            None => {
                warn!(zone = %id, "zone 未注册");
                false
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&ZoneDef> {
        self.zones.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.zones.contains_key(id)
    }

    /// 按注册顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = &ZoneDef> {
        self.order.iter().filter_map(|id| self.zones.get(id))
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn clear(&mut self) {
        self.zones.clear();
        self.order.clear();
    }
}
