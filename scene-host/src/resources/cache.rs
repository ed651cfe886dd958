//! # Image Cache 模块
//!
//! 按解析后的 URL 缓存已解码的图片。
//!
//! 同一 URL 只会被读取、解码一次；之后的引用共享同一个 [`ImageHandle`]。

use std::collections::HashMap;

use super::ImageHandle;

/// 图片缓存
#[derive(Debug, Default)]
pub struct ImageCache {
    /// 解析后的 URL -> 图片
    entries: HashMap<String, ImageHandle>,
    /// 统计：命中次数
    hits: u64,
    /// 统计：未命中次数
    misses: u64,
    /// 统计：实际读取次数
    fetches: u64,
    /// 统计：读取或解码失败次数
    failures: u64,
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取图片（计入命中统计）
    pub fn get(&mut self, key: &str) -> Option<ImageHandle> {
        match self.entries.get(key) {
            Some(image) => {
                self.hits += 1;
                Some(image.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// 只读获取（不计入统计）
    pub fn peek(&self, key: &str) -> Option<ImageHandle> {
        self.entries.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// 插入图片；已存在时保留旧的句柄并返回它
    pub fn insert(&mut self, key: String, image: ImageHandle) -> ImageHandle {
        self.entries.entry(key).or_insert(image).clone()
    }

    pub fn record_fetch(&mut self) {
        self.fetches += 1;
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    pub fn remove(&mut self, key: &str) -> Option<ImageHandle> {
        self.entries.remove(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 当前缓存占用的像素字节数（RGBA8）
    pub fn used_bytes(&self) -> usize {
        self.entries
            .values()
            .map(|image| image.width() as usize * image.height() as usize * 4)
            .sum()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            used_bytes: self.used_bytes(),
            hits: self.hits,
            misses: self.misses,
            fetches: self.fetches,
            failures: self.failures,
            hit_rate: if self.hits + self.misses > 0 {
                self.hits as f64 / (self.hits + self.misses) as f64
            } else {
                0.0
            },
        }
    }

    pub fn reset_stats(&mut self) {
        self.hits = 0;
        self.misses = 0;
        self.fetches = 0;
        self.failures = 0;
    }
}

/// 缓存统计信息
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    /// 缓存条目数量
    pub entries: usize,
    /// 像素数据占用（字节）
    pub used_bytes: usize,
    /// 命中次数
    pub hits: u64,
    /// 未命中次数
    pub misses: u64,
    /// 实际读取次数
    pub fetches: u64,
    /// 失败次数
    pub failures: u64,
    /// 命中率
    pub hit_rate: f64,
}

impl CacheStats {
    /// 格式化为可读字符串
    pub fn format(&self) -> String {
        format!(
            "Cache: {} entries, {:.1}MB, hit rate: {:.1}%, fetches: {}, failures: {}",
            self.entries,
            self.used_bytes as f64 / 1024.0 / 1024.0,
            self.hit_rate * 100.0,
            self.fetches,
            self.failures,
        )
    }
}
