//! # Asset Source 模块
//!
//! 资源来源抽象层，支持从文件系统、ZIP 包、内存读取场景资源。
//!
//! ## 路径约定
//!
//! 传入 `read()` 的路径已经过 [`resolve_asset_path`](super::path::resolve_asset_path) 解析：
//! - 逻辑路径 / 绝对路径：相对于来源根目录
//! - `scheme://` 路径：由具体来源决定是否支持（`FsSource` 支持 `file://`）
//! - `data:` URI 不经过来源，由 [`decode_data_uri`] 直接解码

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use parking_lot::{Condvar, Mutex, RwLock};
use url::Url;

use super::ResourceError;
use super::path::{PathKind, normalize_logical_path};

/// 资源来源 trait
///
/// 加载器在后台线程上并发调用 `read()`，因此要求 `Send + Sync`。
pub trait AssetSource: Send + Sync {
    /// 读取资源字节
    fn read(&self, path: &str) -> Result<Vec<u8>, ResourceError>;

    /// 检查资源是否存在
    fn exists(&self, path: &str) -> bool;

    /// 获取资源的完整路径（用于日志）
    fn full_path(&self, path: &str) -> String;
}

/// 解码 `data:` URI
///
/// 支持 `data:<mime>;base64,<payload>` 与未编码的纯文本负载。
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, ResourceError> {
    let invalid = |message: &str| ResourceError::invalid_format(preview(uri), message);

    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| invalid("缺少 data: 前缀"))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| invalid("缺少 ',' 分隔符"))?;

    if header.split(';').any(|part| part.eq_ignore_ascii_case("base64")) {
        STANDARD
            .decode(payload.trim())
            .map_err(|e| invalid(&format!("base64 解码失败: {}", e)))
    } else {
        Ok(payload.as_bytes().to_vec())
    }
}

/// 日志里只保留 data URI 的开头
fn preview(uri: &str) -> String {
    match uri.char_indices().nth(48) {
        Some((idx, _)) => format!("{}...", &uri[..idx]),
        None => uri.to_string(),
    }
}

/// 文件系统资源来源
#[derive(Debug, Clone)]
pub struct FsSource {
    /// 资源根目录
    base_path: PathBuf,
}

impl FsSource {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn root(&self) -> &PathBuf {
        &self.base_path
    }

    /// 解析到实际文件路径
    fn resolve(&self, path: &str) -> Result<PathBuf, ResourceError> {
        if PathKind::of(path) == PathKind::Qualified {
            let url = Url::parse(path)
                .map_err(|e| ResourceError::load_failed(path, "file", e.to_string()))?;
            if url.scheme() != "file" {
                return Err(ResourceError::load_failed(
                    path,
                    "file",
                    format!("不支持的协议 '{}'", url.scheme()),
                ));
            }
            return url
                .to_file_path()
                .map_err(|_| ResourceError::load_failed(path, "file", "无法转换为本地路径"));
        }

        Ok(self.base_path.join(normalize_logical_path(path)))
    }
}

impl AssetSource for FsSource {
    fn read(&self, path: &str) -> Result<Vec<u8>, ResourceError> {
        let full_path = self.resolve(path)?;

        std::fs::read(&full_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ResourceError::NotFound {
                    path: full_path.to_string_lossy().to_string(),
                }
            } else {
                ResourceError::load_failed(full_path.to_string_lossy(), "file", e.to_string())
            }
        })
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.is_file()).unwrap_or(false)
    }

    fn full_path(&self, path: &str) -> String {
        match self.resolve(path) {
            Ok(p) => p.to_string_lossy().to_string(),
            Err(_) => path.to_string(),
        }
    }
}

/// ZIP 资源来源
///
/// 读取外部打包步骤产出的场景包。条目索引在首次访问时构建并缓存。
pub struct ZipSource {
    /// ZIP 文件路径
    zip_path: PathBuf,
    /// 条目索引（逻辑路径 -> ZIP 内索引）
    index_cache: Mutex<Option<HashMap<String, usize>>>,
}

impl ZipSource {
    pub fn new(zip_path: impl Into<PathBuf>) -> Self {
        Self {
            zip_path: zip_path.into(),
            index_cache: Mutex::new(None),
        }
    }

    fn open_archive(&self) -> Result<zip::ZipArchive<File>, ResourceError> {
        let display = self.zip_path.to_string_lossy().to_string();
        let file = File::open(&self.zip_path)
            .map_err(|e| ResourceError::load_failed(&display, "zip", format!("无法打开 ZIP 文件: {}", e)))?;
        zip::ZipArchive::new(file)
            .map_err(|e| ResourceError::load_failed(&display, "zip", format!("无法读取 ZIP 文件: {}", e)))
    }

    fn build_index(&self) -> Result<HashMap<String, usize>, ResourceError> {
        let mut archive = self.open_archive()?;

        let mut index = HashMap::new();
        for i in 0..archive.len() {
            if let Ok(file) = archive.by_index(i)
                && !file.is_dir()
            {
                index.insert(normalize_logical_path(file.name()), i);
            }
        }
        Ok(index)
    }

    /// 查找条目索引，必要时构建索引
    fn entry_index(&self, name: &str) -> Result<Option<usize>, ResourceError> {
        let mut cache = self.index_cache.lock();
        if cache.is_none() {
            *cache = Some(self.build_index()?);
        }
        Ok(cache.as_ref().and_then(|index| index.get(name).copied()))
    }
}

impl AssetSource for ZipSource {
    fn read(&self, path: &str) -> Result<Vec<u8>, ResourceError> {
        if PathKind::of(path) == PathKind::Qualified {
            return Err(ResourceError::load_failed(path, "zip", "ZIP 包不支持协议路径"));
        }

        let name = normalize_logical_path(path);
        let file_index = self
            .entry_index(&name)?
            .ok_or_else(|| ResourceError::NotFound { path: name.clone() })?;

        let mut archive = self.open_archive()?;
        let mut entry = archive
            .by_index(file_index)
            .map_err(|e| ResourceError::load_failed(&name, "zip_entry", format!("无法读取 ZIP 条目: {}", e)))?;

        let mut buffer = Vec::new();
        entry
            .read_to_end(&mut buffer)
            .map_err(|e| ResourceError::load_failed(&name, "zip_read", format!("读取 ZIP 条目失败: {}", e)))?;

        Ok(buffer)
    }

    fn exists(&self, path: &str) -> bool {
        self.entry_index(&normalize_logical_path(path))
            .map(|index| index.is_some())
            .unwrap_or(false)
    }

    fn full_path(&self, path: &str) -> String {
        format!("zip://{}#{}", self.zip_path.display(), normalize_logical_path(path))
    }
}

/// 内存资源来源
///
/// 用于嵌入式宿主与测试：记录每个路径的读取次数，
/// 并可以把指定路径设为"永不响应"，模拟挂起的请求。
#[derive(Default)]
pub struct MemorySource {
    files: RwLock<HashMap<String, Vec<u8>>>,
    fetches: Mutex<HashMap<String, usize>>,
    stalled: Mutex<HashSet<String>>,
    released: Mutex<bool>,
    release_signal: Condvar,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(path: &str) -> String {
        if PathKind::of(path) == PathKind::Qualified {
            path.to_string()
        } else {
            normalize_logical_path(path)
        }
    }

    /// 添加文件（builder 形式）
    pub fn with_file(self, path: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(path, bytes);
        self
    }

    pub fn insert(&self, path: &str, bytes: impl Into<Vec<u8>>) {
        self.files.write().insert(Self::key(path), bytes.into());
    }

    /// 让该路径的读取一直阻塞，直到 [`release_stalled`](Self::release_stalled)
    pub fn stall(&self, path: &str) {
        self.stalled.lock().insert(Self::key(path));
    }

    /// 放行所有挂起的读取
    pub fn release_stalled(&self) {
        *self.released.lock() = true;
        self.release_signal.notify_all();
    }

    /// 某路径被读取的次数
    pub fn fetch_count(&self, path: &str) -> usize {
        self.fetches.lock().get(&Self::key(path)).copied().unwrap_or(0)
    }

    /// 全部读取次数
    pub fn total_fetches(&self) -> usize {
        self.fetches.lock().values().sum()
    }

    /// 读取过的路径
    pub fn fetched_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.fetches.lock().keys().cloned().collect();
        paths.sort();
        paths
    }
}

impl AssetSource for MemorySource {
    fn read(&self, path: &str) -> Result<Vec<u8>, ResourceError> {
        let key = Self::key(path);
        *self.fetches.lock().entry(key.clone()).or_insert(0) += 1;

        if self.stalled.lock().contains(&key) {
            let mut released = self.released.lock();
            while !*released {
                self.release_signal.wait(&mut released);
            }
        }

        self.files
            .read()
            .get(&key)
            .cloned()
            .ok_or(ResourceError::NotFound { path: key })
    }

    fn exists(&self, path: &str) -> bool {
        self.files.read().contains_key(&Self::key(path))
    }

    fn full_path(&self, path: &str) -> String {
        format!("memory://{}", Self::key(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_decode_data_uri() {
        // "hi" 的 base64
        assert_eq!(decode_data_uri("data:text/plain;base64,aGk=").unwrap(), b"hi");
        assert_eq!(decode_data_uri("data:,plain").unwrap(), b"plain");
        assert!(matches!(
            decode_data_uri("data:image/png;base64"),
            Err(ResourceError::InvalidFormat { .. })
        ));
        assert!(decode_data_uri("data:image/png;base64,@@@").is_err());
    }

    #[test]
    fn test_fs_source_read() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("backgrounds")).unwrap();
        std::fs::write(dir.path().join("backgrounds/bg.png"), b"png").unwrap();

        let source = FsSource::new(dir.path());
        assert_eq!(source.read("backgrounds/bg.png").unwrap(), b"png");
        assert_eq!(source.read("/backgrounds/./bg.png").unwrap(), b"png");
        assert!(source.exists("backgrounds/bg.png"));
        assert!(matches!(
            source.read("backgrounds/missing.png"),
            Err(ResourceError::NotFound { .. })
        ));

        let file_url = Url::from_file_path(dir.path().join("backgrounds/bg.png")).unwrap();
        assert_eq!(source.read(file_url.as_str()).unwrap(), b"png");

        assert!(matches!(
            source.read("https://example.com/bg.png"),
            Err(ResourceError::LoadFailed { .. })
        ));
    }

    #[test]
    fn test_zip_source_read() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("scene.zip");
        {
            let file = File::create(&zip_path).unwrap();
            let mut writer = zip::ZipWriter::new(file);
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("scene.json", options).unwrap();
            writer.write_all(b"{}").unwrap();
            writer.start_file("backgrounds/bg_day.png", options).unwrap();
            writer.write_all(b"day").unwrap();
            writer.finish().unwrap();
        }

        let source = ZipSource::new(&zip_path);
        assert_eq!(source.read("scene.json").unwrap(), b"{}");
        assert_eq!(source.read("./backgrounds/bg_day.png").unwrap(), b"day");
        assert!(source.exists("backgrounds/bg_day.png"));
        assert!(!source.exists("backgrounds/bg_night.png"));
        assert!(matches!(
            source.read("backgrounds/bg_night.png"),
            Err(ResourceError::NotFound { .. })
        ));
        assert!(source.full_path("scene.json").ends_with("#scene.json"));
    }

    #[test]
    fn test_memory_source_counts_fetches() {
        let source = MemorySource::new().with_file("a/b.png", b"x".to_vec());
        assert_eq!(source.read("./a/b.png").unwrap(), b"x");
        assert!(source.read("a/c.png").is_err());

        assert_eq!(source.fetch_count("a/b.png"), 1);
        assert_eq!(source.total_fetches(), 2);
        assert_eq!(source.fetched_paths(), vec!["a/b.png", "a/c.png"]);
    }

    #[test]
    fn test_memory_source_stall_until_released() {
        let source = Arc::new(MemorySource::new().with_file("slow.png", b"s".to_vec()));
        source.stall("slow.png");

        let (tx, rx) = crossbeam_channel::unbounded();
        let reader = source.clone();
        std::thread::spawn(move || {
            let _ = tx.send(reader.read("slow.png"));
        });

        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        source.release_stalled();
        let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(result.unwrap(), b"s");
    }
}
