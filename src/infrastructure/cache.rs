//! 提取结果缓存 - 基础设施层
//!
//! 请求键 → 序列化后的 `ExtractionResult`。默认永久有效，只会被同一个键
//! 的新一次成功提取覆盖（后写者胜出）。读取失败（条目损坏、IO 错误）一律
//! 按未命中处理，由上层重新提取。

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::PersistenceError;
use crate::models::{ExtractionResult, RequestKey};

/// 结果缓存能力
#[async_trait]
pub trait ResultCache: Send + Sync {
    /// 查询缓存，未命中或条目不可用时返回 `None`
    async fn get(&self, key: &RequestKey) -> Option<ExtractionResult>;

    /// 写入（覆盖）缓存
    async fn put(&self, key: &RequestKey, result: &ExtractionResult) -> Result<(), PersistenceError>;
}

/// 基于文件系统的缓存，每个键一个 JSON 文件
pub struct FileCache {
    dir: PathBuf,
    ttl: Option<Duration>,
}

impl FileCache {
    /// 打开（必要时创建）缓存目录
    pub async fn open(dir: impl Into<PathBuf>, ttl: Option<Duration>) -> Result<Self, PersistenceError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| PersistenceError::write(&dir, e))?;
        Ok(Self { dir, ttl })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &RequestKey) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    async fn is_expired(&self, path: &Path) -> bool {
        let Some(ttl) = self.ttl else {
            return false;
        };
        match fs::metadata(path).await.and_then(|m| m.modified()) {
            Ok(modified) => SystemTime::now()
                .duration_since(modified)
                .map(|age| age > ttl)
                .unwrap_or(false),
            Err(_) => true,
        }
    }
}

#[async_trait]
impl ResultCache for FileCache {
    async fn get(&self, key: &RequestKey) -> Option<ExtractionResult> {
        let path = self.entry_path(key);

        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("读取缓存失败，按未命中处理 ({}): {}", path.display(), e);
                return None;
            }
        };

        if self.is_expired(&path).await {
            debug!("缓存已过期: {}", key);
            return None;
        }

        match serde_json::from_str(&raw) {
            Ok(result) => Some(result),
            Err(e) => {
                warn!("缓存条目损坏，按未命中处理 ({}): {}", path.display(), e);
                None
            }
        }
    }

    async fn put(&self, key: &RequestKey, result: &ExtractionResult) -> Result<(), PersistenceError> {
        let path = self.entry_path(key);
        let json = serde_json::to_string(result).map_err(|e| PersistenceError::serde(key.as_str(), e))?;

        // 先写临时文件再改名，并发写同一个键时后写者胜出
        let tmp = self
            .dir
            .join(format!("{}.{:016x}.tmp", key, rand::random::<u64>()));
        fs::write(&tmp, json)
            .await
            .map_err(|e| PersistenceError::write(&tmp, e))?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(PersistenceError::write(&path, e));
        }

        debug!("已写入缓存: {}", path.display());
        Ok(())
    }
}

/// 内存缓存（测试及单次运行使用）
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<RequestKey, (String, Instant)>>,
    ttl: Option<Duration>,
    writes: AtomicUsize,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Self::default()
        }
    }

    /// 直接写入原始文本（可以是损坏的 JSON）
    pub fn insert_raw(&self, key: RequestKey, raw: impl Into<String>) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key, (raw.into(), Instant::now()));
        }
    }

    pub fn contains(&self, key: &RequestKey) -> bool {
        self.entries
            .read()
            .map(|entries| entries.contains_key(key))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 成功的 `put` 次数
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResultCache for MemoryCache {
    async fn get(&self, key: &RequestKey) -> Option<ExtractionResult> {
        let (raw, stored_at) = {
            let entries = self.entries.read().ok()?;
            entries.get(key).cloned()?
        };

        if let Some(ttl) = self.ttl {
            if stored_at.elapsed() > ttl {
                return None;
            }
        }

        match serde_json::from_str(&raw) {
            Ok(result) => Some(result),
            Err(e) => {
                warn!("缓存条目损坏，按未命中处理 ({}): {}", key, e);
                None
            }
        }
    }

    async fn put(&self, key: &RequestKey, result: &ExtractionResult) -> Result<(), PersistenceError> {
        let json = serde_json::to_string(result).map_err(|e| PersistenceError::serde(key.as_str(), e))?;
        let mut entries = self
            .entries
            .write()
            .map_err(|_| PersistenceError::Backend("缓存锁已中毒".to_string()))?;
        entries.insert(key.clone(), (json, Instant::now()));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(title: &str) -> ExtractionResult {
        ExtractionResult {
            title: Some(title.to_string()),
            tag: "ingram".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn file_cache_round_trip_and_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::open(dir.path(), None).await.unwrap();
        let key = RequestKey::derive("SKU-1");

        assert!(cache.get(&key).await.is_none());
        cache.put(&key, &sample("v1")).await.unwrap();
        cache.put(&key, &sample("v2")).await.unwrap();

        let hit = cache.get(&key).await.unwrap();
        assert_eq!(hit.title.as_deref(), Some("v2"));
        assert!(dir.path().join(format!("{}.json", key)).exists());
    }

    #[tokio::test]
    async fn corrupt_file_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::open(dir.path(), None).await.unwrap();
        let key = RequestKey::derive("SKU-2");
        std::fs::write(dir.path().join(format!("{}.json", key)), "{not json").unwrap();

        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn expired_file_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::open(dir.path(), Some(Duration::ZERO)).await.unwrap();
        let key = RequestKey::derive("SKU-3");
        cache.put(&key, &sample("old")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn memory_cache_treats_corrupt_entry_as_miss() {
        let cache = MemoryCache::new();
        let key = RequestKey::derive("SKU-4");
        cache.insert_raw(key.clone(), "garbage");

        assert!(cache.get(&key).await.is_none());
        cache.put(&key, &sample("fresh")).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap().title.as_deref(), Some("fresh"));
        assert_eq!(cache.writes(), 1);
    }
}
