//! 任务进度 / 报告存储 - 基础设施层
//!
//! 同一个任务ID在任何时刻只处于两种可见状态之一：
//! 进行中（存在进度记录）或已完成（存在报告）。

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tracing::debug;

use crate::error::PersistenceError;
use crate::models::{BatchProgress, JobReport};

/// 任务记录存储能力
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn write_progress(&self, progress: &BatchProgress) -> Result<(), PersistenceError>;

    async fn read_progress(&self, job_id: &str) -> Result<Option<BatchProgress>, PersistenceError>;

    async fn remove_progress(&self, job_id: &str) -> Result<(), PersistenceError>;

    async fn write_report(&self, report: &JobReport) -> Result<(), PersistenceError>;

    async fn read_report(&self, job_id: &str) -> Result<Option<JobReport>, PersistenceError>;
}

/// 任务ID只允许字母、数字、`-` 和 `_`（会被用作文件名）
pub fn is_valid_job_id(job_id: &str) -> bool {
    !job_id.is_empty()
        && job_id.len() <= 128
        && job_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// 基于文件的存储
///
/// - 进行中：`<dir>/<job_id>_in_progress.json`
/// - 已完成：`<dir>/<job_id>.json`
pub struct FileJobStore {
    dir: PathBuf,
}

impl FileJobStore {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| PersistenceError::write(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn progress_path(&self, job_id: &str) -> Result<PathBuf, PersistenceError> {
        Self::check_id(job_id)?;
        Ok(self.dir.join(format!("{}_in_progress.json", job_id)))
    }

    pub fn report_path(&self, job_id: &str) -> Result<PathBuf, PersistenceError> {
        Self::check_id(job_id)?;
        Ok(self.dir.join(format!("{}.json", job_id)))
    }

    fn check_id(job_id: &str) -> Result<(), PersistenceError> {
        if is_valid_job_id(job_id) {
            Ok(())
        } else {
            Err(PersistenceError::Backend(format!("非法的任务ID: {:?}", job_id)))
        }
    }

    async fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), PersistenceError> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| PersistenceError::serde(path.display().to_string(), e))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .await
            .map_err(|e| PersistenceError::write(&tmp, e))?;
        fs::rename(&tmp, path)
            .await
            .map_err(|e| PersistenceError::write(path, e))?;
        debug!("已写入: {}", path.display());
        Ok(())
    }

    async fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, PersistenceError> {
        match fs::read_to_string(path).await {
            Ok(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| PersistenceError::serde(path.display().to_string(), e)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PersistenceError::read(path, e)),
        }
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn write_progress(&self, progress: &BatchProgress) -> Result<(), PersistenceError> {
        let path = self.progress_path(&progress.job_id)?;
        self.write_json(&path, progress).await
    }

    async fn read_progress(&self, job_id: &str) -> Result<Option<BatchProgress>, PersistenceError> {
        let path = self.progress_path(job_id)?;
        self.read_json(&path).await
    }

    async fn remove_progress(&self, job_id: &str) -> Result<(), PersistenceError> {
        let path = self.progress_path(job_id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PersistenceError::remove(&path, e)),
        }
    }

    async fn write_report(&self, report: &JobReport) -> Result<(), PersistenceError> {
        let path = self.report_path(&report.job_id)?;
        self.write_json(&path, report).await
    }

    async fn read_report(&self, job_id: &str) -> Result<Option<JobReport>, PersistenceError> {
        let path = self.report_path(job_id)?;
        self.read_json(&path).await
    }
}

/// 内存存储
///
/// 记录每个任务的全部进度写入历史，并支持注入写入失败，便于测试
#[derive(Default)]
pub struct MemoryJobStore {
    progress: Mutex<HashMap<String, BatchProgress>>,
    reports: Mutex<HashMap<String, JobReport>>,
    history: Mutex<HashMap<String, Vec<BatchProgress>>>,
    failing_progress_writes: AtomicUsize,
    failing_report_writes: AtomicUsize,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 接下来的 `count` 次进度写入返回错误
    pub fn fail_next_progress_writes(&self, count: usize) {
        self.failing_progress_writes.store(count, Ordering::SeqCst);
    }

    /// 接下来的 `count` 次报告写入返回错误
    pub fn fail_next_report_writes(&self, count: usize) {
        self.failing_report_writes.store(count, Ordering::SeqCst);
    }

    /// 某个任务全部成功写入过的进度（按写入顺序）
    pub fn progress_history(&self, job_id: &str) -> Vec<BatchProgress> {
        self.history
            .lock()
            .map(|h| h.get(job_id).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn poisoned() -> PersistenceError {
        PersistenceError::Backend("存储锁已中毒".to_string())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn write_progress(&self, progress: &BatchProgress) -> Result<(), PersistenceError> {
        if Self::take_failure(&self.failing_progress_writes) {
            return Err(PersistenceError::Backend("模拟的进度写入失败".to_string()));
        }
        self.progress
            .lock()
            .map_err(|_| Self::poisoned())?
            .insert(progress.job_id.clone(), progress.clone());
        self.history
            .lock()
            .map_err(|_| Self::poisoned())?
            .entry(progress.job_id.clone())
            .or_default()
            .push(progress.clone());
        Ok(())
    }

    async fn read_progress(&self, job_id: &str) -> Result<Option<BatchProgress>, PersistenceError> {
        Ok(self
            .progress
            .lock()
            .map_err(|_| Self::poisoned())?
            .get(job_id)
            .cloned())
    }

    async fn remove_progress(&self, job_id: &str) -> Result<(), PersistenceError> {
        self.progress
            .lock()
            .map_err(|_| Self::poisoned())?
            .remove(job_id);
        Ok(())
    }

    async fn write_report(&self, report: &JobReport) -> Result<(), PersistenceError> {
        if Self::take_failure(&self.failing_report_writes) {
            return Err(PersistenceError::Backend("模拟的报告写入失败".to_string()));
        }
        self.reports
            .lock()
            .map_err(|_| Self::poisoned())?
            .insert(report.job_id.clone(), report.clone());
        Ok(())
    }

    async fn read_report(&self, job_id: &str) -> Result<Option<JobReport>, PersistenceError> {
        Ok(self
            .reports
            .lock()
            .map_err(|_| Self::poisoned())?
            .get(job_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_ids_must_be_file_safe() {
        assert!(is_valid_job_id("1718000000000"));
        assert!(is_valid_job_id("nightly_run-2"));
        assert!(!is_valid_job_id(""));
        assert!(!is_valid_job_id("../etc/passwd"));
    }

    #[tokio::test]
    async fn file_store_uses_progress_and_report_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileJobStore::open(dir.path()).await.unwrap();

        let mut progress = BatchProgress::new("42", 4);
        progress.record_batch(1, 1);
        store.write_progress(&progress).await.unwrap();
        assert!(dir.path().join("42_in_progress.json").exists());
        assert_eq!(store.read_progress("42").await.unwrap(), Some(progress));

        let report = JobReport::new("42", 4, Vec::new());
        store.write_report(&report).await.unwrap();
        store.remove_progress("42").await.unwrap();
        store.remove_progress("42").await.unwrap();

        assert!(store.read_progress("42").await.unwrap().is_none());
        assert_eq!(store.read_report("42").await.unwrap().unwrap().job_id, "42");
    }

    #[tokio::test]
    async fn memory_store_injects_failures_once() {
        let store = MemoryJobStore::new();
        store.fail_next_progress_writes(1);
        let progress = BatchProgress::new("j", 1);

        assert!(store.write_progress(&progress).await.is_err());
        assert!(store.write_progress(&progress).await.is_ok());
        assert_eq!(store.progress_history("j").len(), 1);
    }
}
