//! 任务状态查询
//!
//! 报告优先：报告存在即视为已完成，否则看是否存在进度记录。

use serde::Serialize;
use tracing::warn;

use crate::error::PersistenceError;
use crate::infrastructure::JobStore;
use crate::models::{BatchProgress, JobReport};

/// 任务状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    /// 进行中；进度记录暂时不可读时为空
    InProgress { progress: Option<BatchProgress> },
    Completed { report: JobReport },
    NotFound,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed { .. })
    }
}

/// 查询任务状态
pub async fn job_status(store: &dyn JobStore, job_id: &str) -> Result<JobStatus, PersistenceError> {
    if let Some(report) = store.read_report(job_id).await? {
        return Ok(JobStatus::Completed { report });
    }

    match store.read_progress(job_id).await {
        Ok(Some(progress)) => Ok(JobStatus::InProgress {
            progress: Some(progress),
        }),
        Ok(None) => Ok(JobStatus::NotFound),
        // 进度文件正在被替换或已损坏，任务仍视为进行中
        Err(PersistenceError::Serde { .. }) => {
            warn!("[任务 {}] 进度记录暂时无法解析", job_id);
            Ok(JobStatus::InProgress { progress: None })
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::MemoryJobStore;

    #[tokio::test]
    async fn report_takes_precedence_over_progress() {
        let store = MemoryJobStore::new();
        assert_eq!(job_status(&store, "7").await.unwrap(), JobStatus::NotFound);

        store.write_progress(&BatchProgress::new("7", 2)).await.unwrap();
        assert!(matches!(
            job_status(&store, "7").await.unwrap(),
            JobStatus::InProgress { progress: Some(_) }
        ));

        store.write_report(&JobReport::new("7", 2, Vec::new())).await.unwrap();
        assert!(job_status(&store, "7").await.unwrap().is_terminal());
    }

    #[tokio::test]
    async fn corrupt_progress_file_still_reports_in_progress() {
        let dir = tempfile::tempdir().unwrap();
        let store = crate::infrastructure::FileJobStore::open(dir.path()).await.unwrap();
        std::fs::write(dir.path().join("9_in_progress.json"), "{").unwrap();

        assert_eq!(
            job_status(&store, "9").await.unwrap(),
            JobStatus::InProgress { progress: None }
        );
    }
}
