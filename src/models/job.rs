//! 任务进度与最终报告

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::product::ExtractionResult;

/// 生成任务ID（当前 Unix 毫秒时间戳）
pub fn generate_job_id() -> String {
    Utc::now().timestamp_millis().to_string()
}

/// 任务进行中的进度记录
///
/// `processed_count` 只增不减，并且始终等于 `success_count + failure_count`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress {
    pub job_id: String,
    pub total_items: usize,
    pub processed_count: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub last_updated: DateTime<Utc>,
}

impl BatchProgress {
    pub fn new(job_id: impl Into<String>, total_items: usize) -> Self {
        Self {
            job_id: job_id.into(),
            total_items,
            processed_count: 0,
            success_count: 0,
            failure_count: 0,
            last_updated: Utc::now(),
        }
    }

    /// 累加一批的结果
    pub fn record_batch(&mut self, success: usize, failure: usize) {
        self.success_count += success;
        self.failure_count += failure;
        self.processed_count = self.success_count + self.failure_count;
        self.last_updated = Utc::now();
    }
}

/// 单个商品的结果，失败时 `result` 为空
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemResult {
    pub identifier: String,
    pub result: Option<ExtractionResult>,
}

impl ItemResult {
    pub fn is_success(&self) -> bool {
        self.result.is_some()
    }
}

/// 任务最终报告（写入后不可变）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReport {
    pub job_id: String,
    pub total_items: usize,
    pub success_count: usize,
    pub failure_count: usize,
    /// 任务级错误（异常终止时保留已完成的部分结果）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub cancelled: bool,
    pub completed_at: DateTime<Utc>,
    pub results: Vec<ItemResult>,
}

impl JobReport {
    pub fn new(job_id: impl Into<String>, total_items: usize, results: Vec<ItemResult>) -> Self {
        let success_count = results.iter().filter(|r| r.is_success()).count();
        Self {
            job_id: job_id.into(),
            total_items,
            success_count,
            failure_count: results.len() - success_count,
            error: None,
            cancelled: false,
            completed_at: Utc::now(),
            results,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn cancelled(mut self) -> Self {
        self.cancelled = true;
        self
    }

    pub fn is_complete(&self) -> bool {
        self.error.is_none() && self.results.len() == self.total_items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_keeps_processed_equal_to_sum() {
        let mut progress = BatchProgress::new("job", 6);
        progress.record_batch(2, 0);
        progress.record_batch(1, 1);
        assert_eq!(progress.processed_count, 4);
        assert_eq!(
            progress.processed_count,
            progress.success_count + progress.failure_count
        );
    }

    #[test]
    fn report_counts_successes_and_failures() {
        let results = vec![
            ItemResult {
                identifier: "A".into(),
                result: Some(ExtractionResult::default()),
            },
            ItemResult {
                identifier: "B".into(),
                result: None,
            },
        ];
        let report = JobReport::new("job", 3, results).with_error("disk full");
        assert_eq!(report.success_count, 1);
        assert_eq!(report.failure_count, 1);
        assert!(!report.is_complete());
    }

    #[test]
    fn progress_serializes_in_camel_case() {
        let progress = BatchProgress::new("42", 10);
        let json = serde_json::to_value(&progress).unwrap();
        assert_eq!(json["totalItems"], 10);
        assert_eq!(json["processedCount"], 0);
    }
}
