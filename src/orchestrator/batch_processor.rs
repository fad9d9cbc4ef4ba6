//! 批量提取处理器 - 编排层
//!
//! ## 职责
//!
//! 把一个任务的全部标识符按固定大小切成有序批次，逐批处理：
//!
//! 1. **初始化进度**：处理前写入进度记录（processed = 0）
//! 2. **批内并发**：同一批的商品并发提取，结果按位置汇总，与完成顺序无关
//! 3. **批间顺序**：上一批全部完成并保存进度后，才开始下一批
//! 4. **最终报告**：写入报告后删除进度记录
//! 5. **异常兜底**：中途出现任务级错误时，仍把已完成的部分写入报告
//!
//! 取消只在两批之间检查，已开始的批次会完整跑完。

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, ConfigError, PersistenceError};
use crate::infrastructure::{is_valid_job_id, JobStore};
use crate::models::{BatchProgress, ExtractionResult, ItemResult, JobReport};
use crate::utils::logging::{
    log_batch_complete, log_batch_start, log_job_loaded, log_progress, print_final_stats,
};
use crate::workflow::ExtractionEngine;

/// 取消标记，可跨任务共享
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 编排参数
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub batch_size: usize,
    pub max_identifiers: usize,
    pub persist_attempts: u32,
    pub persist_retry_delay: Duration,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_size: config.batch_size,
            max_identifiers: config.max_identifiers_per_job,
            persist_attempts: config.persist_attempts,
            persist_retry_delay: Duration::from_millis(200),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// 批次循环的结束方式
enum BatchRun {
    Completed,
    Cancelled,
}

/// 批量提取处理器
#[derive(Clone)]
pub struct BatchOrchestrator {
    engine: Arc<ExtractionEngine>,
    store: Arc<dyn JobStore>,
    settings: OrchestratorSettings,
}

impl BatchOrchestrator {
    pub fn new(
        engine: Arc<ExtractionEngine>,
        store: Arc<dyn JobStore>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            engine,
            store,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// 运行一个任务
    ///
    /// 只有配置/输入错误（任务尚未开始）和最终报告无法写入时返回 `Err`；
    /// 运行中的任务级错误会记录在报告的 `error` 字段里。
    pub async fn run(
        &self,
        job_id: &str,
        identifiers: Vec<String>,
        cancel: &CancelFlag,
    ) -> AppResult<JobReport> {
        self.validate(job_id, &identifiers)?;

        let total = identifiers.len();
        log_job_loaded(job_id, total, self.settings.batch_size);

        let mut progress = BatchProgress::new(job_id, total);
        let mut results = Vec::with_capacity(total);

        let report = match self
            .process_batches(&mut progress, &identifiers, &mut results, cancel)
            .await
        {
            Ok(BatchRun::Completed) => JobReport::new(job_id, total, results),
            Ok(BatchRun::Cancelled) => JobReport::new(job_id, total, results)
                .with_error("job cancelled")
                .cancelled(),
            Err(e) => {
                error!("[任务 {}] ❌ 任务异常终止，保存已完成的部分: {}", job_id, e);
                JobReport::new(job_id, total, results).with_error(e.to_string())
            }
        };

        self.finalize(&report).await?;
        print_final_stats(&report);
        Ok(report)
    }

    fn validate(&self, job_id: &str, identifiers: &[String]) -> Result<(), ConfigError> {
        if self.settings.batch_size == 0 {
            return Err(ConfigError::invalid("batch_size", "必须大于 0"));
        }
        if self.settings.persist_attempts == 0 {
            return Err(ConfigError::invalid("persist_attempts", "必须大于 0"));
        }
        if !is_valid_job_id(job_id) {
            return Err(ConfigError::InvalidInput(format!(
                "任务ID只能包含字母、数字、- 和 _: {:?}",
                job_id
            )));
        }
        if identifiers.is_empty() {
            return Err(ConfigError::InvalidInput("标识符列表为空".to_string()));
        }
        if identifiers.len() > self.settings.max_identifiers {
            return Err(ConfigError::InvalidInput(format!(
                "标识符数量 {} 超过上限 {}",
                identifiers.len(),
                self.settings.max_identifiers
            )));
        }
        Ok(())
    }

    async fn process_batches(
        &self,
        progress: &mut BatchProgress,
        identifiers: &[String],
        results: &mut Vec<ItemResult>,
        cancel: &CancelFlag,
    ) -> Result<BatchRun, AppError> {
        let job_id = progress.job_id.clone();
        self.persist("进度", || self.store.write_progress(progress))
            .await?;

        let total = identifiers.len();
        let batch_size = self.settings.batch_size;
        let total_batches = total.div_ceil(batch_size);

        for (batch_index, batch) in identifiers.chunks(batch_size).enumerate() {
            if cancel.is_cancelled() {
                warn!(
                    "[任务 {}] ⚠️ 任务已取消，停止于第 {}/{} 批之前",
                    job_id,
                    batch_index + 1,
                    total_batches
                );
                return Ok(BatchRun::Cancelled);
            }

            let start = batch_index * batch_size;
            log_batch_start(&job_id, batch_index + 1, total_batches, start + 1, start + batch.len(), total);

            let batch_results = self.process_batch(&job_id, batch).await;
            let success = batch_results.iter().filter(|r| r.is_some()).count();

            results.extend(
                batch
                    .iter()
                    .zip(batch_results)
                    .map(|(identifier, result)| ItemResult {
                        identifier: identifier.clone(),
                        result,
                    }),
            );
            progress.record_batch(success, batch.len() - success);

            self.persist("进度", || self.store.write_progress(progress))
                .await?;

            log_batch_complete(&job_id, batch_index + 1, success, batch.len());
            log_progress(progress);
        }

        Ok(BatchRun::Completed)
    }

    /// 并发处理一批，结果按输入位置返回
    async fn process_batch(&self, job_id: &str, batch: &[String]) -> Vec<Option<ExtractionResult>> {
        let mut handles = Vec::with_capacity(batch.len());

        // 为本批创建并发任务（总并发由引擎内的并发闸门限制）
        for identifier in batch {
            let engine = Arc::clone(&self.engine);
            let identifier = identifier.clone();
            handles.push(tokio::spawn(async move { engine.extract(&identifier).await }));
        }

        // 等待本批所有任务完成
        let mut results = Vec::with_capacity(handles.len());
        for (identifier, handle) in batch.iter().zip(handles) {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    error!("[任务 {}] [{}] 任务执行失败: {}", job_id, identifier, e);
                    results.push(None);
                }
            }
        }
        results
    }

    /// 写入报告并删除进度记录
    async fn finalize(&self, report: &JobReport) -> AppResult<()> {
        let job_id = report.job_id.as_str();
        self.persist("报告", || self.store.write_report(report))
            .await
            .map_err(|e| {
                error!("[任务 {}] ❌ 最终报告写入失败: {}", job_id, e);
                e
            })?;

        if let Err(e) = self
            .persist("清理进度", || self.store.remove_progress(job_id))
            .await
        {
            // 报告已存在时查询以报告为准，残留的进度记录不影响状态
            warn!("[任务 {}] ⚠️ 删除进度记录失败: {}", job_id, e);
        }
        Ok(())
    }

    /// 有限次重试的持久化写入
    async fn persist<F, Fut>(&self, what: &str, mut op: F) -> Result<(), PersistenceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), PersistenceError>>,
    {
        let attempts = self.settings.persist_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= attempts => return Err(e),
                Err(e) => {
                    warn!("{}写入失败 (尝试 {}/{}): {}", what, attempt, attempts, e);
                    attempt += 1;
                    sleep(self.settings.persist_retry_delay).await;
                }
            }
        }
    }
}

/// 按固定大小切分，返回每批的长度（最后一批可能不足）
pub fn batch_sizes(total: usize, batch_size: usize) -> Vec<usize> {
    if batch_size == 0 {
        return Vec::new();
    }
    (0..total)
        .step_by(batch_size)
        .map(|start| (start + batch_size).min(total) - start)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_sizes_cover_every_item() {
        assert_eq!(batch_sizes(6, 2), vec![2, 2, 2]);
        assert_eq!(batch_sizes(7, 5), vec![5, 2]);
        assert_eq!(batch_sizes(0, 5), Vec::<usize>::new());
        for total in 0..40 {
            for size in 1..9 {
                assert_eq!(batch_sizes(total, size).iter().sum::<usize>(), total);
            }
        }
    }

    #[test]
    fn cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        other.cancel();
        assert!(flag.is_cancelled());
    }
}
