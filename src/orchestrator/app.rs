//! 应用生命周期
//!
//! 进程启动时一次性构建实例池、缓存、存储和提取引擎，显式传给编排器；
//! 并发运行的多个任务共享同一个缓存和实例池，各自持有独立的进度记录。

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use crate::browser::ChromiumFactory;
use crate::config::Config;
use crate::infrastructure::{ConcurrencyLimiter, FileCache, FileJobStore, JobStore, PoolStats, RendererPool};
use crate::models::{generate_job_id, load_identifiers, ExtractionResult, JobReport};
use crate::orchestrator::batch_processor::{BatchOrchestrator, CancelFlag, OrchestratorSettings};
use crate::orchestrator::job_status::{job_status, JobStatus};
use crate::services::{ChromiumRenderer, InertRotator, RenderSettings, RetryExecutor, RetryPolicy};
use crate::utils::logging::log_startup;
use crate::workflow::ExtractionEngine;

/// 应用主结构
pub struct App {
    config: Config,
    pool: Arc<RendererPool<ChromiumFactory>>,
    store: Arc<FileJobStore>,
    engine: Arc<ExtractionEngine>,
    orchestrator: BatchOrchestrator,
}

impl App {
    /// 初始化应用（浏览器实例按需创建，这里不会启动浏览器）
    pub async fn initialize(config: Config) -> Result<Self> {
        config.validate()?;
        log_startup(&config);

        let pool = Arc::new(RendererPool::new(
            ChromiumFactory::new(config.chrome_executable.clone(), config.browser_debug_port),
            config.max_instances,
            config.max_sessions_per_instance,
        ));

        let cache = FileCache::open(&config.cache_dir, config.cache_ttl_secs.map(Duration::from_secs))
            .await
            .with_context(|| format!("无法打开缓存目录: {}", config.cache_dir))?;
        let store = Arc::new(
            FileJobStore::open(&config.results_dir)
                .await
                .with_context(|| format!("无法打开结果目录: {}", config.results_dir))?,
        );

        let renderer = ChromiumRenderer::new(Arc::clone(&pool), RenderSettings::from_config(&config));
        let retry = RetryExecutor::new(
            RetryPolicy::from_config(&config),
            Arc::new(InertRotator::new(Duration::from_millis(100))),
        );
        let engine = Arc::new(ExtractionEngine::new(
            Arc::new(cache),
            ConcurrencyLimiter::new(config.max_concurrent_extractions),
            retry,
            Arc::new(renderer),
        ));

        let orchestrator = BatchOrchestrator::new(
            Arc::clone(&engine),
            Arc::clone(&store) as Arc<dyn JobStore>,
            OrchestratorSettings::from_config(&config),
        );

        Ok(Self {
            config,
            pool,
            store,
            engine,
            orchestrator,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 从文件读取标识符并运行任务
    pub async fn run_file(
        &self,
        input: &Path,
        job_id: Option<String>,
        cancel: &CancelFlag,
    ) -> Result<JobReport> {
        let identifiers = load_identifiers(input).await?;
        let job_id = job_id.unwrap_or_else(generate_job_id);
        let report = self.orchestrator.run(&job_id, identifiers, cancel).await?;
        Ok(report)
    }

    /// 提取单个商品（经过缓存）
    pub async fn extract_one(&self, identifier: &str) -> Option<ExtractionResult> {
        self.engine.extract(identifier).await
    }

    pub async fn job_status(&self, job_id: &str) -> Result<JobStatus> {
        Ok(job_status(self.store.as_ref(), job_id).await?)
    }

    pub async fn pool_stats(&self) -> PoolStats {
        self.pool.stats().await
    }

    /// 关闭全部浏览器实例，可重复调用
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
        info!("✓ 应用已关闭");
    }
}
