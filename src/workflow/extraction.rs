//! 单个商品的提取流程 - 流程层
//!
//! 流程顺序：
//! 1. 查缓存，命中直接返回（不占用并发许可，不调用渲染器）
//! 2. 获取并发许可
//! 3. 带重试地调用渲染器
//! 4. 成功则写缓存，失败返回 `None`
//!
//! 单个商品的任何错误都不会越过这一层向批处理抛出。

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::infrastructure::{ConcurrencyLimiter, ResultCache};
use crate::models::{ExtractionRequest, ExtractionResult};
use crate::services::{Renderer, RetryExecutor};

/// 提取引擎
///
/// - 组合 缓存 → 并发闸门 → 重试 → 渲染器
/// - 不持有任何浏览器资源，只依赖注入的能力
#[derive(Clone)]
pub struct ExtractionEngine {
    cache: Arc<dyn ResultCache>,
    limiter: ConcurrencyLimiter,
    retry: RetryExecutor,
    renderer: Arc<dyn Renderer>,
}

impl ExtractionEngine {
    pub fn new(
        cache: Arc<dyn ResultCache>,
        limiter: ConcurrencyLimiter,
        retry: RetryExecutor,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        Self {
            cache,
            limiter,
            retry,
            renderer,
        }
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    /// 提取单个标识符
    pub async fn extract(&self, identifier: &str) -> Option<ExtractionResult> {
        self.extract_request(&ExtractionRequest::new(identifier)).await
    }

    pub async fn extract_request(&self, request: &ExtractionRequest) -> Option<ExtractionResult> {
        if let Some(cached) = self.cache.get(request.key()).await {
            debug!("{} ✓ 命中缓存", request);
            return Some(cached);
        }

        let permit = match self.limiter.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                error!("{} ❌ 无法获取并发许可: {}", request, e);
                return None;
            }
        };

        let renderer = &self.renderer;
        let outcome = self
            .retry
            .run(request.key(), |_| renderer.fetch_and_parse(request.identifier()))
            .await;

        let result = match outcome {
            Ok(result) => {
                if let Err(e) = self.cache.put(request.key(), &result).await {
                    warn!("{} ⚠️ 写入缓存失败（结果仍然返回）: {}", request, e);
                }
                info!("{} ✓ 提取成功", request);
                Some(result)
            }
            Err(failure) => {
                error!("{} ❌ 提取失败: {}", request, failure);
                None
            }
        };

        self.limiter.release(permit);
        result
    }
}
