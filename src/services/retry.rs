//! 重试执行器 - 业务能力层
//!
//! 把一次渲染尝试包装成"最多 N 次、随机退避、两次之间轮换身份"的执行。
//! 最后一次仍失败时返回带全部错误的 `RetryFailure`，不会继续向外抛出。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::error::RenderFailure;
use crate::models::RequestKey;
use crate::services::identity::{IdentityRotator, InertRotator};

/// 重试策略
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// 退避基数，第 n 次失败后等待 `base_delay * n + jitter`
    pub base_delay: Duration,
    /// 随机抖动上限
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_jitter: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_jitter: Duration::from_millis(config.retry_jitter_ms),
        }
    }

    /// 无等待的策略（测试用）
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }

    /// 第 `failed_attempt` 次失败后的等待时间
    pub fn backoff_delay(&self, failed_attempt: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        // 配置值极大时饱和到 Duration::MAX，而不是溢出
        self.base_delay
            .saturating_mul(failed_attempt)
            .saturating_add(Duration::from_millis(jitter))
    }
}

/// 全部尝试失败
#[derive(Debug, Clone, Error)]
#[error(
    "{key} 重试 {attempts} 次后仍失败: {}",
    .errors.last().map(|e| e.to_string()).unwrap_or_default()
)]
pub struct RetryFailure {
    pub key: RequestKey,
    pub attempts: u32,
    /// 每次尝试的错误（按顺序）
    pub errors: Vec<RenderFailure>,
}

impl RetryFailure {
    pub fn last_error(&self) -> Option<&RenderFailure> {
        self.errors.last()
    }
}

/// 重试执行器
#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    rotator: Arc<dyn IdentityRotator>,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy, rotator: Arc<dyn IdentityRotator>) -> Self {
        Self { policy, rotator }
    }

    /// 使用不切换身份的轮换器
    pub fn with_policy(policy: RetryPolicy) -> Self {
        Self::new(policy, Arc::new(InertRotator::default()))
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// 执行带重试的操作
    ///
    /// `attempt_fn` 接收当前尝试序号（从1开始），成功后立即返回，不再重试
    pub async fn run<T, F, Fut>(&self, key: &RequestKey, mut attempt_fn: F) -> Result<T, RetryFailure>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, RenderFailure>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut errors = Vec::new();

        for attempt in 1..=max_attempts {
            match attempt_fn(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("[{}] 第 {} 次尝试成功", short_key(key), attempt);
                    }
                    return Ok(value);
                }
                Err(failure) => {
                    if failure.is_pool_exhaustion() {
                        error!(
                            "[{}] ⚠️ 浏览器实例不足 (尝试 {}/{}): {}",
                            short_key(key),
                            attempt,
                            max_attempts,
                            failure
                        );
                    } else {
                        warn!(
                            "[{}] 尝试 {}/{} 失败: {}",
                            short_key(key),
                            attempt,
                            max_attempts,
                            failure
                        );
                    }
                    errors.push(failure);
                }
            }

            if attempt < max_attempts {
                let delay = self.policy.backoff_delay(attempt);
                debug!("[{}] 等待 {:?} 后重试", short_key(key), delay);
                sleep(delay).await;

                if let Err(e) = self.rotator.rotate(key, attempt + 1).await {
                    warn!("[{}] 身份轮换失败（已忽略）: {}", short_key(key), e);
                }
            }
        }

        Err(RetryFailure {
            key: key.clone(),
            attempts: max_attempts,
            errors,
        })
    }
}

fn short_key(key: &RequestKey) -> &str {
    key.as_str().get(..12).unwrap_or(key.as_str())
}
