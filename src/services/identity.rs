//! 身份轮换钩子
//!
//! 在两次重试之间调用，可用于切换出口 IP、User-Agent 或视口。
//! 目前只提供 `InertRotator`：记录日志并短暂停顿，不改变任何网络身份。

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::models::RequestKey;

#[async_trait]
pub trait IdentityRotator: Send + Sync {
    /// `next_attempt` 为即将开始的尝试序号（从1开始）
    async fn rotate(&self, key: &RequestKey, next_attempt: u32) -> anyhow::Result<()>;
}

/// 不做任何身份切换的轮换器
#[derive(Debug, Clone, Default)]
pub struct InertRotator {
    pause: Duration,
}

impl InertRotator {
    pub fn new(pause: Duration) -> Self {
        Self { pause }
    }
}

#[async_trait]
impl IdentityRotator for InertRotator {
    async fn rotate(&self, key: &RequestKey, next_attempt: u32) -> anyhow::Result<()> {
        debug!("身份轮换 (未启用) - 键 {} 第 {} 次尝试前", key, next_attempt);
        if !self.pause.is_zero() {
            tokio::time::sleep(self.pause).await;
        }
        Ok(())
    }
}
