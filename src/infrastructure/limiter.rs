//! 全局并发闸门 - 基础设施层
//!
//! 限制同时进行的提取操作总数，与实例池的大小相互独立。
//! 获取许可时协作式挂起，许可在 `Permit` 被 drop 时归还。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::AppError;

/// 并发闸门
#[derive(Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    acquired_total: Arc<AtomicU64>,
}

/// 一个许可，drop 时自动归还
pub struct Permit {
    _inner: OwnedSemaphorePermit,
}

impl ConcurrencyLimiter {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            acquired_total: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 获取一个许可，没有空闲许可时挂起等待
    pub async fn acquire(&self) -> Result<Permit, AppError> {
        let inner = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| AppError::Other(format!("并发闸门已关闭: {}", e)))?;
        self.acquired_total.fetch_add(1, Ordering::SeqCst);
        Ok(Permit { _inner: inner })
    }

    /// 归还许可
    pub fn release(&self, permit: Permit) {
        drop(permit);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 当前空闲许可数
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// 当前被占用的许可数
    pub fn in_flight(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }

    /// 自创建以来发放过的许可总数
    pub fn acquired_total(&self) -> u64 {
        self.acquired_total.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn permits_are_returned_on_drop() {
        let limiter = ConcurrencyLimiter::new(2);
        let a = limiter.acquire().await.unwrap();
        let _b = limiter.acquire().await.unwrap();
        assert_eq!(limiter.available(), 0);
        assert_eq!(limiter.in_flight(), 2);

        limiter.release(a);
        assert_eq!(limiter.available(), 1);
        assert_eq!(limiter.acquired_total(), 2);
    }

    #[tokio::test]
    async fn acquire_waits_for_a_free_permit() {
        let limiter = ConcurrencyLimiter::new(1);
        let held = limiter.acquire().await.unwrap();

        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire().await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        tokio_test::assert_ok!(waiter.await.unwrap());
    }
}
