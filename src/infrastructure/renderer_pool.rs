//! 渲染实例池 - 基础设施层
//!
//! 持有稀缺资源（浏览器实例），只暴露"借出 / 归还实例"的能力。
//!
//! ## 分配策略
//!
//! 1. 扫描已有槽位，返回第一个仍有会话余量且存活的实例；
//!    探活失败的实例被移出池子并尽力销毁
//! 2. 没有余量且实例数未达上限时，创建新实例
//! 3. 池子已满且全部饱和时，选中最久未使用的槽位，强制关闭它上面的全部会话后复用
//!    （调用方不会在这里排队等待）
//!
//! 选择槽位的整个过程在同一把锁内完成，并发的 `acquire_instance` 不会破坏
//! `会话数 <= max_sessions_per_instance` 与 `实例数 <= max_instances`。

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::PoolError;

/// 实例编号（池内唯一，单调递增）
pub type InstanceId = u64;

/// 实例的创建、探活、清理与销毁能力
#[async_trait]
pub trait InstanceFactory: Send + Sync {
    type Instance: Send + Sync + 'static;

    /// 创建一个新实例
    async fn create(&self, id: InstanceId) -> anyhow::Result<Self::Instance>;

    /// 探活
    async fn is_alive(&self, instance: &Self::Instance) -> bool;

    /// 关闭实例上挂载的全部会话，返回关闭的数量
    async fn detach_sessions(&self, instance: &Self::Instance) -> anyhow::Result<usize>;

    /// 销毁实例
    async fn dispose(&self, instance: Arc<Self::Instance>) -> anyhow::Result<()>;
}

/// 借出的实例
///
/// 必须通过 `RendererPool::release` 归还。槽位被强制复用后，旧的租约归还时会被忽略。
pub struct InstanceLease<I> {
    id: InstanceId,
    generation: u64,
    instance: Arc<I>,
}

impl<I> InstanceLease<I> {
    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn instance(&self) -> &I {
        &self.instance
    }
}

/// 池子状态快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// (实例编号, 当前会话数)
    pub slots: Vec<(InstanceId, usize)>,
    pub max_instances: usize,
    pub max_sessions_per_instance: usize,
}

impl PoolStats {
    pub fn instances(&self) -> usize {
        self.slots.len()
    }

    pub fn total_sessions(&self) -> usize {
        self.slots.iter().map(|(_, sessions)| sessions).sum()
    }
}

struct Slot<I> {
    id: InstanceId,
    instance: Arc<I>,
    sessions: usize,
    /// 每次强制复用加一
    generation: u64,
    last_used: Instant,
}

impl<I> Slot<I> {
    fn lease(&self) -> InstanceLease<I> {
        InstanceLease {
            id: self.id,
            generation: self.generation,
            instance: Arc::clone(&self.instance),
        }
    }
}

struct PoolState<I> {
    slots: Vec<Slot<I>>,
    next_id: InstanceId,
    closed: bool,
}

/// 渲染实例池
pub struct RendererPool<F: InstanceFactory> {
    factory: F,
    state: Mutex<PoolState<F::Instance>>,
    max_instances: usize,
    max_sessions_per_instance: usize,
}

impl<F: InstanceFactory> RendererPool<F> {
    pub fn new(factory: F, max_instances: usize, max_sessions_per_instance: usize) -> Self {
        Self {
            factory,
            state: Mutex::new(PoolState {
                slots: Vec::new(),
                next_id: 1,
                closed: false,
            }),
            max_instances: max_instances.max(1),
            max_sessions_per_instance: max_sessions_per_instance.max(1),
        }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// 借出一个实例
    pub async fn acquire_instance(&self) -> Result<InstanceLease<F::Instance>, PoolError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(PoolError::ShutDown);
        }

        // 1. 复用仍有余量的存活实例
        let mut index = 0;
        while index < state.slots.len() {
            if state.slots[index].sessions >= self.max_sessions_per_instance {
                index += 1;
                continue;
            }

            let instance = Arc::clone(&state.slots[index].instance);
            if self.factory.is_alive(&instance).await {
                let slot = &mut state.slots[index];
                slot.sessions += 1;
                slot.last_used = Instant::now();
                debug!("复用实例 #{} (会话 {}/{})", slot.id, slot.sessions, self.max_sessions_per_instance);
                return Ok(slot.lease());
            }

            let dead = state.slots.remove(index);
            warn!("实例 #{} 探活失败，已移出实例池", dead.id);
            self.dispose_quietly(dead).await;
        }

        // 2. 未达上限，创建新实例
        if state.slots.len() < self.max_instances {
            return self.create_slot(&mut state).await;
        }

        // 3. 池子已满且全部饱和：强制复用最久未使用的实例
        let lru_index = state
            .slots
            .iter()
            .enumerate()
            .min_by_key(|(_, slot)| slot.last_used)
            .map(|(index, _)| index)
            .ok_or_else(|| PoolError::Exhausted {
                source: anyhow::anyhow!("实例池为空且无法创建新实例"),
            })?;

        let instance = Arc::clone(&state.slots[lru_index].instance);
        if !self.factory.is_alive(&instance).await {
            let dead = state.slots.remove(lru_index);
            warn!("实例 #{} 探活失败，已移出实例池", dead.id);
            self.dispose_quietly(dead).await;
            return self.create_slot(&mut state).await;
        }

        match self.factory.detach_sessions(&instance).await {
            Ok(closed) => debug!("强制复用前关闭了 {} 个会话", closed),
            Err(e) => warn!("强制关闭会话失败（继续复用）: {}", e),
        }

        let slot = &mut state.slots[lru_index];
        slot.generation += 1;
        slot.sessions = 1;
        slot.last_used = Instant::now();
        info!(
            "♻️ 实例池已满，强制复用实例 #{} (第 {} 代)",
            slot.id, slot.generation
        );
        Ok(slot.lease())
    }

    /// 归还实例，只减少会话计数，不销毁实例
    pub async fn release(&self, lease: InstanceLease<F::Instance>) {
        let mut state = self.state.lock().await;
        match state.slots.iter_mut().find(|slot| slot.id == lease.id) {
            Some(slot) if slot.generation == lease.generation => {
                slot.sessions = slot.sessions.saturating_sub(1);
            }
            Some(slot) => debug!(
                "实例 #{} 已被强制复用 (租约第 {} 代, 当前第 {} 代)，忽略归还",
                slot.id, lease.generation, slot.generation
            ),
            None => debug!("实例 #{} 已不在池中，忽略归还", lease.id),
        }
    }

    /// 销毁全部实例，可重复调用
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if state.closed {
            return;
        }
        state.closed = true;

        let slots: Vec<_> = state.slots.drain(..).collect();
        info!("正在关闭实例池 ({} 个实例)...", slots.len());
        for slot in slots {
            self.dispose_quietly(slot).await;
        }
    }

    pub async fn stats(&self) -> PoolStats {
        let state = self.state.lock().await;
        PoolStats {
            slots: state.slots.iter().map(|s| (s.id, s.sessions)).collect(),
            max_instances: self.max_instances,
            max_sessions_per_instance: self.max_sessions_per_instance,
        }
    }

    async fn create_slot(
        &self,
        state: &mut PoolState<F::Instance>,
    ) -> Result<InstanceLease<F::Instance>, PoolError> {
        let id = state.next_id;
        state.next_id += 1;

        let instance = self
            .factory
            .create(id)
            .await
            .map_err(|source| PoolError::Exhausted { source })?;

        let slot = Slot {
            id,
            instance: Arc::new(instance),
            sessions: 1,
            generation: 0,
            last_used: Instant::now(),
        };
        let lease = slot.lease();
        state.slots.push(slot);
        info!(
            "✓ 新建实例 #{} ({}/{})",
            id,
            state.slots.len(),
            self.max_instances
        );
        Ok(lease)
    }

    async fn dispose_quietly(&self, slot: Slot<F::Instance>) {
        if let Err(e) = self.factory.dispose(slot.instance).await {
            warn!("销毁实例 #{} 失败（已忽略）: {}", slot.id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FakeInstance {
        id: InstanceId,
        detached: AtomicUsize,
    }

    #[derive(Default)]
    struct FakeFactory {
        created: AtomicUsize,
        disposed: AtomicUsize,
        fail_create: AtomicBool,
        fail_dispose: AtomicBool,
        dead: std::sync::Mutex<HashSet<InstanceId>>,
    }

    impl FakeFactory {
        fn kill(&self, id: InstanceId) {
            self.dead.lock().unwrap().insert(id);
        }
    }

    #[async_trait]
    impl InstanceFactory for FakeFactory {
        type Instance = FakeInstance;

        async fn create(&self, id: InstanceId) -> anyhow::Result<FakeInstance> {
            if self.fail_create.load(Ordering::SeqCst) {
                anyhow::bail!("chrome not found");
            }
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(FakeInstance {
                id,
                detached: AtomicUsize::new(0),
            })
        }

        async fn is_alive(&self, instance: &FakeInstance) -> bool {
            !self.dead.lock().unwrap().contains(&instance.id)
        }

        async fn detach_sessions(&self, instance: &FakeInstance) -> anyhow::Result<usize> {
            instance.detached.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        }

        async fn dispose(&self, _instance: Arc<FakeInstance>) -> anyhow::Result<()> {
            self.disposed.fetch_add(1, Ordering::SeqCst);
            if self.fail_dispose.load(Ordering::SeqCst) {
                anyhow::bail!("already gone");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn third_acquire_forcibly_reuses_a_slot() {
        let pool = RendererPool::new(FakeFactory::default(), 2, 1);

        let first = pool.acquire_instance().await.unwrap();
        let second = pool.acquire_instance().await.unwrap();
        assert_ne!(first.id(), second.id());

        let third = pool.acquire_instance().await.unwrap();
        assert!(third.id() == first.id() || third.id() == second.id());
        assert_eq!(third.generation(), 1);
        assert_eq!(third.instance().detached.load(Ordering::SeqCst), 1);
        assert_eq!(pool.factory().created.load(Ordering::SeqCst), 2);

        let stats = pool.stats().await;
        assert_eq!(stats.instances(), 2);
        assert!(stats.slots.iter().all(|(_, s)| *s <= 1));
    }

    #[tokio::test]
    async fn stale_lease_release_is_ignored() {
        let pool = RendererPool::new(FakeFactory::default(), 1, 1);
        let old = pool.acquire_instance().await.unwrap();
        let reused = pool.acquire_instance().await.unwrap();
        assert_eq!(old.id(), reused.id());

        pool.release(old).await;
        assert_eq!(pool.stats().await.total_sessions(), 1);

        pool.release(reused).await;
        assert_eq!(pool.stats().await.total_sessions(), 0);
    }

    #[tokio::test]
    async fn release_frees_capacity_without_destroying() {
        let pool = RendererPool::new(FakeFactory::default(), 1, 2);
        let a = pool.acquire_instance().await.unwrap();
        let b = pool.acquire_instance().await.unwrap();
        assert_eq!(a.id(), b.id());

        pool.release(a).await;
        let c = pool.acquire_instance().await.unwrap();
        assert_eq!(c.generation(), 0);
        assert_eq!(pool.factory().created.load(Ordering::SeqCst), 1);
        assert_eq!(pool.factory().disposed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unhealthy_instance_is_removed_and_replaced() {
        let pool = RendererPool::new(FakeFactory::default(), 1, 2);
        let lease = pool.acquire_instance().await.unwrap();
        let dead_id = lease.id();
        pool.factory().fail_dispose.store(true, Ordering::SeqCst);
        pool.factory().kill(dead_id);

        let fresh = pool.acquire_instance().await.unwrap();
        assert_ne!(fresh.id(), dead_id);
        assert_eq!(pool.factory().disposed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.stats().await.instances(), 1);
    }

    #[tokio::test]
    async fn creation_failure_is_pool_exhaustion() {
        let factory = FakeFactory::default();
        factory.fail_create.store(true, Ordering::SeqCst);
        let pool = RendererPool::new(factory, 2, 1);

        let err = pool.acquire_instance().await.err().unwrap();
        assert!(matches!(err, PoolError::Exhausted { .. }));
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_final() {
        let pool = RendererPool::new(FakeFactory::default(), 2, 1);
        let _a = pool.acquire_instance().await.unwrap();
        let _b = pool.acquire_instance().await.unwrap();

        pool.shutdown().await;
        pool.shutdown().await;
        assert_eq!(pool.factory().disposed.load(Ordering::SeqCst), 2);
        assert!(matches!(
            pool.acquire_instance().await,
            Err(PoolError::ShutDown)
        ));
    }

    #[tokio::test]
    async fn invariants_hold_under_concurrent_use() {
        let pool = Arc::new(RendererPool::new(FakeFactory::default(), 3, 2));
        let mut handles = Vec::new();

        for task in 0..24u64 {
            let pool = Arc::clone(&pool);
            handles.push(tokio::spawn(async move {
                for round in 0..10u64 {
                    let lease = pool.acquire_instance().await.unwrap();
                    let stats = pool.stats().await;
                    assert!(stats.instances() <= 3);
                    assert!(stats.slots.iter().all(|(_, s)| *s <= 2));
                    if (task + round) % 3 == 0 {
                        tokio::task::yield_now().await;
                    }
                    pool.release(lease).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let stats = pool.stats().await;
        assert!(stats.instances() <= 3);
        assert_eq!(pool.factory().created.load(Ordering::SeqCst), stats.instances());
    }
}
