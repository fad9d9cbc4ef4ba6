//! 基础设施层（Infrastructure）
//!
//! 持有进程级共享资源（实例池、缓存、存储、并发闸门），只暴露能力，不含业务流程。

pub mod cache;
pub mod job_store;
pub mod js_executor;
pub mod limiter;
pub mod renderer_pool;

pub use cache::{FileCache, MemoryCache, ResultCache};
pub use job_store::{is_valid_job_id, FileJobStore, JobStore, MemoryJobStore};
pub use js_executor::{JsExecutor, HEAVY_RESOURCE_TYPES};
pub use limiter::{ConcurrencyLimiter, Permit};
pub use renderer_pool::{InstanceFactory, InstanceId, InstanceLease, PoolStats, RendererPool};
