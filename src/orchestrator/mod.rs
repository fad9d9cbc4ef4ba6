//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和任务调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `app` - 应用生命周期
//! - 一次性构建实例池、缓存、存储、并发闸门
//! - 提供运行任务、单个提取、状态查询、关闭
//!
//! ### `batch_processor` - 批量提取处理器
//! - 切分批次、批内并发、批间顺序执行
//! - 每批完成后保存进度，结束时写入最终报告
//!
//! ### `job_status` - 任务状态查询
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<标识符>)
//!     ↓
//! workflow::ExtractionEngine (处理单个标识符)
//!     ↓
//! services (能力层：retry / renderer / identity)
//!     ↓
//! infrastructure (基础设施：cache / limiter / pool / store)
//! ```

pub mod app;
pub mod batch_processor;
pub mod job_status;

pub use app::App;
pub use batch_processor::{batch_sizes, BatchOrchestrator, CancelFlag, OrchestratorSettings};
pub use job_status::{job_status, JobStatus};
