//! # Product Scraper
//!
//! 一个基于无头浏览器的商品详情批量提取工具
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有进程级共享资源，只暴露能力
//! - `RendererPool` - 浏览器实例池（实例上限 × 每实例会话上限）
//! - `ConcurrencyLimiter` - 全局并发闸门
//! - `ResultCache` / `JobStore` - 提取结果缓存、任务进度与报告
//! - `JsExecutor` - 唯一的 page owner，提供 eval() 能力
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 只处理单个请求
//! - `Renderer` - 渲染并解析一个商品页
//! - `RetryExecutor` - 带退避的有限次重试
//! - `IdentityRotator` - 重试之间的身份轮换
//!
//! ### ③ 流程层（Workflow）
//! - `ExtractionEngine` - 一个商品的完整流程（缓存 → 许可 → 重试渲染 → 写缓存）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批次切分、批内并发、进度持久化
//! - `orchestrator/job_status` - 任务状态查询
//! - `orchestrator/app` - 应用生命周期
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod logger;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult, ConfigError, PersistenceError, PoolError, RenderFailure};
pub use infrastructure::{ConcurrencyLimiter, JsExecutor, RendererPool, ResultCache};
pub use models::{BatchProgress, ExtractionRequest, ExtractionResult, JobReport, RequestKey};
pub use orchestrator::{App, BatchOrchestrator, CancelFlag, JobStatus};
pub use services::{Renderer, RetryExecutor, RetryPolicy};
pub use workflow::ExtractionEngine;
