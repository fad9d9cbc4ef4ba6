//! 业务能力层（Services）
//!
//! 描述"我能做什么"：渲染一个商品页、带重试地执行一次操作、在重试之间轮换身份。
//! 只处理单个请求，不出现批次和任务。

pub mod chromium_renderer;
pub mod identity;
pub mod renderer;
pub mod retry;

pub use chromium_renderer::{ChromiumRenderer, RenderSettings};
pub use identity::{IdentityRotator, InertRotator};
pub use renderer::Renderer;
pub use retry::{RetryExecutor, RetryFailure, RetryPolicy};
