//! 渲染能力 - 业务能力层
//!
//! 把"加载目标页面并提取结构化字段"抽象成一个可注入的能力，
//! 实例池和重试逻辑因此可以用假的 Renderer 做确定性测试。

use async_trait::async_trait;

use crate::error::RenderFailure;
use crate::models::ExtractionResult;

/// 渲染器
///
/// 一次调用就是一次完整的往返（获取实例 → 打开会话 → 导航 → 提取 → 归还），
/// 超时、内容缺失、传输错误都以 `RenderFailure` 返回，由上层决定是否重试。
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn fetch_and_parse(&self, identifier: &str) -> Result<ExtractionResult, RenderFailure>;
}
