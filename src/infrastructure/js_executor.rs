//! JS 执行器 - 基础设施层
//!
//! 持有一个会话（标签页），只暴露"拦截资源 / 导航 / 等待元素 / 执行 JS"的能力

use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams, EventRequestPaused, FailRequestParams, RequestPattern,
};
use chromiumoxide::cdp::browser_protocol::network::{ErrorReason, ResourceType};
use chromiumoxide::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::debug;

use crate::error::RenderFailure;

/// 轮询元素的间隔
const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// 提取时用不到的资源，直接拦截以加快加载
pub const HEAVY_RESOURCE_TYPES: [ResourceType; 3] =
    [ResourceType::Stylesheet, ResourceType::Font, ResourceType::Media];

/// 只暂停指定类型请求的拦截规则
pub fn blocking_patterns(types: &[ResourceType]) -> Vec<RequestPattern> {
    types
        .iter()
        .map(|resource_type| {
            RequestPattern::builder()
                .resource_type(resource_type.clone())
                .build()
        })
        .collect()
}

/// 判断元素存在且可见（未隐藏，且有非空的布局尺寸）
pub fn visibility_script(selector: &str) -> String {
    let selector = JsonValue::from(selector).to_string();
    format!(
        r#"(() => {{
    const el = document.querySelector({selector});
    if (!el) return false;
    const style = window.getComputedStyle(el);
    if (style.display === 'none' || style.visibility === 'hidden') return false;
    const rect = el.getBoundingClientRect();
    return rect.width > 0 && rect.height > 0;
}})()"#
    )
}

/// JS 执行器
///
/// 职责：
/// - 持有一个 Page（一个会话）
/// - 不认识商品字段，只执行调用方给出的脚本
/// - 用完后必须 `close()`
pub struct JsExecutor {
    page: Page,
    interceptor: Option<JoinHandle<()>>,
}

impl JsExecutor {
    pub fn new(page: Page) -> Self {
        Self {
            page,
            interceptor: None,
        }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 拦截指定类型的资源请求，必须在导航之前调用
    pub async fn block_resources(&mut self, types: &[ResourceType]) -> Result<(), RenderFailure> {
        if types.is_empty() {
            return Ok(());
        }

        // 先订阅事件再开启拦截，避免漏掉第一个请求
        let mut paused = self.page.event_listener::<EventRequestPaused>().await?;
        self.page
            .execute(EnableParams::builder().patterns(blocking_patterns(types)).build())
            .await?;

        let page = self.page.clone();
        let blocked = types.to_vec();
        self.interceptor = Some(tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let outcome = if blocked.contains(&event.resource_type) {
                    page.execute(FailRequestParams::new(
                        event.request_id.clone(),
                        ErrorReason::BlockedByClient,
                    ))
                    .await
                    .map(|_| ())
                } else {
                    page.execute(ContinueRequestParams::new(event.request_id.clone()))
                        .await
                        .map(|_| ())
                };
                if let Err(e) = outcome {
                    debug!("处理被拦截的请求失败: {}", e);
                }
            }
        }));
        Ok(())
    }

    /// 导航到 URL，超时视为一次普通的失败
    pub async fn navigate(&self, url: &str, timeout_ms: u64) -> Result<(), RenderFailure> {
        debug!("导航到: {}", url);
        match timeout(Duration::from_millis(timeout_ms), self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(RenderFailure::Transport(format!("导航到 {} 失败: {}", url, e))),
            Err(_) => Err(RenderFailure::NavigationTimeout {
                url: url.to_string(),
                timeout_ms,
            }),
        }
    }

    /// 等待选择器对应的元素出现并可见
    pub async fn wait_for_visible(&self, selector: &str, timeout_ms: u64) -> Result<(), RenderFailure> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        let script = visibility_script(selector);
        loop {
            // 页面跳转中执行脚本可能失败，按"尚未出现"处理
            if let Ok(JsonValue::Bool(true)) = self.eval(script.as_str()).await {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(RenderFailure::MissingContent {
                    selector: selector.to_string(),
                });
            }
            sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }

    /// 执行 JS 代码并返回 JSON 结果
    pub async fn eval(&self, js_code: impl Into<String>) -> Result<JsonValue, RenderFailure> {
        let result = self
            .page
            .evaluate(js_code.into())
            .await
            .map_err(|e| RenderFailure::Script(e.to_string()))?;
        result
            .into_value()
            .map_err(|e| RenderFailure::Script(format!("无法转换脚本结果: {:?}", e)))
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(&self, js_code: impl Into<String>) -> Result<T, RenderFailure> {
        let json_value = self.eval(js_code).await?;
        serde_json::from_value(json_value).map_err(|e| RenderFailure::Script(format!("结果结构不符: {}", e)))
    }

    /// 关闭会话
    pub async fn close(self) {
        if let Some(interceptor) = self.interceptor {
            interceptor.abort();
        }
        if let Err(e) = self.page.close().await {
            debug!("关闭页面失败（可能已被强制关闭）: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visibility_script_escapes_the_selector() {
        let script = visibility_script(r#"span[data-testid="pdp_ProductTitle"]"#);
        assert!(script.contains(r#"document.querySelector("span[data-testid=\"pdp_ProductTitle\"]")"#));
        assert!(script.contains("getBoundingClientRect"));
        assert!(script.contains("visibility === 'hidden'"));
    }

    #[test]
    fn only_heavy_resources_are_paused() {
        let patterns = blocking_patterns(&HEAVY_RESOURCE_TYPES);
        let types: Vec<_> = patterns
            .iter()
            .filter_map(|pattern| pattern.resource_type.clone())
            .collect();
        assert_eq!(
            types,
            vec![ResourceType::Stylesheet, ResourceType::Font, ResourceType::Media]
        );
        assert!(patterns.iter().all(|pattern| pattern.url_pattern.is_none()));
        assert!(blocking_patterns(&[]).is_empty());
    }
}
