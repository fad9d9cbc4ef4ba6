//! Chromium 渲染器 - 业务能力层
//!
//! 基于实例池实现 `Renderer`：每次调用借出一个实例、打开一个标签页，
//! 提取完成后关闭标签页并归还实例（任何路径都会归还）。

use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use tracing::debug;

use crate::browser::{ChromiumFactory, ChromiumInstance};
use crate::config::Config;
use crate::error::RenderFailure;
use crate::infrastructure::{JsExecutor, RendererPool, HEAVY_RESOURCE_TYPES};
use crate::models::ExtractionResult;
use crate::services::renderer::Renderer;

/// 商品标题元素，出现后才开始提取
pub const TITLE_SELECTOR: &str = r#"span[data-testid="pdp_ProductTitle"]"#;

/// 在页面上下文中执行的提取脚本，返回 `ExtractionResult` 结构
const EXTRACTION_SCRIPT: &str = r#"
(() => {
    const qs = (s) => document.querySelector(s);
    const qsa = (s) => Array.from(document.querySelectorAll(s));
    const text = (el) => (el && el.textContent ? el.textContent.trim() : null);

    const specs = {};
    let current = null;
    qsa('div[data-testid="TechnicalSpecification"] tr').forEach((row) => {
        const header = row.querySelector('td[colspan="2"]');
        if (header && header.textContent) {
            current = header.textContent.trim();
            specs[current] = {};
        } else if (current) {
            const cols = row.querySelectorAll('td');
            const key = text(cols[0]) || '';
            const val = text(cols[1]) || '';
            if (key) specs[current][key] = val;
        }
    });

    const warranty = {};
    const section = qs('div[data-testid="warrantyAndInfo"]');
    if (section) {
        Array.from(section.querySelectorAll('p'))
            .map((p) => text(p) || '')
            .filter((t) => t !== '')
            .slice(1)
            .forEach((line) => {
                const parts = line.split(' ');
                warranty[parts.slice(0, -1).join(' ')] = parts[parts.length - 1];
            });
    }

    return {
        title: text(qs('span[data-testid="pdp_ProductTitle"]')),
        categories: qsa('button[data-testid*="-category"]').map(text).filter((t) => t),
        description: text(qs('div[data-testid="OverviewDescription"]')),
        images: qsa('div[data-element="ThumbnailsBox"] img')
            .map((img) => img.getAttribute('src') || '')
            .filter((src) => src !== ''),
        tag: 'ingram',
        technical_specs: specs,
        warranty_info: warranty,
    };
})()
"#;

/// 渲染参数
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub url_template: String,
    pub user_agent: String,
    pub accept_language: String,
    pub navigation_timeout_ms: u64,
    pub content_timeout_ms: u64,
    /// 拦截样式表、字体和媒体请求
    pub block_heavy_resources: bool,
}

impl RenderSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            url_template: config.product_url_template.clone(),
            user_agent: config.user_agent.clone(),
            accept_language: config.accept_language.clone(),
            navigation_timeout_ms: config.navigation_timeout_ms,
            content_timeout_ms: config.content_timeout_ms,
            block_heavy_resources: config.block_heavy_resources,
        }
    }

    /// 模拟真实浏览器的 UA 与语言
    pub fn user_agent_override(&self) -> SetUserAgentOverrideParams {
        let mut params = SetUserAgentOverrideParams::new(self.user_agent.clone());
        params.accept_language = Some(self.accept_language.clone());
        params
    }

    /// 标识符本身是 URL 时直接使用，否则代入模板
    pub fn target_url(&self, identifier: &str) -> String {
        if identifier.starts_with("http://") || identifier.starts_with("https://") {
            identifier.to_string()
        } else {
            self.url_template.replace("{id}", identifier)
        }
    }
}

/// Chromium 渲染器
pub struct ChromiumRenderer {
    pool: Arc<RendererPool<ChromiumFactory>>,
    settings: RenderSettings,
}

impl ChromiumRenderer {
    pub fn new(pool: Arc<RendererPool<ChromiumFactory>>, settings: RenderSettings) -> Self {
        Self { pool, settings }
    }

    async fn render_on(&self, instance: &ChromiumInstance, url: &str) -> Result<ExtractionResult, RenderFailure> {
        let page = instance.new_page().await?;
        let target_id = page.target_id().clone();
        debug!("[实例 #{}] 当前会话数: {}", instance.id(), instance.open_sessions());

        let mut executor = JsExecutor::new(page);
        let result = self.extract(&mut executor, url).await;
        executor.close().await;
        instance.forget_page(&target_id);
        result
    }

    async fn extract(&self, executor: &mut JsExecutor, url: &str) -> Result<ExtractionResult, RenderFailure> {
        if self.settings.block_heavy_resources {
            executor.block_resources(&HEAVY_RESOURCE_TYPES).await?;
        }

        executor
            .page()
            .set_user_agent(self.settings.user_agent_override())
            .await?;

        executor
            .navigate(url, self.settings.navigation_timeout_ms)
            .await?;
        executor
            .wait_for_visible(TITLE_SELECTOR, self.settings.content_timeout_ms)
            .await?;

        let details: ExtractionResult = executor.eval_as(EXTRACTION_SCRIPT).await?;
        if details.title.is_none() {
            return Err(RenderFailure::MissingContent {
                selector: TITLE_SELECTOR.to_string(),
            });
        }
        Ok(details)
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn fetch_and_parse(&self, identifier: &str) -> Result<ExtractionResult, RenderFailure> {
        let url = self.settings.target_url(identifier);
        let lease = self.pool.acquire_instance().await?;
        debug!("[{}] 使用实例 #{}", identifier, lease.id());

        let result = self.render_on(lease.instance(), &url).await;
        self.pool.release(lease).await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sku_is_expanded_through_template() {
        let settings = RenderSettings::from_config(&Config::default());
        assert_eq!(
            settings.target_url("ABC123"),
            "https://co.ingrammicro.com/cep/app/product/productdetails?id=ABC123"
        );
        assert_eq!(
            settings.target_url("https://shop.test/p/9"),
            "https://shop.test/p/9"
        );
    }

    #[test]
    fn user_agent_override_carries_accept_language() {
        let settings = RenderSettings::from_config(&Config::default());
        let params = settings.user_agent_override();
        assert_eq!(params.user_agent, settings.user_agent);
        assert_eq!(params.accept_language.as_deref(), Some("es-CO,es;q=0.9"));
        assert!(settings.block_heavy_resources);
    }

    #[tokio::test]
    #[ignore] // 需要本机安装 Chrome：cargo test -- --ignored
    async fn renders_a_live_product_page() {
        let config = Config::default();
        let pool = Arc::new(RendererPool::new(
            ChromiumFactory::new(config.chrome_executable.clone(), None),
            1,
            1,
        ));
        let renderer = ChromiumRenderer::new(pool.clone(), RenderSettings::from_config(&config));

        let result = renderer.fetch_and_parse("https://example.com").await;
        assert!(result.is_err(), "example.com 没有商品标题，应当报告缺少内容");
        pool.shutdown().await;
    }
}
