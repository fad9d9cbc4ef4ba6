//! 浏览器实例的创建与管理
//!
//! `ChromiumFactory` 为实例池提供 Chromium 实例：默认启动独立的无头浏览器，
//! 配置了调试端口时改为连接已有浏览器（此时销毁只断开连接，不关闭浏览器）。
//! 每个实例只管理自己打开的标签页，多个实例共用一个浏览器时互不干扰。

pub mod connection;
pub mod headless;
pub mod sessions;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::target::TargetId;
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, Page};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::infrastructure::{InstanceFactory, InstanceId};

pub use connection::connect_to_browser;
pub use headless::launch_headless_browser;
pub use sessions::SessionRegistry;

/// 探活超时
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// 一个 Chromium 实例
pub struct ChromiumInstance {
    id: InstanceId,
    browser: RwLock<Browser>,
    handler_task: JoinHandle<()>,
    /// 启动时创建的用户数据目录；连接模式下为空
    profile_dir: Option<PathBuf>,
    /// 本实例打开且尚未关闭的标签页
    sessions: SessionRegistry<TargetId, Page>,
}

impl ChromiumInstance {
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// 在该实例上打开一个新会话（标签页）
    pub async fn new_page(&self) -> Result<Page, CdpError> {
        let page = self.browser.read().await.new_page("about:blank").await?;
        self.sessions.register(page.target_id().clone(), page.clone());
        Ok(page)
    }

    /// 会话已由调用方关闭，注销登记
    pub fn forget_page(&self, target_id: &TargetId) {
        self.sessions.remove(target_id);
    }

    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }
}

/// Chromium 实例工厂
#[derive(Clone, Debug, Default)]
pub struct ChromiumFactory {
    chrome_executable: Option<String>,
    debug_port: Option<u16>,
}

impl ChromiumFactory {
    pub fn new(chrome_executable: Option<String>, debug_port: Option<u16>) -> Self {
        Self {
            chrome_executable,
            debug_port,
        }
    }

    fn profile_dir(id: InstanceId) -> PathBuf {
        std::env::temp_dir().join(format!("product_scraper-{}-{}", std::process::id(), id))
    }
}

#[async_trait]
impl InstanceFactory for ChromiumFactory {
    type Instance = ChromiumInstance;

    async fn create(&self, id: InstanceId) -> anyhow::Result<ChromiumInstance> {
        let (browser, handler_task, profile_dir) = match self.debug_port {
            Some(port) => {
                let (browser, task) = connect_to_browser(port).await?;
                (browser, task, None)
            }
            None => {
                let dir = Self::profile_dir(id);
                let (browser, task) =
                    launch_headless_browser(self.chrome_executable.as_deref(), &dir).await?;
                (browser, task, Some(dir))
            }
        };

        Ok(ChromiumInstance {
            id,
            browser: RwLock::new(browser),
            handler_task,
            profile_dir,
            sessions: SessionRegistry::new(),
        })
    }

    async fn is_alive(&self, instance: &ChromiumInstance) -> bool {
        if instance.handler_task.is_finished() {
            return false;
        }
        let browser = instance.browser.read().await;
        matches!(
            tokio::time::timeout(PROBE_TIMEOUT, browser.version()).await,
            Ok(Ok(_))
        )
    }

    async fn detach_sessions(&self, instance: &ChromiumInstance) -> anyhow::Result<usize> {
        // 只关闭本实例登记过的标签页，不碰同一浏览器里其他实例或用户的页面
        let mut closed = 0;
        for page in instance.sessions.drain() {
            match page.close().await {
                Ok(()) => closed += 1,
                Err(e) => debug!("[实例 #{}] 关闭页面失败: {}", instance.id, e),
            }
        }
        Ok(closed)
    }

    async fn dispose(&self, instance: Arc<ChromiumInstance>) -> anyhow::Result<()> {
        if instance.profile_dir.is_some() {
            let mut browser = instance.browser.write().await;
            if let Err(e) = browser.close().await {
                warn!("[实例 #{}] 关闭浏览器失败: {}", instance.id, e);
            }
            let _ = browser.wait().await;
        }
        instance.handler_task.abort();

        if let Some(dir) = &instance.profile_dir {
            if let Err(e) = tokio::fs::remove_dir_all(dir).await {
                debug!("[实例 #{}] 清理用户数据目录失败: {}", instance.id, e);
            }
        }
        Ok(())
    }
}
