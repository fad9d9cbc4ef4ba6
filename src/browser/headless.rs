use std::path::{Path, PathBuf};

use anyhow::Result;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info};

/// 启动一个无头浏览器
///
/// # 参数
/// - `chrome_executable`: 浏览器可执行文件，为空时由 chromiumoxide 自动查找
/// - `profile_dir`: 独立的用户数据目录（同时运行多个实例时不能共用）
///
/// # 返回
/// 返回 (浏览器, 后台事件处理任务)
pub async fn launch_headless_browser(
    chrome_executable: Option<&str>,
    profile_dir: &Path,
) -> Result<(Browser, JoinHandle<()>)> {
    info!("🚀 启动无头浏览器...");
    debug!("用户数据目录: {}", profile_dir.display());

    let mut builder = BrowserConfig::builder()
        .new_headless_mode()
        .user_data_dir(profile_dir)
        .args(vec![
            "--no-sandbox",            // 禁用沙盒，防止权限问题导致的崩溃
            "--disable-setuid-sandbox",
            "--disable-dev-shm-usage", // 防止共享内存不足
            "--disable-gpu",
            "--disable-extensions",
        ]);
    if let Some(path) = chrome_executable {
        builder = builder.chrome_executable(PathBuf::from(path));
    }

    let config = builder.build().map_err(|e| {
        error!("配置无头浏览器失败: {}", e);
        anyhow::anyhow!("配置无头浏览器失败: {}", e)
    })?;

    let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
        error!("启动无头浏览器失败: {}", e);
        anyhow::anyhow!("启动无头浏览器失败: {}", e)
    })?;
    debug!("无头浏览器启动成功");

    // 在后台处理浏览器事件
    let handler_task = tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    // 添加短暂延迟以等待浏览器状态同步
    sleep(Duration::from_millis(300)).await;

    Ok((browser, handler_task))
}
