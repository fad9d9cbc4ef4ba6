/// 日志工具模块
///
/// 提供批处理任务各阶段的日志输出辅助函数
use tracing::{info, warn};

use crate::config::Config;
use crate::models::{BatchProgress, JobReport};

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 商品信息批量提取模式");
    info!(
        "📊 浏览器实例上限: {} | 每实例会话上限: {} | 全局并发上限: {}",
        config.max_instances, config.max_sessions_per_instance, config.max_concurrent_extractions
    );
    info!("{}", "=".repeat(60));
}

/// 记录任务加载信息
///
/// # 参数
/// - `job_id`: 任务ID
/// - `total`: 标识符总数
/// - `batch_size`: 每批数量
pub fn log_job_loaded(job_id: &str, total: usize, batch_size: usize) {
    info!("[任务 {}] ✓ 共 {} 个待提取的商品", job_id, total);
    info!("[任务 {}] 📋 将以每批 {} 个的方式处理", job_id, batch_size);
    info!("[任务 {}] 💡 每批完成并保存进度后再开始下一批", job_id);
}

/// 记录批次开始信息
///
/// # 参数
/// - `batch_num`: 批次编号（从1开始）
/// - `total_batches`: 批次总数
/// - `start`: 起始编号（从1开始）
/// - `end`: 结束编号
/// - `total`: 总数
pub fn log_batch_start(
    job_id: &str,
    batch_num: usize,
    total_batches: usize,
    start: usize,
    end: usize,
    total: usize,
) {
    info!("{}", "=".repeat(60));
    info!("[任务 {}] 📦 开始处理第 {}/{} 批", job_id, batch_num, total_batches);
    info!("[任务 {}] 📄 本批商品: {}-{} / 共 {} 个", job_id, start, end, total);
}

/// 记录批次完成信息
pub fn log_batch_complete(job_id: &str, batch_num: usize, success: usize, total: usize) {
    info!("{}", "─".repeat(60));
    info!(
        "[任务 {}] ✓ 第 {} 批完成: 成功 {}/{}",
        job_id, batch_num, success, total
    );
}

/// 记录进度快照
pub fn log_progress(progress: &BatchProgress) {
    info!(
        "[任务 {}] 进度: {}/{} (成功 {}, 失败 {})",
        progress.job_id,
        progress.processed_count,
        progress.total_items,
        progress.success_count,
        progress.failure_count
    );
}

/// 打印最终统计信息
pub fn print_final_stats(report: &JobReport) {
    info!("{}", "=".repeat(60));
    info!("📊 任务 {} 处理完成统计", report.job_id);
    info!(
        "完成时间: {}",
        report.completed_at.format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", report.success_count, report.total_items);
    info!("❌ 失败: {}", report.failure_count);
    if let Some(error) = &report.error {
        warn!("⚠️ 任务异常结束: {}", error);
    }
    info!("{}", "=".repeat(60));
}
