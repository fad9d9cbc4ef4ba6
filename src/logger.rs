//! 日志初始化

use tracing_subscriber::EnvFilter;

/// 初始化全局日志（默认 info 级别，可通过 `RUST_LOG` 覆盖）
///
/// 重复调用是安全的，只有第一次生效
pub fn init() {
    init_with_level("info");
}

/// 初始化全局日志，`verbose` 为 true 时默认级别提升为 debug
pub fn init_verbose(verbose: bool) {
    init_with_level(if verbose { "debug" } else { "info" });
}

fn init_with_level(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
