use std::path::{Path, PathBuf};

use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 渲染相关错误
    #[error("渲染错误: {0}")]
    Render(#[from] RenderFailure),
    /// 浏览器实例池错误
    #[error("实例池错误: {0}")]
    Pool(#[from] PoolError),
    /// 持久化错误
    #[error("持久化错误: {0}")]
    Persistence(#[from] PersistenceError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

/// 单次渲染失败
///
/// 由 `Renderer::fetch_and_parse` 返回，属于一次尝试的失败，由重试策略处理
#[derive(Debug, Clone, Error)]
pub enum RenderFailure {
    /// 页面导航超时
    #[error("导航超时 ({url}, {timeout_ms}ms)")]
    NavigationTimeout { url: String, timeout_ms: u64 },
    /// 等待的内容没有出现
    #[error("页面缺少预期内容 ({selector})")]
    MissingContent { selector: String },
    /// 网络或 CDP 传输错误
    #[error("传输错误: {0}")]
    Transport(String),
    /// 提取脚本执行或结果解析失败
    #[error("提取脚本失败: {0}")]
    Script(String),
    /// 无法获得浏览器实例
    #[error("浏览器实例池耗尽: {0}")]
    PoolExhausted(String),
}

impl RenderFailure {
    /// 是否为实例池容量问题（需要单独记录日志）
    pub fn is_pool_exhaustion(&self) -> bool {
        matches!(self, RenderFailure::PoolExhausted(_))
    }
}

impl From<PoolError> for RenderFailure {
    fn from(err: PoolError) -> Self {
        RenderFailure::PoolExhausted(err.to_string())
    }
}

/// 浏览器实例池错误
#[derive(Debug, Error)]
pub enum PoolError {
    /// 创建新实例失败
    #[error("无法创建浏览器实例: {source}")]
    Exhausted {
        #[source]
        source: anyhow::Error,
    },
    /// 实例池已关闭
    #[error("实例池已关闭")]
    ShutDown,
}

/// 持久化错误（进度记录、任务报告、缓存）
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// 读取失败
    #[error("读取失败 ({}): {source}", path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// 写入失败
    #[error("写入失败 ({}): {source}", path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// 删除失败
    #[error("删除失败 ({}): {source}", path.display())]
    RemoveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// JSON 序列化/反序列化失败
    #[error("JSON 处理失败 ({key}): {source}")]
    Serde {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    /// 其他存储后端错误
    #[error("存储错误: {0}")]
    Backend(String),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置值不合法
    #[error("配置项 {field} 不合法: {reason}")]
    InvalidValue { field: String, reason: String },
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 读取配置文件失败
    #[error("读取配置文件失败 ({}): {source}", path.display())]
    FileReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML 解析失败 ({}): {source}", path.display())]
    TomlParseFailed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    /// 任务输入不合法（空列表、超出上限等）
    #[error("任务输入不合法: {0}")]
    InvalidInput(String),
}

// ========== 便捷构造函数 ==========

impl PersistenceError {
    pub fn read(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        PersistenceError::ReadFailed {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn write(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        PersistenceError::WriteFailed {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn remove(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        PersistenceError::RemoveFailed {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn serde(key: impl Into<String>, source: serde_json::Error) -> Self {
        PersistenceError::Serde {
            key: key.into(),
            source,
        }
    }
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<chromiumoxide::error::CdpError> for RenderFailure {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        RenderFailure::Transport(err.to_string())
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_error_converts_to_pool_exhaustion() {
        let failure: RenderFailure = PoolError::ShutDown.into();
        assert!(failure.is_pool_exhaustion());
        assert!(!RenderFailure::Transport("reset".into()).is_pool_exhaustion());
    }

    #[test]
    fn config_error_wraps_into_app_error() {
        let err: AppError = ConfigError::invalid("batch_size", "必须大于 0").into();
        assert!(matches!(err, AppError::Config(_)));
        assert!(err.to_string().contains("batch_size"));
    }
}
