use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::ConfigError;

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- 实例池 ---
    /// 浏览器实例上限
    pub max_instances: usize,
    /// 每个实例同时挂载的会话（标签页）上限
    pub max_sessions_per_instance: usize,
    /// 全局同时进行的提取操作上限（与实例池大小无关）
    pub max_concurrent_extractions: usize,

    // --- 批处理 ---
    /// 每批处理的标识符数量
    pub batch_size: usize,
    /// 单个任务允许的标识符数量上限
    pub max_identifiers_per_job: usize,
    /// 进度/报告写入的最大尝试次数
    pub persist_attempts: u32,

    // --- 重试 ---
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_jitter_ms: u64,

    // --- 渲染 ---
    pub navigation_timeout_ms: u64,
    pub content_timeout_ms: u64,
    /// 非 URL 标识符的展开模板，必须包含 `{id}`
    pub product_url_template: String,
    pub user_agent: String,
    pub accept_language: String,
    /// 拦截样式表、字体和媒体请求以加快加载
    pub block_heavy_resources: bool,
    /// Chrome 可执行文件路径，为空时由 chromiumoxide 自动查找
    pub chrome_executable: Option<String>,
    /// 设置后连接到已有浏览器的调试端口，而不是启动新的无头浏览器
    pub browser_debug_port: Option<u16>,

    // --- 存储 ---
    pub cache_dir: String,
    /// 缓存有效期（秒），为空表示永久有效
    pub cache_ttl_secs: Option<u64>,
    pub results_dir: String,

    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_instances: 2,
            max_sessions_per_instance: 3,
            max_concurrent_extractions: 4,
            batch_size: 5,
            max_identifiers_per_job: 5000,
            persist_attempts: 3,
            max_attempts: 3,
            retry_base_delay_ms: 1000,
            retry_jitter_ms: 1000,
            navigation_timeout_ms: 60_000,
            content_timeout_ms: 60_000,
            product_url_template:
                "https://co.ingrammicro.com/cep/app/product/productdetails?id={id}".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            accept_language: "es-CO,es;q=0.9".to_string(),
            block_heavy_resources: true,
            chrome_executable: None,
            browser_debug_port: None,
            cache_dir: "cache".to_string(),
            cache_ttl_secs: None,
            results_dir: "results".to_string(),
            verbose_logging: false,
        }
    }
}

impl Config {
    /// 默认值 + 环境变量覆盖
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    /// TOML 文件 + 环境变量覆盖
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadFailed {
                path: path.to_path_buf(),
                source,
            })?;
        let config: Config =
            toml::from_str(&content).map_err(|source| ConfigError::TomlParseFailed {
                path: path.to_path_buf(),
                source,
            })?;
        config.with_env_overrides()
    }

    /// 用环境变量覆盖已有配置；变量存在但无法解析时报错，而不是静默忽略
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        env_parse("MAX_INSTANCES", &mut self.max_instances)?;
        env_parse("MAX_SESSIONS_PER_INSTANCE", &mut self.max_sessions_per_instance)?;
        env_parse("MAX_CONCURRENT_EXTRACTIONS", &mut self.max_concurrent_extractions)?;
        env_parse("BATCH_SIZE", &mut self.batch_size)?;
        env_parse("MAX_IDENTIFIERS_PER_JOB", &mut self.max_identifiers_per_job)?;
        env_parse("PERSIST_ATTEMPTS", &mut self.persist_attempts)?;
        env_parse("MAX_ATTEMPTS", &mut self.max_attempts)?;
        env_parse("RETRY_BASE_DELAY_MS", &mut self.retry_base_delay_ms)?;
        env_parse("RETRY_JITTER_MS", &mut self.retry_jitter_ms)?;
        env_parse("NAVIGATION_TIMEOUT_MS", &mut self.navigation_timeout_ms)?;
        env_parse("CONTENT_TIMEOUT_MS", &mut self.content_timeout_ms)?;
        env_parse("VERBOSE_LOGGING", &mut self.verbose_logging)?;
        env_parse("BLOCK_HEAVY_RESOURCES", &mut self.block_heavy_resources)?;
        env_string("PRODUCT_URL_TEMPLATE", &mut self.product_url_template);
        env_string("USER_AGENT", &mut self.user_agent);
        env_string("ACCEPT_LANGUAGE", &mut self.accept_language);
        env_string("CACHE_DIR", &mut self.cache_dir);
        env_string("RESULTS_DIR", &mut self.results_dir);

        if let Ok(v) = std::env::var("CHROME_EXECUTABLE") {
            self.chrome_executable = Some(v);
        }
        if std::env::var("BROWSER_DEBUG_PORT").is_ok() {
            let mut port = 0u16;
            env_parse("BROWSER_DEBUG_PORT", &mut port)?;
            self.browser_debug_port = Some(port);
        }
        if std::env::var("CACHE_TTL_SECS").is_ok() {
            let mut ttl = 0u64;
            env_parse("CACHE_TTL_SECS", &mut ttl)?;
            self.cache_ttl_secs = Some(ttl);
        }

        Ok(self)
    }

    /// 任务开始前的配置校验
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("max_instances", self.max_instances),
            ("max_sessions_per_instance", self.max_sessions_per_instance),
            ("max_concurrent_extractions", self.max_concurrent_extractions),
            ("batch_size", self.batch_size),
            ("max_identifiers_per_job", self.max_identifiers_per_job),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::invalid(field, "必须大于 0"));
            }
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("max_attempts", "必须大于 0"));
        }
        if self.persist_attempts == 0 {
            return Err(ConfigError::invalid("persist_attempts", "必须大于 0"));
        }
        if self.navigation_timeout_ms == 0 || self.content_timeout_ms == 0 {
            return Err(ConfigError::invalid("timeout", "超时时间必须大于 0"));
        }
        if !self.product_url_template.contains("{id}") {
            return Err(ConfigError::invalid(
                "product_url_template",
                "必须包含 {id} 占位符",
            ));
        }
        Ok(())
    }
}

fn env_parse<T: FromStr>(var_name: &str, target: &mut T) -> Result<(), ConfigError> {
    if let Ok(value) = std::env::var(var_name) {
        *target = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value: value.clone(),
                expected_type: std::any::type_name::<T>().to_string(),
            })?;
    }
    Ok(())
}

fn env_string(var_name: &str, target: &mut String) {
    if let Ok(value) = std::env::var(var_name) {
        *target = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let config = Config {
            batch_size: 0,
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn url_template_needs_placeholder() {
        let config = Config {
            product_url_template: "https://example.com/product".into(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scraper.toml");
        std::fs::write(&path, "batch_size = 8\nmax_instances = 4\ncache_ttl_secs = 3600\nblock_heavy_resources = false\n").unwrap();

        let config = Config::from_toml_file(&path).unwrap();
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.max_instances, 4);
        assert_eq!(config.cache_ttl_secs, Some(3600));
        assert!(!config.block_heavy_resources);
        assert!(Config::default().block_heavy_resources);
        assert_eq!(config.max_attempts, 3);
    }

    #[test]
    fn malformed_toml_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "batch_size = \"many\"").unwrap();

        let err = Config::from_toml_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TomlParseFailed { .. }));
    }
}
