//! 配置管理模块
//!
//! 提供路由器配置的加载、解析和管理功能。
//! 支持从 TOML 配置文件加载，也支持命令行参数覆盖。
//!
//! # 配置文件格式 (router.toml)
//!
//! ```toml
//! [router]
//! preferred_backend = "gl33"      # 可选
//! max_fallback_attempts = 5
//! eliminate_redundant = true
//! validation_interval_frames = 60
//! validate_state_toggles = true
//! tracked_capabilities = ["blend", "depth_test", "cull_face"]
//!
//! [logging]
//! level = "info"      # trace, debug, info, warn, error
//! file_output = false
//! log_file = "dist_router.log"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::backend::tag::BackendTag;
use crate::state::capability::Capability;

use super::error::{ConfigError, Result};

/// 重试轮数上限
pub const MAX_FALLBACK_ATTEMPTS_LIMIT: u32 = 64;

/// 路由器配置
///
/// 可以从配置文件加载，也可以通过代码构建。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// 路由与分发配置
    #[serde(default)]
    pub router: RoutingConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 路由与分发配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// 首选后端；未设置或不可用时使用检测到的激活后端
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_backend: Option<BackendTag>,

    /// 主/备后端对的最大重试轮数
    #[serde(default = "default_max_fallback_attempts")]
    pub max_fallback_attempts: u32,

    /// 是否消除冗余的能力开关调用
    #[serde(default = "default_eliminate_redundant")]
    pub eliminate_redundant: bool,

    /// 周期校验间隔（帧）
    #[serde(default = "default_validation_interval")]
    pub validation_interval_frames: u32,

    /// 能力开关操作执行前是否先校验状态
    #[serde(default = "default_validate_state_toggles")]
    pub validate_state_toggles: bool,

    /// 参与状态哈希的能力集合
    #[serde(default = "default_tracked_capabilities")]
    pub tracked_capabilities: Vec<Capability>,
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// 是否输出到文件
    #[serde(default = "default_file_output")]
    pub file_output: bool,

    /// 日志文件路径
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

// 默认值函数
fn default_max_fallback_attempts() -> u32 { 5 }
fn default_eliminate_redundant() -> bool { true }
fn default_validation_interval() -> u32 { 60 }
fn default_validate_state_toggles() -> bool { true }
fn default_tracked_capabilities() -> Vec<Capability> { Capability::DEFAULT_TRACKED.to_vec() }
fn default_log_level() -> LogLevel { LogLevel::Info }
fn default_file_output() -> bool { false }
fn default_log_file() -> String { "dist_router.log".to_string() }

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            router: RoutingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            preferred_backend: None,
            max_fallback_attempts: default_max_fallback_attempts(),
            eliminate_redundant: default_eliminate_redundant(),
            validation_interval_frames: default_validation_interval(),
            validate_state_toggles: default_validate_state_toggles(),
            tracked_capabilities: default_tracked_capabilities(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: default_file_output(),
            log_file: default_log_file(),
        }
    }
}

impl RouterConfig {
    /// 从配置文件加载
    ///
    /// # 示例
    ///
    /// ```no_run
    /// use dist_router::core::RouterConfig;
    ///
    /// let config = RouterConfig::from_file("router.toml").unwrap();
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let contents = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path_str.clone()))?;

        Self::from_toml_str(&contents)
    }

    /// 从 TOML 文本解析
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()).into())
    }

    /// 从配置文件加载，如果文件不存在则使用默认配置
    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::from_file(path).unwrap_or_default()
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// 从命令行参数覆盖配置
    ///
    /// 支持的参数：
    /// - `--backend <tag>`: 首选后端
    /// - `--max-attempts <n>`: 最大重试轮数
    /// - `--no-elimination`: 关闭冗余调用消除
    /// - `--validate-every <n>`: 周期校验间隔（帧）
    ///
    /// 无法解析的值被忽略，保留原配置。
    pub fn apply_args<I>(&mut self, args: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();

        if let Some(tag) = value_after(&args, "--backend").and_then(BackendTag::parse) {
            self.router.preferred_backend = Some(tag);
        }

        if let Some(attempts) = value_after(&args, "--max-attempts").and_then(|v| v.parse().ok()) {
            self.router.max_fallback_attempts = attempts;
        }

        if args.iter().any(|a| a == "--no-elimination") {
            self.router.eliminate_redundant = false;
        }

        if let Some(frames) = value_after(&args, "--validate-every").and_then(|v| v.parse().ok()) {
            self.router.validation_interval_frames = frames;
        }
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        let router = &self.router;

        if router.max_fallback_attempts == 0
            || router.max_fallback_attempts > MAX_FALLBACK_ATTEMPTS_LIMIT
        {
            return Err(ConfigError::InvalidValue {
                field: "router.max_fallback_attempts".to_string(),
                reason: format!("must be between 1 and {}", MAX_FALLBACK_ATTEMPTS_LIMIT),
            }.into());
        }

        if router.validation_interval_frames == 0 {
            return Err(ConfigError::InvalidValue {
                field: "router.validation_interval_frames".to_string(),
                reason: "Validation interval must be greater than 0".to_string(),
            }.into());
        }

        if router.tracked_capabilities.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "router.tracked_capabilities".to_string(),
                reason: "At least one capability must be tracked".to_string(),
            }.into());
        }

        Ok(())
    }
}

fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    let idx = args.iter().position(|a| a == flag)?;
    args.get(idx + 1).map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RouterConfig::default();
        assert_eq!(config.router.max_fallback_attempts, 5);
        assert_eq!(config.router.validation_interval_frames, 60);
        assert!(config.router.eliminate_redundant);
        assert_eq!(config.router.tracked_capabilities.len(), 9);
        assert_eq!(config.router.preferred_backend, None);
    }

    #[test]
    fn test_config_validation() {
        let mut config = RouterConfig::default();
        assert!(config.validate().is_ok());

        config.router.max_fallback_attempts = 0;
        assert!(config.validate().is_err());

        config.router.max_fallback_attempts = 65;
        assert!(config.validate().is_err());

        config.router.max_fallback_attempts = 64;
        config.router.validation_interval_frames = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = RouterConfig::from_toml_str(
            r#"
            [router]
            preferred_backend = "gl45"
            tracked_capabilities = ["blend", "line_smooth"]

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.router.preferred_backend, Some(BackendTag::Gl45));
        assert_eq!(
            config.router.tracked_capabilities,
            vec![Capability::Blend, Capability::LineSmooth]
        );
        assert_eq!(config.router.max_fallback_attempts, 5);
        assert_eq!(config.logging.level, LogLevel::Debug);
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(RouterConfig::from_toml_str("").unwrap(), RouterConfig::default());
    }

    #[test]
    fn test_apply_args() {
        let mut config = RouterConfig::default();
        config.apply_args([
            "dist_router",
            "--backend",
            "legacy",
            "--max-attempts",
            "3",
            "--no-elimination",
            "--validate-every",
            "10",
        ]);

        assert_eq!(config.router.preferred_backend, Some(BackendTag::Legacy));
        assert_eq!(config.router.max_fallback_attempts, 3);
        assert!(!config.router.eliminate_redundant);
        assert_eq!(config.router.validation_interval_frames, 10);
    }

    #[test]
    fn test_apply_args_ignores_garbage() {
        let mut config = RouterConfig::default();
        config.apply_args(["--backend", "vulkan", "--max-attempts", "many"]);
        assert_eq!(config, RouterConfig::default());
    }

    #[test]
    fn test_save_and_reload() {
        let path = std::env::temp_dir().join(format!("dist_router_cfg_{}.toml", std::process::id()));
        let mut config = RouterConfig::default();
        config.router.preferred_backend = Some(BackendTag::Gles30);
        config.save_to_file(&path).unwrap();

        let loaded = RouterConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, config);
    }
}
