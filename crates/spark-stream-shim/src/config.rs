//! 兼容层配置。
//!
//! 配置可以在代码中以 builder 方式构造，也可以从 TOML 片段解析：
//!
//! ```toml
//! force_polyfills = false
//! max_derivation_attempts = 3
//! log_throw_reasons = true
//! ```
//!
//! 所有字段都有默认值，缺省字段按默认处理；解析后统一经过 [`ShimConfig::validate`]。

use serde::Deserialize;
use thiserror::Error;

/// 默认的流重新派生上限。
pub const DEFAULT_MAX_DERIVATION_ATTEMPTS: u32 = 3;

/// 重新派生上限允许的最大值。
pub const MAX_DERIVATION_ATTEMPTS_CEILING: u32 = 8;

/// 配置解析或校验失败。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse shim config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for `{field}`: {detail}")]
    Invalid { field: &'static str, detail: String },
}

/// 兼容层运行参数。
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ShimConfig {
    /// 为真时，即使宿主原生支持 BYOB 也一律走仿真路径。
    pub force_polyfills: bool,
    /// 字节流构造失败后允许的重新派生次数上限，第 N 次时强制仿真。
    pub max_derivation_attempts: u32,
    /// `throw()` 是否以 ERROR 级别记录原因。
    pub log_throw_reasons: bool,
}

impl Default for ShimConfig {
    fn default() -> Self {
        Self {
            force_polyfills: false,
            max_derivation_attempts: DEFAULT_MAX_DERIVATION_ATTEMPTS,
            log_throw_reasons: true,
        }
    }
}

impl ShimConfig {
    /// 从 TOML 文本解析并校验。
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: ShimConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_derivation_attempts == 0
            || self.max_derivation_attempts > MAX_DERIVATION_ATTEMPTS_CEILING
        {
            return Err(ConfigError::Invalid {
                field: "max_derivation_attempts",
                detail: format!(
                    "expected 1..={MAX_DERIVATION_ATTEMPTS_CEILING}, got {}",
                    self.max_derivation_attempts
                ),
            });
        }
        Ok(())
    }

    pub fn with_force_polyfills(mut self, force: bool) -> Self {
        self.force_polyfills = force;
        self
    }

    pub fn with_max_derivation_attempts(mut self, attempts: u32) -> Self {
        self.max_derivation_attempts = attempts;
        self
    }

    pub fn with_log_throw_reasons(mut self, enabled: bool) -> Self {
        self.log_throw_reasons = enabled;
        self
    }
}
