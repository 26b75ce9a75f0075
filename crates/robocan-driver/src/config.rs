//! # 驱动配置
//!
//! 会话、参数校验与电机安全的运行参数，可从 TOML 加载。
//!
//! ```toml
//! [session]
//! default_rx_timeout_ms = 50
//! talon_control_period_ms = 10
//!
//! [reconcile]
//! max_resends = 8
//! max_backoff_ticks = 16
//!
//! [safety]
//! enabled = true
//! expiration_ms = 100
//! sweep_period_ms = 20
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// 接收超时上限（毫秒）
pub const MAX_RX_TIMEOUT_MS: u64 = 999;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// 完整配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobocanConfig {
    pub session: SessionConfig,
    pub reconcile: ReconcileConfig,
    pub safety: SafetyConfig,
}

impl RobocanConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 校验取值范围
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.default_rx_timeout_ms > MAX_RX_TIMEOUT_MS {
            return Err(ConfigError::Invalid {
                field: "session.default_rx_timeout_ms",
                reason: format!("must be <= {}", MAX_RX_TIMEOUT_MS),
            });
        }
        if !(1..=95).contains(&self.session.talon_control_period_ms) {
            return Err(ConfigError::Invalid {
                field: "session.talon_control_period_ms",
                reason: "must be within [1, 95]".to_string(),
            });
        }
        if self.reconcile.max_backoff_ticks == 0 {
            return Err(ConfigError::Invalid {
                field: "reconcile.max_backoff_ticks",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.safety.expiration_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "safety.expiration_ms",
                reason: "must be positive".to_string(),
            });
        }
        if self.safety.sweep_period_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "safety.sweep_period_ms",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// 会话配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// 设备门面未指定时使用的接收超时（毫秒）
    pub default_rx_timeout_ms: u64,
    /// Talon SRX Control 1 发送周期（毫秒）
    pub talon_control_period_ms: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_rx_timeout_ms: 50,
            talon_control_period_ms: 10,
        }
    }
}

/// 参数校验配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// 连续不匹配重发次数上限，超过后参数进入 Stuck
    pub max_resends: u32,
    /// 重发退避的最大轮询间隔
    pub max_backoff_ticks: u32,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            max_resends: 8,
            max_backoff_ticks: 16,
        }
    }
}

/// 电机安全配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// 新建执行器是否启用看门狗
    pub enabled: bool,
    /// 喂食超时（毫秒）
    pub expiration_ms: u64,
    /// 后台巡检周期（毫秒）
    pub sweep_period_ms: u64,
}

impl SafetyConfig {
    pub fn expiration(&self) -> Duration {
        Duration::from_millis(self.expiration_ms)
    }

    pub fn sweep_period(&self) -> Duration {
        Duration::from_millis(self.sweep_period_ms)
    }
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            expiration_ms: 100,
            sweep_period_ms: 20,
        }
    }
}
