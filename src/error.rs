//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 错误类型定义
//!
//! 使用thiserror定义所有错误类型。普通的拒绝（配额耗尽、封禁中）不是错误，
//! 通过 [`Admission`] 返回；只有调用方误用（非法参数、非法配置）才返回错误。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Gatehouse 错误类型
#[derive(Error, Debug)]
pub enum GatehouseError {
    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// 参数校验错误
    #[error("验证错误: {0}")]
    ValidationError(String),

    /// IO错误
    #[error("IO错误: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML解析错误
    #[error("YAML解析错误: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML解析错误
    #[error("TOML解析错误: {0}")]
    TomlError(#[from] toml::de::Error),

    /// 其他错误
    #[error("未知错误: {0}")]
    Other(String),
}

/// 准入决策
///
/// `reset_at` 在放行或被限流时为当前窗口的结束时间，在被封禁时为封禁结束时间。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admission {
    /// 是否放行
    pub allowed: bool,
    /// 当前窗口剩余次数
    pub remaining: u64,
    /// 状态恢复时间
    pub reset_at: Option<DateTime<Utc>>,
    /// 是否因封禁被拒绝
    pub blocked: bool,
}

impl Admission {
    pub(crate) fn admitted(remaining: u64, reset_at: DateTime<Utc>) -> Self {
        Self {
            allowed: true,
            remaining,
            reset_at: Some(reset_at),
            blocked: false,
        }
    }

    pub(crate) fn limited(reset_at: DateTime<Utc>) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            reset_at: Some(reset_at),
            blocked: false,
        }
    }

    pub(crate) fn blocked(blocked_until: DateTime<Utc>) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            reset_at: Some(blocked_until),
            blocked: true,
        }
    }

    /// 距离状态恢复的秒数（向上取整），用于 Retry-After 响应头
    ///
    /// 放行的请求返回 `None`。
    pub fn retry_after(&self, now: DateTime<Utc>) -> Option<u64> {
        if self.allowed {
            return None;
        }
        let reset_at = self.reset_at?;
        let millis = (reset_at - now).num_milliseconds().max(0) as u64;
        Some(millis.div_ceil(1000))
    }
}
