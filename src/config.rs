//! 配置模块
//!
//! 每个动作一条静态策略：`{action: {limit, window_ms, escalation_threshold, block_duration_ms}}`。
//! 支持从 YAML / TOML 加载，所有时长以毫秒表示。

use crate::constants::*;
use crate::error::GatehouseError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// 受保护的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Action {
    /// 订阅邮件通讯
    #[serde(rename = "newsletter-subscribe")]
    NewsletterSubscribe,
    /// 提交联系表单
    #[serde(rename = "contact-submit")]
    ContactSubmit,
    /// 管理员登录
    #[serde(rename = "admin-login")]
    AdminLogin,
    /// 其他 API
    #[serde(rename = "generic-api")]
    GenericApi,
}

impl Action {
    /// 所有动作
    pub const ALL: [Action; 4] = [
        Action::NewsletterSubscribe,
        Action::ContactSubmit,
        Action::AdminLogin,
        Action::GenericApi,
    ];

    /// 动作名称
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::NewsletterSubscribe => "newsletter-subscribe",
            Action::ContactSubmit => "contact-submit",
            Action::AdminLogin => "admin-login",
            Action::GenericApi => "generic-api",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = GatehouseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| GatehouseError::ValidationError(format!("未知的动作: {}", s)))
    }
}

/// 升级阈值
///
/// 违规次数达到阈值后，客户端被加入封禁列表。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum EscalationThreshold {
    /// 固定次数
    Absolute(u32),
    /// 限额的倍数
    LimitMultiple(u32),
}

impl EscalationThreshold {
    /// 针对给定限额计算实际阈值
    pub fn resolve(&self, limit: u64) -> u32 {
        match *self {
            EscalationThreshold::Absolute(count) => count,
            EscalationThreshold::LimitMultiple(factor) => {
                u32::try_from(limit.saturating_mul(factor as u64)).unwrap_or(u32::MAX)
            }
        }
    }

    fn validate(&self) -> Result<(), String> {
        match *self {
            EscalationThreshold::Absolute(0) => Err("升级阈值必须大于0".to_string()),
            EscalationThreshold::LimitMultiple(0) => Err("升级倍数必须大于0".to_string()),
            _ => Ok(()),
        }
    }
}

impl Default for EscalationThreshold {
    fn default() -> Self {
        EscalationThreshold::Absolute(DEFAULT_ESCALATION_THRESHOLD)
    }
}

/// 单个动作的限流策略
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionPolicy {
    /// 每个窗口允许的请求数
    pub limit: u64,
    /// 窗口长度（毫秒）
    pub window_ms: u64,
    /// 升级阈值
    #[serde(default)]
    pub escalation_threshold: EscalationThreshold,
    /// 封禁时长（毫秒）
    #[serde(default = "default_block_duration_ms")]
    pub block_duration_ms: u64,
}

fn default_block_duration_ms() -> u64 {
    DEFAULT_BLOCK_DURATION_MS
}

impl ActionPolicy {
    /// 使用默认升级策略创建
    pub fn new(limit: u64, window_ms: u64) -> Self {
        Self {
            limit,
            window_ms,
            escalation_threshold: EscalationThreshold::default(),
            block_duration_ms: DEFAULT_BLOCK_DURATION_MS,
        }
    }

    /// 设置升级阈值
    pub fn with_escalation(mut self, threshold: EscalationThreshold) -> Self {
        self.escalation_threshold = threshold;
        self
    }

    /// 设置封禁时长
    pub fn with_block_duration_ms(mut self, block_duration_ms: u64) -> Self {
        self.block_duration_ms = block_duration_ms;
        self
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn block_duration(&self) -> Duration {
        Duration::from_millis(self.block_duration_ms)
    }

    /// 校验策略
    pub fn validate(&self) -> Result<(), String> {
        if self.limit == 0 {
            return Err("limit 必须大于0".to_string());
        }
        if self.window_ms == 0 {
            return Err("window_ms 必须大于0".to_string());
        }
        if self.block_duration_ms == 0 {
            return Err("block_duration_ms 必须大于0".to_string());
        }
        self.escalation_threshold.validate()
    }
}

/// 威胁监控配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreatConfig {
    /// 是否启用
    pub enabled: bool,
    /// 同一客户端同一类型命中多少次后封禁
    pub block_threshold: u32,
    /// 封禁时长（毫秒）
    pub block_duration_ms: u64,
    /// 命中记录保留时长（毫秒）
    pub ttl_ms: u64,
}

impl Default for ThreatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            block_threshold: DEFAULT_THREAT_BLOCK_THRESHOLD,
            block_duration_ms: DEFAULT_BLOCK_DURATION_MS,
            ttl_ms: DEFAULT_THREAT_TTL_MS,
        }
    }
}

/// Gatehouse 配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatehouseConfig {
    /// 各动作策略
    pub policies: BTreeMap<Action, ActionPolicy>,
    /// 令牌有效期（毫秒）
    pub token_lifetime_ms: u64,
    /// 清理任务间隔（毫秒）
    pub sweep_interval_ms: u64,
    /// 违规计数保留时长（毫秒）
    pub violation_ttl_ms: u64,
    /// 威胁监控
    pub threat: ThreatConfig,
}

impl Default for GatehouseConfig {
    fn default() -> Self {
        let mut policies = BTreeMap::new();
        policies.insert(
            Action::NewsletterSubscribe,
            ActionPolicy::new(NEWSLETTER_LIMIT, NEWSLETTER_WINDOW_MS),
        );
        policies.insert(
            Action::ContactSubmit,
            ActionPolicy::new(CONTACT_LIMIT, CONTACT_WINDOW_MS),
        );
        policies.insert(
            Action::AdminLogin,
            ActionPolicy::new(ADMIN_LOGIN_LIMIT, ADMIN_LOGIN_WINDOW_MS),
        );
        policies.insert(
            Action::GenericApi,
            ActionPolicy::new(GENERIC_API_LIMIT, GENERIC_API_WINDOW_MS),
        );

        Self {
            policies,
            token_lifetime_ms: DEFAULT_TOKEN_LIFETIME_MS,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
            violation_ttl_ms: DEFAULT_VIOLATION_TTL_MS,
            threat: ThreatConfig::default(),
        }
    }
}

impl GatehouseConfig {
    /// 从 YAML 字符串加载并校验
    pub fn from_yaml_str(input: &str) -> Result<Self, GatehouseError> {
        let config: GatehouseConfig = serde_yaml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 字符串加载并校验
    pub fn from_toml_str(input: &str) -> Result<Self, GatehouseError> {
        let config: GatehouseConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// 从文件加载，按扩展名选择格式
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, GatehouseError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            Some("toml") => Self::from_toml_str(&content),
            other => Err(GatehouseError::ConfigError(format!(
                "不支持的配置文件格式: {:?}",
                other
            ))),
        }
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), GatehouseError> {
        for (action, policy) in &self.policies {
            policy
                .validate()
                .map_err(|e| GatehouseError::ConfigError(format!("策略[{}]: {}", action, e)))?;
        }

        if self.token_lifetime_ms == 0 {
            return Err(GatehouseError::ConfigError(
                "token_lifetime_ms 必须大于0".to_string(),
            ));
        }
        if self.sweep_interval_ms == 0 {
            return Err(GatehouseError::ConfigError(
                "sweep_interval_ms 必须大于0".to_string(),
            ));
        }
        if self.violation_ttl_ms == 0 {
            return Err(GatehouseError::ConfigError(
                "violation_ttl_ms 必须大于0".to_string(),
            ));
        }
        if self.threat.enabled
            && (self.threat.block_threshold == 0
                || self.threat.block_duration_ms == 0
                || self.threat.ttl_ms == 0)
        {
            return Err(GatehouseError::ConfigError(
                "威胁监控阈值、封禁时长和保留时长必须大于0".to_string(),
            ));
        }

        Ok(())
    }

    /// 获取动作策略
    pub fn policy(&self, action: Action) -> Option<&ActionPolicy> {
        self.policies.get(&action)
    }

    /// 设置动作策略
    pub fn with_policy(mut self, action: Action, policy: ActionPolicy) -> Self {
        self.policies.insert(action, policy);
        self
    }

    pub fn token_lifetime(&self) -> Duration {
        Duration::from_millis(self.token_lifetime_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn violation_ttl(&self) -> Duration {
        Duration::from_millis(self.violation_ttl_ms)
    }
}
