//! 准入控制器
//!
//! 组合固定窗口计数、封禁列表、令牌存储和可疑请求检测，是请求处理层唯一需要
//! 持有的对象。控制器由调用方显式构造，通过 `Arc` 在各处理函数之间共享，
//! 不使用全局单例。
//!
//! 所有操作都是同步的内存操作，不会挂起；内部锁不会跨越任何 await 点。

use crate::block_list::{BlockEntry, BlockList, BlockReason};
use crate::clock::{Clock, SystemClock};
use crate::config::{Action, EscalationThreshold, GatehouseConfig};
use crate::constants::{DEFAULT_BLOCK_DURATION_MS, MAX_CLIENT_ID_LENGTH};
use crate::error::{Admission, GatehouseError};
use crate::log_redaction::redact_client_id;
use crate::token_store::{Token, TokenStore};
use crate::window::{ClientKey, WindowHit, WindowTable};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

#[cfg(feature = "monitoring")]
use crate::telemetry::Metrics;
#[cfg(feature = "threat-monitor")]
use crate::threat_monitor::{ThreatMonitor, ThreatVerdict};

/// 限流状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitInfo {
    /// 当前窗口计数
    pub count: u64,
    /// 窗口重置时间
    pub reset_at: DateTime<Utc>,
    /// 是否被封禁
    pub blocked: bool,
    /// 是否有可疑请求记录
    pub suspicious: bool,
}

/// 清理结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub windows: usize,
    pub blocks: usize,
    pub violations: usize,
    pub tokens: usize,
    pub threats: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.windows + self.blocks + self.violations + self.tokens + self.threats
    }
}

/// 安全报告
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityReport {
    pub generated_at: DateTime<Utc>,
    /// 跟踪中的窗口数
    pub tracked_windows: usize,
    /// 封禁中的客户端
    pub blocked_clients: Vec<String>,
    /// 可疑客户端
    pub suspicious_clients: Vec<String>,
    /// 未过期和尚未清理的令牌数
    pub outstanding_tokens: usize,
    /// 各类可疑请求命中数
    pub threat_hits: BTreeMap<String, u32>,
}

/// 准入控制器
pub struct AdmissionController {
    config: GatehouseConfig,
    clock: Arc<dyn Clock>,
    windows: WindowTable,
    blocks: BlockList,
    tokens: TokenStore,
    #[cfg(feature = "threat-monitor")]
    threats: Option<ThreatMonitor>,
    #[cfg(feature = "monitoring")]
    metrics: Option<Arc<Metrics>>,
}

impl AdmissionController {
    /// 使用系统时钟创建
    pub fn new(config: GatehouseConfig) -> Result<Self, GatehouseError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// 使用指定时钟创建
    ///
    /// # 示例
    /// ```rust
    /// use gatehouse::clock::ManualClock;
    /// use gatehouse::config::{Action, GatehouseConfig};
    /// use gatehouse::controller::AdmissionController;
    /// use std::sync::Arc;
    ///
    /// let clock = Arc::new(ManualClock::at_epoch());
    /// let controller = AdmissionController::with_clock(GatehouseConfig::default(), clock).unwrap();
    /// let decision = controller.check("203.0.113.7", Action::ContactSubmit).unwrap();
    /// assert!(decision.allowed);
    /// assert_eq!(decision.remaining, 2);
    /// ```
    pub fn with_clock(
        config: GatehouseConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, GatehouseError> {
        config.validate()?;

        #[cfg(feature = "threat-monitor")]
        let threats = if config.threat.enabled {
            Some(ThreatMonitor::new(&config.threat)?)
        } else {
            None
        };

        let controller = Self {
            blocks: BlockList::new(config.violation_ttl()),
            tokens: TokenStore::new(Arc::clone(&clock)),
            windows: WindowTable::new(),
            clock,
            config,
            #[cfg(feature = "threat-monitor")]
            threats,
            #[cfg(feature = "monitoring")]
            metrics: None,
        };

        info!(
            "AdmissionController initialized: policies={}",
            controller.config.policies.len()
        );
        Ok(controller)
    }

    /// 挂载监控指标
    #[cfg(feature = "monitoring")]
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &GatehouseConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// 令牌存储
    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// 按配置的动作策略检查准入
    pub fn check(&self, client_id: &str, action: Action) -> Result<Admission, GatehouseError> {
        let policy = self.config.policy(action).ok_or_else(|| {
            GatehouseError::ConfigError(format!("动作 {} 没有配置限流策略", action))
        })?;
        self.check_admission(client_id, action, policy.limit, policy.window())
    }

    /// 检查准入
    ///
    /// # 参数
    /// - `client_id`: 客户端标识，不能为空
    /// - `action`: 受保护的动作
    /// - `limit`: 每个窗口允许的请求数，必须大于0
    /// - `window`: 窗口长度，必须大于0
    ///
    /// # 返回
    /// - 被封禁时直接拒绝，不修改窗口计数
    /// - 否则递增计数；递增前计数已达到 `limit` 时拒绝并记录一次违规
    #[instrument(skip(self, client_id), fields(client = %redact_client_id(client_id)))]
    pub fn check_admission(
        &self,
        client_id: &str,
        action: Action,
        limit: u64,
        window: Duration,
    ) -> Result<Admission, GatehouseError> {
        validate_client_id(client_id)?;
        if limit == 0 {
            return Err(GatehouseError::ValidationError(
                "limit 必须大于0".to_string(),
            ));
        }
        if window.is_zero() {
            return Err(GatehouseError::ValidationError(
                "窗口长度必须大于0".to_string(),
            ));
        }

        let now = self.clock.now();

        if let Some(entry) = self.blocks.active_block(client_id, now) {
            debug!("客户端封禁中，拒绝请求: until={}", entry.blocked_until);
            #[cfg(feature = "monitoring")]
            if let Some(metrics) = &self.metrics {
                metrics.requests_blocked.inc();
            }
            return Ok(Admission::blocked(entry.blocked_until));
        }

        match self
            .windows
            .hit(ClientKey::new(client_id, action), limit, window, now)
        {
            WindowHit::Admitted {
                remaining,
                reset_at,
            } => {
                #[cfg(feature = "monitoring")]
                if let Some(metrics) = &self.metrics {
                    metrics.requests_admitted.inc();
                }
                Ok(Admission::admitted(remaining, reset_at))
            }
            WindowHit::Limited { reset_at } => {
                debug!("超过窗口限额，拒绝请求: reset_at={}", reset_at);
                #[cfg(feature = "monitoring")]
                if let Some(metrics) = &self.metrics {
                    metrics.requests_limited.inc();
                }
                self.record_violation(client_id, action, limit, now);
                Ok(Admission::limited(reset_at))
            }
        }
    }

    /// 记录违规，必要时升级为封禁
    fn record_violation(
        &self,
        client_id: &str,
        action: Action,
        limit: u64,
        now: DateTime<Utc>,
    ) -> Option<BlockEntry> {
        let (threshold, block_duration) = match self.config.policy(action) {
            Some(policy) => (
                policy.escalation_threshold.resolve(limit),
                policy.block_duration(),
            ),
            None => (
                EscalationThreshold::default().resolve(limit),
                Duration::from_millis(DEFAULT_BLOCK_DURATION_MS),
            ),
        };

        let entry = self
            .blocks
            .record_violation(client_id, threshold, block_duration, now);

        #[cfg(feature = "monitoring")]
        if entry.is_some() {
            if let Some(metrics) = &self.metrics {
                metrics.escalations.inc();
            }
        }

        entry
    }

    /// 是否处于封禁中
    pub fn is_blocked(&self, client_id: &str) -> bool {
        self.blocks.is_blocked(client_id, self.clock.now())
    }

    /// 有效封禁记录
    pub fn block_entry(&self, client_id: &str) -> Option<BlockEntry> {
        self.blocks.active_block(client_id, self.clock.now())
    }

    /// 当前违规计数
    pub fn violations(&self, client_id: &str) -> u32 {
        self.blocks.violations(client_id, self.clock.now())
    }

    /// 手动封禁
    #[instrument(skip(self, client_id), fields(client = %redact_client_id(client_id)))]
    pub fn block(
        &self,
        client_id: &str,
        duration: Duration,
        operator: &str,
    ) -> Result<BlockEntry, GatehouseError> {
        validate_client_id(client_id)?;
        if duration.is_zero() {
            return Err(GatehouseError::ValidationError(
                "封禁时长必须大于0".to_string(),
            ));
        }
        let entry = self.blocks.block(
            client_id,
            duration,
            BlockReason::Manual {
                operator: operator.to_string(),
            },
            self.clock.now(),
        );
        info!("手动封禁: operator={}, until={}", operator, entry.blocked_until);
        Ok(entry)
    }

    /// 解封，同时清空违规计数和可疑请求记录
    pub fn unblock(&self, client_id: &str) -> bool {
        #[cfg(feature = "threat-monitor")]
        if let Some(threats) = &self.threats {
            threats.forget(client_id);
        }
        self.blocks.unblock(client_id)
    }

    /// 查询某个客户端某个动作的限流状态
    pub fn rate_limit_info(&self, client_id: &str, action: Action) -> Option<RateLimitInfo> {
        let now = self.clock.now();
        let counter = self
            .windows
            .get(&ClientKey::new(client_id, action), now)?;
        Some(RateLimitInfo {
            count: counter.count,
            reset_at: counter.window_reset_at,
            blocked: self.blocks.is_blocked(client_id, now),
            suspicious: self.is_suspicious_at(client_id, now),
        })
    }

    /// 按配置的有效期签发令牌
    pub fn issue_token(&self) -> Result<Token, GatehouseError> {
        self.issue_token_with_lifetime(self.config.token_lifetime())
    }

    /// 签发指定有效期的令牌
    pub fn issue_token_with_lifetime(&self, lifetime: Duration) -> Result<Token, GatehouseError> {
        let token = self.tokens.issue_token(lifetime)?;
        #[cfg(feature = "monitoring")]
        if let Some(metrics) = &self.metrics {
            metrics.tokens_issued.inc();
        }
        Ok(token)
    }

    /// 校验令牌（不消费）
    pub fn validate_token(&self, token: &str) -> bool {
        self.tokens.validate_token(token)
    }

    /// 校验并消费令牌
    pub fn consume_token(&self, token: &str) -> bool {
        let valid = self.tokens.consume_token(token);
        #[cfg(feature = "monitoring")]
        if let Some(metrics) = &self.metrics {
            if valid {
                metrics.tokens_consumed.inc();
            } else {
                metrics.tokens_rejected.inc();
            }
        }
        valid
    }

    /// 检测可疑请求，命中次数达到阈值时封禁客户端
    ///
    /// 未启用威胁监控时总是返回空结果。
    #[cfg(feature = "threat-monitor")]
    pub fn inspect_request(
        &self,
        client_id: &str,
        user_agent: &str,
        path: &str,
    ) -> Result<ThreatVerdict, GatehouseError> {
        validate_client_id(client_id)?;
        let Some(threats) = &self.threats else {
            return Ok(ThreatVerdict::default());
        };

        let now = self.clock.now();
        let verdict = threats.inspect(client_id, user_agent, path, now);
        if let Some(kind) = verdict.escalated {
            self.blocks.block(
                client_id,
                Duration::from_millis(self.config.threat.block_duration_ms),
                BlockReason::Threat {
                    pattern: kind.as_str().to_string(),
                },
                now,
            );
            #[cfg(feature = "monitoring")]
            if let Some(metrics) = &self.metrics {
                metrics.escalations.inc();
            }
        }
        Ok(verdict)
    }

    /// 是否有可疑请求记录
    pub fn is_suspicious(&self, client_id: &str) -> bool {
        self.is_suspicious_at(client_id, self.clock.now())
    }

    #[allow(unused_variables)]
    fn is_suspicious_at(&self, client_id: &str, now: DateTime<Utc>) -> bool {
        #[cfg(feature = "threat-monitor")]
        if let Some(threats) = &self.threats {
            return threats.is_suspicious(client_id, now);
        }
        false
    }

    /// 清理所有严格早于 `now` 过期的记录
    #[instrument(skip(self))]
    pub fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let windows = self.windows.sweep(now);
        let (blocks, violations) = self.blocks.sweep(now);
        let tokens = self.tokens.sweep(now);

        #[cfg(feature = "threat-monitor")]
        let threats = self
            .threats
            .as_ref()
            .map(|threats| threats.sweep(now))
            .unwrap_or(0);
        #[cfg(not(feature = "threat-monitor"))]
        let threats = 0;

        #[cfg(feature = "monitoring")]
        if let Some(metrics) = &self.metrics {
            metrics
                .tracked_windows
                .set(i64::try_from(self.windows.len()).unwrap_or(i64::MAX));
        }

        let report = SweepReport {
            windows,
            blocks,
            violations,
            tokens,
            threats,
        };
        debug!("清理完成: {:?}", report);
        report
    }

    /// 以当前时间清理
    pub fn sweep_now(&self) -> SweepReport {
        self.sweep(self.clock.now())
    }

    /// 跟踪中的窗口数
    pub fn tracked_windows(&self) -> usize {
        self.windows.len()
    }

    /// 封禁记录数（包括尚未清理的过期记录）
    pub fn block_entries(&self) -> usize {
        self.blocks.len()
    }

    /// 生成安全报告
    pub fn report(&self) -> SecurityReport {
        let now = self.clock.now();
        let mut blocked_clients = self.blocks.blocked_clients(now);
        blocked_clients.sort();

        #[cfg(feature = "threat-monitor")]
        let (suspicious_clients, threat_hits) = match &self.threats {
            Some(threats) => (
                threats.suspicious_clients(now),
                threats
                    .hits_by_kind(now)
                    .into_iter()
                    .map(|(kind, hits)| (kind.as_str().to_string(), hits))
                    .collect(),
            ),
            None => (Vec::new(), BTreeMap::new()),
        };
        #[cfg(not(feature = "threat-monitor"))]
        let (suspicious_clients, threat_hits) = (Vec::new(), BTreeMap::new());

        SecurityReport {
            generated_at: now,
            tracked_windows: self.windows.len(),
            blocked_clients,
            suspicious_clients,
            outstanding_tokens: self.tokens.len(),
            threat_hits,
        }
    }
}

impl std::fmt::Debug for AdmissionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionController")
            .field("config", &self.config)
            .field("windows", &self.windows.len())
            .field("blocks", &self.blocks.len())
            .field("tokens", &self.tokens.len())
            .finish()
    }
}

/// 校验客户端标识
fn validate_client_id(client_id: &str) -> Result<(), GatehouseError> {
    if client_id.is_empty() {
        return Err(GatehouseError::ValidationError(
            "客户端标识不能为空".to_string(),
        ));
    }
    if client_id.len() > MAX_CLIENT_ID_LENGTH {
        return Err(GatehouseError::ValidationError(format!(
            "客户端标识过长，最大长度为 {} 字符",
            MAX_CLIENT_ID_LENGTH
        )));
    }
    if client_id.contains(|c: char| c.is_control()) {
        return Err(GatehouseError::ValidationError(
            "客户端标识包含非法字符".to_string(),
        ));
    }
    Ok(())
}
