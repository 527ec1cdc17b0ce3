//! 监控指标模块
//!
//! 使用Prometheus记录准入、封禁和令牌相关的计数。指标注册在实例自己的
//! Registry 中，不依赖全局注册表。
//!
//! # 示例
//!
//! ```rust
//! use gatehouse::telemetry::Metrics;
//!
//! let metrics = Metrics::new().unwrap();
//! metrics.requests_admitted.inc();
//! assert!(metrics.gather().contains("gatehouse_requests_admitted_total"));
//! ```

use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use tracing::error;

/// 监控指标
#[derive(Clone)]
pub struct Metrics {
    /// 放行的请求数
    pub requests_admitted: IntCounter,
    /// 因超过限额被拒绝的请求数
    pub requests_limited: IntCounter,
    /// 因封禁被拒绝的请求数
    pub requests_blocked: IntCounter,
    /// 升级为封禁的次数
    pub escalations: IntCounter,
    /// 签发的令牌数
    pub tokens_issued: IntCounter,
    /// 成功消费的令牌数
    pub tokens_consumed: IntCounter,
    /// 被拒绝的令牌数
    pub tokens_rejected: IntCounter,
    /// 当前跟踪的窗口数
    pub tracked_windows: IntGauge,
    registry: Registry,
}

impl Metrics {
    /// 创建并注册所有指标
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| -> Result<IntCounter, prometheus::Error> {
            let counter = IntCounter::with_opts(Opts::new(name, help))?;
            registry.register(Box::new(counter.clone()))?;
            Ok(counter)
        };

        let requests_admitted = counter(
            "gatehouse_requests_admitted_total",
            "Total number of admitted requests",
        )?;
        let requests_limited = counter(
            "gatehouse_requests_limited_total",
            "Total number of requests denied by a window limit",
        )?;
        let requests_blocked = counter(
            "gatehouse_requests_blocked_total",
            "Total number of requests denied because the client is blocked",
        )?;
        let escalations = counter(
            "gatehouse_escalations_total",
            "Total number of clients promoted to the block list",
        )?;
        let tokens_issued = counter("gatehouse_tokens_issued_total", "Total number of issued tokens")?;
        let tokens_consumed = counter(
            "gatehouse_tokens_consumed_total",
            "Total number of tokens consumed while valid",
        )?;
        let tokens_rejected = counter(
            "gatehouse_tokens_rejected_total",
            "Total number of unknown or expired tokens presented",
        )?;

        let tracked_windows = IntGauge::with_opts(Opts::new(
            "gatehouse_tracked_windows",
            "Current number of tracked window counters",
        ))?;
        registry.register(Box::new(tracked_windows.clone()))?;

        Ok(Self {
            requests_admitted,
            requests_limited,
            requests_blocked,
            escalations,
            tokens_issued,
            tokens_consumed,
            tokens_rejected,
            tracked_windows,
            registry,
        })
    }

    /// 收集所有指标并返回Prometheus格式的文本
    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            error!("Failed to encode metrics: {}", e);
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
