//! 可疑请求检测
//!
//! 对 User-Agent 和请求路径做模式匹配，识别扫描器、注入尝试等可疑请求。
//! 同一客户端同一类型的命中次数达到阈值后，由控制器把客户端加入封禁列表。

use crate::clock::add_duration;
use crate::config::ThreatConfig;
use crate::error::GatehouseError;
use crate::log_redaction::redact_client_id;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

/// 可疑请求类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreatKind {
    SqlInjectionTool,
    VulnerabilityScanner,
    PortScanner,
    AutomatedTool,
    Bot,
    Crawler,
    Scanner,
    SuspiciousKeyword,
    PathTraversal,
    XssAttempt,
    SqlInjection,
}

impl ThreatKind {
    pub const ALL: [ThreatKind; 11] = [
        ThreatKind::SqlInjectionTool,
        ThreatKind::VulnerabilityScanner,
        ThreatKind::PortScanner,
        ThreatKind::AutomatedTool,
        ThreatKind::Bot,
        ThreatKind::Crawler,
        ThreatKind::Scanner,
        ThreatKind::SuspiciousKeyword,
        ThreatKind::PathTraversal,
        ThreatKind::XssAttempt,
        ThreatKind::SqlInjection,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatKind::SqlInjectionTool => "SQL_INJECTION_TOOL",
            ThreatKind::VulnerabilityScanner => "VULNERABILITY_SCANNER",
            ThreatKind::PortScanner => "PORT_SCANNER",
            ThreatKind::AutomatedTool => "AUTOMATED_TOOL",
            ThreatKind::Bot => "BOT",
            ThreatKind::Crawler => "CRAWLER",
            ThreatKind::Scanner => "SCANNER",
            ThreatKind::SuspiciousKeyword => "SUSPICIOUS_KEYWORD",
            ThreatKind::PathTraversal => "PATH_TRAVERSAL",
            ThreatKind::XssAttempt => "XSS_ATTEMPT",
            ThreatKind::SqlInjection => "SQL_INJECTION",
        }
    }
}

impl fmt::Display for ThreatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 默认检测模式
pub const DEFAULT_PATTERNS: &[(ThreatKind, &str)] = &[
    (ThreatKind::SqlInjectionTool, r"sqlmap"),
    (ThreatKind::VulnerabilityScanner, r"nikto"),
    (ThreatKind::PortScanner, r"nmap"),
    (ThreatKind::AutomatedTool, r"wget"),
    (ThreatKind::AutomatedTool, r"curl"),
    (ThreatKind::AutomatedTool, r"python-requests"),
    (ThreatKind::Bot, r"bot"),
    (ThreatKind::Crawler, r"crawler"),
    (ThreatKind::Scanner, r"scanner"),
    (ThreatKind::SuspiciousKeyword, r"hack"),
    (ThreatKind::SuspiciousKeyword, r"exploit"),
    (ThreatKind::PathTraversal, r"\.\./"),
    (ThreatKind::XssAttempt, r"<script"),
    (ThreatKind::XssAttempt, r"javascript:"),
    (ThreatKind::SqlInjection, r"union.*select"),
    (ThreatKind::SqlInjection, r"drop.*table"),
    (ThreatKind::SqlInjection, r"insert.*into"),
];

#[derive(Debug, Clone, Copy)]
struct ThreatTally {
    count: u32,
    last_hit_at: DateTime<Utc>,
}

/// 单次检测结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreatVerdict {
    /// 本次请求命中的类型（去重）
    pub kinds: Vec<ThreatKind>,
    /// 命中次数达到阈值、应当封禁的类型
    pub escalated: Option<ThreatKind>,
}

impl ThreatVerdict {
    pub fn is_clean(&self) -> bool {
        self.kinds.is_empty()
    }
}

/// 可疑请求检测器
#[derive(Debug)]
pub struct ThreatMonitor {
    patterns: Vec<(ThreatKind, Regex)>,
    tallies: DashMap<(String, ThreatKind), ThreatTally>,
    block_threshold: u32,
    ttl: Duration,
}

impl ThreatMonitor {
    /// 使用默认模式创建
    pub fn new(config: &ThreatConfig) -> Result<Self, GatehouseError> {
        Self::with_patterns(config, DEFAULT_PATTERNS)
    }

    /// 使用自定义模式创建，模式不区分大小写
    pub fn with_patterns(
        config: &ThreatConfig,
        patterns: &[(ThreatKind, &str)],
    ) -> Result<Self, GatehouseError> {
        let patterns = patterns
            .iter()
            .map(|(kind, pattern)| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map(|regex| (*kind, regex))
                    .map_err(|e| {
                        GatehouseError::ConfigError(format!("无效的检测模式 {}: {}", pattern, e))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            patterns,
            tallies: DashMap::new(),
            block_threshold: config.block_threshold,
            ttl: Duration::from_millis(config.ttl_ms),
        })
    }

    /// 只做匹配，不记录
    pub fn classify(&self, user_agent: &str, path: &str) -> Vec<ThreatKind> {
        let combined = format!("{} {}", user_agent, path);
        let mut kinds: Vec<ThreatKind> = self
            .patterns
            .iter()
            .filter(|(_, regex)| regex.is_match(&combined))
            .map(|(kind, _)| *kind)
            .collect();
        kinds.sort();
        kinds.dedup();
        kinds
    }

    /// 检测请求并记录命中
    pub fn inspect(
        &self,
        client_id: &str,
        user_agent: &str,
        path: &str,
        now: DateTime<Utc>,
    ) -> ThreatVerdict {
        let kinds = self.classify(user_agent, path);
        let mut escalated = None;

        for kind in &kinds {
            let count = {
                let mut tally = self
                    .tallies
                    .entry((client_id.to_string(), *kind))
                    .or_insert(ThreatTally {
                        count: 0,
                        last_hit_at: now,
                    });
                if add_duration(tally.last_hit_at, self.ttl) < now {
                    tally.count = 0;
                }
                tally.count = tally.count.saturating_add(1);
                tally.last_hit_at = now;
                tally.count
            };

            warn!(
                "检测到可疑请求: type={}, client={}, hits={}",
                kind,
                redact_client_id(client_id),
                count
            );

            if count >= self.block_threshold && escalated.is_none() {
                escalated = Some(*kind);
            }
        }

        if kinds.is_empty() {
            debug!("请求未命中可疑模式: client={}", redact_client_id(client_id));
        }

        ThreatVerdict { kinds, escalated }
    }

    /// 客户端在保留期内是否有过命中
    pub fn is_suspicious(&self, client_id: &str, now: DateTime<Utc>) -> bool {
        let mut key = (client_id.to_string(), ThreatKind::SqlInjectionTool);
        ThreatKind::ALL.into_iter().any(|kind| {
            key.1 = kind;
            self.tallies
                .get(&key)
                .map(|tally| add_duration(tally.last_hit_at, self.ttl) >= now)
                .unwrap_or(false)
        })
    }

    /// 有命中记录的客户端
    pub fn suspicious_clients(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut clients: Vec<String> = self
            .tallies
            .iter()
            .filter(|entry| add_duration(entry.last_hit_at, self.ttl) >= now)
            .map(|entry| entry.key().0.clone())
            .collect();
        clients.sort();
        clients.dedup();
        clients
    }

    /// 各类型命中总数
    pub fn hits_by_kind(&self, now: DateTime<Utc>) -> BTreeMap<ThreatKind, u32> {
        let mut hits = BTreeMap::new();
        for entry in self.tallies.iter() {
            if add_duration(entry.last_hit_at, self.ttl) >= now {
                *hits.entry(entry.key().1).or_insert(0) += entry.count;
            }
        }
        hits
    }

    /// 清理过期命中记录，返回删除数量
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let ttl = self.ttl;
        let stale: Vec<(String, ThreatKind)> = self
            .tallies
            .iter()
            .filter(|entry| add_duration(entry.last_hit_at, ttl) < now)
            .map(|entry| entry.key().clone())
            .collect();

        stale
            .into_iter()
            .filter(|key| {
                self.tallies
                    .remove_if(key, |_, tally| add_duration(tally.last_hit_at, ttl) < now)
                    .is_some()
            })
            .count()
    }

    /// 清除某个客户端的命中记录
    pub fn forget(&self, client_id: &str) {
        self.tallies.retain(|key, _| key.0 != client_id);
    }

    pub fn len(&self) -> usize {
        self.tallies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tallies.is_empty()
    }
}
