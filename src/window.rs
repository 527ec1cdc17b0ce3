//! 固定窗口计数
//!
//! 按 (客户端, 动作) 维护固定窗口计数器。窗口在过期后的第一次请求时重新开始，
//! 不继承上一个窗口的计数，也不做平滑处理，因此窗口边界处允许出现最多 2 倍
//! 限额的突发流量。
//!
//! # 特性
//! - 使用 DashMap 的 entry 锁保证同一 key 的读-改-写是原子的
//! - 惰性创建计数器
//! - 清理时先快照过期 key，再在同一把锁下复查后删除

use crate::clock::add_duration;
use crate::config::Action;
use crate::log_redaction::redact_client_id;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::fmt;
use std::time::Duration;
use tracing::trace;

/// 计数器 key：(客户端标识, 动作)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    pub client_id: String,
    pub action: Action,
}

impl ClientKey {
    pub fn new(client_id: impl Into<String>, action: Action) -> Self {
        Self {
            client_id: client_id.into(),
            action,
        }
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.client_id, self.action)
    }
}

/// 窗口计数器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCounter {
    /// 当前窗口内的请求数（包含被拒绝的请求）
    pub count: u64,
    /// 窗口重置时间
    pub window_reset_at: DateTime<Utc>,
}

impl WindowCounter {
    /// 在 `now` 时是否已过期
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.window_reset_at
    }
}

/// 单次计数结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowHit {
    /// 放行
    Admitted {
        remaining: u64,
        reset_at: DateTime<Utc>,
    },
    /// 超过限额
    Limited { reset_at: DateTime<Utc> },
}

/// 固定窗口计数表
#[derive(Debug, Default)]
pub struct WindowTable {
    counters: DashMap<ClientKey, WindowCounter>,
}

impl WindowTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次请求
    ///
    /// 计数总是递增；递增前的计数已达到 `limit` 时返回 [`WindowHit::Limited`]。
    /// 调用方负责保证 `limit > 0` 且 `window` 非零。
    pub fn hit(
        &self,
        key: ClientKey,
        limit: u64,
        window: Duration,
        now: DateTime<Utc>,
    ) -> WindowHit {
        // 新建的计数器立即视为过期，由下面的重置逻辑统一开窗
        let mut counter = self.counters.entry(key).or_insert(WindowCounter {
            count: 0,
            window_reset_at: now,
        });

        if counter.is_expired(now) {
            counter.count = 0;
            counter.window_reset_at = add_duration(now, window);
            trace!(
                "窗口重置: client={}, action={}",
                redact_client_id(&counter.key().client_id),
                counter.key().action
            );
        }

        let previous = counter.count;
        counter.count = previous.saturating_add(1);
        let reset_at = counter.window_reset_at;

        if previous >= limit {
            WindowHit::Limited { reset_at }
        } else {
            WindowHit::Admitted {
                remaining: limit - counter.count,
                reset_at,
            }
        }
    }

    /// 读取未过期的计数器
    pub fn get(&self, key: &ClientKey, now: DateTime<Utc>) -> Option<WindowCounter> {
        self.counters
            .get(key)
            .map(|counter| *counter)
            .filter(|counter| !counter.is_expired(now))
    }

    /// 清理 `window_reset_at < now` 的计数器，返回删除数量
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let stale: Vec<ClientKey> = self
            .counters
            .iter()
            .filter(|entry| entry.window_reset_at < now)
            .map(|entry| entry.key().clone())
            .collect();

        stale
            .into_iter()
            .filter(|key| {
                self.counters
                    .remove_if(key, |_, counter| counter.window_reset_at < now)
                    .is_some()
            })
            .count()
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}
