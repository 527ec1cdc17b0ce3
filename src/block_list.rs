//! 封禁列表
//!
//! 记录每个客户端的违规次数，并在违规次数达到阈值后把客户端加入临时封禁列表。
//!
//! # 功能
//!
//! - 违规计数与动作无关，跨窗口累积，超过保留时长后重新计数
//! - 达到阈值时封禁，封禁后违规计数清零
//! - 手动封禁 / 解封
//! - 过期封禁在读取时视为无效，由清理任务删除

use crate::clock::add_duration;
use crate::log_redaction::redact_client_id;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// 封禁原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockReason {
    /// 违规次数达到阈值
    Escalation { violations: u32 },
    /// 命中可疑请求模式
    Threat { pattern: String },
    /// 手动封禁
    Manual { operator: String },
}

/// 封禁记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEntry {
    /// 封禁时间
    pub blocked_at: DateTime<Utc>,
    /// 解封时间
    pub blocked_until: DateTime<Utc>,
    /// 封禁原因
    pub reason: BlockReason,
}

impl BlockEntry {
    /// 在 `now` 时是否仍然有效
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.blocked_until > now
    }
}

/// 违规计数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ViolationTally {
    count: u32,
    last_violation_at: DateTime<Utc>,
}

/// 封禁列表
#[derive(Debug)]
pub struct BlockList {
    /// 客户端 -> 封禁记录
    blocks: DashMap<String, BlockEntry>,
    /// 客户端 -> 违规计数
    tallies: DashMap<String, ViolationTally>,
    /// 违规计数保留时长
    violation_ttl: Duration,
}

impl BlockList {
    /// 创建封禁列表
    ///
    /// # 参数
    /// - `violation_ttl`: 距上次违规超过该时长后，违规计数重新开始
    pub fn new(violation_ttl: Duration) -> Self {
        Self {
            blocks: DashMap::new(),
            tallies: DashMap::new(),
            violation_ttl,
        }
    }

    /// 记录一次违规
    ///
    /// 违规计数达到 `threshold` 时封禁客户端 `block_duration`，并返回新的封禁记录。
    pub fn record_violation(
        &self,
        client_id: &str,
        threshold: u32,
        block_duration: Duration,
        now: DateTime<Utc>,
    ) -> Option<BlockEntry> {
        let violations = {
            let mut tally = self
                .tallies
                .entry(client_id.to_string())
                .or_insert(ViolationTally {
                    count: 0,
                    last_violation_at: now,
                });

            if add_duration(tally.last_violation_at, self.violation_ttl) < now {
                tally.count = 0;
            }
            tally.count = tally.count.saturating_add(1);
            tally.last_violation_at = now;
            tally.count
        };

        debug!(
            "记录违规: client={}, violations={}, threshold={}",
            redact_client_id(client_id),
            violations,
            threshold
        );

        if violations < threshold {
            return None;
        }

        self.tallies.remove(client_id);
        let entry = self.block(
            client_id,
            block_duration,
            BlockReason::Escalation { violations },
            now,
        );
        warn!(
            "客户端违规次数过多，已封禁: client={}, violations={}, until={}",
            redact_client_id(client_id),
            violations,
            entry.blocked_until
        );
        Some(entry)
    }

    /// 封禁客户端
    ///
    /// 已有更晚到期的封禁时保留原封禁，不会缩短封禁时间。
    pub fn block(
        &self,
        client_id: &str,
        duration: Duration,
        reason: BlockReason,
        now: DateTime<Utc>,
    ) -> BlockEntry {
        let candidate = BlockEntry {
            blocked_at: now,
            blocked_until: add_duration(now, duration),
            reason,
        };

        let mut entry = self
            .blocks
            .entry(client_id.to_string())
            .or_insert_with(|| candidate.clone());
        if entry.blocked_until < candidate.blocked_until {
            *entry = candidate;
        }
        entry.clone()
    }

    /// 解封客户端并清空违规计数
    pub fn unblock(&self, client_id: &str) -> bool {
        self.tallies.remove(client_id);
        let removed = self.blocks.remove(client_id).is_some();
        if removed {
            info!("客户端已解封: client={}", redact_client_id(client_id));
        }
        removed
    }

    /// 是否处于封禁中
    pub fn is_blocked(&self, client_id: &str, now: DateTime<Utc>) -> bool {
        self.active_block(client_id, now).is_some()
    }

    /// 获取仍然有效的封禁记录
    pub fn active_block(&self, client_id: &str, now: DateTime<Utc>) -> Option<BlockEntry> {
        self.blocks
            .get(client_id)
            .filter(|entry| entry.is_active(now))
            .map(|entry| entry.clone())
    }

    /// 当前违规计数（已过保留期的计数视为 0）
    pub fn violations(&self, client_id: &str, now: DateTime<Utc>) -> u32 {
        self.tallies
            .get(client_id)
            .filter(|tally| add_duration(tally.last_violation_at, self.violation_ttl) >= now)
            .map(|tally| tally.count)
            .unwrap_or(0)
    }

    /// 所有有效封禁的客户端
    pub fn blocked_clients(&self, now: DateTime<Utc>) -> Vec<String> {
        self.blocks
            .iter()
            .filter(|entry| entry.is_active(now))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// 清理过期封禁和过期违规计数，返回 (封禁删除数, 计数删除数)
    pub fn sweep(&self, now: DateTime<Utc>) -> (usize, usize) {
        let expired_blocks: Vec<String> = self
            .blocks
            .iter()
            .filter(|entry| entry.blocked_until < now)
            .map(|entry| entry.key().clone())
            .collect();
        let blocks_removed = expired_blocks
            .into_iter()
            .filter(|client| {
                self.blocks
                    .remove_if(client, |_, entry| entry.blocked_until < now)
                    .is_some()
            })
            .count();

        let ttl = self.violation_ttl;
        let stale_tallies: Vec<String> = self
            .tallies
            .iter()
            .filter(|entry| add_duration(entry.last_violation_at, ttl) < now)
            .map(|entry| entry.key().clone())
            .collect();
        let tallies_removed = stale_tallies
            .into_iter()
            .filter(|client| {
                self.tallies
                    .remove_if(client, |_, tally| {
                        add_duration(tally.last_violation_at, ttl) < now
                    })
                    .is_some()
            })
            .count();

        (blocks_removed, tallies_removed)
    }

    /// 封禁记录数（包括尚未清理的过期记录）
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// 违规计数记录数
    pub fn tally_len(&self) -> usize {
        self.tallies.len()
    }
}
