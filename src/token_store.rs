//! 一次性令牌存储
//!
//! 为表单渲染签发短期不透明令牌（防跨站请求伪造），在处理提交时校验并作废。
//!
//! # 特性
//! - 每个令牌 256 位系统随机数，URL 安全的 base64 编码
//! - 校验不消费，`consume_token` 校验后无条件删除
//! - 碰撞会静默覆盖旧令牌的过期时间（在该熵宽度下可以接受）
//!
//! # 示例
//! ```rust
//! use gatehouse::token_store::TokenStore;
//! use std::time::Duration;
//!
//! let store = TokenStore::with_system_clock();
//! let token = store.issue_token(Duration::from_secs(3600)).unwrap();
//! assert!(store.validate_token(token.as_str()));
//! assert!(store.consume_token(token.as_str()));
//! assert!(!store.consume_token(token.as_str()));
//! ```

use crate::clock::{add_duration, Clock, SystemClock};
use crate::constants::{MAX_TOKEN_LENGTH, TOKEN_ENTROPY_BYTES};
use crate::error::GatehouseError;
use crate::log_redaction::redact_token;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// 不透明令牌
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Debug 输出不暴露完整令牌
impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Token").field(&redact_token(&self.0)).finish()
    }
}

impl AsRef<str> for Token {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// 令牌信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// 过期时间
    pub expires_at: DateTime<Utc>,
    /// 当前是否有效
    pub valid: bool,
}

/// 令牌存储
pub struct TokenStore {
    /// 令牌 -> 过期时间
    tokens: DashMap<String, DateTime<Utc>>,
    clock: Arc<dyn Clock>,
}

impl TokenStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            tokens: DashMap::new(),
            clock,
        }
    }

    pub fn with_system_clock() -> Self {
        Self::new(Arc::new(SystemClock))
    }

    /// 签发令牌
    ///
    /// # 参数
    /// - `lifetime`: 有效期，必须大于0
    pub fn issue_token(&self, lifetime: Duration) -> Result<Token, GatehouseError> {
        if lifetime.is_zero() {
            return Err(GatehouseError::ValidationError(
                "令牌有效期必须大于0".to_string(),
            ));
        }

        let mut bytes = [0u8; TOKEN_ENTROPY_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let token = URL_SAFE_NO_PAD.encode(bytes);

        let expires_at = add_duration(self.clock.now(), lifetime);
        self.tokens.insert(token.clone(), expires_at);
        debug!(
            "签发令牌: token={}, expires_at={}",
            redact_token(&token),
            expires_at
        );

        Ok(Token(token))
    }

    /// 校验令牌（不消费）
    pub fn validate_token(&self, token: &str) -> bool {
        if !Self::plausible(token) {
            return false;
        }
        let now = self.clock.now();
        self.tokens
            .get(token)
            .map(|expires_at| now < *expires_at)
            .unwrap_or(false)
    }

    /// 校验并删除令牌，返回删除前是否有效
    pub fn consume_token(&self, token: &str) -> bool {
        if !Self::plausible(token) {
            return false;
        }
        let now = self.clock.now();
        let valid = self
            .tokens
            .remove(token)
            .map(|(_, expires_at)| now < expires_at)
            .unwrap_or(false);
        trace!("消费令牌: token={}, valid={}", redact_token(token), valid);
        valid
    }

    /// 作废令牌，返回令牌是否存在
    pub fn invalidate(&self, token: &str) -> bool {
        self.tokens.remove(token).is_some()
    }

    /// 获取令牌信息
    pub fn token_info(&self, token: &str) -> Option<TokenInfo> {
        let now = self.clock.now();
        self.tokens.get(token).map(|expires_at| TokenInfo {
            expires_at: *expires_at,
            valid: now < *expires_at,
        })
    }

    /// 清理 `expires_at < now` 的令牌，返回删除数量
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let expired: Vec<String> = self
            .tokens
            .iter()
            .filter(|entry| *entry.value() < now)
            .map(|entry| entry.key().clone())
            .collect();

        expired
            .into_iter()
            .filter(|token| {
                self.tokens
                    .remove_if(token, |_, expires_at| *expires_at < now)
                    .is_some()
            })
            .count()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    fn plausible(token: &str) -> bool {
        !token.is_empty() && token.len() <= MAX_TOKEN_LENGTH
    }
}

impl fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenStore")
            .field("tokens", &self.tokens.len())
            .finish()
    }
}
