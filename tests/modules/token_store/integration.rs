//! 令牌存储模块集成测试
//!
//! 测试令牌在并发消费下的一次性语义

use ahash::AHashSet;
use gatehouse::clock::{Clock, ManualClock};
use gatehouse::token_store::TokenStore;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 测试同一令牌并发消费只有一次成功
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_consume_single_winner() {
    let store = Arc::new(TokenStore::with_system_clock());
    let token = store.issue_token(Duration::from_secs(60)).unwrap();
    let winners = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..64 {
        let store = Arc::clone(&store);
        let winners = Arc::clone(&winners);
        let token = token.clone();
        handles.push(tokio::spawn(async move {
            if store.consume_token(token.as_str()) {
                winners.fetch_add(1, Ordering::SeqCst);
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(winners.load(Ordering::SeqCst), 1);
    assert!(store.is_empty());
}

/// 测试并发签发的令牌互不相同
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_issue_unique() {
    let store = Arc::new(TokenStore::with_system_clock());
    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            (0..250)
                .map(|_| store.issue_token(Duration::from_secs(60)).unwrap().into_inner())
                .collect::<Vec<_>>()
        }));
    }

    let mut seen = AHashSet::new();
    for handle in handles {
        for token in handle.await.unwrap() {
            assert!(seen.insert(token));
        }
    }
    assert_eq!(seen.len(), 2000);
    assert_eq!(store.len(), 2000);
}

/// 测试过期令牌保留到清理为止
#[test]
fn test_expired_tokens_until_sweep() {
    let clock = Arc::new(ManualClock::at_epoch());
    let store = TokenStore::new(clock.clone());
    let token = store.issue_token(Duration::from_secs(1)).unwrap();

    clock.advance_ms(1_000);
    assert!(!store.validate_token(token.as_str()));
    assert_eq!(store.len(), 1);

    // expires_at == now 时不清理
    assert_eq!(store.sweep(clock.now()), 0);
    clock.advance_ms(1);
    assert_eq!(store.sweep(clock.now()), 1);
    assert!(store.token_info(token.as_str()).is_none());
}

/// 测试令牌序列化为纯字符串
#[test]
fn test_token_serializes_transparently() {
    let store = TokenStore::with_system_clock();
    let token = store.issue_token(Duration::from_secs(60)).unwrap();
    let json = serde_json::to_string(&token).unwrap();
    assert_eq!(json, format!("\"{}\"", token.as_str()));
}
