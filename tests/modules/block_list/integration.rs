//! 封禁列表模块集成测试
//!
//! 测试违规升级与封禁的并发行为

use chrono::{DateTime, TimeZone, Utc};
use gatehouse::block_list::{BlockList, BlockReason};
use std::sync::Arc;
use std::time::Duration;

const HOUR: Duration = Duration::from_secs(3600);

fn t(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).unwrap()
}

/// 测试并发违规只触发一次升级
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_violations_escalate_once() {
    let list = Arc::new(BlockList::new(HOUR));
    let mut handles = Vec::new();

    for _ in 0..50 {
        let list = Arc::clone(&list);
        handles.push(tokio::spawn(async move {
            list.record_violation("10.0.0.9", 50, HOUR, t(0)).is_some()
        }));
    }

    let mut escalations = 0;
    for handle in handles {
        if handle.await.unwrap() {
            escalations += 1;
        }
    }
    assert_eq!(escalations, 1);
    assert!(list.is_blocked("10.0.0.9", t(1)));
}

/// 测试封禁到期后可再次累计违规
#[test]
fn test_reescalation_after_expiry() {
    let list = BlockList::new(HOUR);
    for _ in 0..2 {
        list.record_violation("c", 2, Duration::from_secs(10), t(0));
    }
    assert!(list.is_blocked("c", t(0)));
    assert!(!list.is_blocked("c", t(10_000)));

    assert!(list
        .record_violation("c", 2, Duration::from_secs(10), t(10_000))
        .is_none());
    let entry = list
        .record_violation("c", 2, Duration::from_secs(10), t(10_000))
        .unwrap();
    assert_eq!(entry.blocked_until, t(20_000));
}

/// 测试封禁原因序列化
#[test]
fn test_block_reason_serialization() {
    let json = serde_json::to_string(&BlockReason::Escalation { violations: 10 }).unwrap();
    assert_eq!(json, r#"{"kind":"escalation","violations":10}"#);

    let reason: BlockReason =
        serde_json::from_str(r#"{"kind":"manual","operator":"ops"}"#).unwrap();
    assert_eq!(
        reason,
        BlockReason::Manual {
            operator: "ops".to_string()
        }
    );
}
