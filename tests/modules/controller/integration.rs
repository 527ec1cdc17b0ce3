//! 控制器模块集成测试
//!
//! 测试准入控制器在并发、隔离和封禁下的行为

use crate::common::*;
use gatehouse::prelude::*;
use std::sync::Arc;
use std::time::Duration;

/// 测试100个并发请求只放行10个
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_admission_exact_limit() {
    let (_, controller) = create_manual_controller(GatehouseConfig::default());
    let mut handles = Vec::new();

    for _ in 0..100 {
        let controller = Arc::clone(&controller);
        handles.push(tokio::spawn(async move {
            controller
                .check_admission("203.0.113.1", Action::GenericApi, 10, Duration::from_secs(60))
                .unwrap()
        }));
    }

    let mut decisions = Vec::new();
    for handle in handles {
        decisions.push(handle.await.unwrap());
    }
    assert_eq!(tally_decisions(&decisions), (10, 90));

    // 放行的请求看到的剩余次数互不相同
    let mut remaining: Vec<u64> = decisions
        .iter()
        .filter(|d| d.allowed)
        .map(|d| d.remaining)
        .collect();
    remaining.sort_unstable();
    assert_eq!(remaining, (0..10).collect::<Vec<_>>());
}

/// 测试不同客户端、不同动作互相隔离
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_clients_and_actions_isolated() {
    let config = create_single_policy_config(Action::GenericApi, 5, 60_000, 1_000, 60_000)
        .with_policy(Action::ContactSubmit, ActionPolicy::new(2, 60_000));
    let (_, controller) = create_manual_controller(config);

    let admitted =
        concurrent_admissions(Arc::clone(&controller), &["a", "b", "c"], Action::GenericApi, 20)
            .await;
    for client in ["a", "b", "c"] {
        assert_eq!(admitted.get(client), Some(&5));
    }

    // 另一个动作有自己的计数
    let decisions = send_requests(&controller, "a", Action::ContactSubmit, 3);
    assert_eq!(tally_decisions(&decisions), (2, 1));
}

/// 测试封禁期间所有动作都被拒绝且不计数
#[test]
fn test_block_denies_all_actions() {
    let (clock, controller) = create_manual_controller(GatehouseConfig::default());
    controller.block("198.51.100.4", minutes(10), "ops").unwrap();

    for action in Action::ALL {
        let decision = controller.check("198.51.100.4", action).unwrap();
        assert!(!decision.allowed);
        assert!(decision.blocked);
        assert_eq!(decision.retry_after(clock.now()), Some(600));
        assert!(controller.rate_limit_info("198.51.100.4", action).is_none());
    }
    assert_eq!(controller.tracked_windows(), 0);
}

/// 测试重置时间与重试秒数
#[test]
fn test_reset_at_and_retry_after() {
    let (clock, controller) = create_manual_controller(create_single_policy_config(
        Action::NewsletterSubscribe,
        1,
        60_000,
        100,
        60_000,
    ));

    let first = controller.check("c", Action::NewsletterSubscribe).unwrap();
    assert_eq!(first.retry_after(clock.now()), None);
    let window_end = first.reset_at.unwrap();

    clock.advance_ms(30_500);
    let denied = controller.check("c", Action::NewsletterSubscribe).unwrap();
    assert!(!denied.allowed);
    assert_eq!(denied.reset_at, Some(window_end));
    // 剩余 29.5 秒向上取整
    assert_eq!(denied.retry_after(clock.now()), Some(30));
}

/// 测试违规计数在保留期后过期
#[test]
fn test_violation_tally_expires() {
    let mut config = create_single_policy_config(Action::ContactSubmit, 1, 1_000, 3, 60_000);
    config.violation_ttl_ms = 10_000;
    let (clock, controller) = create_manual_controller(config);

    send_requests(&controller, "c", Action::ContactSubmit, 3);
    assert_eq!(controller.violations("c"), 2);

    clock.advance_ms(10_001);
    assert_eq!(controller.violations("c"), 0);
    send_requests(&controller, "c", Action::ContactSubmit, 3);
    assert_eq!(controller.violations("c"), 2);
    assert!(!controller.is_blocked("c"));
}

/// 测试安全报告序列化
#[test]
fn test_report_json() {
    let (_, controller) = create_manual_controller(GatehouseConfig::default());
    controller.check("a", Action::GenericApi).unwrap();
    controller.block("b", minutes(1), "ops").unwrap();

    let json = serde_json::to_value(controller.report()).unwrap();
    assert_eq!(json["tracked_windows"], 1);
    assert_eq!(json["blocked_clients"][0], "b");
    assert_eq!(json["outstanding_tokens"], 0);
}
