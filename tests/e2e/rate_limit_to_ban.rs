//! 端到端测试：限流到封禁的完整流程
//!
//! 测试场景：
//! 1. 客户端正常登录尝试（限额 5 次 / 15 分钟）
//! 2. 暴力尝试持续超限
//! 3. 违规次数达到阈值后封禁 1 小时
//! 4. 封禁期间所有动作被拒绝
//! 5. 封禁到期后恢复访问
//! 6. 清理任务回收所有过期状态

use crate::common::*;
use gatehouse::prelude::*;
use std::time::Duration;

/// 测试暴力登录被封禁并自动解封
#[test]
fn test_login_bruteforce_to_ban() {
    init_tracing();
    let (clock, controller) = create_manual_controller(GatehouseConfig::default());
    let attacker = "198.51.100.77";

    // 第一个窗口：5 次放行，之后持续超限
    let decisions = send_requests(&controller, attacker, Action::AdminLogin, 5);
    assert!(decisions.iter().all(|d| d.allowed));
    assert_eq!(decisions.last().map(|d| d.remaining), Some(0));

    let mut blocked_at_attempt = None;
    for attempt in 1..=20 {
        let decision = controller.check(attacker, Action::AdminLogin).unwrap();
        assert!(!decision.allowed);
        if decision.blocked {
            blocked_at_attempt = Some(attempt);
            break;
        }
    }
    // 第 10 次违规触发封禁，第 11 次请求看到封禁
    assert_eq!(blocked_at_attempt, Some(11));

    let entry = controller.block_entry(attacker).unwrap();
    assert_eq!(entry.reason, BlockReason::Escalation { violations: 10 });

    // 封禁对所有动作生效
    assert!(controller.check(attacker, Action::ContactSubmit).unwrap().blocked);

    // 其他客户端不受影响
    assert!(controller.check("198.51.100.78", Action::AdminLogin).unwrap().allowed);

    // 封禁到期
    clock.advance(Duration::from_secs(3600));
    assert!(!controller.is_blocked(attacker));
    let decision = controller.check(attacker, Action::AdminLogin).unwrap();
    assert!(decision.allowed);
    assert_eq!(decision.remaining, 4);
}

/// 测试违规计数跨窗口累积到封禁
#[test]
fn test_slow_abuse_accumulates() {
    let (clock, controller) = create_manual_controller(create_single_policy_config(
        Action::NewsletterSubscribe,
        2,
        60_000,
        3,
        120_000,
    ));
    let client = "203.0.113.50";

    for _ in 0..3 {
        let decisions = send_requests(&controller, client, Action::NewsletterSubscribe, 3);
        assert_eq!(tally_decisions(&decisions), (2, 1));
        clock.advance(minutes(1));
    }
    assert!(controller.is_blocked(client));

    clock.advance(minutes(2));
    assert!(!controller.is_blocked(client));
}

/// 测试管理员手动解封
#[test]
fn test_manual_unblock_restores_access() {
    let (_, controller) = create_manual_controller(create_single_policy_config(
        Action::GenericApi,
        1,
        60_000,
        1,
        3_600_000,
    ));

    send_requests(&controller, "c", Action::GenericApi, 2);
    assert!(controller.is_blocked("c"));

    assert!(controller.unblock("c"));
    // 窗口计数仍然保留：这次请求因超限被拒绝，而不是因封禁
    let decision = controller.check("c", Action::GenericApi).unwrap();
    assert!(!decision.allowed);
    assert!(!decision.blocked);
}

/// 测试清理回收所有过期状态
#[test]
fn test_sweep_reclaims_after_ban() {
    let (clock, controller) = create_manual_controller(GatehouseConfig::default());
    send_requests(&controller, "x", Action::AdminLogin, 15);
    assert!(controller.is_blocked("x"));

    clock.advance(Duration::from_secs(2 * 3600));
    let report = controller.sweep_now();
    assert_eq!(report.windows, 1);
    assert_eq!(report.blocks, 1);
    assert_eq!(controller.tracked_windows(), 0);
    assert_eq!(controller.block_entries(), 0);
}
