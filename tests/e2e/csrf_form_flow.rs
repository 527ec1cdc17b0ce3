//! 端到端测试：表单令牌流程
//!
//! 测试场景：
//! 1. 渲染表单时签发令牌
//! 2. 提交时先做准入检查，再消费令牌
//! 3. 重放提交被拒绝
//! 4. 过期令牌被拒绝

use crate::common::*;
use gatehouse::prelude::*;
use std::time::Duration;

/// 模拟一次联系表单提交
fn submit_contact(controller: &AdmissionController, client: &str, token: &str) -> Result<(), &'static str> {
    let decision = controller
        .check(client, Action::ContactSubmit)
        .map_err(|_| "bad request")?;
    if !decision.allowed {
        return Err("too many requests");
    }
    if !controller.consume_token(token) {
        return Err("forbidden");
    }
    Ok(())
}

/// 测试正常提交和重放
#[test]
fn test_submit_then_replay() {
    let (_, controller) = create_manual_controller(GatehouseConfig::default());

    let token = controller.issue_token().unwrap();
    assert_eq!(submit_contact(&controller, "192.0.2.1", token.as_str()), Ok(()));
    assert_eq!(
        submit_contact(&controller, "192.0.2.1", token.as_str()),
        Err("forbidden")
    );
}

/// 测试令牌过期
#[test]
fn test_expired_form_token() {
    let (clock, controller) = create_manual_controller(GatehouseConfig::default());
    let token = controller
        .issue_token_with_lifetime(Duration::from_secs(600))
        .unwrap();

    clock.advance(Duration::from_secs(599));
    assert!(controller.validate_token(token.as_str()));
    clock.advance(Duration::from_secs(1));
    assert_eq!(
        submit_contact(&controller, "192.0.2.2", token.as_str()),
        Err("forbidden")
    );
}

/// 测试伪造令牌
#[test]
fn test_forged_token() {
    let (_, controller) = create_manual_controller(GatehouseConfig::default());
    controller.issue_token().unwrap();
    assert_eq!(
        submit_contact(&controller, "192.0.2.3", "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"),
        Err("forbidden")
    );
    assert_eq!(controller.tokens().len(), 1);
}

/// 测试限流先于令牌检查
#[test]
fn test_rate_limit_before_token() {
    let (_, controller) = create_manual_controller(GatehouseConfig::default());
    for _ in 0..3 {
        let token = controller.issue_token().unwrap();
        assert_eq!(submit_contact(&controller, "192.0.2.4", token.as_str()), Ok(()));
    }

    let token = controller.issue_token().unwrap();
    assert_eq!(
        submit_contact(&controller, "192.0.2.4", token.as_str()),
        Err("too many requests")
    );
    // 被限流的提交不消费令牌
    assert!(controller.validate_token(token.as_str()));
}

/// 测试令牌按配置的有效期签发
#[test]
fn test_configured_lifetime() {
    let mut config = GatehouseConfig::default();
    config.token_lifetime_ms = 30_000;
    let (clock, controller) = create_manual_controller(config);

    let token = controller.issue_token().unwrap();
    let info = controller.tokens().token_info(token.as_str()).unwrap();
    assert_eq!(info.expires_at, clock.now() + chrono::Duration::seconds(30));
}
