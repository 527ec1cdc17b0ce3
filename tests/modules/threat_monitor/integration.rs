//! 可疑请求检测模块集成测试
//!
//! 测试模式识别、命中统计和过期清理

use chrono::{DateTime, TimeZone, Utc};
use gatehouse::config::ThreatConfig;
use gatehouse::threat_monitor::{ThreatKind, ThreatMonitor};

fn t(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).unwrap()
}

/// 测试常见攻击请求的分类
#[test]
fn test_classify_common_attacks() {
    let monitor = ThreatMonitor::new(&ThreatConfig::default()).unwrap();

    assert_eq!(
        monitor.classify("Mozilla/5.0", "/../../etc/passwd"),
        vec![ThreatKind::PathTraversal]
    );
    assert_eq!(
        monitor.classify("Mozilla/5.0", "/search?q=<SCRIPT>alert(1)"),
        vec![ThreatKind::XssAttempt]
    );
    assert_eq!(
        monitor.classify("Nikto/2.5", "/"),
        vec![ThreatKind::VulnerabilityScanner]
    );
    assert!(monitor
        .classify("Mozilla/5.0 (X11; Linux x86_64)", "/admin/login")
        .is_empty());
}

/// 测试命中统计与过期
#[test]
fn test_hits_and_expiry() {
    let config = ThreatConfig {
        ttl_ms: 1_000,
        ..ThreatConfig::default()
    };
    let monitor = ThreatMonitor::new(&config).unwrap();

    monitor.inspect("a", "Nmap Scripting Engine", "/", t(0));
    monitor.inspect("b", "Nmap Scripting Engine", "/", t(0));
    monitor.inspect("b", "Mozilla/5.0", "/?q=union select 1", t(500));

    let hits = monitor.hits_by_kind(t(500));
    assert_eq!(hits.get(&ThreatKind::PortScanner), Some(&2));
    assert_eq!(hits.get(&ThreatKind::SqlInjection), Some(&1));
    assert_eq!(monitor.suspicious_clients(t(500)), vec!["a".to_string(), "b".to_string()]);

    assert_eq!(monitor.sweep(t(1_001)), 2);
    assert_eq!(monitor.suspicious_clients(t(1_001)), vec!["b".to_string()]);
    assert_eq!(monitor.sweep(t(1_501)), 1);
    assert!(monitor.is_empty());
}

/// 测试命中次数达到阈值后升级
#[test]
fn test_escalation_threshold() {
    let config = ThreatConfig {
        block_threshold: 2,
        ..ThreatConfig::default()
    };
    let monitor = ThreatMonitor::new(&config).unwrap();

    let first = monitor.inspect("c", "python-requests/2.31", "/", t(0));
    assert!(!first.is_clean());
    assert!(first.escalated.is_none());

    let second = monitor.inspect("c", "python-requests/2.31", "/", t(1));
    assert_eq!(second.escalated, Some(ThreatKind::AutomatedTool));
}
