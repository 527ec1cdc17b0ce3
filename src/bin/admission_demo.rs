//! 准入控制演示
//!
//! 并发模拟多个客户端访问各个动作，输出准入结果、封禁情况和安全报告。
//!
//! 运行：`RUST_LOG=gatehouse=debug cargo run --features cli --bin admission_demo [config.yaml]`

use gatehouse::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gatehouse=info")),
        )
        .init();

    println!("=== 准入控制演示 ===");

    let config = match std::env::args().nth(1) {
        Some(path) => GatehouseConfig::from_file(path)?,
        None => GatehouseConfig::default(),
    };
    let controller = Arc::new(AdmissionController::new(config)?);
    let sweeper = Sweeper::spawn_configured(Arc::clone(&controller))?;

    concurrent_same_client(&controller).await?;
    escalation(&controller)?;
    token_flow(&controller)?;
    #[cfg(feature = "threat-monitor")]
    threat_detection(&controller)?;

    let report = controller.report();
    println!("\n安全报告:\n{}", serde_json::to_string_pretty(&report)?);

    sweeper.shutdown().await;
    Ok(())
}

/// 同一客户端并发访问，放行数量必须等于限额
async fn concurrent_same_client(
    controller: &Arc<AdmissionController>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("\n--- 并发访问同一客户端 ---");
    let admitted = Arc::new(AtomicU64::new(0));
    let start = Instant::now();

    let mut handles = Vec::new();
    for _ in 0..200 {
        let controller = Arc::clone(controller);
        let admitted = Arc::clone(&admitted);
        handles.push(tokio::spawn(async move {
            if let Ok(decision) = controller.check("198.51.100.1", Action::GenericApi) {
                if decision.allowed {
                    admitted.fetch_add(1, Ordering::Relaxed);
                }
            }
        }));
    }
    for handle in handles {
        handle.await?;
    }

    let limit = controller
        .config()
        .policy(Action::GenericApi)
        .map(|policy| policy.limit)
        .unwrap_or_default();
    println!(
        "200 个请求放行 {} 个（限额 {}），耗时 {:?}",
        admitted.load(Ordering::Relaxed),
        limit,
        start.elapsed()
    );
    Ok(())
}

/// 反复超限直到被封禁
fn escalation(controller: &AdmissionController) -> Result<(), Box<dyn std::error::Error>> {
    println!("\n--- 违规升级 ---");
    let client = "198.51.100.2";
    for attempt in 1..=30 {
        let decision = controller.check(client, Action::AdminLogin)?;
        if decision.blocked {
            println!("第 {} 次请求时已被封禁，解封时间 {:?}", attempt, decision.reset_at);
            break;
        }
    }
    Ok(())
}

fn token_flow(controller: &AdmissionController) -> Result<(), Box<dyn std::error::Error>> {
    println!("\n--- 一次性令牌 ---");
    let token = controller.issue_token()?;
    println!("签发令牌: {:?}", token);
    println!("第一次提交: {}", controller.consume_token(token.as_str()));
    println!("重复提交: {}", controller.consume_token(token.as_str()));
    Ok(())
}

#[cfg(feature = "threat-monitor")]
fn threat_detection(controller: &AdmissionController) -> Result<(), Box<dyn std::error::Error>> {
    println!("\n--- 可疑请求检测 ---");
    let client = "198.51.100.3";
    for _ in 0..controller.config().threat.block_threshold {
        let verdict = controller.inspect_request(client, "sqlmap/1.7", "/search")?;
        if let Some(kind) = verdict.escalated {
            println!("命中 {} 次数达到阈值，客户端已封禁", kind);
        }
    }
    println!("是否封禁: {}", controller.is_blocked(client));
    Ok(())
}
