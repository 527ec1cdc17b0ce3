//! 后台清理任务
//!
//! 周期性调用 [`AdmissionController::sweep_now`]，删除过期的窗口、封禁、违规计数、
//! 令牌和可疑请求记录。清理是纯粹的存储回收，不影响任何准入结果。
//!
//! 任务在 tokio 运行时中执行，必须在运行时上下文中调用 [`Sweeper::spawn`]。

use crate::controller::AdmissionController;
use crate::error::GatehouseError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// 清理任务启动器
pub struct Sweeper;

impl Sweeper {
    /// 以指定间隔启动清理任务
    ///
    /// 第一次清理在一个完整间隔之后执行。
    pub fn spawn(
        controller: Arc<AdmissionController>,
        interval: Duration,
    ) -> Result<SweeperHandle, GatehouseError> {
        if interval.is_zero() {
            return Err(GatehouseError::ValidationError(
                "清理间隔必须大于0".to_string(),
            ));
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval 的第一次 tick 立即完成
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = controller.sweep_now();
                        if report.total() > 0 {
                            debug!("清理过期记录: {:?}", report);
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("清理任务已停止");
        });

        info!("清理任务已启动: interval={:?}", interval);
        Ok(SweeperHandle {
            shutdown_tx,
            handle: Some(handle),
        })
    }

    /// 按控制器配置的间隔启动清理任务
    pub fn spawn_configured(
        controller: Arc<AdmissionController>,
    ) -> Result<SweeperHandle, GatehouseError> {
        let interval = controller.config().sweep_interval();
        Self::spawn(controller, interval)
    }
}

/// 清理任务句柄
///
/// 句柄被丢弃时任务被中止。
pub struct SweeperHandle {
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// 任务是否仍在运行
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// 通知任务退出并等待其结束
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!("清理任务异常退出: {}", e);
                }
            }
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
