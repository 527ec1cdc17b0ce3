//! 时钟抽象
//!
//! 控制器只通过 [`Clock`] 获取当前时间，便于在测试中精确控制窗口边界。
//! 不假设时钟单调：时钟回拨只会推迟下一次窗口重置。

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// 时钟 trait
pub trait Clock: Send + Sync {
    /// 当前时间
    fn now(&self) -> DateTime<Utc>;
}

/// 系统时钟
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 手动时钟
///
/// 时间只在调用 [`ManualClock::advance`] 或 [`ManualClock::set`] 时变化。
///
/// # 示例
/// ```rust
/// use gatehouse::clock::{Clock, ManualClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::at_epoch();
/// let start = clock.now();
/// clock.advance(Duration::from_secs(61));
/// assert_eq!((clock.now() - start).num_seconds(), 61);
/// ```
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// 从指定时间开始
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// 从 Unix 纪元开始
    pub fn at_epoch() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// 前进一段时间
    pub fn advance(&self, by: std::time::Duration) {
        let mut now = self.now.lock();
        *now = add_duration(*now, by);
    }

    /// 前进若干毫秒
    pub fn advance_ms(&self, millis: u64) {
        self.advance(std::time::Duration::from_millis(millis));
    }

    /// 设置为指定时间（可以早于当前时间，用于模拟时钟回拨）
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// 计算 `now + duration`，溢出时饱和到最大时间
pub(crate) fn add_duration(now: DateTime<Utc>, duration: std::time::Duration) -> DateTime<Utc> {
    Duration::from_std(duration)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
