//! 走子计时
//!
//! 可选策略层：每一手有时限，超时后向走子方发送 `-4` 并重新计时，
//! 连续超时达到上限则判负。落子成功即清零。

use std::time::{Duration, Instant};

/// 计时检查结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// 未超时（或未启用）
    Running,
    /// 本手超时，已重新计时
    Expired { strikes: u32 },
    /// 连续超时达到上限
    Forfeit,
}

/// 单手计时器
#[derive(Debug, Clone)]
pub struct TurnTimer {
    /// 每手时限，None 表示不限时
    limit: Option<Duration>,
    /// 当前一手的截止时间
    deadline: Option<Instant>,
    /// 当前一手已超时次数
    strikes: u32,
    /// 判负前允许的超时次数
    max_strikes: u32,
}

impl TurnTimer {
    pub fn new(limit: Option<Duration>, max_strikes: u32) -> Self {
        Self {
            limit,
            deadline: None,
            strikes: 0,
            max_strikes,
        }
    }

    /// 不限时的计时器
    pub fn disabled() -> Self {
        Self::new(None, 0)
    }

    /// 开始新的一手
    pub fn start_turn(&mut self, now: Instant) {
        self.deadline = self.limit.map(|limit| now + limit);
        self.strikes = 0;
    }

    /// 停止计时（终局）
    pub fn stop(&mut self) {
        self.deadline = None;
    }

    /// 当前一手剩余时间
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline.map(|deadline| deadline.saturating_duration_since(now))
    }

    /// 检查是否超时
    pub fn check(&mut self, now: Instant) -> TimerEvent {
        let (Some(deadline), Some(limit)) = (self.deadline, self.limit) else {
            return TimerEvent::Running;
        };
        if now < deadline {
            return TimerEvent::Running;
        }

        self.strikes += 1;
        if self.strikes >= self.max_strikes {
            self.stop();
            TimerEvent::Forfeit
        } else {
            self.deadline = Some(now + limit);
            TimerEvent::Expired {
                strikes: self.strikes,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_timer_never_expires() {
        let mut timer = TurnTimer::disabled();
        let now = Instant::now();
        timer.start_turn(now);
        assert_eq!(timer.remaining(now), None);
        assert_eq!(timer.check(now + Duration::from_secs(3600)), TimerEvent::Running);
    }

    #[test]
    fn test_expire_then_forfeit() {
        let mut timer = TurnTimer::new(Some(Duration::from_secs(10)), 3);
        let start = Instant::now();
        timer.start_turn(start);

        assert_eq!(timer.check(start + Duration::from_secs(5)), TimerEvent::Running);
        assert_eq!(
            timer.remaining(start + Duration::from_secs(4)),
            Some(Duration::from_secs(6))
        );

        let t1 = start + Duration::from_secs(10);
        assert_eq!(timer.check(t1), TimerEvent::Expired { strikes: 1 });
        // 超时后重新计时
        assert_eq!(timer.check(t1 + Duration::from_secs(9)), TimerEvent::Running);

        let t2 = t1 + Duration::from_secs(10);
        assert_eq!(timer.check(t2), TimerEvent::Expired { strikes: 2 });

        let t3 = t2 + Duration::from_secs(10);
        assert_eq!(timer.check(t3), TimerEvent::Forfeit);
        // 判负后停止
        assert_eq!(timer.check(t3 + Duration::from_secs(60)), TimerEvent::Running);
    }

    #[test]
    fn test_new_turn_resets_strikes() {
        let mut timer = TurnTimer::new(Some(Duration::from_secs(1)), 2);
        let start = Instant::now();
        timer.start_turn(start);
        assert_eq!(
            timer.check(start + Duration::from_secs(1)),
            TimerEvent::Expired { strikes: 1 }
        );

        let next = start + Duration::from_millis(1500);
        timer.start_turn(next);
        assert_eq!(
            timer.check(next + Duration::from_secs(1)),
            TimerEvent::Expired { strikes: 1 }
        );
    }
}
