//! 胜负统计

use std::sync::atomic::{AtomicU32, Ordering};

use othello_protocol::Outcome;
use serde::Serialize;

/// 胜负计数器（跨会话累计，仅内存）
#[derive(Debug, Default)]
pub struct Scoreboard {
    dark_wins: AtomicU32,
    light_wins: AtomicU32,
    draws: AtomicU32,
    /// 因认输、掉线或超时判负而结束的对局
    forfeits: AtomicU32,
}

/// 统计快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScoreboardSnapshot {
    pub dark_wins: u32,
    pub light_wins: u32,
    pub draws: u32,
    pub forfeits: u32,
}

impl ScoreboardSnapshot {
    /// 已记录的对局总数
    pub fn games(&self) -> u32 {
        self.dark_wins + self.light_wins + self.draws
    }
}

impl Scoreboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一局结果
    pub fn record(&self, outcome: Outcome, forfeit: bool) {
        let counter = match outcome {
            Outcome::Dark => &self.dark_wins,
            Outcome::Light => &self.light_wins,
            Outcome::Draw => &self.draws,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        if forfeit {
            self.forfeits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> ScoreboardSnapshot {
        ScoreboardSnapshot {
            dark_wins: self.dark_wins.load(Ordering::Relaxed),
            light_wins: self.light_wins.load(Ordering::Relaxed),
            draws: self.draws.load(Ordering::Relaxed),
            forfeits: self.forfeits.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record() {
        let board = Scoreboard::new();
        board.record(Outcome::Dark, false);
        board.record(Outcome::Light, true);
        board.record(Outcome::Draw, false);
        board.record(Outcome::Dark, false);

        let snapshot = board.snapshot();
        assert_eq!(snapshot.dark_wins, 2);
        assert_eq!(snapshot.light_wins, 1);
        assert_eq!(snapshot.draws, 1);
        assert_eq!(snapshot.forfeits, 1);
        assert_eq!(snapshot.games(), 4);
    }
}
