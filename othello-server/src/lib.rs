//! 黑白棋桥接服务端
//!
//! 包含:
//! - 会话管理（一局一个权威会话）
//! - 走子计时与空闲回收
//! - 胜负统计
//! - TCP / WebSocket 传输桥接

pub mod bridge;
pub mod config;
pub mod manager;
pub mod peer;
pub mod scoreboard;
pub mod session;
pub mod timer;

pub use bridge::{serve_connection, Bridge, BridgeHandle};
pub use config::BridgeConfig;
pub use manager::SessionManager;
pub use peer::{PeerHandle, PeerId, Role};
pub use scoreboard::{Scoreboard, ScoreboardSnapshot};
pub use session::{FinishReason, GameStatus, Session, SessionError, SessionState};
pub use timer::{TimerEvent, TurnTimer};
