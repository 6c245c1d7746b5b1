//! 会话管理器
//!
//! 持有全局会话表，负责把解码后的消息投递到对应会话，
//! 并向界面层提供查询和落子接口。
//!
//! 锁顺序固定为：会话表 -> 会话。只转发消息时不持有会话表锁。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use othello_protocol::{
    Board, Color, Message, Move, Notation, SessionId, TransportType,
};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use crate::config::BridgeConfig;
use crate::peer::{PeerHandle, PeerId};
use crate::scoreboard::{Scoreboard, ScoreboardSnapshot};
use crate::session::{GameStatus, Session, SessionError, SweepResult};
use crate::timer::TurnTimer;

type SessionRef = Arc<Mutex<Session>>;

/// 会话管理器
pub struct SessionManager {
    config: BridgeConfig,
    sessions: Mutex<HashMap<SessionId, SessionRef>>,
    next_peer_id: AtomicU64,
    scoreboard: Scoreboard,
}

impl SessionManager {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            sessions: Mutex::new(HashMap::new()),
            next_peer_id: AtomicU64::new(1),
            scoreboard: Scoreboard::new(),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// 为新连接分配对端句柄
    pub fn register_peer(
        &self,
        transport: TransportType,
        addr: Option<String>,
    ) -> (PeerHandle, mpsc::UnboundedReceiver<Message>) {
        let id = self.next_peer_id.fetch_add(1, Ordering::Relaxed);
        PeerHandle::new(id, transport, addr)
    }

    fn new_timer(&self) -> TurnTimer {
        TurnTimer::new(self.config.move_timeout(), self.config.max_move_timeouts)
    }

    async fn lookup(&self, session_id: &str) -> Option<SessionRef> {
        self.sessions.lock().await.get(session_id).cloned()
    }

    // ========================================================================
    // 连接侧接口
    // ========================================================================

    /// 投递一条已成功解码的消息
    ///
    /// 对端尚未挂接时，先挂接（必要时创建会话）再处理。
    pub async fn deliver(&self, session_id: &str, peer: &PeerHandle, msg: Message) {
        let now = Instant::now();

        // 已挂接：只锁会话
        if let Some(session) = self.lookup(session_id).await {
            let mut session = session.lock().await;
            if !session.is_closed() && session.has_peer(peer.id) {
                session.handle(peer.id, msg, now);
                self.record(&mut session);
                return;
            }
        }

        // 未挂接：持有会话表锁完成挂接，避免与移除竞争
        let mut sessions = self.sessions.lock().await;
        let reusable = match sessions.get(session_id).cloned() {
            Some(session) => {
                let closed = session.lock().await.is_closed();
                (!closed).then_some(session)
            }
            None => None,
        };
        let session = match reusable {
            Some(session) => session,
            None => {
                // 巡检已判定回收但尚未移出表的会话不再复用
                info!("创建会话 {}", session_id);
                let session = Arc::new(Mutex::new(Session::new(
                    session_id.to_string(),
                    self.new_timer(),
                    now,
                )));
                sessions.insert(session_id.to_string(), session.clone());
                session
            }
        };
        let mut session = session.lock().await;
        if !session.has_peer(peer.id) {
            session.attach(peer.clone(), now);
        }
        session.handle(peer.id, msg, now);
        session.flush_start();
        self.record(&mut session);
    }

    /// 连接关闭
    pub async fn leave(&self, session_id: &str, peer_id: PeerId) {
        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.get(session_id).cloned() else {
            return;
        };
        let mut session = session.lock().await;
        session.detach(peer_id);
        self.record(&mut session);

        if session.is_empty() {
            session.mark_closed();
            sessions.remove(session_id);
            info!("会话 {} 已无对端，移除", session_id);
        }
    }

    /// 巡检所有会话（空闲回收与走子计时）
    ///
    /// 逐个检查会话时不持有会话表锁，只在移除时短暂加锁。
    pub async fn sweep(&self, now: Instant) {
        let snapshot: Vec<(SessionId, SessionRef)> = self
            .sessions
            .lock()
            .await
            .iter()
            .map(|(id, session)| (id.clone(), session.clone()))
            .collect();

        let mut removed = Vec::new();
        for (id, session) in snapshot {
            let mut guard = session.lock().await;
            if guard.is_closed() {
                continue;
            }
            let result = guard.sweep(now, self.config.idle_timeout());
            self.record(&mut guard);
            if result == SweepResult::Remove {
                guard.mark_closed();
                drop(guard);
                removed.push((id, session));
            }
        }

        if removed.is_empty() {
            return;
        }
        let mut sessions = self.sessions.lock().await;
        for (id, session) in removed {
            // 期间同名会话可能已被替换
            if sessions.get(&id).is_some_and(|current| Arc::ptr_eq(current, &session)) {
                sessions.remove(&id);
                info!("回收会话 {}", id);
            }
        }
    }

    /// 强制拆除会话，未结束的对局向所有对端发送 `-7`
    pub async fn teardown(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.remove(session_id) else {
            return false;
        };
        let mut session = session.lock().await;
        session.teardown();
        session.mark_closed();
        self.record(&mut session);
        info!("拆除会话 {}", session_id);
        true
    }

    fn record(&self, session: &mut Session) {
        if let Some((outcome, reason)) = session.take_result() {
            debug!("会话 {} 计入统计: {:?} ({:?})", session.id, outcome, reason);
            self.scoreboard.record(outcome, reason.is_forfeit());
        }
    }

    // ========================================================================
    // 界面侧接口
    // ========================================================================

    /// 当前棋盘
    pub async fn board(&self, session_id: &str) -> Option<Board> {
        let session = self.lookup(session_id).await?;
        let board = *session.lock().await.board();
        Some(board)
    }

    /// 指定颜色的合法走法（记法字符串），不是该颜色的回合时为空
    pub async fn valid_moves(&self, session_id: &str, color: Color) -> Option<Vec<String>> {
        let session = self.lookup(session_id).await?;
        let moves = session.lock().await.valid_moves(color);
        Some(moves.into_iter().map(Notation::format).collect())
    }

    /// 界面层落子，校验与线协议走法相同，成功后回显给所有对端
    pub async fn submit_move(
        &self,
        session_id: &str,
        notation: &str,
        color: Color,
    ) -> Result<Board, SessionError> {
        let position = Notation::parse(notation)?;
        let session = self
            .lookup(session_id)
            .await
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;

        let mut session = session.lock().await;
        let result = session.play(Move::new(position, color), None, Instant::now());
        self.record(&mut session);
        result
    }

    /// 会话状态快照
    pub async fn status(&self, session_id: &str) -> Option<GameStatus> {
        let session = self.lookup(session_id).await?;
        let status = session.lock().await.status();
        Some(status)
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub fn scoreboard(&self) -> ScoreboardSnapshot {
        self.scoreboard.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use othello_protocol::{ErrorCode, OthelloError, Position};

    fn drain(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<Message> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn d3() -> Message {
        Message::Move {
            position: Some(Position::new_unchecked(2, 3)),
            color: Color::Dark,
        }
    }

    #[tokio::test]
    async fn test_deliver_creates_and_activates_session() {
        let manager = SessionManager::new(BridgeConfig::default());
        let (a, mut rx_a) = manager.register_peer(TransportType::Tcp, None);
        let (b, mut rx_b) = manager.register_peer(TransportType::WebSocket, None);
        assert_ne!(a.id, b.id);

        manager.deliver("g1", &a, Message::Init).await;
        assert_eq!(manager.session_count().await, 1);
        assert_eq!(
            manager.status("g1").await.unwrap().state,
            SessionState::Waiting
        );

        manager.deliver("g1", &b, Message::Init).await;
        assert_eq!(drain(&mut rx_a), vec![Message::Ack, Message::Init]);
        assert_eq!(drain(&mut rx_b), vec![Message::Ack, Message::Init]);

        manager.deliver("g1", &a, d3()).await;
        assert_eq!(drain(&mut rx_a), vec![Message::Ack]);
        assert_eq!(drain(&mut rx_b), vec![d3()]);

        let board = manager.board("g1").await.unwrap();
        assert_eq!(board.count(othello_protocol::Cell::Dark), 4);
        assert_eq!(board.count(othello_protocol::Cell::Light), 1);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let manager = SessionManager::new(BridgeConfig::default());
        let (a, mut rx_a) = manager.register_peer(TransportType::Tcp, None);
        let (b, mut rx_b) = manager.register_peer(TransportType::Tcp, None);

        manager.deliver("one", &a, Message::Init).await;
        manager.deliver("two", &b, Message::Init).await;

        assert_eq!(manager.session_count().await, 2);
        assert_eq!(drain(&mut rx_a), vec![Message::Ack]);
        assert_eq!(drain(&mut rx_b), vec![Message::Ack]);
        assert_eq!(
            manager.status("two").await.unwrap().state,
            SessionState::Waiting
        );
    }

    #[tokio::test]
    async fn test_leave_removes_empty_session() {
        let manager = SessionManager::new(BridgeConfig::default());
        let (a, _rx_a) = manager.register_peer(TransportType::Tcp, None);

        manager.deliver("g", &a, Message::Init).await;
        manager.leave("g", a.id).await;
        assert_eq!(manager.session_count().await, 0);
        assert!(manager.board("g").await.is_none());

        // 不存在的会话
        manager.leave("missing", 42).await;
    }

    #[tokio::test]
    async fn test_disconnect_records_forfeit() {
        let manager = SessionManager::new(BridgeConfig::default());
        let (a, _rx_a) = manager.register_peer(TransportType::Tcp, None);
        let (b, mut rx_b) = manager.register_peer(TransportType::Tcp, None);
        manager.deliver("g", &a, Message::Init).await;
        manager.deliver("g", &b, Message::Init).await;
        drain(&mut rx_b);

        manager.leave("g", a.id).await;
        assert_eq!(
            drain(&mut rx_b),
            vec![
                Message::Resign {
                    winner: Color::Light
                },
                Message::End {
                    winner: Some(Color::Light)
                }
            ]
        );
        assert_eq!(manager.session_count().await, 1);

        let score = manager.scoreboard();
        assert_eq!(score.light_wins, 1);
        assert_eq!(score.forfeits, 1);

        manager.leave("g", b.id).await;
        assert_eq!(manager.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_submit_move_from_ui() {
        let manager = SessionManager::new(BridgeConfig::default());
        let (a, mut rx_a) = manager.register_peer(TransportType::Tcp, None);
        let (b, mut rx_b) = manager.register_peer(TransportType::Tcp, None);
        manager.deliver("g", &a, Message::Init).await;
        manager.deliver("g", &b, Message::Init).await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        assert_eq!(
            manager.valid_moves("g", Color::Dark).await.unwrap(),
            vec!["D3", "C4", "F5", "E6"]
        );
        assert!(manager.valid_moves("g", Color::Light).await.unwrap().is_empty());

        let err = manager.submit_move("g", "A1", Color::Dark).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::IllegalMove(OthelloError::IllegalMove { .. })
        ));
        assert_eq!(err.code(), ErrorCode::IllegalMove);

        let err = manager.submit_move("g", "Z9", Color::Dark).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::IllegalMove(OthelloError::InvalidNotation(_))
        ));

        assert_eq!(
            manager.submit_move("g", "d3", Color::Light).await,
            Err(SessionError::NotYourTurn(Color::Light))
        );

        let board = manager.submit_move("g", "d3", Color::Dark).await.unwrap();
        assert_eq!(board.count(othello_protocol::Cell::Dark), 4);
        // 界面落子回显给双方
        assert_eq!(drain(&mut rx_a), vec![d3()]);
        assert_eq!(drain(&mut rx_b), vec![d3()]);

        assert_eq!(
            manager.submit_move("missing", "d3", Color::Dark).await,
            Err(SessionError::NotFound("missing".to_string()))
        );
    }

    #[tokio::test]
    async fn test_sweep_idle_session() {
        let config = BridgeConfig {
            idle_timeout_secs: 1,
            ..BridgeConfig::default()
        };
        let manager = SessionManager::new(config);
        let (a, mut rx_a) = manager.register_peer(TransportType::Tcp, None);
        manager.deliver("g", &a, Message::Init).await;
        drain(&mut rx_a);

        manager.sweep(Instant::now()).await;
        assert_eq!(manager.session_count().await, 1);

        manager
            .sweep(Instant::now() + std::time::Duration::from_secs(5))
            .await;
        assert_eq!(manager.session_count().await, 0);
        assert_eq!(drain(&mut rx_a), vec![Message::Error(ErrorCode::Fatal)]);
    }

    #[tokio::test]
    async fn test_closed_session_not_reused_before_removal() {
        let manager = SessionManager::new(BridgeConfig::default());
        let (a, mut rx_a) = manager.register_peer(TransportType::Tcp, None);
        manager.deliver("g", &a, Message::Init).await;
        drain(&mut rx_a);

        // 巡检已判定回收、尚未移出表
        let stale = manager.sessions.lock().await.get("g").cloned().unwrap();
        stale.lock().await.mark_closed();

        let (c, mut rx_c) = manager.register_peer(TransportType::Tcp, None);
        manager.deliver("g", &c, Message::Init).await;
        assert_eq!(drain(&mut rx_c), vec![Message::Ack]);

        let current = manager.sessions.lock().await.get("g").cloned().unwrap();
        assert!(!Arc::ptr_eq(&stale, &current));
        assert!(current.lock().await.has_peer(c.id));
        assert!(!stale.lock().await.has_peer(c.id));

        // 旧会话的移除不影响新会话
        manager.sweep(Instant::now()).await;
        assert_eq!(manager.session_count().await, 1);
        assert!(drain(&mut rx_a).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_moves_applied_once() {
        let manager = Arc::new(SessionManager::new(BridgeConfig::default()));
        let (a, mut rx_a) = manager.register_peer(TransportType::Tcp, None);
        let (b, mut rx_b) = manager.register_peer(TransportType::Tcp, None);
        manager.deliver("g", &a, Message::Init).await;
        manager.deliver("g", &b, Message::Init).await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        // 黑方同时提交四个开局合法点，只有最先处理的一个生效
        let tasks: Vec<_> = ["D3", "C4", "F5", "E6"]
            .into_iter()
            .map(|notation| {
                let manager = manager.clone();
                let peer = a.clone();
                tokio::spawn(async move {
                    let msg = Message::Move {
                        position: Some(Notation::parse(notation).unwrap()),
                        color: Color::Dark,
                    };
                    manager.deliver("g", &peer, msg).await;
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let replies = drain(&mut rx_a);
        assert_eq!(replies.len(), 4);
        assert_eq!(replies.iter().filter(|m| **m == Message::Ack).count(), 1);
        assert_eq!(
            replies
                .iter()
                .filter(|m| **m == Message::Error(ErrorCode::IllegalMove))
                .count(),
            3
        );

        let echoes = drain(&mut rx_b);
        assert_eq!(echoes.len(), 1);
        assert!(matches!(
            echoes[0],
            Message::Move {
                color: Color::Dark,
                ..
            }
        ));

        let status = manager.status("g").await.unwrap();
        assert_eq!(status.move_count, 1);
        assert_eq!(status.to_move, Some(Color::Light));
        assert_eq!((status.dark, status.light), (4, 1));
    }

    #[tokio::test]
    async fn test_teardown() {
        let manager = SessionManager::new(BridgeConfig::default());
        let (a, mut rx_a) = manager.register_peer(TransportType::Tcp, None);
        manager.deliver("g", &a, Message::Init).await;
        drain(&mut rx_a);

        assert!(manager.teardown("g").await);
        assert!(!manager.teardown("g").await);
        assert_eq!(drain(&mut rx_a), vec![Message::Error(ErrorCode::Fatal)]);

        // 被拆除后再发消息会建立新会话
        manager.deliver("g", &a, Message::Init).await;
        assert_eq!(
            manager.status("g").await.unwrap().state,
            SessionState::Waiting
        );
    }
}
