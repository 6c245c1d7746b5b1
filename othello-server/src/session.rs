//! 会话
//!
//! 一个会话对应一局棋：权威棋盘、走子方、两名棋手和若干观战者。
//! 状态机：`Waiting -> Active -> Finished`。所有修改都在会话锁内同步完成，
//! 出站消息通过各对端的无界队列投递，临界区内不等待 IO。

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use othello_protocol::{
    Board, Cell, Color, ErrorCode, GameState, Message, Move, MoveGenerator, OthelloError, Outcome,
    Position, SessionId,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::peer::{PeerHandle, PeerId, Role};
use crate::timer::{TimerEvent, TurnTimer};

/// 会话生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// 等待第二名棋手
    Waiting,
    /// 对局进行中
    Active,
    /// 对局结束
    Finished,
}

/// 结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    /// 正常终局（双方无子可下或棋手发送 End）
    Completed,
    /// 认输
    Resigned,
    /// 棋手断线
    Disconnected,
    /// 连续超时判负
    Forfeited,
    /// 致命错误
    Fatal,
    /// 长时间无活动被回收
    Idle,
}

impl FinishReason {
    /// 是否属于一方判负（而非下完）
    pub fn is_forfeit(&self) -> bool {
        matches!(
            self,
            FinishReason::Resigned | FinishReason::Disconnected | FinishReason::Forfeited
        )
    }
}

/// 会话错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// 会话不存在
    #[error("Session not found: {0}")]
    NotFound(SessionId),

    /// 非法走法
    #[error(transparent)]
    IllegalMove(#[from] OthelloError),

    /// 不是该颜色的回合
    #[error("Not {0:?}'s turn")]
    NotYourTurn(Color),

    /// 会话不在可走子状态
    #[error("Session is {0:?}")]
    NotActive(SessionState),

    /// 发送方不是棋手
    #[error("Sender is not a player")]
    NotAPlayer,

    /// 仍有合法走法时不能 pass
    #[error("{0:?} has a legal move and cannot pass")]
    PassNotAllowed(Color),

    /// 会话内部状态不一致
    #[error("Fatal session error: {0}")]
    Fatal(String),
}

impl SessionError {
    /// 对应的线协议错误码
    pub fn code(&self) -> ErrorCode {
        match self {
            SessionError::NotFound(_) => ErrorCode::Malformed,
            SessionError::IllegalMove(_)
            | SessionError::NotYourTurn(_)
            | SessionError::NotActive(_)
            | SessionError::NotAPlayer
            | SessionError::PassNotAllowed(_) => ErrorCode::IllegalMove,
            SessionError::Fatal(_) => ErrorCode::Internal,
        }
    }
}

/// 会话状态快照（供界面层查询）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameStatus {
    pub session_id: SessionId,
    pub state: SessionState,
    pub to_move: Option<Color>,
    pub dark: u8,
    pub light: u8,
    pub move_count: u32,
    pub last_move: Option<String>,
    pub winner: Option<Outcome>,
    pub reason: Option<FinishReason>,
    pub spectators: usize,
    pub created_at: DateTime<Utc>,
}

/// 巡检结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepResult {
    /// 继续保留
    Keep,
    /// 应从会话表移除
    Remove,
}

/// 会话
pub struct Session {
    pub id: SessionId,
    state: SessionState,
    game: GameState,
    dark: Option<PeerHandle>,
    light: Option<PeerHandle>,
    spectators: Vec<PeerHandle>,
    outcome: Option<Outcome>,
    reason: Option<FinishReason>,
    /// 已代为宣布的 pass（避免重复转发棋手自己发来的 NONE）
    announced_pass: Option<Color>,
    /// 第二名棋手挂接后待发送开局通知
    start_pending: bool,
    /// 待计入胜负统计的结果
    unrecorded: Option<(Outcome, FinishReason)>,
    /// 已从会话表移除
    closed: bool,
    timer: TurnTimer,
    last_activity: Instant,
    created_at: DateTime<Utc>,
}

impl Session {
    /// 创建新会话（标准开局）
    pub fn new(id: SessionId, timer: TurnTimer, now: Instant) -> Self {
        Self::from_state(id, GameState::initial(), timer, now)
    }

    /// 从指定对局状态创建会话
    pub fn from_state(id: SessionId, game: GameState, timer: TurnTimer, now: Instant) -> Self {
        Self {
            id,
            state: SessionState::Waiting,
            game,
            dark: None,
            light: None,
            spectators: Vec::new(),
            outcome: None,
            reason: None,
            announced_pass: None,
            start_pending: false,
            unrecorded: None,
            closed: false,
            timer,
            last_activity: now,
            created_at: Utc::now(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn board(&self) -> &Board {
        &self.game.board
    }

    pub fn to_move(&self) -> Option<Color> {
        self.game.to_move
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn mark_closed(&mut self) {
        self.closed = true;
    }

    /// 是否已没有任何对端
    pub fn is_empty(&self) -> bool {
        self.dark.is_none() && self.light.is_none() && self.spectators.is_empty()
    }

    /// 取出尚未计入统计的结果
    pub fn take_result(&mut self) -> Option<(Outcome, FinishReason)> {
        self.unrecorded.take()
    }

    /// 对端在会话中的角色
    pub fn role_of(&self, peer: PeerId) -> Option<Role> {
        if self.dark.as_ref().is_some_and(|p| p.id == peer) {
            Some(Role::Player(Color::Dark))
        } else if self.light.as_ref().is_some_and(|p| p.id == peer) {
            Some(Role::Player(Color::Light))
        } else if self.spectators.iter().any(|p| p.id == peer) {
            Some(Role::Spectator)
        } else {
            None
        }
    }

    pub fn has_peer(&self, peer: PeerId) -> bool {
        self.role_of(peer).is_some()
    }

    /// 指定颜色当前的合法走法（仅在轮到该颜色时非空）
    pub fn valid_moves(&self, color: Color) -> Vec<Position> {
        if self.state == SessionState::Active && self.game.to_move == Some(color) {
            MoveGenerator::legal_moves(&self.game.board, color)
        } else {
            Vec::new()
        }
    }

    /// 状态快照
    pub fn status(&self) -> GameStatus {
        GameStatus {
            session_id: self.id.clone(),
            state: self.state,
            to_move: match self.state {
                SessionState::Finished => None,
                _ => self.game.to_move,
            },
            dark: self.game.board.count(Cell::Dark),
            light: self.game.board.count(Cell::Light),
            move_count: self.game.move_count,
            last_move: self.game.last_move.map(|mv| mv.position.to_string()),
            winner: self.outcome,
            reason: self.reason,
            spectators: self.spectators.len(),
            created_at: self.created_at,
        }
    }

    // ========================================================================
    // 挂接与断开
    // ========================================================================

    /// 挂接对端：先到者执黑，后到者执白，其余观战
    pub fn attach(&mut self, peer: PeerHandle, now: Instant) -> Role {
        self.last_activity = now;

        let role = if self.state == SessionState::Waiting && self.dark.is_none() {
            self.dark = Some(peer);
            Role::Player(Color::Dark)
        } else if self.state == SessionState::Waiting && self.light.is_none() {
            self.light = Some(peer);
            self.state = SessionState::Active;
            self.start_pending = true;
            self.timer.start_turn(now);
            info!("会话 {} 开始对局", self.id);
            Role::Player(Color::Light)
        } else {
            self.spectators.push(peer);
            Role::Spectator
        };

        info!("会话 {}: 对端挂接为 {}", self.id, role);
        role
    }

    /// 发送开局通知（在挂接第二名棋手的那条消息处理完之后调用）
    pub fn flush_start(&mut self) {
        if std::mem::take(&mut self.start_pending) {
            self.send_players(Message::Init);
        }
    }

    /// 断开对端；对局中棋手离开视为认输
    pub fn detach(&mut self, peer: PeerId) {
        let Some(role) = self.role_of(peer) else {
            return;
        };

        match role {
            Role::Player(Color::Dark) => self.dark = None,
            Role::Player(Color::Light) => self.light = None,
            Role::Spectator => self.spectators.retain(|p| p.id != peer),
        }
        info!("会话 {}: {} 离开", self.id, role);

        if let (Role::Player(color), SessionState::Active) = (role, self.state) {
            self.concede(color, FinishReason::Disconnected, None);
        }
    }

    // ========================================================================
    // 消息处理
    // ========================================================================

    /// 处理来自对端的一条消息
    pub fn handle(&mut self, from: PeerId, msg: Message, now: Instant) {
        self.last_activity = now;
        debug!("会话 {}: 收到 {} 来自对端 {}", self.id, msg, from);

        match msg {
            Message::Init => self.reply(from, Message::Ack),
            Message::Move { position, color } => self.handle_move(from, position, color, now),
            Message::End { .. } => self.handle_end(from),
            Message::Resign { .. } => self.handle_resign(from),
            Message::Ack => {}
            Message::Error(code) if code.is_fatal() => self.handle_fatal(from, code),
            Message::Error(code) => {
                warn!("会话 {}: 对端 {} 报告错误 {}", self.id, from, code);
            }
        }
    }

    fn handle_move(&mut self, from: PeerId, position: Option<Position>, color: Color, now: Instant) {
        let result = match self.role_of(from) {
            Some(Role::Player(own)) if own == color => match position {
                Some(position) => self.play(Move::new(position, color), Some(from), now).map(|_| ()),
                None => self.pass(from, color),
            },
            Some(Role::Player(own)) => Err(SessionError::NotYourTurn(own.opponent())),
            _ => Err(SessionError::NotAPlayer),
        };

        if let Err(e) = result {
            debug!("会话 {}: 拒绝对端 {} 的走法: {}", self.id, from, e);
            self.reply(from, Message::Error(e.code()));
        }
    }

    /// 执行走法并通知各方
    ///
    /// `origin` 为发起走法的对端：它收到 `-1`，其余对端收到走法回显。
    /// 界面层直接提交时 `origin` 为 None，所有对端都收到回显。
    pub fn play(
        &mut self,
        mv: Move,
        origin: Option<PeerId>,
        now: Instant,
    ) -> Result<Board, SessionError> {
        if self.state != SessionState::Active {
            return Err(SessionError::NotActive(self.state));
        }
        let Some(to_move) = self.game.to_move else {
            return Err(self.fail("active session has no color to move"));
        };
        if mv.color != to_move {
            return Err(SessionError::NotYourTurn(mv.color));
        }

        let outcome = self.game.play(mv)?;
        self.announced_pass = None;
        info!("会话 {}: {} 翻转 {} 子", self.id, mv, outcome.flipped.len());

        if let Some(origin) = origin {
            self.reply(origin, Message::Ack);
        }
        self.broadcast(
            Message::Move {
                position: Some(mv.position),
                color: mv.color,
            },
            origin,
        );

        match outcome.next {
            None => {
                let result = MoveGenerator::winner(&self.game.board);
                self.finish(FinishReason::Completed, Some(result));
                self.broadcast(Message::End { winner: result.winner() }, None);
            }
            Some(next) => {
                if let Some(passed) = outcome.passed {
                    // 对方无子可下，代其宣布 pass，走子方继续
                    self.announced_pass = Some(passed);
                    let skipped = self.player(passed).map(|p| p.id);
                    self.broadcast(
                        Message::Move {
                            position: None,
                            color: passed,
                        },
                        skipped,
                    );
                    debug!("会话 {}: {:?} 无子可下，{:?} 继续", self.id, passed, next);
                }
                self.timer.start_turn(now);
            }
        }

        Ok(self.game.board)
    }

    /// 棋手显式 pass（`1|NONE|color`）
    fn pass(&mut self, from: PeerId, color: Color) -> Result<(), SessionError> {
        if self.state != SessionState::Active {
            return Err(SessionError::NotActive(self.state));
        }
        // 只确认会话刚代为宣布过的 pass，已宣布过就不再转发
        if self.announced_pass == Some(color) {
            self.announced_pass = None;
            self.reply(from, Message::Ack);
            return Ok(());
        }
        if self.game.to_move != Some(color) {
            return Err(SessionError::NotYourTurn(color));
        }
        // 走子方总有合法走法，无子可下时回合已由规则顺延
        Err(SessionError::PassNotAllowed(color))
    }

    fn handle_end(&mut self, from: PeerId) {
        match (self.role_of(from), self.state) {
            (Some(Role::Player(_)), SessionState::Active) => {
                // 不采信客户端给出的胜方
                let result = MoveGenerator::winner(&self.game.board);
                if !MoveGenerator::is_terminal(&self.game.board) {
                    warn!("会话 {}: 对端 {} 在非终局局面发送 End", self.id, from);
                }
                self.finish(FinishReason::Completed, Some(result));
                self.broadcast(Message::End { winner: result.winner() }, None);
            }
            (Some(_), SessionState::Finished) => self.reply(from, Message::Ack),
            _ => self.reply(from, Message::Error(ErrorCode::IllegalMove)),
        }
    }

    fn handle_resign(&mut self, from: PeerId) {
        match (self.role_of(from), self.state) {
            (Some(Role::Player(color)), SessionState::Active) => {
                self.reply(from, Message::Ack);
                self.concede(color, FinishReason::Resigned, Some(from));
            }
            (Some(_), SessionState::Finished) => self.reply(from, Message::Ack),
            _ => self.reply(from, Message::Error(ErrorCode::IllegalMove)),
        }
    }

    fn handle_fatal(&mut self, from: PeerId, code: ErrorCode) {
        if !matches!(self.role_of(from), Some(Role::Player(_))) {
            warn!("会话 {}: 忽略观战者 {} 发来的 {}", self.id, from, code);
            return;
        }
        if self.state == SessionState::Finished {
            return;
        }

        error!("会话 {}: 对端 {} 报告致命错误 {}", self.id, from, code);
        self.broadcast(Message::Error(code), Some(from));
        self.finish(FinishReason::Fatal, None);
    }

    // ========================================================================
    // 巡检
    // ========================================================================

    /// 空闲回收与走子计时
    pub fn sweep(&mut self, now: Instant, idle_timeout: Duration) -> SweepResult {
        if self.is_empty() {
            return SweepResult::Remove;
        }

        if now.saturating_duration_since(self.last_activity) >= idle_timeout {
            info!("会话 {} 空闲超时，回收", self.id);
            self.teardown();
            return SweepResult::Remove;
        }

        if self.state == SessionState::Active {
            match self.timer.check(now) {
                TimerEvent::Running => {}
                TimerEvent::Expired { strikes } => {
                    if let Some(color) = self.game.to_move {
                        warn!("会话 {}: {:?} 走子超时（第 {} 次）", self.id, color, strikes);
                        if let Some(peer) = self.player(color) {
                            peer.send(Message::Error(ErrorCode::Timeout));
                        }
                    }
                }
                TimerEvent::Forfeit => {
                    if let Some(color) = self.game.to_move {
                        warn!("会话 {}: {:?} 连续超时判负", self.id, color);
                        self.concede(color, FinishReason::Forfeited, None);
                    }
                }
            }
        }

        SweepResult::Keep
    }

    /// 强制拆除：未结束的对局向所有对端发送 `-7`
    pub fn teardown(&mut self) {
        if self.state != SessionState::Finished {
            self.broadcast(Message::Error(ErrorCode::Fatal), None);
            self.finish(FinishReason::Idle, None);
        }
    }

    // ========================================================================
    // 内部工具
    // ========================================================================

    fn player(&self, color: Color) -> Option<&PeerHandle> {
        match color {
            Color::Dark => self.dark.as_ref(),
            Color::Light => self.light.as_ref(),
        }
    }

    fn peers(&self) -> impl Iterator<Item = &PeerHandle> {
        self.dark
            .iter()
            .chain(self.light.iter())
            .chain(self.spectators.iter())
    }

    fn reply(&self, to: PeerId, msg: Message) {
        if let Some(peer) = self.peers().find(|p| p.id == to) {
            peer.send(msg);
        }
    }

    fn send_players(&self, msg: Message) {
        for peer in self.dark.iter().chain(self.light.iter()) {
            peer.send(msg);
        }
    }

    /// 发送给所有对端，`except` 除外
    fn broadcast(&self, msg: Message, except: Option<PeerId>) {
        for peer in self.peers().filter(|p| Some(p.id) != except) {
            peer.send(msg);
        }
    }

    /// 一方认输、掉线或超时判负
    ///
    /// 除 `notified` 外的对端先收到 `3|<胜方>`，随后所有剩余对端收到唯一一条 `End`。
    fn concede(&mut self, loser: Color, reason: FinishReason, notified: Option<PeerId>) {
        let winner = loser.opponent();
        self.broadcast(Message::Resign { winner }, notified);
        self.finish(reason, Some(Outcome::from_winner(Some(winner))));
        self.broadcast(Message::End { winner: Some(winner) }, None);
    }

    fn finish(&mut self, reason: FinishReason, outcome: Option<Outcome>) {
        self.state = SessionState::Finished;
        self.reason = Some(reason);
        self.outcome = outcome;
        self.announced_pass = None;
        self.timer.stop();
        if let Some(outcome) = outcome {
            self.unrecorded = Some((outcome, reason));
        }
        info!("会话 {} 结束: {:?}, 结果 {:?}", self.id, reason, outcome);
    }

    /// 内部不一致：通知所有对端并结束会话
    fn fail(&mut self, reason: &str) -> SessionError {
        error!("会话 {}: {}", self.id, reason);
        self.broadcast(Message::Error(ErrorCode::Internal), None);
        self.finish(FinishReason::Fatal, None);
        SessionError::Fatal(reason.to_string())
    }
}
