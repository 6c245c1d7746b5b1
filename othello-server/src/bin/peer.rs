//! 参考引擎对端
//!
//! 通过 TCP 连接桥接服务并用贪心策略（翻子最多，平局按行优先）下棋，
//! 用于联调和演示。线协议不携带角色，执哪一方由 `--color` 指定，
//! 需与挂接顺序一致（先连者执黑）。

use anyhow::{bail, Context, Result};
use clap::Parser;
use othello_protocol::{
    Color, Connection, Connector, ErrorCode, GameState, Message, MessageReader, MessageWriter,
    Move, MoveGenerator, Position, TcpConnector, DEFAULT_TCP_PORT,
};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "othello-peer")]
#[command(about = "Greedy Othello engine speaking the bridge line protocol", long_about = None)]
struct Cli {
    /// 桥接服务 TCP 地址
    #[arg(long, default_value_t = format!("127.0.0.1:{}", DEFAULT_TCP_PORT))]
    addr: String,

    /// 执子颜色（B 或 W）
    #[arg(long, default_value = "B", value_parser = parse_color)]
    color: Color,
}

fn parse_color(s: &str) -> std::result::Result<Color, String> {
    let mut chars = s.chars();
    match (chars.next().and_then(Color::from_wire_char), chars.next()) {
        (Some(color), None) => Ok(color),
        _ => Err(format!("expected B or W, got {:?}", s)),
    }
}

/// 贪心选点：翻子最多者优先，数量相同取行优先的第一个
fn choose_move(game: &GameState, color: Color) -> Option<Position> {
    let mut best: Option<(Position, usize)> = None;
    for position in MoveGenerator::legal_moves(&game.board, color) {
        let flips = MoveGenerator::flips(&game.board, Move::new(position, color))
            .map(|f| f.len())
            .unwrap_or(0);
        if best.map_or(true, |(_, n)| flips > n) {
            best = Some((position, flips));
        }
    }
    best.map(|(position, _)| position)
}

/// 轮到本方时落子，对方被迫 pass 时继续走，返回待发送的消息
fn play_turn(game: &mut GameState, me: Color) -> Result<Vec<Message>> {
    let mut out = Vec::new();
    while game.to_move == Some(me) {
        let Some(position) = choose_move(game, me) else {
            break;
        };
        game.play(Move::new(position, me))?;
        out.push(Message::Move {
            position: Some(position),
            color: me,
        });
    }
    Ok(out)
}

/// 收到 `-4`：本地棋盘仍轮到本方时重新选点，否则说明回合不同步
fn on_timeout(game: &mut GameState, me: Color) -> Result<Vec<Message>> {
    if game.to_move != Some(me) {
        warn!("收到走子超时，但本地棋盘轮到 {:?}", game.to_move);
        return Ok(Vec::new());
    }
    play_turn(game, me)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("othello_peer=debug".parse()?))
        .init();

    let cli = Cli::parse();
    let me = cli.color;

    let conn = TcpConnector
        .connect(&cli.addr)
        .await
        .with_context(|| format!("连接 {} 失败", cli.addr))?;
    let (mut reader, mut writer) = conn.split();
    info!("已连接 {}，执 {:?}", cli.addr, me);

    writer.send(&Message::Init).await?;

    let mut game = GameState::initial();
    let mut started = false;

    loop {
        let msg = match reader.recv().await {
            Ok(msg) => msg,
            Err(e) if e.is_malformed() => {
                warn!("收到无法解析的消息: {}", e);
                continue;
            }
            Err(e) => return Err(e).context("连接中断"),
        };
        debug!("<- {}", msg);

        match msg {
            Message::Init => started = true,
            Message::Ack => {}
            Message::Move {
                position: Some(position),
                color,
            } if color != me => {
                game.play(Move::new(position, color))
                    .with_context(|| format!("对方走法与本地棋盘不一致: {}", msg))?;
            }
            // pass 由本地规则推进，无需处理
            Message::Move { .. } => {}
            Message::End { winner } => {
                info!("对局结束，胜方 {:?}", winner);
                return Ok(());
            }
            Message::Resign { winner } => {
                info!("对局以认输结束，胜方 {:?}", winner);
                return Ok(());
            }
            Message::Error(ErrorCode::Timeout) => {
                // 只有对局进行中才会计时
                started = true;
                for out in on_timeout(&mut game, me)? {
                    info!("-> {}（超时后补发）", out);
                    writer.send(&out).await?;
                }
                continue;
            }
            Message::Error(code) if code.is_fatal() => bail!("会话异常终止: {}", code),
            Message::Error(code) => bail!("桥接服务拒绝了本方消息: {}", code),
        }

        if started {
            for out in play_turn(&mut game, me)? {
                info!("-> {}", out);
                writer.send(&out).await?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use othello_protocol::{Board, Notation};

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("B"), Ok(Color::Dark));
        assert_eq!(parse_color("w"), Ok(Color::Light));
        assert!(parse_color("BW").is_err());
        assert!(parse_color("").is_err());
    }

    #[test]
    fn test_opening_tie_breaks_row_major() {
        // 开局四个合法点都只翻一子
        let game = GameState::initial();
        assert_eq!(choose_move(&game, Color::Dark), Some(Notation::parse("D3").unwrap()));
    }

    #[test]
    fn test_prefers_most_flips() {
        let board = Board::from_rows(&[
            "........",
            ".WB.....",
            "........",
            "........",
            "........",
            "...W....",
            "...W....",
            "...B....",
        ])
        .unwrap();
        let game = GameState::from_board(board, Color::Dark);
        // A2 只翻一子，D5 翻两子
        assert_eq!(choose_move(&game, Color::Dark), Some(Notation::parse("D5").unwrap()));
    }

    fn d3() -> Message {
        Message::Move {
            position: Some(Notation::parse("D3").unwrap()),
            color: Color::Dark,
        }
    }

    #[test]
    fn test_timeout_before_first_move_plays_fresh_move() {
        let mut game = GameState::initial();
        assert_eq!(on_timeout(&mut game, Color::Dark).unwrap(), vec![d3()]);
        assert_eq!(game.to_move, Some(Color::Light));
        assert_eq!(game.move_count, 1);
    }

    #[test]
    fn test_timeout_after_move_sent_does_not_resend() {
        let mut game = GameState::initial();
        assert_eq!(play_turn(&mut game, Color::Dark).unwrap(), vec![d3()]);

        // 走法已发出，本地已轮到白方：不再重复发送旧走法
        let before = game.clone();
        assert!(on_timeout(&mut game, Color::Dark).unwrap().is_empty());
        assert_eq!(game, before);
    }

    #[test]
    fn test_play_turn_continues_through_opponent_pass() {
        // 黑方下 A3 后白方无子可下，黑方接着下 F4，随后终局
        let board = Board::from_rows(&[
            "B.......",
            "W.......",
            "........",
            "......WB",
            "........",
            "........",
            "........",
            "........",
        ])
        .unwrap();
        let mut game = GameState::from_board(board, Color::Dark);
        let moves = play_turn(&mut game, Color::Dark).unwrap();
        assert_eq!(moves.len(), 2);
        assert!(game.is_over());
    }
}
