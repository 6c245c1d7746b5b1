use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use othello_server::{Bridge, BridgeConfig, SessionManager};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// 黑白棋 TCP / WebSocket 桥接服务
#[derive(Parser, Debug)]
#[command(name = "othello-server")]
#[command(about = "Othello line-protocol bridge between TCP and WebSocket peers", long_about = None)]
#[command(version)]
struct Cli {
    /// JSON 配置文件
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// TCP 监听地址
    #[arg(long)]
    tcp: Option<String>,

    /// WebSocket 监听地址
    #[arg(long)]
    ws: Option<String>,

    /// 每步走子时限（秒）
    #[arg(long)]
    move_timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("othello_server=debug".parse()?))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => BridgeConfig::load(path)?,
        None => BridgeConfig::default(),
    };
    if let Some(addr) = cli.tcp {
        config.tcp_addr = addr;
    }
    if let Some(addr) = cli.ws {
        config.ws_addr = addr;
    }
    if cli.move_timeout.is_some() {
        config.move_timeout_secs = cli.move_timeout;
    }

    info!("黑白棋桥接服务启动中...");

    let manager = Arc::new(SessionManager::new(config.clone()));
    let bridge = Bridge::bind(&config, manager.clone()).await?;
    let handle = bridge.serve();

    tokio::signal::ctrl_c().await?;
    info!("收到退出信号，关闭服务");
    handle.shutdown();

    let score = manager.scoreboard();
    info!(
        "共 {} 局：黑胜 {}，白胜 {}，平局 {}",
        score.games(),
        score.dark_wins,
        score.light_wins,
        score.draws
    );

    Ok(())
}
