//! 桥接服务配置
//!
//! 可从 JSON 文件加载，缺省字段使用默认值；命令行参数在 main 中覆盖文件配置。

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use othello_protocol::{DEFAULT_SESSION_ID, DEFAULT_TCP_PORT, DEFAULT_WS_PORT};
use serde::{Deserialize, Serialize};

/// 桥接服务配置
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// 原始 TCP 监听地址
    pub tcp_addr: String,
    /// WebSocket 监听地址
    pub ws_addr: String,
    /// TCP 连接和 WebSocket 根路径使用的会话 ID
    pub default_session: String,
    /// 会话无任何消息多久后被回收（秒）
    pub idle_timeout_secs: u64,
    /// 每步走子时限（秒），None 表示不限时
    pub move_timeout_secs: Option<u64>,
    /// 连续超时多少次判负
    pub max_move_timeouts: u32,
    /// 巡检间隔（毫秒）
    pub sweep_interval_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            tcp_addr: format!("127.0.0.1:{}", DEFAULT_TCP_PORT),
            ws_addr: format!("127.0.0.1:{}", DEFAULT_WS_PORT),
            default_session: DEFAULT_SESSION_ID.to_string(),
            idle_timeout_secs: 600,
            move_timeout_secs: None,
            max_move_timeouts: 3,
            sweep_interval_ms: 1000,
        }
    }
}

impl BridgeConfig {
    /// 从 JSON 文件加载
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {:?}", path))?;
        serde_json::from_str(&content).with_context(|| format!("解析配置文件失败: {:?}", path))
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn move_timeout(&self) -> Option<Duration> {
        self.move_timeout_secs.map(Duration::from_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.tcp_addr, "127.0.0.1:9527");
        assert_eq!(config.ws_addr, "127.0.0.1:9528");
        assert_eq!(config.default_session, "default");
        assert_eq!(config.move_timeout(), None);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "tcp_addr": "0.0.0.0:7000", "move_timeout_secs": 30 }}"#).unwrap();

        let config = BridgeConfig::load(file.path()).unwrap();
        assert_eq!(config.tcp_addr, "0.0.0.0:7000");
        assert_eq!(config.move_timeout(), Some(Duration::from_secs(30)));
        // 未给出的字段取默认值
        assert_eq!(config.ws_addr, BridgeConfig::default().ws_addr);
        assert_eq!(config.max_move_timeouts, 3);
    }

    #[test]
    fn test_load_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(BridgeConfig::load(file.path()).is_err());
        assert!(BridgeConfig::load(Path::new("/nonexistent/othello.json")).is_err());
    }
}
