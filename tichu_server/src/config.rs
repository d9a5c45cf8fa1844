use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// 服务器配置，全部来自环境变量
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    /// 出牌超时秒数，为 0 时关闭超时代打
    pub turn_timeout_secs: u64,
    pub target_score: i32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            addr: SocketAddr::from(([0, 0, 0, 0], 25917)),
            turn_timeout_secs: 30,
            target_score: 1000,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> ServerConfig {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 用任意的键值查找函数构造，解析失败的值回落到默认值
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ServerConfig {
        let defaults = ServerConfig::default();
        ServerConfig {
            addr: parse_or(&lookup, "TICHU_ADDR", defaults.addr),
            turn_timeout_secs: parse_or(&lookup, "TICHU_TURN_TIMEOUT_SECS", defaults.turn_timeout_secs),
            target_score: parse_or(&lookup, "TICHU_TARGET_SCORE", defaults.target_score),
        }
    }

    pub fn turn_timeout(&self) -> Option<Duration> {
        (self.turn_timeout_secs > 0).then(|| Duration::from_secs(self.turn_timeout_secs))
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("环境变量 {} 的值无效: {:?}，使用默认值", key, raw);
            default
        }),
    }
}
