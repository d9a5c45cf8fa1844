use serde::{Deserialize, Serialize};

/// 一场比赛的配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// 任一队累计分数达到该值 (且两队不平) 时比赛结束
    pub target_score: i32,
    /// 发牌的基础种子；为 `None` 时开局随机抽取一次
    pub seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        GameConfig { target_score: 1000, seed: None }
    }
}

impl GameConfig {
    pub fn with_seed(seed: u64) -> Self {
        GameConfig { seed: Some(seed), ..GameConfig::default() }
    }
}
