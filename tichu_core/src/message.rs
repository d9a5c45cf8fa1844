use crate::card::{Card, Rank};
use crate::combo::Combo;
use crate::scoring::TeamScores;
use crate::state::{PlayerId, Relative, RoomId, Seat, Team};
use crate::view::SeatView;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type PlayerSecret = Uuid;

// --- 玩家动作 ---
// 每次调用只处理一个动作，引擎同步地校验并应用它。

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// 只在大 Tichu 阶段有效
    DeclareLargeTichu,
    PassLargeTichu,
    /// 持有全部 14 张牌且未叫过 Tichu 时有效
    DeclareSmallTichu,
    /// 三张不同的手牌，分别给左手对手、搭档、右手对手
    ExchangeCards { left: Card, partner: Card, right: Card },
    /// `call_rank` 只在包含雀时有意义；`"none"` 表示不叫
    PlayCards {
        cards: Vec<Card>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        call_rank: Option<String>,
    },
    Pass,
    DragonGive { target: Relative },
    /// 点数标签 (`"2"`..`"A"`) 或 `"none"`
    CallRank { rank: String },
    NextRound,
}

impl Action {
    pub fn play(cards: Vec<Card>) -> Action {
        Action::PlayCards { cards, call_rank: None }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::DeclareLargeTichu => "declare_large_tichu",
            Action::PassLargeTichu => "pass_large_tichu",
            Action::DeclareSmallTichu => "declare_small_tichu",
            Action::ExchangeCards { .. } => "exchange_cards",
            Action::PlayCards { .. } => "play_cards",
            Action::Pass => "pass",
            Action::DragonGive { .. } => "dragon_give",
            Action::CallRank { .. } => "call_rank",
            Action::NextRound => "next_round",
        }
    }
}

// --- 引擎产生的事件 ---
// 每个成功的动作返回一串事件，由传输层广播给房间里的所有人。

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    RoundStarted { round_no: u32 },
    LargeTichuDeclared { seat: Seat },
    LargeTichuPassed { seat: Seat },
    RemainingCardsDealt,
    SmallTichuDeclared { seat: Seat },
    ExchangeCommitted { seat: Seat },
    /// 换牌完成，持雀者首出
    ExchangeCompleted { lead: Seat },
    CardsPlayed { seat: Seat, cards: Vec<Card>, combo: Combo },
    BombPlayed { seat: Seat, cards: Vec<Card>, combo: Combo },
    DogPlayed { seat: Seat, lead: Seat },
    Passed { seat: Seat },
    TrickWon { seat: Seat, points: i32 },
    DragonGiveRequired { seat: Seat },
    DragonGiven { from: Seat, to: Seat, points: i32 },
    RankCallRequired { seat: Seat },
    CallRankSet { seat: Seat, rank: Option<Rank> },
    CallFulfilled { seat: Seat, rank: Rank },
    PlayerFinished { seat: Seat, place: usize },
    RoundEnded { round: TeamScores, totals: TeamScores },
    GameEnded { winner: Team, totals: TeamScores },
}

fn cards_text(cards: &[Card]) -> String {
    cards.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(" ")
}

impl fmt::Display for GameEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GameEvent::RoundStarted { round_no } => write!(f, "第 {} 轮开始，每人先发 8 张", round_no + 1),
            GameEvent::LargeTichuDeclared { seat } => write!(f, "座位 {} 叫了大 Tichu", seat),
            GameEvent::LargeTichuPassed { seat } => write!(f, "座位 {} 不叫大 Tichu", seat),
            GameEvent::RemainingCardsDealt => write!(f, "发剩下的 6 张，开始换牌"),
            GameEvent::SmallTichuDeclared { seat } => write!(f, "座位 {} 叫了小 Tichu", seat),
            GameEvent::ExchangeCommitted { seat } => write!(f, "座位 {} 已选好换牌", seat),
            GameEvent::ExchangeCompleted { lead } => write!(f, "换牌完成，座位 {} 持雀首出", lead),
            GameEvent::CardsPlayed { seat, cards, combo } => {
                write!(f, "座位 {} 打出 {} [{}]", seat, combo, cards_text(cards))
            }
            GameEvent::BombPlayed { seat, cards, combo } => {
                write!(f, "座位 {} 炸弹! {} [{}]", seat, combo, cards_text(cards))
            }
            GameEvent::DogPlayed { seat, lead } => write!(f, "座位 {} 打出狗，座位 {} 获得出牌权", seat, lead),
            GameEvent::Passed { seat } => write!(f, "座位 {} 过", seat),
            GameEvent::TrickWon { seat, points } => write!(f, "座位 {} 赢下这一墩 ({} 分)", seat, points),
            GameEvent::DragonGiveRequired { seat } => write!(f, "座位 {} 用龙赢墩，需要把牌送给一名对手", seat),
            GameEvent::DragonGiven { from, to, points } => {
                write!(f, "座位 {} 把龙墩 ({} 分) 送给了座位 {}", from, points, to)
            }
            GameEvent::RankCallRequired { seat } => write!(f, "座位 {} 打出雀，等待叫牌", seat),
            GameEvent::CallRankSet { seat, rank: Some(rank) } => {
                write!(f, "座位 {} 叫了 {}", seat, rank.label())
            }
            GameEvent::CallRankSet { seat, rank: None } => write!(f, "座位 {} 没有叫牌", seat),
            GameEvent::CallFulfilled { seat, rank } => {
                write!(f, "座位 {} 打出了被叫的 {}", seat, rank.label())
            }
            GameEvent::PlayerFinished { seat, place } => write!(f, "座位 {} 第 {} 个出完", seat, place),
            GameEvent::RoundEnded { round, totals } => write!(f, "本轮得分 {}，累计 {}", round, totals),
            GameEvent::GameEnded { winner, totals } => write!(f, "比赛结束，{:?} 队获胜 ({})", winner, totals),
        }
    }
}

// --- 客户端 -> 服务器 的消息 ---

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    /// 创建一个新房间并坐下
    CreateRoom { nickname: String },
    /// 加入已存在的房间，坐到下一个空位
    JoinRoom { room_id: RoomId, nickname: String },
    /// 断线后凭密钥回到原来的座位
    Rejoin { room_id: RoomId, secret: PlayerSecret },
    /// 游戏动作
    PerformAction(Action),
}

// --- 服务器 -> 客户端 的消息 ---

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    /// 成功入座后私密地发给该玩家
    RoomJoined {
        room_id: RoomId,
        your_id: PlayerId,
        your_secret: PlayerSecret, // 用于断线重连的凭证
        seat: Seat,
    },
    /// 有玩家入座
    PlayerSeated { nickname: String, seat: Seat },
    /// 该玩家视角下的状态快照
    SeatSnapshot(SeatView),
    /// 广播的游戏事件
    Event { event: GameEvent, description: String },
    /// 动作被拒绝，只发给动作发起者
    Rejected { code: String, reason: String },
    Info { message: String },
    Error { message: String },
}

impl From<Action> for ClientMessage {
    fn from(action: Action) -> Self {
        ClientMessage::PerformAction(action)
    }
}

impl From<GameEvent> for ServerMessage {
    fn from(event: GameEvent) -> Self {
        ServerMessage::Event { description: event.to_string(), event }
    }
}
