use crate::card::Rank;
use thiserror::Error;

/// 牌面标识解析失败
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("无法识别的牌: {0}")]
pub struct ParseCardError(pub String);

/// 动作被拒绝的原因。
/// 拒绝永远不会修改游戏状态。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("当前阶段不能执行该动作")]
    WrongPhase,
    #[error("该玩家不在本局中")]
    UnknownPlayer,
    #[error("还没轮到你")]
    NotYourTurn,
    #[error("你已经出完牌了")]
    AlreadyFinished,
    #[error("手里没有这张牌: {0}")]
    CardNotInHand(String),
    #[error("没有选择任何牌")]
    EmptySelection,
    #[error("选择了重复的牌")]
    DuplicateCards,
    #[error("不是合法的牌型")]
    IllegalCombination,
    #[error("牌型打不过桌上的牌")]
    TooWeak,
    #[error("必须出被叫的点数 {}", .0.label())]
    UnmetCall(Rank),
    #[error("狗只能在首出时打出")]
    DogMustLead,
    #[error("首出时不能过牌")]
    CannotPass,
    #[error("龙只能送给对手")]
    InvalidDragonTarget,
    #[error("正在等待其他玩家的决定")]
    PendingDecision,
    #[error("这个决定不归你做")]
    NotYourDecision,
    #[error("已经表态过了")]
    AlreadyResponded,
    #[error("已经换过牌了")]
    AlreadyExchanged,
    #[error("已经叫过 Tichu 了")]
    AlreadyDeclared,
    #[error("只有持有全部 14 张牌时才能叫小 Tichu")]
    NotAllCards,
    #[error("无效的叫牌点数: {0}")]
    InvalidRank(String),
}

impl ActionError {
    /// 稳定的机器可读错误码，供传输层转发给客户端
    pub fn code(&self) -> &'static str {
        match self {
            ActionError::WrongPhase => "wrong_phase",
            ActionError::UnknownPlayer => "unknown_player",
            ActionError::NotYourTurn => "not_your_turn",
            ActionError::AlreadyFinished => "already_finished",
            ActionError::CardNotInHand(_) => "card_not_in_hand",
            ActionError::EmptySelection => "empty_selection",
            ActionError::DuplicateCards => "duplicate_cards",
            ActionError::IllegalCombination => "illegal_combination",
            ActionError::TooWeak => "too_weak",
            ActionError::UnmetCall(_) => "unmet_call",
            ActionError::DogMustLead => "dog_must_lead",
            ActionError::CannotPass => "cannot_pass",
            ActionError::InvalidDragonTarget => "invalid_dragon_target",
            ActionError::PendingDecision => "pending_decision",
            ActionError::NotYourDecision => "not_your_decision",
            ActionError::AlreadyResponded => "already_responded",
            ActionError::AlreadyExchanged => "already_exchanged",
            ActionError::AlreadyDeclared => "already_declared",
            ActionError::NotAllCards => "not_all_cards",
            ActionError::InvalidRank(_) => "invalid_rank",
        }
    }
}
