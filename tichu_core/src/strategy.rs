//! 自动决策：超时代打和测试驱动用的保守策略。

use crate::card::{Card, Rank, sort_cards};
use crate::combo::Combo;
use crate::logic::find_call_fulfilment;
use crate::message::Action;
use crate::state::{Phase, Relative};
use crate::view::SeatView;

/// 根据某个座位能看到的状态选择一个动作。
///
/// 只能读取 `SeatView`，看不到其他人的手牌。没有需要本座位做的事时返回 `None`。
pub trait Strategy: Send + Sync {
    fn decide(&self, view: &SeatView) -> Option<Action>;
}

/// 从不叫 Tichu，能过就过，必须出牌时出最小的单张
#[derive(Debug, Clone, Copy, Default)]
pub struct PassiveStrategy;

impl Strategy for PassiveStrategy {
    fn decide(&self, view: &SeatView) -> Option<Action> {
        match view.phase {
            Phase::LargeTichu if view.awaiting_large_tichu => Some(Action::PassLargeTichu),
            Phase::CardExchange if view.awaiting_exchange => fallback_exchange(&view.hand),
            Phase::Playing if view.must_give_dragon => {
                Some(Action::DragonGive { target: Relative::Right })
            }
            Phase::Playing if view.must_call_rank => {
                Some(Action::CallRank { rank: "none".to_string() })
            }
            Phase::Playing if view.is_my_turn() => {
                let top = view.top().map(|entry| &entry.combo);
                let action = match fallback_play(&view.hand, top, view.call) {
                    Some(cards) => {
                        let call_rank = cards.contains(&Card::Bird).then(|| "none".to_string());
                        Action::PlayCards { cards, call_rank }
                    }
                    None => Action::Pass,
                };
                Some(action)
            }
            Phase::RoundEnd => Some(Action::NextRound),
            _ => None,
        }
    }
}

/// 被迫出牌时的选择：`None` 表示过。
///
/// 有可履行的叫牌时出那手牌；桌上有牌时过；首出时出最小的单张 (只剩狗时出狗)。
pub fn fallback_play(hand: &[Card], top: Option<&Combo>, call: Option<Rank>) -> Option<Vec<Card>> {
    if let Some(rank) = call {
        if let Some(cards) = find_call_fulfilment(hand, top, rank) {
            return Some(cards);
        }
    }
    if top.is_some() {
        return None;
    }
    let mut sorted = hand.to_vec();
    sort_cards(&mut sorted);
    sorted.iter().find(|c| **c != Card::Dog).or(sorted.first()).map(|c| vec![*c])
}

/// 最小的牌给左手对手，次小的给右手对手，最大的给搭档
pub fn fallback_exchange(hand: &[Card]) -> Option<Action> {
    let mut sorted = hand.to_vec();
    sort_cards(&mut sorted);
    match sorted.as_slice() {
        [left, right, .., partner] => Some(Action::ExchangeCards {
            left: *left,
            partner: *partner,
            right: *right,
        }),
        _ => None,
    }
}
