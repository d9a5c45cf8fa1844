use crate::card::{Card, HAND_SIZE, Rank};
use crate::scoring::TeamScores;
use crate::state::{
    Declaration, Game, Pending, Phase, PlayerId, SEATS, Seat, TrickEntry, left_of, partner_of,
    right_of,
};
use serde::{Deserialize, Serialize};

/// 某个座位能看到的状态。自动玩家和人类客户端消费的都是它。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeatView {
    pub seat: Seat,
    pub partner: Seat,
    pub left: Seat,
    pub right: Seat,
    pub phase: Phase,
    pub round_no: u32,
    pub hand: Vec<Card>,
    pub hand_counts: [usize; SEATS],
    pub declarations: [Option<Declaration>; SEATS],
    pub trick: Vec<TrickEntry>,
    pub turn: Option<Seat>,
    pub call: Option<Rank>,
    /// 正在做挂起决定的座位 (送龙或叫牌)，此时其他人都不能出牌
    pub deciding: Option<Seat>,
    pub finish_order: Vec<Seat>,
    pub scores: TeamScores,
    /// 每一轮的得分
    pub history: Vec<TeamScores>,

    // 只对本座位有意义的标志
    pub awaiting_large_tichu: bool,
    pub awaiting_exchange: bool,
    pub can_declare_small_tichu: bool,
    pub must_give_dragon: bool,
    pub must_call_rank: bool,
    /// 轮到本座位且手里有被叫点数的牌能压过桌面
    pub must_fulfil_call: bool,
}

impl SeatView {
    /// 轮到本座位出牌或过牌 (没有挂起的决定)
    pub fn is_my_turn(&self) -> bool {
        self.turn == Some(self.seat) && self.deciding.is_none()
    }

    pub fn top(&self) -> Option<&TrickEntry> {
        self.trick.last()
    }
}

/// 观战者能看到的状态：所有人的牌数，只有被授权的座位才显示手牌
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpectatorView {
    pub phase: Phase,
    pub round_no: u32,
    pub hand_counts: [usize; SEATS],
    pub hands: [Option<Vec<Card>>; SEATS],
    pub declarations: [Option<Declaration>; SEATS],
    pub trick: Vec<TrickEntry>,
    pub turn: Option<Seat>,
    pub call: Option<Rank>,
    /// 正在做挂起决定的座位 (送龙或叫牌)
    pub deciding: Option<Seat>,
    pub finish_order: Vec<Seat>,
    pub scores: TeamScores,
}

impl Game {
    fn hand_counts(&self) -> [usize; SEATS] {
        std::array::from_fn(|s| self.round.hands[s].len())
    }

    pub fn view_for(&self, seat: Seat) -> SeatView {
        let round = &self.round;
        let pending = round.pending.as_ref();
        let playing = self.phase == Phase::Playing;
        let must_fulfil_call = playing
            && pending.is_none()
            && round.turn == Some(seat)
            && self.call_obligation(seat).is_some();

        SeatView {
            seat,
            partner: partner_of(seat),
            left: left_of(seat),
            right: right_of(seat),
            phase: self.phase,
            round_no: self.round_no,
            hand: round.hands[seat].clone(),
            hand_counts: self.hand_counts(),
            declarations: round.declarations,
            trick: round.trick.clone(),
            turn: round.turn,
            call: round.call,
            deciding: pending.map(Pending::decider),
            finish_order: round.finish_order.clone(),
            scores: self.scores,
            history: self.history.clone(),
            awaiting_large_tichu: self.phase == Phase::LargeTichu && !round.large_responses[seat],
            awaiting_exchange: self.phase == Phase::CardExchange && round.exchanges[seat].is_none(),
            can_declare_small_tichu: matches!(self.phase, Phase::CardExchange | Phase::Playing)
                && round.declarations[seat].is_none()
                && round.hands[seat].len() == HAND_SIZE,
            must_give_dragon: matches!(pending, Some(Pending::DragonGive { winner, .. }) if *winner == seat),
            must_call_rank: matches!(pending, Some(Pending::RankCall { seat: s }) if *s == seat),
            must_fulfil_call,
        }
    }

    pub fn view_for_player(&self, player_id: &PlayerId) -> Option<SeatView> {
        self.seat_of(player_id).map(|seat| self.view_for(seat))
    }

    pub fn spectator_view(&self, visible: &[Seat]) -> SpectatorView {
        let round = &self.round;
        SpectatorView {
            phase: self.phase,
            round_no: self.round_no,
            hand_counts: self.hand_counts(),
            hands: std::array::from_fn(|s| visible.contains(&s).then(|| round.hands[s].clone())),
            declarations: round.declarations,
            trick: round.trick.clone(),
            turn: round.turn,
            call: round.call,
            deciding: round.pending.as_ref().map(Pending::decider),
            finish_order: round.finish_order.clone(),
            scores: self.scores,
        }
    }
}
