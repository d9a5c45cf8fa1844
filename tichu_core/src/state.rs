use crate::card::{Card, Rank, deal, derive_deal_seed};
use crate::combo::Combo;
use crate::config::GameConfig;
use crate::scoring::TeamScores;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type RoomId = Uuid;
pub type PlayerId = Uuid;
/// 座位号 0..=3，0 与 2、1 与 3 为搭档
pub type Seat = usize;

pub const SEATS: usize = 4;

// --- 座位与队伍 ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Team {
    A, // 座位 0 和 2
    B, // 座位 1 和 3
}

impl Team {
    pub fn of(seat: Seat) -> Team {
        if seat % 2 == 0 { Team::A } else { Team::B }
    }

    pub fn other(self) -> Team {
        match self {
            Team::A => Team::B,
            Team::B => Team::A,
        }
    }

    pub fn seats(self) -> [Seat; 2] {
        match self {
            Team::A => [0, 2],
            Team::B => [1, 3],
        }
    }
}

pub fn partner_of(seat: Seat) -> Seat {
    (seat + 2) % SEATS
}

/// 左手对手 (座位偏移 +3)
pub fn left_of(seat: Seat) -> Seat {
    (seat + 3) % SEATS
}

/// 右手对手 (座位偏移 +1)，也是顺时针的下家
pub fn right_of(seat: Seat) -> Seat {
    (seat + 1) % SEATS
}

/// 相对于某个座位的位置，用于换牌和送龙
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relative {
    Left,
    Partner,
    Right,
}

impl Relative {
    pub fn resolve(self, seat: Seat) -> Seat {
        match self {
            Relative::Left => left_of(seat),
            Relative::Partner => partner_of(seat),
            Relative::Right => right_of(seat),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Declaration {
    SmallTichu,
    LargeTichu,
}

impl Declaration {
    /// 第一个出完牌时得到的奖励 (否则扣同样的分)
    pub fn bonus(self) -> i32 {
        match self {
            Declaration::SmallTichu => 100,
            Declaration::LargeTichu => 200,
        }
    }
}

// --- 阶段与挂起状态 ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Waiting,
    DealingFirst8,
    LargeTichu,
    DealingRemaining6,
    CardExchange,
    Playing,
    RoundEnd,
    GameEnd,
}

/// 出牌阶段中阻塞正常出牌的挂起决定
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Pending {
    /// 龙赢下一墩后，赢家必须把这墩牌送给一名对手。`cards` 是暂存的这墩牌。
    DragonGive { winner: Seat, cards: Vec<Card> },
    /// 打出雀时没有同时叫点数，等待该玩家叫牌
    RankCall { seat: Seat },
}

impl Pending {
    /// 需要做出决定的座位
    pub fn decider(&self) -> Seat {
        match self {
            Pending::DragonGive { winner, .. } => *winner,
            Pending::RankCall { seat } => *seat,
        }
    }
}

/// 换牌：分别给左手对手、搭档、右手对手的三张牌
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Exchange {
    pub left: Card,
    pub partner: Card,
    pub right: Card,
}

impl Exchange {
    pub fn cards(&self) -> [Card; 3] {
        [self.left, self.partner, self.right]
    }

    /// (收牌座位, 牌)
    pub fn deliveries(&self, from: Seat) -> [(Seat, Card); 3] {
        [
            (left_of(from), self.left),
            (partner_of(from), self.partner),
            (right_of(from), self.right),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrickEntry {
    pub seat: Seat,
    pub cards: Vec<Card>,
    pub combo: Combo,
}

// --- 一轮 (一次发牌到计分) 的状态 ---

/// 一轮的全部可变状态，所有按座位的数据都是以座位号为下标的定长数组
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Round {
    pub hands: [Vec<Card>; SEATS],
    /// 大 Tichu 决定之后才发下去的 6 张
    pub undealt: [Vec<Card>; SEATS],
    /// 每个座位赢得的牌
    pub piles: [Vec<Card>; SEATS],
    /// 桌上当前这一墩
    pub trick: Vec<TrickEntry>,
    pub turn: Option<Seat>,
    /// 自最近一次出牌以来的过牌次数
    pub passes: usize,
    pub finish_order: Vec<Seat>,
    /// 雀叫出的点数，直到有人打出该点数的普通牌为止
    pub call: Option<Rank>,
    pub declarations: [Option<Declaration>; SEATS],
    pub large_responses: [bool; SEATS],
    pub exchanges: [Option<Exchange>; SEATS],
    pub pending: Option<Pending>,
    pub score: Option<TeamScores>,
}

impl Round {
    /// 发前 8 张，剩下的 6 张暂存在 `undealt`
    pub fn deal(seed: u64) -> Round {
        let dealt = deal(seed);
        Round { hands: dealt.first, undealt: dealt.rest, ..Round::default() }
    }

    pub fn is_finished(&self, seat: Seat) -> bool {
        self.finish_order.contains(&seat)
    }

    pub fn active_seats(&self) -> impl Iterator<Item = Seat> + '_ {
        (0..SEATS).filter(|s| !self.is_finished(*s))
    }

    /// `after` 之后顺时针第一个还有牌的座位 (不含 `after` 自己)
    pub fn next_active(&self, after: Seat) -> Option<Seat> {
        (1..SEATS).map(|i| (after + i) % SEATS).find(|s| !self.is_finished(*s))
    }

    /// 从 `seat` 开始 (含自己) 顺时针第一个还有牌的座位
    pub fn active_from(&self, seat: Seat) -> Option<Seat> {
        if self.is_finished(seat) { self.next_active(seat) } else { Some(seat) }
    }

    pub fn top(&self) -> Option<&TrickEntry> {
        self.trick.last()
    }

    pub fn holds(&self, seat: Seat, card: &Card) -> bool {
        self.hands[seat].contains(card)
    }

    pub fn holder_of(&self, card: &Card) -> Option<Seat> {
        (0..SEATS).find(|s| self.holds(*s, card))
    }

    pub(crate) fn remove_cards(&mut self, seat: Seat, cards: &[Card]) {
        self.hands[seat].retain(|c| !cards.contains(c));
    }

    /// 本墩所需的过牌数：除了桌面最大那手牌的出牌者之外，所有还有牌的座位都要过
    pub fn passes_needed(&self) -> usize {
        match self.top() {
            Some(top) => self.active_seats().filter(|s| *s != top.seat).count(),
            None => 0,
        }
    }

    /// 一轮中所有位置上的牌数之和 (手牌、未发的牌、赢得的牌、桌面、待送的龙墩)，恒为 56
    pub fn card_count(&self) -> usize {
        let pending = match &self.pending {
            Some(Pending::DragonGive { cards, .. }) => cards.len(),
            _ => 0,
        };
        self.hands.iter().map(Vec::len).sum::<usize>()
            + self.undealt.iter().map(Vec::len).sum::<usize>()
            + self.piles.iter().map(Vec::len).sum::<usize>()
            + self.trick.iter().map(|e| e.cards.len()).sum::<usize>()
            + pending
    }

    /// 同队的两名玩家分别第一、第二个出完
    pub fn is_one_two(&self) -> bool {
        matches!(self.finish_order.as_slice(), [a, b, ..] if Team::of(*a) == Team::of(*b))
    }

    pub fn is_over(&self) -> bool {
        self.is_one_two() || self.finish_order.len() >= SEATS - 1
    }
}

// --- 跨轮次的比赛状态 ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Game {
    /// 座位号 -> 玩家。重连时只需替换这里。
    pub seats: [PlayerId; SEATS],
    pub config: GameConfig,
    pub phase: Phase,
    pub round: Round,
    pub round_no: u32,
    /// 累计分数
    pub scores: TeamScores,
    /// 每一轮的得分
    pub history: Vec<TeamScores>,
    pub winner: Option<Team>,
    base_seed: u64,
}

impl Game {
    pub fn new(seats: [PlayerId; SEATS], config: GameConfig) -> Game {
        let base_seed = config.seed.unwrap_or_else(rand::random);
        Game {
            seats,
            config,
            phase: Phase::Waiting,
            round: Round::default(),
            round_no: 0,
            scores: TeamScores::default(),
            history: Vec::new(),
            winner: None,
            base_seed,
        }
    }

    pub fn seat_of(&self, player_id: &PlayerId) -> Option<Seat> {
        self.seats.iter().position(|id| id == player_id)
    }

    pub fn player_at(&self, seat: Seat) -> Option<PlayerId> {
        self.seats.get(seat).copied()
    }

    /// 断线重连：把座位上的旧身份换成新身份。
    /// 其它状态全部按座位号索引，所以这一次替换就覆盖了手牌、赢牌、出牌权和挂起决定。
    pub fn rebind_seat(&mut self, old: &PlayerId, new: PlayerId) -> Option<Seat> {
        if self.seat_of(&new).is_some() {
            return None;
        }
        let seat = self.seat_of(old)?;
        self.seats[seat] = new;
        Some(seat)
    }

    pub(crate) fn deal_seed(&self) -> u64 {
        derive_deal_seed(self.base_seed, self.round_no)
    }

    pub fn is_over(&self) -> bool {
        self.phase == Phase::GameEnd
    }
}
