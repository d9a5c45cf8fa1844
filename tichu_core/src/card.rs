use crate::error::ParseCardError;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// --- 核心数据结构定义 ---

/// 花色 (Suit)，Tichu 的四种花色
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Suit {
    Jade,   // 翡翠
    Sword,  // 宝剑
    Pagoda, // 宝塔
    Star,   // 星星
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Jade, Suit::Sword, Suit::Pagoda, Suit::Star];

    fn label(&self) -> &'static str {
        match self {
            Suit::Jade => "jade",
            Suit::Sword => "sword",
            Suit::Pagoda => "pagoda",
            Suit::Star => "star",
        }
    }

    fn from_label(label: &str) -> Option<Suit> {
        Suit::ALL.into_iter().find(|s| s.label() == label)
    }
}

/// 点数 (Rank)
/// 判别值即排序用的基础点数，2 最小，A 为 14
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
#[repr(u8)]
pub enum Rank {
    Two = 2,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
    Jack,
    Queen,
    King,
    Ace,
}

impl Rank {
    pub const ALL: [Rank; 13] = [
        Rank::Two, Rank::Three, Rank::Four, Rank::Five, Rank::Six, Rank::Seven, Rank::Eight,
        Rank::Nine, Rank::Ten, Rank::Jack, Rank::Queen, Rank::King, Rank::Ace,
    ];

    pub fn value(self) -> u8 {
        self as u8
    }

    pub fn from_value(value: u8) -> Option<Rank> {
        Rank::ALL.into_iter().find(|r| r.value() == value)
    }

    pub fn label(self) -> &'static str {
        match self {
            Rank::Two => "2",
            Rank::Three => "3",
            Rank::Four => "4",
            Rank::Five => "5",
            Rank::Six => "6",
            Rank::Seven => "7",
            Rank::Eight => "8",
            Rank::Nine => "9",
            Rank::Ten => "10",
            Rank::Jack => "J",
            Rank::Queen => "Q",
            Rank::King => "K",
            Rank::Ace => "A",
        }
    }

    pub fn from_label(label: &str) -> Option<Rank> {
        Rank::ALL.into_iter().find(|r| r.label() == label)
    }
}

impl From<Rank> for String {
    fn from(rank: Rank) -> String {
        rank.label().to_string()
    }
}

impl TryFrom<String> for Rank {
    type Error = ParseCardError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Rank::from_label(&value).ok_or(ParseCardError(value))
    }
}

/// 单张牌 (Card)
/// 52 张普通牌加上四张特殊牌：雀 (Bird)、狗 (Dog)、凤凰 (Phoenix)、龙 (Dragon)。
/// 序列化为字符串标识，例如 `jade_10`、`star_A`、`phoenix`。
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Card {
    Normal { rank: Rank, suit: Suit },
    Bird,
    Dog,
    Phoenix,
    Dragon,
}

impl Card {
    pub fn new(rank: Rank, suit: Suit) -> Card {
        Card::Normal { rank, suit }
    }

    pub fn rank(&self) -> Option<Rank> {
        match self {
            Card::Normal { rank, .. } => Some(*rank),
            _ => None,
        }
    }

    pub fn suit(&self) -> Option<Suit> {
        match self {
            Card::Normal { suit, .. } => Some(*suit),
            _ => None,
        }
    }

    pub fn is_special(&self) -> bool {
        !matches!(self, Card::Normal { .. })
    }

    /// 用于组成顺子的基础点数。凤凰没有固定点数，出牌时才确定。
    pub fn base_value(&self) -> Option<u8> {
        match self {
            Card::Normal { rank, .. } => Some(rank.value()),
            Card::Dog => Some(0),
            Card::Bird => Some(1),
            Card::Dragon => Some(15),
            Card::Phoenix => None,
        }
    }

    pub fn rank_label(&self) -> &'static str {
        match self {
            Card::Normal { rank, .. } => rank.label(),
            Card::Bird => "bird",
            Card::Dog => "dog",
            Card::Phoenix => "phoenix",
            Card::Dragon => "dragon",
        }
    }

    /// 计分：5 记 5 分，10 和 K 记 10 分，龙 25 分，凤凰 -25 分
    pub fn points(&self) -> i32 {
        match self {
            Card::Normal { rank: Rank::Five, .. } => 5,
            Card::Normal { rank: Rank::Ten | Rank::King, .. } => 10,
            Card::Dragon => 25,
            Card::Phoenix => -25,
            _ => 0,
        }
    }

    /// 稳定排序用的键：按半点精度的点数，凤凰排在雀和 2 之间
    fn sort_key(&self) -> (u8, Option<Suit>) {
        let key = match self.base_value() {
            Some(v) => v * 2,
            None => 3,
        };
        (key, self.suit())
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Card::Normal { rank, suit } => write!(f, "{}_{}", suit.label(), rank.label()),
            _ => write!(f, "{}", self.rank_label()),
        }
    }
}

impl FromStr for Card {
    type Err = ParseCardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bird" => return Ok(Card::Bird),
            "dog" => return Ok(Card::Dog),
            "phoenix" => return Ok(Card::Phoenix),
            "dragon" => return Ok(Card::Dragon),
            _ => {}
        }
        let (suit, rank) = s.split_once('_').ok_or_else(|| ParseCardError(s.to_string()))?;
        let suit = Suit::from_label(suit).ok_or_else(|| ParseCardError(s.to_string()))?;
        let rank = Rank::from_label(rank).ok_or_else(|| ParseCardError(s.to_string()))?;
        Ok(Card::new(rank, suit))
    }
}

impl From<Card> for String {
    fn from(card: Card) -> String {
        card.to_string()
    }
}

impl TryFrom<String> for Card {
    type Error = ParseCardError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// --- 牌组与发牌 ---

pub const DECK_SIZE: usize = 56;
pub const FIRST_DEAL: usize = 8;
pub const SECOND_DEAL: usize = 6;
pub const HAND_SIZE: usize = FIRST_DEAL + SECOND_DEAL;

/// 创建一副完整的 56 张牌
pub fn full_deck() -> Vec<Card> {
    let mut deck = Vec::with_capacity(DECK_SIZE);
    for suit in Suit::ALL {
        for rank in Rank::ALL {
            deck.push(Card::new(rank, suit));
        }
    }
    deck.extend([Card::Bird, Card::Dog, Card::Phoenix, Card::Dragon]);
    deck
}

/// 用固定种子洗牌，同一种子总是得到同样的牌序
pub fn shuffled_deck(seed: u64) -> Vec<Card> {
    let mut deck = full_deck();
    let mut rng = StdRng::seed_from_u64(seed);
    deck.shuffle(&mut rng);
    deck
}

/// 由整局的基础种子推导每一轮的发牌种子
pub fn derive_deal_seed(base_seed: u64, round_no: u32) -> u64 {
    base_seed
        .wrapping_add((round_no as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
        .rotate_left(17)
}

/// 一次发牌的结果：先发的 8 张 (大 Tichu 决定之前可见) 和后发的 6 张
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deal {
    pub first: [Vec<Card>; 4],
    pub rest: [Vec<Card>; 4],
}

pub fn deal(seed: u64) -> Deal {
    let deck = shuffled_deck(seed);
    let mut first: [Vec<Card>; 4] = Default::default();
    let mut rest: [Vec<Card>; 4] = Default::default();
    for (i, card) in deck.into_iter().enumerate() {
        if i < FIRST_DEAL * 4 {
            first[i % 4].push(card);
        } else {
            rest[i % 4].push(card);
        }
    }
    for hand in first.iter_mut().chain(rest.iter_mut()) {
        sort_cards(hand);
    }
    Deal { first, rest }
}

/// 按点数稳定排序 (同点数按花色)
pub fn sort_cards(cards: &mut [Card]) {
    cards.sort_by_key(|c| c.sort_key());
}

pub fn card_points(cards: &[Card]) -> i32 {
    cards.iter().map(Card::points).sum()
}

// --- 单元测试 ---
