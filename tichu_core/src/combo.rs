//! 牌型识别与比较。
//!
//! `classify` 把一组牌识别为合法牌型 (或 `None`)，`can_beat` 判断一手牌能否压过桌上的牌。
//! 两者都是纯函数；凤凰单张的实际点数由状态机通过 [`resolve_phoenix`] 按桌面情况确定。

use crate::card::{Card, Rank, Suit, sort_cards};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// 牌型的可比较点数，以半点为单位存储，凤凰单张因此可以精确表示为 "x.5"
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
pub struct Value(u8);

impl Value {
    /// 凤凰首出时的点数：1.5，比雀大、比任何 2 小
    pub const PHOENIX_LEAD: Value = Value(3);

    pub const fn of(base: u8) -> Value {
        Value(base * 2)
    }

    pub fn half_above(self) -> Value {
        Value(self.0 + 1)
    }

    pub fn as_f32(self) -> f32 {
        self.0 as f32 / 2.0
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.0 % 2 == 0 {
            write!(f, "{}", self.0 / 2)
        } else {
            write!(f, "{}.5", self.0 / 2)
        }
    }
}

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComboKind {
    Single,
    Pair,
    Triple,
    Straight,
    FullHouse,
    Steps,     // 连对
    FourBomb,  // 四张炸弹
    FlushBomb, // 同花顺炸弹
    Dog,
}

/// 凤凰在牌型中扮演的角色
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhoenixRole {
    /// 单出的凤凰，点数由桌面决定
    Single,
    /// 代替某个点数 (2..=14)
    StandsFor(u8),
}

#[derive(Debug, PartialEq, Eq, Hash, Clone, Serialize, Deserialize)]
pub struct Combo {
    pub kind: ComboKind,
    /// 牌的张数
    pub len: usize,
    pub value: Value,
    pub phoenix: Option<PhoenixRole>,
    /// 仅同花顺炸弹有花色
    pub suit: Option<Suit>,
}

impl Combo {
    fn new(kind: ComboKind, len: usize, value: u8) -> Combo {
        Combo { kind, len, value: Value::of(value), phoenix: None, suit: None }
    }

    fn with_phoenix(mut self, stands_for: u8) -> Combo {
        self.phoenix = Some(PhoenixRole::StandsFor(stands_for));
        self
    }

    pub fn is_bomb(&self) -> bool {
        matches!(self.kind, ComboKind::FourBomb | ComboKind::FlushBomb)
    }

    pub fn is_phoenix_single(&self) -> bool {
        self.phoenix == Some(PhoenixRole::Single)
    }

    pub fn is_dragon(&self) -> bool {
        self.kind == ComboKind::Single && self.phoenix.is_none() && self.value == Value::of(15)
    }

    /// 连对包含的对子数
    pub fn pair_count(&self) -> usize {
        match self.kind {
            ComboKind::Steps => self.len / 2,
            _ => 0,
        }
    }

    // 炸弹之间比较的键：同花顺炸弹总是大于四张炸弹，其次比长度，再比点数
    fn bomb_key(&self) -> (bool, usize, Value) {
        (self.kind == ComboKind::FlushBomb, self.len, self.value)
    }
}

impl fmt::Display for Combo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self.kind {
            ComboKind::Single => "单张",
            ComboKind::Pair => "对子",
            ComboKind::Triple => "三张",
            ComboKind::Straight => "顺子",
            ComboKind::FullHouse => "葫芦",
            ComboKind::Steps => "连对",
            ComboKind::FourBomb => "四张炸弹",
            ComboKind::FlushBomb => "同花顺炸弹",
            ComboKind::Dog => "狗",
        };
        match self.kind {
            ComboKind::Dog => write!(f, "{}", name),
            ComboKind::Straight | ComboKind::Steps | ComboKind::FlushBomb => {
                write!(f, "{}({}张, {})", name, self.len, self.value)
            }
            _ => write!(f, "{}({})", name, self.value),
        }
    }
}

// --- 牌型识别 ---

/// 识别一组牌的牌型，非法组合返回 `None`。
///
/// 识别顺序：同花顺炸弹先于葫芦/顺子/连对检查，保证真正的炸弹不会被识别成更弱的牌型。
pub fn classify(cards: &[Card]) -> Option<Combo> {
    if cards.is_empty() {
        return None;
    }
    let unique: HashSet<&Card> = cards.iter().collect();
    if unique.len() != cards.len() {
        return None;
    }
    if cards.len() == 1 {
        return Some(classify_single(cards[0]));
    }
    // 狗和龙只能单出
    if cards.iter().any(|c| matches!(c, Card::Dog | Card::Dragon)) {
        return None;
    }

    let has_phoenix = cards.contains(&Card::Phoenix);
    let others: Vec<Card> = cards.iter().copied().filter(|c| *c != Card::Phoenix).collect();

    match cards.len() {
        2 | 3 => same_rank(&others, has_phoenix, cards.len()),
        4 => four_bomb(&others, has_phoenix).or_else(|| steps(&others, has_phoenix)),
        5 => flush_bomb(&others, has_phoenix)
            .or_else(|| full_house(&others, has_phoenix))
            .or_else(|| straight(&others, has_phoenix)),
        _ => flush_bomb(&others, has_phoenix)
            .or_else(|| straight(&others, has_phoenix))
            .or_else(|| steps(&others, has_phoenix)),
    }
}

fn classify_single(card: Card) -> Combo {
    match card {
        Card::Dog => Combo::new(ComboKind::Dog, 1, 0),
        Card::Phoenix => Combo {
            kind: ComboKind::Single,
            len: 1,
            value: Value::PHOENIX_LEAD,
            phoenix: Some(PhoenixRole::Single),
            suit: None,
        },
        // 雀 1、龙 15、普通牌取点数
        other => Combo::new(ComboKind::Single, 1, other.base_value().unwrap_or(0)),
    }
}

/// 所有牌都是普通牌时返回它们的点数
fn ordinary_ranks(cards: &[Card]) -> Option<Vec<u8>> {
    cards.iter().map(|c| c.rank().map(Rank::value)).collect()
}

fn rank_counts(ranks: &[u8]) -> BTreeMap<u8, usize> {
    let mut counts = BTreeMap::new();
    for r in ranks {
        *counts.entry(*r).or_insert(0) += 1;
    }
    counts
}

fn is_consecutive(values: &[u8]) -> bool {
    values.windows(2).all(|w| w[1] == w[0] + 1)
}

// 对子和三张：同点数，凤凰可以补一张
fn same_rank(others: &[Card], has_phoenix: bool, len: usize) -> Option<Combo> {
    let ranks = ordinary_ranks(others)?;
    let first = *ranks.first()?;
    if ranks.iter().any(|r| *r != first) {
        return None;
    }
    let kind = if len == 2 { ComboKind::Pair } else { ComboKind::Triple };
    let combo = Combo::new(kind, len, first);
    Some(if has_phoenix { combo.with_phoenix(first) } else { combo })
}

fn four_bomb(others: &[Card], has_phoenix: bool) -> Option<Combo> {
    if has_phoenix || others.len() != 4 {
        return None;
    }
    let ranks = ordinary_ranks(others)?;
    if ranks.iter().all(|r| *r == ranks[0]) {
        Some(Combo::new(ComboKind::FourBomb, 4, ranks[0]))
    } else {
        None
    }
}

fn flush_bomb(others: &[Card], has_phoenix: bool) -> Option<Combo> {
    if has_phoenix || others.len() < 5 {
        return None;
    }
    let suit = others[0].suit()?;
    if others.iter().any(|c| c.suit() != Some(suit)) {
        return None;
    }
    let mut ranks = ordinary_ranks(others)?;
    ranks.sort_unstable();
    if !is_consecutive(&ranks) {
        return None;
    }
    let mut combo = Combo::new(ComboKind::FlushBomb, ranks.len(), *ranks.last()?);
    combo.suit = Some(suit);
    Some(combo)
}

/// 葫芦：三张 + 对子。凤凰在 3+1 时补成对子，在 2+2 时把较大的对子升为三张。
fn full_house(others: &[Card], has_phoenix: bool) -> Option<Combo> {
    let ranks = ordinary_ranks(others)?;
    let counts = rank_counts(&ranks);
    if counts.len() != 2 {
        return None;
    }
    let mut groups: Vec<(usize, u8)> = counts.iter().map(|(r, c)| (*c, *r)).collect();
    groups.sort_by(|a, b| b.cmp(a)); // 先按张数，再按点数从大到小
    let (big, small) = (groups[0], groups[1]);

    if !has_phoenix {
        return (big.0 == 3 && small.0 == 2).then(|| Combo::new(ComboKind::FullHouse, 5, big.1));
    }
    match (big.0, small.0) {
        (3, 1) => Some(Combo::new(ComboKind::FullHouse, 5, big.1).with_phoenix(small.1)),
        // 两个对子时 groups[0] 就是点数较大的那一对
        (2, 2) => Some(Combo::new(ComboKind::FullHouse, 5, big.1).with_phoenix(big.1)),
        _ => None,
    }
}

/// 顺子：至少 5 张连续点数，不能重复。雀可以作为 1 参与。
/// 凤凰可以填补一个内部空缺，或接在顶端 (最高到 A)，否则接在底端 (不能代替雀)。
fn straight(others: &[Card], has_phoenix: bool) -> Option<Combo> {
    let mut values: Vec<u8> = others.iter().map(|c| c.base_value()).collect::<Option<_>>()?;
    values.sort_unstable();
    if values.windows(2).any(|w| w[0] == w[1]) {
        return None;
    }
    let len = values.len() + usize::from(has_phoenix);
    if len < 5 {
        return None;
    }
    let (low, high) = (*values.first()?, *values.last()?);
    let span = (high - low + 1) as usize;

    if !has_phoenix {
        return (span == len).then(|| Combo::new(ComboKind::Straight, len, high));
    }
    if span == len {
        // 恰好一个内部空缺
        let gap = (low..=high).find(|v| !values.contains(v))?;
        Some(Combo::new(ComboKind::Straight, len, high).with_phoenix(gap))
    } else if span == len - 1 {
        if high < Rank::Ace.value() {
            Some(Combo::new(ComboKind::Straight, len, high + 1).with_phoenix(high + 1))
        } else if low > Rank::Two.value() {
            Some(Combo::new(ComboKind::Straight, len, high).with_phoenix(low - 1))
        } else {
            None
        }
    } else {
        None
    }
}

/// 连对：相邻点数的对子，至少两对。凤凰最多替一个落单的点数补成对子。
fn steps(others: &[Card], has_phoenix: bool) -> Option<Combo> {
    let len = others.len() + usize::from(has_phoenix);
    if len < 4 || len % 2 != 0 {
        return None;
    }
    let ranks = ordinary_ranks(others)?;
    let counts = rank_counts(&ranks);
    let keys: Vec<u8> = counts.keys().copied().collect();
    if keys.len() != len / 2 || !is_consecutive(&keys) {
        return None;
    }
    let singles: Vec<u8> = counts.iter().filter(|(_, c)| **c == 1).map(|(r, _)| *r).collect();
    if counts.values().any(|c| *c > 2) {
        return None;
    }
    let top = *keys.last()?;
    match (has_phoenix, singles.as_slice()) {
        (false, []) => Some(Combo::new(ComboKind::Steps, len, top)),
        (true, [single]) => Some(Combo::new(ComboKind::Steps, len, top).with_phoenix(*single)),
        _ => None,
    }
}

// --- 牌型比较 ---

/// 判断 `candidate` 能否压过桌上的 `current`。
///
/// 任何炸弹都压得过非炸弹；炸弹之间同花顺炸弹大于四张炸弹，同花顺炸弹先比长度再比点数。
/// 非炸弹只能压同类型、同张数且点数严格更大的牌。凤凰单张压不过龙，狗不能压任何牌。
pub fn can_beat(current: &Combo, candidate: &Combo) -> bool {
    if current.kind == ComboKind::Dog || candidate.kind == ComboKind::Dog {
        return false;
    }
    match (current.is_bomb(), candidate.is_bomb()) {
        (false, true) => true,
        (true, false) => false,
        (true, true) => candidate.bomb_key() > current.bomb_key(),
        (false, false) => {
            if candidate.is_phoenix_single() && current.is_dragon() {
                return false;
            }
            candidate.kind == current.kind
                && candidate.len == current.len
                && candidate.value > current.value
        }
    }
}

/// 确定凤凰单张的实际点数：压单张时为桌面点数 + 0.5，首出时为 1.5。
/// 其它牌型原样返回。
pub fn resolve_phoenix(combo: Combo, current: Option<&Combo>) -> Combo {
    if !combo.is_phoenix_single() {
        return combo;
    }
    let value = match current {
        Some(top) if top.kind == ComboKind::Single => top.value.half_above(),
        _ => Value::PHOENIX_LEAD,
    };
    Combo { value, ..combo }
}

/// 按展示顺序重新排列一手牌：葫芦先对子后三张，其它牌型把凤凰放在它代表的点数位置。
/// 只影响展示，不影响规则。
pub fn arrange_for_display(cards: &[Card], combo: &Combo) -> Vec<Card> {
    let stands_for = match combo.phoenix {
        Some(PhoenixRole::StandsFor(v)) => Some(v),
        _ => None,
    };
    let effective = |card: &Card| -> u8 {
        match card {
            Card::Phoenix => stands_for.unwrap_or(0),
            other => other.base_value().unwrap_or(0),
        }
    };

    let mut arranged = cards.to_vec();
    sort_cards(&mut arranged);
    if combo.kind == ComboKind::FullHouse {
        let triple = (combo.value.as_f32()) as u8;
        arranged.sort_by_key(|c| (effective(c) == triple, effective(c), *c == Card::Phoenix));
    } else if stands_for.is_some() {
        arranged.sort_by_key(|c| (effective(c), *c == Card::Phoenix));
    }
    arranged
}

// --- 单元测试 ---
