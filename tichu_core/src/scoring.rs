//! 一轮结束时的计分。纯函数，相同输入总是得到相同结果。

use crate::card::{Card, card_points};
use crate::state::{Declaration, SEATS, Seat, Team};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::AddAssign;

/// 两队分数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamScores {
    pub team_a: i32,
    pub team_b: i32,
}

impl TeamScores {
    pub fn get(&self, team: Team) -> i32 {
        match team {
            Team::A => self.team_a,
            Team::B => self.team_b,
        }
    }

    pub fn add(&mut self, team: Team, points: i32) {
        match team {
            Team::A => self.team_a += points,
            Team::B => self.team_b += points,
        }
    }

    /// 达到目标分且两队不平时的领先队伍
    pub fn leader_at(&self, target: i32) -> Option<Team> {
        if self.team_a.max(self.team_b) < target || self.team_a == self.team_b {
            return None;
        }
        Some(if self.team_a > self.team_b { Team::A } else { Team::B })
    }
}

impl AddAssign for TeamScores {
    fn add_assign(&mut self, rhs: TeamScores) {
        self.team_a += rhs.team_a;
        self.team_b += rhs.team_b;
    }
}

impl fmt::Display for TeamScores {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "A队 {} : B队 {}", self.team_a, self.team_b)
    }
}

/// 最后一名：出完顺序不足 4 人时是不在其中的座位，否则是第 4 个
pub fn last_place(finish_order: &[Seat]) -> Option<Seat> {
    if finish_order.len() >= SEATS {
        return finish_order.get(SEATS - 1).copied();
    }
    (0..SEATS).find(|s| !finish_order.contains(s))
}

/// 计算一轮的得分。
///
/// - 同队包揽前两名：该队 200 分，对方 0 分，赢牌分数全部忽略。
/// - 否则各座位赢牌的分数计入本队；最后一名赢得的牌计入第一名的队伍，
///   最后一名手里剩下的牌计入对方队伍。
/// - 最后加上 Tichu 奖惩：第一个出完 +100/+200，否则 -100/-200。包揽前两名时同样适用。
pub fn score_round(
    finish_order: &[Seat],
    trick_piles: &[Vec<Card>; SEATS],
    remaining_hands: &[Vec<Card>; SEATS],
    declarations: &[Option<Declaration>; SEATS],
) -> TeamScores {
    let mut scores = TeamScores::default();

    match finish_order {
        [first, second, ..] if Team::of(*first) == Team::of(*second) => {
            scores.add(Team::of(*first), 200);
        }
        _ => {
            let last = last_place(finish_order);
            for (seat, pile) in trick_piles.iter().enumerate() {
                let points = card_points(pile);
                if Some(seat) == last {
                    // 没人出完时 (比赛中止) 留给本队
                    let receiver = finish_order.first().copied().unwrap_or(seat);
                    scores.add(Team::of(receiver), points);
                } else {
                    scores.add(Team::of(seat), points);
                }
            }
            if let Some(last) = last {
                scores.add(Team::of(last).other(), card_points(&remaining_hands[last]));
            }
        }
    }

    let first = finish_order.first().copied();
    for (seat, declaration) in declarations.iter().enumerate() {
        if let Some(declaration) = declaration {
            let bonus = declaration.bonus();
            let delta = if first == Some(seat) { bonus } else { -bonus };
            scores.add(Team::of(seat), delta);
        }
    }
    scores
}
