use crate::card::{Card, HAND_SIZE, Rank, card_points, sort_cards};
use crate::combo::{Combo, ComboKind, can_beat, classify, resolve_phoenix};
use crate::error::ActionError;
use crate::message::{Action, GameEvent};
use crate::scoring::score_round;
use crate::state::*;
use crate::strategy::{PassiveStrategy, Strategy};
use std::collections::HashSet;
use tracing::{debug, info};

// --- 核心游戏流程函数 ---

impl Game {
    /// 开始比赛：发第一轮的前 8 张，进入大 Tichu 阶段
    pub fn start(&mut self) -> Result<Vec<GameEvent>, ActionError> {
        if self.phase != Phase::Waiting {
            return Err(ActionError::WrongPhase);
        }
        Ok(self.start_round())
    }

    fn start_round(&mut self) -> Vec<GameEvent> {
        self.phase = Phase::DealingFirst8;
        self.round = Round::deal(self.deal_seed());
        self.phase = Phase::LargeTichu;
        info!(round_no = self.round_no, "新一轮开始");
        vec![GameEvent::RoundStarted { round_no: self.round_no }]
    }

    /// 处理某个玩家的动作
    pub fn handle_action(
        &mut self,
        player_id: &PlayerId,
        action: Action,
    ) -> Result<Vec<GameEvent>, ActionError> {
        let seat = self.seat_of(player_id).ok_or(ActionError::UnknownPlayer)?;
        self.apply(seat, action)
    }

    /// 唯一的动作入口。
    ///
    /// 先校验全部前置条件 (阶段、行动者、手牌、牌型、叫牌义务)，再修改状态；
    /// 被拒绝的动作不会改变任何状态。成功时返回需要广播的事件。
    pub fn apply(&mut self, seat: Seat, action: Action) -> Result<Vec<GameEvent>, ActionError> {
        let name = action.name();
        let result = self.dispatch(seat, action);
        match &result {
            Ok(events) => debug!(seat, action = name, events = events.len(), "动作已应用"),
            Err(err) => debug!(seat, action = name, code = err.code(), "动作被拒绝"),
        }
        result
    }

    fn dispatch(&mut self, seat: Seat, action: Action) -> Result<Vec<GameEvent>, ActionError> {
        if seat >= SEATS {
            return Err(ActionError::UnknownPlayer);
        }
        self.check_allowed(seat, &action)?;

        match action {
            Action::DeclareLargeTichu => Ok(self.respond_large_tichu(seat, true)),
            Action::PassLargeTichu => Ok(self.respond_large_tichu(seat, false)),
            Action::DeclareSmallTichu => Ok(self.declare_small_tichu(seat)),
            Action::ExchangeCards { left, partner, right } => {
                self.exchange(seat, Exchange { left, partner, right })
            }
            Action::PlayCards { cards, call_rank } => {
                self.play_cards(seat, cards, call_rank.as_deref())
            }
            Action::Pass => self.pass(seat),
            Action::DragonGive { target } => self.give_dragon(seat, target),
            Action::CallRank { rank } => self.set_call(seat, &rank),
            Action::NextRound => Ok(self.next_round()),
        }
    }

    fn expect_phase(&self, phase: Phase) -> Result<(), ActionError> {
        if self.phase == phase { Ok(()) } else { Err(ActionError::WrongPhase) }
    }

    /// 在 (阶段, 挂起状态, 行动者) 上判断动作当前是否允许。
    /// 出牌是否轮到自己要等识别出牌型后才能决定 (炸弹可以插队)，留给 `play_cards`。
    fn check_allowed(&self, seat: Seat, action: &Action) -> Result<(), ActionError> {
        let round = &self.round;
        match action {
            Action::DeclareLargeTichu | Action::PassLargeTichu => {
                self.expect_phase(Phase::LargeTichu)?;
                if round.large_responses[seat] {
                    return Err(ActionError::AlreadyResponded);
                }
            }
            Action::DeclareSmallTichu => {
                if !matches!(self.phase, Phase::CardExchange | Phase::Playing) {
                    return Err(ActionError::WrongPhase);
                }
                if round.declarations[seat].is_some() {
                    return Err(ActionError::AlreadyDeclared);
                }
                if round.hands[seat].len() != HAND_SIZE {
                    return Err(ActionError::NotAllCards);
                }
            }
            Action::ExchangeCards { .. } => {
                self.expect_phase(Phase::CardExchange)?;
                if round.exchanges[seat].is_some() {
                    return Err(ActionError::AlreadyExchanged);
                }
            }
            Action::PlayCards { .. } | Action::Pass => {
                self.expect_phase(Phase::Playing)?;
                if round.pending.is_some() {
                    return Err(ActionError::PendingDecision);
                }
                if round.is_finished(seat) {
                    return Err(ActionError::AlreadyFinished);
                }
                if matches!(action, Action::Pass) {
                    if round.turn != Some(seat) {
                        return Err(ActionError::NotYourTurn);
                    }
                    if round.trick.is_empty() {
                        return Err(ActionError::CannotPass);
                    }
                }
            }
            Action::DragonGive { .. } => {
                self.expect_phase(Phase::Playing)?;
                match &round.pending {
                    Some(Pending::DragonGive { winner, .. }) if *winner == seat => {}
                    Some(Pending::DragonGive { .. }) => return Err(ActionError::NotYourDecision),
                    _ => return Err(ActionError::WrongPhase),
                }
            }
            Action::CallRank { .. } => {
                self.expect_phase(Phase::Playing)?;
                match &round.pending {
                    Some(Pending::RankCall { seat: caller }) if *caller == seat => {}
                    Some(Pending::RankCall { .. }) => return Err(ActionError::NotYourDecision),
                    _ => return Err(ActionError::WrongPhase),
                }
            }
            Action::NextRound => self.expect_phase(Phase::RoundEnd)?,
        }
        Ok(())
    }

    // --- 发牌前后的一次性决定 ---

    fn respond_large_tichu(&mut self, seat: Seat, declare: bool) -> Vec<GameEvent> {
        let round = &mut self.round;
        round.large_responses[seat] = true;
        let mut events = Vec::new();
        if declare {
            round.declarations[seat] = Some(Declaration::LargeTichu);
            events.push(GameEvent::LargeTichuDeclared { seat });
        } else {
            events.push(GameEvent::LargeTichuPassed { seat });
        }
        if round.large_responses.iter().all(|r| *r) {
            self.deal_remaining(&mut events);
        }
        events
    }

    fn deal_remaining(&mut self, events: &mut Vec<GameEvent>) {
        self.phase = Phase::DealingRemaining6;
        for seat in 0..SEATS {
            let rest = std::mem::take(&mut self.round.undealt[seat]);
            let hand = &mut self.round.hands[seat];
            hand.extend(rest);
            sort_cards(hand);
        }
        self.phase = Phase::CardExchange;
        events.push(GameEvent::RemainingCardsDealt);
    }

    fn declare_small_tichu(&mut self, seat: Seat) -> Vec<GameEvent> {
        self.round.declarations[seat] = Some(Declaration::SmallTichu);
        vec![GameEvent::SmallTichuDeclared { seat }]
    }

    fn exchange(&mut self, seat: Seat, exchange: Exchange) -> Result<Vec<GameEvent>, ActionError> {
        let cards = exchange.cards();
        if cards[0] == cards[1] || cards[0] == cards[2] || cards[1] == cards[2] {
            return Err(ActionError::DuplicateCards);
        }
        if let Some(missing) = cards.iter().find(|c| !self.round.holds(seat, c)) {
            return Err(ActionError::CardNotInHand(missing.to_string()));
        }

        self.round.exchanges[seat] = Some(exchange);
        let mut events = vec![GameEvent::ExchangeCommitted { seat }];
        if self.round.exchanges.iter().all(Option::is_some) {
            self.complete_exchange(&mut events);
        }
        Ok(events)
    }

    /// 四人都选好后一次性交换，持雀者首出
    fn complete_exchange(&mut self, events: &mut Vec<GameEvent>) {
        let committed: Vec<(Seat, Exchange)> = self
            .round
            .exchanges
            .iter()
            .enumerate()
            .filter_map(|(seat, ex)| ex.map(|ex| (seat, ex)))
            .collect();
        for (from, exchange) in &committed {
            self.round.remove_cards(*from, &exchange.cards());
        }
        for (from, exchange) in &committed {
            for (to, card) in exchange.deliveries(*from) {
                self.round.hands[to].push(card);
            }
        }
        for hand in self.round.hands.iter_mut() {
            sort_cards(hand);
        }

        let lead = self.round.holder_of(&Card::Bird).unwrap_or(0);
        self.round.turn = Some(lead);
        self.phase = Phase::Playing;
        events.push(GameEvent::ExchangeCompleted { lead });
    }

    // --- 出牌 ---

    fn play_cards(
        &mut self,
        seat: Seat,
        cards: Vec<Card>,
        call_rank: Option<&str>,
    ) -> Result<Vec<GameEvent>, ActionError> {
        if cards.is_empty() {
            return Err(ActionError::EmptySelection);
        }
        if cards.iter().collect::<HashSet<_>>().len() != cards.len() {
            return Err(ActionError::DuplicateCards);
        }
        if let Some(missing) = cards.iter().find(|c| !self.round.holds(seat, c)) {
            return Err(ActionError::CardNotInHand(missing.to_string()));
        }

        let combo = classify(&cards).ok_or(ActionError::IllegalCombination)?;
        let top = self.round.top().map(|entry| entry.combo.clone());
        let combo = resolve_phoenix(combo, top.as_ref());
        let on_turn = self.round.turn == Some(seat);

        // 不是自己的回合时只能用炸弹插队
        if !on_turn && !(combo.is_bomb() && top.is_some()) {
            return Err(ActionError::NotYourTurn);
        }
        if combo.kind == ComboKind::Dog && top.is_some() {
            return Err(ActionError::DogMustLead);
        }
        if let Some(top) = &top {
            if !can_beat(top, &combo) {
                return Err(ActionError::TooWeak);
            }
        }
        let has_bird = cards.contains(&Card::Bird);
        let new_call = match call_rank {
            Some(label) if has_bird => Some(parse_call(label)?),
            _ => None,
        };
        if let Some(rank) = self.round.call {
            let plays_called = cards.iter().any(|c| c.rank() == Some(rank));
            if on_turn && !plays_called && self.call_obligation(seat).is_some() {
                return Err(ActionError::UnmetCall(rank));
            }
        }

        // 校验完毕，开始修改状态
        let mut events = Vec::new();
        self.round.remove_cards(seat, &cards);
        self.round.passes = 0;
        if let Some(rank) = self.round.call {
            if cards.iter().any(|c| c.rank() == Some(rank)) {
                self.round.call = None;
                events.push(GameEvent::CallFulfilled { seat, rank });
            }
        }

        if combo.kind == ComboKind::Dog {
            self.round.piles[seat].extend(cards);
            let mut finished = Vec::new();
            self.record_finish(seat, &mut finished);
            // 出牌权交给搭档，搭档已出完则交给其后第一个还有牌的座位
            let lead = self.round.active_from(partner_of(seat));
            events.push(GameEvent::DogPlayed { seat, lead: lead.unwrap_or(seat) });
            events.extend(finished);
            if self.round.is_over() {
                self.close_round(&mut events);
            } else {
                self.round.turn = lead;
            }
            return Ok(events);
        }

        let played = if combo.is_bomb() {
            GameEvent::BombPlayed { seat, cards: cards.clone(), combo: combo.clone() }
        } else {
            GameEvent::CardsPlayed { seat, cards: cards.clone(), combo: combo.clone() }
        };
        events.push(played);
        self.round.trick.push(TrickEntry { seat, cards, combo });
        self.record_finish(seat, &mut events);

        if self.round.is_over() {
            self.close_round(&mut events);
            return Ok(events);
        }
        self.round.turn = self.round.next_active(seat);

        if has_bird {
            match new_call {
                Some(rank) => {
                    self.round.call = rank;
                    events.push(GameEvent::CallRankSet { seat, rank });
                }
                None => {
                    self.round.pending = Some(Pending::RankCall { seat });
                    events.push(GameEvent::RankCallRequired { seat });
                }
            }
        }
        Ok(events)
    }

    fn pass(&mut self, seat: Seat) -> Result<Vec<GameEvent>, ActionError> {
        if let Some(rank) = self.round.call {
            if self.call_obligation(seat).is_some() {
                return Err(ActionError::UnmetCall(rank));
            }
        }

        self.round.passes += 1;
        let mut events = vec![GameEvent::Passed { seat }];
        if self.round.passes >= self.round.passes_needed() {
            self.win_trick(&mut events);
        } else {
            self.round.turn = self.round.next_active(seat);
        }
        Ok(events)
    }

    fn record_finish(&mut self, seat: Seat, events: &mut Vec<GameEvent>) {
        if self.round.hands[seat].is_empty() && !self.round.is_finished(seat) {
            self.round.finish_order.push(seat);
            let place = self.round.finish_order.len();
            events.push(GameEvent::PlayerFinished { seat, place });
        }
    }

    /// 桌面最大那手牌的出牌者赢下这一墩；含龙时先挂起，等赢家把牌送给对手
    fn win_trick(&mut self, events: &mut Vec<GameEvent>) {
        let Some(top) = self.round.top() else {
            return;
        };
        let winner = top.seat;
        let dragon = top.cards.contains(&Card::Dragon);
        let cards: Vec<Card> = self.round.trick.drain(..).flat_map(|entry| entry.cards).collect();
        self.round.passes = 0;

        if dragon {
            self.round.turn = None;
            self.round.pending = Some(Pending::DragonGive { winner, cards });
            events.push(GameEvent::DragonGiveRequired { seat: winner });
        } else {
            let points = card_points(&cards);
            self.round.piles[winner].extend(cards);
            self.round.turn = self.round.active_from(winner);
            events.push(GameEvent::TrickWon { seat: winner, points });
        }
    }

    // --- 挂起决定 ---

    fn give_dragon(&mut self, seat: Seat, target: Relative) -> Result<Vec<GameEvent>, ActionError> {
        if !matches!(self.round.pending, Some(Pending::DragonGive { .. })) {
            return Err(ActionError::WrongPhase);
        }
        let to = target.resolve(seat);
        if Team::of(to) == Team::of(seat) {
            return Err(ActionError::InvalidDragonTarget);
        }
        let cards = match self.round.pending.take() {
            Some(Pending::DragonGive { cards, .. }) => cards,
            _ => Vec::new(),
        };

        let points = card_points(&cards);
        self.round.piles[to].extend(cards);
        let mut events = vec![GameEvent::DragonGiven { from: seat, to, points }];
        if self.round.is_over() {
            self.finish_round(&mut events);
        } else {
            self.round.turn = self.round.active_from(seat);
        }
        Ok(events)
    }

    fn set_call(&mut self, seat: Seat, label: &str) -> Result<Vec<GameEvent>, ActionError> {
        let rank = parse_call(label)?;
        self.round.pending = None;
        self.round.call = rank;
        Ok(vec![GameEvent::CallRankSet { seat, rank }])
    }

    // --- 一轮结束 ---

    /// 出完的人数够了：补上最后一名，处理桌上剩下的牌，然后计分
    fn close_round(&mut self, events: &mut Vec<GameEvent>) {
        let one_two = self.round.is_one_two();
        if !one_two {
            if let Some(last) = (0..SEATS).find(|s| !self.round.is_finished(*s)) {
                self.round.finish_order.push(last);
            }
        }
        self.round.pending = None;
        self.round.turn = None;

        if one_two {
            // 包揽前两名时赢牌不计分，桌上的牌直接归最后出牌者
            if let Some(winner) = self.round.top().map(|entry| entry.seat) {
                let cards: Vec<Card> =
                    self.round.trick.drain(..).flat_map(|entry| entry.cards).collect();
                self.round.piles[winner].extend(cards);
            }
        } else {
            self.win_trick(events);
            if self.round.pending.is_some() {
                // 送完龙再结算
                return;
            }
        }
        self.finish_round(events);
    }

    fn finish_round(&mut self, events: &mut Vec<GameEvent>) {
        let round = &self.round;
        let score = score_round(&round.finish_order, &round.piles, &round.hands, &round.declarations);
        self.round.score = Some(score);
        self.round.turn = None;
        self.scores += score;
        self.history.push(score);
        self.phase = Phase::RoundEnd;
        info!(
            round_no = self.round_no,
            team_a = score.team_a,
            team_b = score.team_b,
            total_a = self.scores.team_a,
            total_b = self.scores.team_b,
            "本轮结束"
        );
        events.push(GameEvent::RoundEnded { round: score, totals: self.scores });

        if let Some(winner) = self.scores.leader_at(self.config.target_score) {
            self.phase = Phase::GameEnd;
            self.winner = Some(winner);
            info!(?winner, "比赛结束");
            events.push(GameEvent::GameEnded { winner, totals: self.scores });
        }
    }

    fn next_round(&mut self) -> Vec<GameEvent> {
        self.round_no += 1;
        self.start_round()
    }

    // --- 查询 ---

    /// 如果有被叫的点数，返回该座位能用来履行叫牌的一手牌 (否则义务解除)
    pub fn call_obligation(&self, seat: Seat) -> Option<Vec<Card>> {
        let rank = self.round.call?;
        let top = self.round.top().map(|entry| &entry.combo);
        find_call_fulfilment(&self.round.hands[seat], top, rank)
    }

    /// 假如当前应当行动的座位被强制行动 (例如超时)，它会做什么。不修改状态。
    pub fn timeout_action(&self) -> Option<(Seat, Action)> {
        let round = &self.round;
        let seat = match self.phase {
            Phase::LargeTichu => (0..SEATS).find(|s| !round.large_responses[*s])?,
            Phase::CardExchange => (0..SEATS).find(|s| round.exchanges[*s].is_none())?,
            Phase::Playing => match &round.pending {
                Some(pending) => pending.decider(),
                None => round.turn?,
            },
            Phase::RoundEnd => 0,
            _ => return None,
        };
        let action = PassiveStrategy.decide(&self.view_for(seat))?;
        Some((seat, action))
    }
}

/// 解析叫牌：点数标签或 `"none"` (不叫)
pub fn parse_call(label: &str) -> Result<Option<Rank>, ActionError> {
    if label == "none" {
        return Ok(None);
    }
    Rank::from_label(label).map(Some).ok_or_else(|| ActionError::InvalidRank(label.to_string()))
}

/// 叫牌义务的穷举搜索。
///
/// 手牌最多 14 张，把每个子集编码成位掩码，对所有掩码只遍历一遍 (最多 2^14 个)：
/// 子集必须包含至少一张被叫点数的普通牌、必须是合法牌型 (狗除外)，
/// 并且在桌面有牌时能压过桌面。返回张数最少的那手牌，张数相同时取掩码最小的；
/// 找不到时义务解除。
pub fn find_call_fulfilment(hand: &[Card], top: Option<&Combo>, rank: Rank) -> Option<Vec<Card>> {
    let n = hand.len();
    let called = hand
        .iter()
        .enumerate()
        .filter(|(_, c)| c.rank() == Some(rank))
        .fold(0u32, |mask, (i, _)| mask | 1 << i);
    if called == 0 {
        return None;
    }
    let subset = |mask: u32| -> Vec<Card> { (0..n).filter(|i| mask & (1 << i) != 0).map(|i| hand[i]).collect() };

    let mut best: Option<u32> = None;
    for mask in 1..(1u32 << n) {
        if mask & called == 0 || best.is_some_and(|b| mask.count_ones() >= b.count_ones()) {
            continue;
        }
        let Some(combo) = classify(&subset(mask)) else {
            continue;
        };
        if combo.kind == ComboKind::Dog {
            continue;
        }
        let combo = resolve_phoenix(combo, top);
        if top.is_none_or(|top| can_beat(top, &combo)) {
            best = Some(mask);
            if mask.count_ones() == 1 {
                break;
            }
        }
    }
    best.map(subset)
}

// --- 单元测试 ---

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::{DECK_SIZE, Suit, full_deck};
    use crate::config::GameConfig;
    use Rank::*;
    use Suit::*;
    use uuid::Uuid;

    fn card(rank: Rank, suit: Suit) -> Card {
        Card::new(rank, suit)
    }

    fn new_game() -> Game {
        let seats = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        Game::new(seats, GameConfig::with_seed(2024))
    }

    /// 直接摆好出牌阶段的手牌；其余的牌放进座位 0 的赢牌堆以保持 56 张
    fn playing_game(hands: [Vec<Card>; SEATS], turn: Seat) -> Game {
        let mut game = new_game();
        let mut round = Round::default();
        let used: Vec<Card> = hands.iter().flatten().copied().collect();
        round.piles[0] = full_deck().into_iter().filter(|c| !used.contains(c)).collect();
        round.hands = hands;
        round.large_responses = [true; SEATS];
        round.turn = Some(turn);
        game.round = round;
        game.phase = Phase::Playing;
        game
    }

    fn assert_conserved(game: &Game) {
        assert_eq!(game.round.card_count(), DECK_SIZE, "牌数必须守恒");
    }

    #[test]
    fn start_deals_first_eight() {
        let mut game = new_game();
        let events = game.start().unwrap();
        assert_eq!(events, vec![GameEvent::RoundStarted { round_no: 0 }]);
        assert_eq!(game.phase, Phase::LargeTichu);
        assert!(game.round.hands.iter().all(|h| h.len() == 8));
        assert_conserved(&game);
        assert_eq!(game.start(), Err(ActionError::WrongPhase));
    }

    #[test]
    fn large_tichu_then_remaining_six() {
        let mut game = new_game();
        game.start().unwrap();
        game.apply(0, Action::DeclareLargeTichu).unwrap();
        assert_eq!(game.apply(0, Action::PassLargeTichu), Err(ActionError::AlreadyResponded));
        assert_eq!(game.apply(1, Action::DeclareSmallTichu), Err(ActionError::WrongPhase));
        for seat in 1..SEATS {
            game.apply(seat, Action::PassLargeTichu).unwrap();
        }
        assert_eq!(game.phase, Phase::CardExchange);
        assert!(game.round.hands.iter().all(|h| h.len() == HAND_SIZE));
        assert_eq!(game.round.declarations[0], Some(Declaration::LargeTichu));
        assert_conserved(&game);
    }

    #[test]
    fn exchange_swaps_atomically_and_bird_leads() {
        let mut game = new_game();
        game.start().unwrap();
        for seat in 0..SEATS {
            game.apply(seat, Action::PassLargeTichu).unwrap();
        }
        let before = game.round.hands.clone();
        let mut given = Vec::new();
        for seat in 0..SEATS {
            let h = &before[seat];
            let ex = Exchange { left: h[0], partner: h[1], right: h[2] };
            given.push((seat, ex));
            game.apply(seat, Action::ExchangeCards { left: ex.left, partner: ex.partner, right: ex.right })
                .unwrap();
            if seat < SEATS - 1 {
                assert_eq!(game.round.hands[seat].len(), HAND_SIZE, "四人都提交前不交换");
            }
        }
        assert_eq!(game.phase, Phase::Playing);
        for (from, ex) in given {
            assert!(game.round.hands[left_of(from)].contains(&ex.left));
            assert!(game.round.hands[partner_of(from)].contains(&ex.partner));
            assert!(game.round.hands[right_of(from)].contains(&ex.right));
        }
        let bird_holder = game.round.holder_of(&Card::Bird).unwrap();
        assert_eq!(game.round.turn, Some(bird_holder));
        assert_conserved(&game);
    }

    #[test]
    fn exchange_rejects_bad_selection() {
        let mut game = new_game();
        game.start().unwrap();
        for seat in 0..SEATS {
            game.apply(seat, Action::PassLargeTichu).unwrap();
        }
        let h = game.round.hands[0].clone();
        let other = game.round.hands[1][0];
        assert_eq!(
            game.apply(0, Action::ExchangeCards { left: h[0], partner: h[0], right: h[1] }),
            Err(ActionError::DuplicateCards)
        );
        assert_eq!(
            game.apply(0, Action::ExchangeCards { left: h[0], partner: other, right: h[1] }),
            Err(ActionError::CardNotInHand(other.to_string()))
        );
        game.apply(0, Action::ExchangeCards { left: h[0], partner: h[1], right: h[2] }).unwrap();
        assert_eq!(
            game.apply(0, Action::ExchangeCards { left: h[3], partner: h[4], right: h[5] }),
            Err(ActionError::AlreadyExchanged)
        );
    }

    #[test]
    fn small_tichu_only_with_fourteen_cards() {
        let mut game = playing_game(
            [
                vec![card(Two, Jade), card(Three, Jade)],
                vec![card(Four, Jade)],
                vec![card(Five, Jade)],
                vec![card(Six, Jade)],
            ],
            0,
        );
        assert_eq!(game.apply(0, Action::DeclareSmallTichu), Err(ActionError::NotAllCards));

        let mut game = new_game();
        game.start().unwrap();
        for seat in 0..SEATS {
            game.apply(seat, Action::PassLargeTichu).unwrap();
        }
        game.apply(2, Action::DeclareSmallTichu).unwrap();
        assert_eq!(game.apply(2, Action::DeclareSmallTichu), Err(ActionError::AlreadyDeclared));
    }

    #[test]
    fn play_validation_errors_do_not_mutate() {
        let mut game = playing_game(
            [
                vec![card(Two, Jade), card(Three, Jade), card(Nine, Star)],
                vec![card(Four, Jade), card(Four, Star)],
                vec![card(Five, Jade)],
                vec![card(Six, Jade)],
            ],
            0,
        );
        let snapshot = game.clone();
        assert_eq!(game.apply(0, Action::play(vec![])), Err(ActionError::EmptySelection));
        assert_eq!(
            game.apply(0, Action::play(vec![card(Four, Jade)])),
            Err(ActionError::CardNotInHand("jade_4".to_string()))
        );
        assert_eq!(
            game.apply(0, Action::play(vec![card(Two, Jade), card(Three, Jade)])),
            Err(ActionError::IllegalCombination)
        );
        assert_eq!(game.apply(1, Action::play(vec![card(Four, Jade)])), Err(ActionError::NotYourTurn));
        assert_eq!(game.apply(0, Action::Pass), Err(ActionError::CannotPass));
        assert_eq!(game, snapshot);

        game.apply(0, Action::play(vec![card(Nine, Star)])).unwrap();
        assert_eq!(game.apply(1, Action::play(vec![card(Four, Jade)])), Err(ActionError::TooWeak));
        assert_eq!(
            game.apply(1, Action::play(vec![card(Four, Jade), card(Four, Star)])),
            Err(ActionError::TooWeak)
        );
    }

    #[test]
    fn trick_is_won_after_three_passes() {
        let mut game = playing_game(
            [
                vec![card(King, Jade), card(Two, Jade)],
                vec![card(Four, Jade), card(Two, Star)],
                vec![card(Five, Jade), card(Two, Sword)],
                vec![card(Six, Jade), card(Two, Pagoda)],
            ],
            0,
        );
        let pile_before = game.round.piles[0].len();
        game.apply(0, Action::play(vec![card(King, Jade)])).unwrap();
        game.apply(1, Action::Pass).unwrap();
        game.apply(2, Action::Pass).unwrap();
        let events = game.apply(3, Action::Pass).unwrap();
        assert!(events.contains(&GameEvent::TrickWon { seat: 0, points: 10 }));
        assert_eq!(game.round.piles[0].len(), pile_before + 1);
        assert_eq!(game.round.turn, Some(0));
        assert!(game.round.trick.is_empty());
        assert_conserved(&game);
    }

    #[test]
    fn bomb_interrupts_out_of_turn() {
        let bomb = vec![card(Three, Jade), card(Three, Star), card(Three, Sword), card(Three, Pagoda)];
        let mut hand2 = bomb.clone();
        hand2.push(card(Ace, Jade));
        let mut game = playing_game(
            [
                vec![card(King, Jade), card(Two, Jade)],
                vec![card(Four, Jade), card(Two, Star)],
                hand2,
                vec![card(Six, Jade), card(Two, Pagoda)],
            ],
            0,
        );
        game.apply(0, Action::play(vec![card(King, Jade)])).unwrap();
        let events = game.apply(2, Action::play(bomb)).unwrap();
        assert!(matches!(events[0], GameEvent::BombPlayed { seat: 2, .. }));
        assert_eq!(game.round.turn, Some(3));
        assert_eq!(game.round.passes, 0);
        // 非炸弹仍然要等轮到自己
        assert_eq!(game.apply(1, Action::play(vec![card(Four, Jade)])), Err(ActionError::NotYourTurn));
    }

    #[test]
    fn dog_passes_lead_to_partner() {
        let mut game = playing_game(
            [
                vec![Card::Dog, card(Two, Jade)],
                vec![card(Four, Jade), card(Two, Star)],
                vec![card(Five, Jade), card(Two, Sword)],
                vec![card(Six, Jade), card(Two, Pagoda)],
            ],
            0,
        );
        let events = game.apply(0, Action::play(vec![Card::Dog])).unwrap();
        assert_eq!(events, vec![GameEvent::DogPlayed { seat: 0, lead: 2 }]);
        assert_eq!(game.round.turn, Some(2));
        assert!(game.round.trick.is_empty());
        assert!(game.round.piles[0].contains(&Card::Dog));
        assert_conserved(&game);
    }

    #[test]
    fn dog_skips_finished_partner_and_cannot_reply() {
        let mut game = playing_game(
            [
                vec![Card::Dog, card(Two, Jade)],
                vec![card(Four, Jade), card(Two, Star)],
                vec![],
                vec![card(Six, Jade), card(Two, Pagoda)],
            ],
            3,
        );
        game.round.finish_order = vec![2];
        game.apply(3, Action::play(vec![card(Six, Jade)])).unwrap();
        assert_eq!(game.apply(0, Action::play(vec![Card::Dog])), Err(ActionError::DogMustLead));
        game.apply(0, Action::Pass).unwrap();
        game.apply(1, Action::Pass).unwrap();
        assert_eq!(game.round.turn, Some(3));
        game.apply(3, Action::play(vec![card(Two, Pagoda)])).unwrap();
        game.apply(0, Action::Pass).unwrap();
        game.apply(1, Action::Pass).unwrap();
        // 座位 3 出完，由下一位座位 0 首出
        assert_eq!(game.round.turn, Some(0));
        let events = game.apply(0, Action::play(vec![Card::Dog])).unwrap();
        // 搭档 2 和其后的 3 都已出完，出牌权回到座位 0
        assert_eq!(events[0], GameEvent::DogPlayed { seat: 0, lead: 0 });
        assert_eq!(game.round.turn, Some(0));
    }

    #[test]
    fn dragon_trick_waits_for_opponent_target() {
        let mut game = playing_game(
            [
                vec![Card::Dragon, card(Two, Jade)],
                vec![card(Four, Jade), card(Two, Star)],
                vec![card(Five, Jade), card(Two, Sword)],
                vec![card(Six, Jade), card(Two, Pagoda)],
            ],
            0,
        );
        let piles_before = game.round.piles.clone();
        game.apply(0, Action::play(vec![Card::Dragon])).unwrap();
        game.apply(1, Action::Pass).unwrap();
        game.apply(2, Action::Pass).unwrap();
        let events = game.apply(3, Action::Pass).unwrap();
        assert!(events.contains(&GameEvent::DragonGiveRequired { seat: 0 }));
        assert_eq!(game.round.piles, piles_before, "送龙之前不计入任何赢牌堆");
        assert_conserved(&game);

        assert_eq!(game.apply(0, Action::play(vec![card(Two, Jade)])), Err(ActionError::PendingDecision));
        assert_eq!(
            game.apply(0, Action::DragonGive { target: Relative::Partner }),
            Err(ActionError::InvalidDragonTarget)
        );
        assert_eq!(
            game.apply(1, Action::DragonGive { target: Relative::Left }),
            Err(ActionError::NotYourDecision)
        );
        let events = game.apply(0, Action::DragonGive { target: Relative::Left }).unwrap();
        assert_eq!(events, vec![GameEvent::DragonGiven { from: 0, to: 3, points: 25 }]);
        assert_eq!(game.round.piles[3], vec![Card::Dragon]);
        assert_eq!(game.round.turn, Some(0));
        assert_conserved(&game);
    }

    #[test]
    fn bird_without_call_blocks_until_rank_called() {
        let mut game = playing_game(
            [
                vec![Card::Bird, card(Two, Jade)],
                vec![card(Seven, Jade), card(Two, Star)],
                vec![card(Five, Jade), card(Two, Sword)],
                vec![card(Six, Jade), card(Two, Pagoda)],
            ],
            0,
        );
        let events = game.apply(0, Action::play(vec![Card::Bird])).unwrap();
        assert!(events.contains(&GameEvent::RankCallRequired { seat: 0 }));
        assert_eq!(game.apply(1, Action::Pass), Err(ActionError::PendingDecision));
        assert_eq!(game.apply(1, Action::CallRank { rank: "7".into() }), Err(ActionError::NotYourDecision));
        assert_eq!(
            game.apply(0, Action::CallRank { rank: "11".into() }),
            Err(ActionError::InvalidRank("11".into()))
        );
        game.apply(0, Action::CallRank { rank: "7".into() }).unwrap();
        assert_eq!(game.round.call, Some(Seven));

        // 座位 1 有 7 且能压过雀，必须出 7
        assert!(game.view_for(1).must_fulfil_call);
        assert_eq!(game.apply(1, Action::Pass), Err(ActionError::UnmetCall(Seven)));
        assert_eq!(
            game.apply(1, Action::play(vec![card(Two, Star)])),
            Err(ActionError::UnmetCall(Seven))
        );
        let events = game.apply(1, Action::play(vec![card(Seven, Jade)])).unwrap();
        assert_eq!(events[0], GameEvent::CallFulfilled { seat: 1, rank: Seven });
        assert_eq!(game.round.call, None);
    }

    #[test]
    fn phoenix_does_not_fulfil_call_but_interrupting_bomb_is_exempt() {
        let nines = vec![card(Nine, Jade), card(Nine, Star), card(Nine, Sword), card(Nine, Pagoda)];
        let mut seat2 = nines.clone();
        seat2.push(card(Three, Jade));
        let mut game = playing_game(
            [
                vec![card(Six, Jade), card(Two, Jade)],
                vec![Card::Phoenix, card(Seven, Jade), card(Two, Star)],
                seat2,
                vec![card(Four, Jade), card(Two, Pagoda)],
            ],
            0,
        );
        game.round.call = Some(Seven);
        game.apply(0, Action::play(vec![card(Six, Jade)])).unwrap();

        // 凤凰单张当 6.5 出，但不算被叫的点数
        assert_eq!(game.apply(1, Action::play(vec![Card::Phoenix])), Err(ActionError::UnmetCall(Seven)));
        assert_eq!(game.round.hands[1].len(), 3);

        // 座位 2 不在回合上，插队的炸弹不受叫牌约束
        let events = game.apply(2, Action::play(nines)).unwrap();
        assert!(matches!(events[0], GameEvent::BombPlayed { seat: 2, .. }));
        assert_eq!(game.round.call, Some(Seven));
        assert_eq!(game.round.turn, Some(3));
        assert_conserved(&game);
    }

    #[test]
    fn obliged_seat_cannot_dodge_call_with_bomb() {
        let nines = vec![card(Nine, Jade), card(Nine, Star), card(Nine, Sword), card(Nine, Pagoda)];
        let mut seat1 = nines.clone();
        seat1.push(card(Seven, Jade));
        let mut game = playing_game(
            [
                vec![card(Six, Jade), card(Two, Jade)],
                seat1,
                vec![card(Five, Jade), card(Two, Sword)],
                vec![card(Four, Jade), card(Two, Pagoda)],
            ],
            0,
        );
        game.round.call = Some(Seven);
        game.apply(0, Action::play(vec![card(Six, Jade)])).unwrap();

        assert_eq!(game.apply(1, Action::play(nines)), Err(ActionError::UnmetCall(Seven)));
        let events = game.apply(1, Action::play(vec![card(Seven, Jade)])).unwrap();
        assert_eq!(events[0], GameEvent::CallFulfilled { seat: 1, rank: Seven });
        assert_conserved(&game);
    }

    #[test]
    fn bomb_cannot_interrupt_empty_trick_but_may_lead() {
        let nines = vec![card(Nine, Jade), card(Nine, Star), card(Nine, Sword), card(Nine, Pagoda)];
        let threes = vec![card(Three, Jade), card(Three, Star), card(Three, Sword), card(Three, Pagoda)];
        let mut seat0 = threes.clone();
        seat0.push(card(Two, Jade));
        let mut seat2 = nines.clone();
        seat2.push(card(Two, Sword));
        let mut game = playing_game(
            [
                seat0,
                vec![card(Four, Jade), card(Two, Star)],
                seat2,
                vec![card(Five, Jade), card(Two, Pagoda)],
            ],
            0,
        );

        assert_eq!(game.apply(2, Action::play(nines)), Err(ActionError::NotYourTurn));
        assert_eq!(game.round.hands[2].len(), 5);

        let events = game.apply(0, Action::play(threes)).unwrap();
        assert!(matches!(events[0], GameEvent::BombPlayed { seat: 0, .. }));
        assert_eq!(game.round.turn, Some(1));
        assert_conserved(&game);
    }

    #[test]
    fn inline_call_and_lifted_obligation() {
        let mut game = playing_game(
            [
                vec![Card::Bird, card(Ace, Jade), card(Two, Jade)],
                vec![card(Seven, Jade), card(Two, Star)],
                vec![card(Five, Jade), card(Two, Sword)],
                vec![card(Six, Jade), card(Two, Pagoda)],
            ],
            0,
        );
        game.apply(0, Action::PlayCards { cards: vec![Card::Bird], call_rank: Some("7".into()) })
            .unwrap();
        assert_eq!(game.round.call, Some(Seven));
        assert!(game.round.pending.is_none());
        game.apply(1, Action::play(vec![card(Seven, Jade)])).unwrap();
        // 叫牌已履行，之后可以自由过牌
        game.apply(2, Action::Pass).unwrap();

        let mut game = playing_game(
            [
                vec![card(Ace, Jade), card(Two, Jade)],
                vec![card(Seven, Jade), card(Two, Star)],
                vec![card(Five, Jade), card(Two, Sword)],
                vec![card(Six, Jade), card(Two, Pagoda)],
            ],
            0,
        );
        game.round.call = Some(Seven);
        game.apply(0, Action::play(vec![card(Ace, Jade)])).unwrap();
        // 7 压不过 A，义务解除
        assert!(game.call_obligation(1).is_none());
        game.apply(1, Action::Pass).unwrap();
        assert_eq!(game.round.call, Some(Seven));
    }

    #[test]
    fn fulfilment_search_finds_combinations() {
        let hand = vec![
            card(Three, Jade),
            card(Four, Star),
            card(Five, Sword),
            card(Six, Jade),
            card(Seven, Pagoda),
            card(Seven, Star),
        ];
        let pair = classify(&[card(Six, Sword), card(Six, Star)]).unwrap();
        let found = find_call_fulfilment(&hand, Some(&pair), Seven).unwrap();
        assert_eq!(found, vec![card(Seven, Pagoda), card(Seven, Star)]);

        let straight =
            classify(&[card(Two, Sword), card(Three, Star), card(Four, Jade), card(Five, Jade), card(Six, Star)])
                .unwrap();
        let found = find_call_fulfilment(&hand, Some(&straight), Seven).unwrap();
        assert_eq!(found.len(), 5);
        assert!(can_beat(&straight, &classify(&found).unwrap()));

        assert!(find_call_fulfilment(&hand, None, Ace).is_none());
    }

    #[test]
    fn fulfilment_prefers_fewest_cards() {
        let hand = vec![
            card(Seven, Jade),
            card(Seven, Star),
            card(Seven, Sword),
            card(Seven, Pagoda),
            card(Eight, Jade),
        ];
        let six = classify(&[card(Six, Sword)]).unwrap();
        assert_eq!(find_call_fulfilment(&hand, Some(&six), Seven), Some(vec![card(Seven, Jade)]));
        // 首出时同样只需要一张
        assert_eq!(find_call_fulfilment(&hand, None, Seven), Some(vec![card(Seven, Jade)]));
    }

    #[test]
    fn dragon_give_without_pending_dragon_keeps_state() {
        let mut game = playing_game(
            [
                vec![Card::Bird, card(Two, Jade)],
                vec![card(Seven, Jade), card(Two, Star)],
                vec![card(Five, Jade), card(Two, Sword)],
                vec![card(Six, Jade), card(Two, Pagoda)],
            ],
            0,
        );
        game.apply(0, Action::play(vec![Card::Bird])).unwrap();
        let before = game.clone();
        assert_eq!(game.give_dragon(0, Relative::Left), Err(ActionError::WrongPhase));
        assert_eq!(game.round.pending, Some(Pending::RankCall { seat: 0 }));
        assert_eq!(game, before);
    }

    #[test]
    fn one_two_finish_ends_round_immediately() {
        let mut game = playing_game(
            [
                vec![card(Ace, Jade)],
                vec![card(Four, Jade), card(Two, Star)],
                vec![card(King, Jade)],
                vec![card(Six, Jade), card(Two, Pagoda)],
            ],
            2,
        );
        game.round.finish_order = vec![];
        game.apply(2, Action::play(vec![card(King, Jade)])).unwrap();
        game.apply(3, Action::Pass).unwrap();
        let events = game.apply(0, Action::play(vec![card(Ace, Jade)])).unwrap();
        assert!(events.contains(&GameEvent::PlayerFinished { seat: 0, place: 2 }));
        assert_eq!(game.phase, Phase::RoundEnd);
        assert_eq!(game.round.finish_order, vec![2, 0]);
        assert_eq!(game.round.score, Some(crate::scoring::TeamScores { team_a: 200, team_b: 0 }));
        assert_conserved(&game);
    }

    #[test]
    fn third_finisher_ends_round_and_last_is_appended() {
        let mut game = playing_game(
            [
                vec![card(Ace, Jade)],
                vec![card(Four, Jade), card(Two, Star)],
                vec![],
                vec![],
            ],
            0,
        );
        game.round.finish_order = vec![2, 3];
        let events = game.apply(0, Action::play(vec![card(Ace, Jade)])).unwrap();
        assert!(events.iter().any(|e| matches!(e, GameEvent::RoundEnded { .. })));
        assert_eq!(game.round.finish_order, vec![2, 3, 0, 1]);
        // 桌上的 A 归出牌者座位 0
        assert!(game.round.piles[0].contains(&card(Ace, Jade)));
        assert_eq!(game.phase, Phase::RoundEnd);
        assert_conserved(&game);
    }

    #[test]
    fn dragon_on_table_at_round_end_still_needs_give() {
        let mut game = playing_game(
            [vec![Card::Dragon], vec![card(Four, Jade)], vec![], vec![]],
            0,
        );
        game.round.finish_order = vec![3, 2];
        game.apply(0, Action::play(vec![Card::Dragon])).unwrap();
        assert_eq!(game.phase, Phase::Playing);
        assert!(matches!(game.round.pending, Some(Pending::DragonGive { winner: 0, .. })));
        let events = game.apply(0, Action::DragonGive { target: Relative::Right }).unwrap();
        assert!(events.iter().any(|e| matches!(e, GameEvent::RoundEnded { .. })));
        assert!(game.round.piles[1].contains(&Card::Dragon));
        assert_eq!(game.phase, Phase::RoundEnd);
    }

    #[test]
    fn finished_leader_needs_all_remaining_passes() {
        let mut game = playing_game(
            [
                vec![card(Ace, Jade)],
                vec![card(Four, Jade), card(Two, Star)],
                vec![card(Five, Jade), card(Two, Sword)],
                vec![card(Six, Jade), card(Two, Pagoda)],
            ],
            0,
        );
        game.apply(0, Action::play(vec![card(Ace, Jade)])).unwrap();
        game.apply(1, Action::Pass).unwrap();
        game.apply(2, Action::Pass).unwrap();
        assert!(!game.round.trick.is_empty(), "还差座位 3 没有表态");
        game.apply(3, Action::Pass).unwrap();
        assert!(game.round.trick.is_empty());
        assert_eq!(game.round.turn, Some(1));
    }

    /// 座位 0 的赢牌堆里是整副牌的全部 100 分，打出最后一张后本轮结束
    fn last_card_game() -> Game {
        let mut game = playing_game(
            [vec![card(Ace, Jade)], vec![card(Four, Jade)], vec![], vec![]],
            0,
        );
        game.round.finish_order = vec![2, 3];
        game
    }

    #[test]
    fn reaching_target_ends_game() {
        let mut game = last_card_game();
        game.config.target_score = 100;
        let events = game.apply(0, Action::play(vec![card(Ace, Jade)])).unwrap();
        let totals = crate::scoring::TeamScores { team_a: 100, team_b: 0 };
        assert_eq!(events.last(), Some(&GameEvent::GameEnded { winner: Team::A, totals }));
        assert_eq!(game.phase, Phase::GameEnd);
        assert_eq!(game.winner, Some(Team::A));
        assert_eq!(game.apply(0, Action::NextRound), Err(ActionError::WrongPhase));
    }

    #[test]
    fn tie_above_target_keeps_playing() {
        let mut game = last_card_game();
        game.config.target_score = 100;
        game.scores = crate::scoring::TeamScores { team_a: 50, team_b: 150 };
        game.apply(0, Action::play(vec![card(Ace, Jade)])).unwrap();
        assert_eq!(game.scores, crate::scoring::TeamScores { team_a: 150, team_b: 150 });
        assert_eq!(game.phase, Phase::RoundEnd);
        assert!(game.winner.is_none());
    }

    #[test]
    fn next_round_redeals() {
        let mut game = last_card_game();
        game.apply(0, Action::play(vec![card(Ace, Jade)])).unwrap();
        assert_eq!(game.phase, Phase::RoundEnd);
        game.apply(1, Action::NextRound).unwrap();
        assert_eq!(game.round_no, 1);
        assert_eq!(game.phase, Phase::LargeTichu);
        assert_eq!(game.history.len(), 1);
        assert!(game.round.hands.iter().all(|h| h.len() == 8));
        assert_conserved(&game);
    }

    #[test]
    fn timeout_action_is_always_accepted() {
        let mut game = new_game();
        game.start().unwrap();
        for _ in 0..400 {
            let Some((seat, action)) = game.timeout_action() else { break };
            game.apply(seat, action).unwrap();
            assert_conserved(&game);
            if game.phase == Phase::RoundEnd {
                break;
            }
        }
        assert_eq!(game.phase, Phase::RoundEnd);
    }

    #[test]
    fn stale_actions_are_rejected() {
        let mut game = new_game();
        game.start().unwrap();
        assert_eq!(game.apply(0, Action::Pass), Err(ActionError::WrongPhase));
        assert_eq!(game.apply(0, Action::NextRound), Err(ActionError::WrongPhase));
        assert_eq!(
            game.apply(0, Action::DragonGive { target: Relative::Left }),
            Err(ActionError::WrongPhase)
        );
        assert_eq!(game.handle_action(&Uuid::new_v4(), Action::PassLargeTichu), Err(ActionError::UnknownPlayer));
    }
}
