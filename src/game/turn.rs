//! Turn ownership, the per-turn countdown bonus, and the per-turn bonus tile

use super::scoring::BonusTile;
use super::tiles::alphabet;
use super::PlayerId;
use rand::Rng;
use std::time::{Duration, Instant};

/// Seconds on the turn countdown
pub const TURN_SECONDS: u64 = 20;

/// Round-robin successor of `current` in join order.
/// An unknown `current` hands the turn to the first player.
pub fn next_player<'a, T: PartialEq>(order: &'a [T], current: &T) -> Option<&'a T> {
    if order.is_empty() {
        return None;
    }
    let next = match order.iter().position(|p| p == current) {
        Some(index) => (index + 1) % order.len(),
        None => 0,
    };
    order.get(next)
}

/// Odds used when drawing a bonus tile. The remainder is the 3x chance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BonusOdds {
    pub blank: f64,
    pub double: f64,
}

impl Default for BonusOdds {
    fn default() -> Self {
        Self {
            blank: 0.15,
            double: 0.55,
        }
    }
}

/// Draw a bonus tile: uniform letter, multiplier per `odds`
pub fn draw_bonus_tile<R: Rng + ?Sized>(rng: &mut R, odds: BonusOdds) -> BonusTile {
    let letters: Vec<char> = alphabet().collect();
    let letter = letters[rng.random_range(0..letters.len())];
    let roll: f64 = rng.random();
    let multiplier = if roll < odds.blank {
        0
    } else if roll < odds.blank + odds.double {
        2
    } else {
        3
    };
    BonusTile { letter, multiplier }
}

/// Countdown that accrues a bonus equal to the whole seconds left
#[derive(Debug, Clone)]
pub struct TurnClock {
    duration: Duration,
    started: Option<Instant>,
    time_bonus: u32,
}

impl TurnClock {
    pub fn new(seconds: u64) -> Self {
        Self {
            duration: Duration::from_secs(seconds),
            started: None,
            time_bonus: 0,
        }
    }

    /// Re-arm the countdown. Any captured bonus is discarded.
    pub fn start(&mut self, now: Instant) {
        self.started = Some(now);
        self.time_bonus = 0;
    }

    /// Cancel the countdown without capturing
    pub fn cancel(&mut self) {
        self.started = None;
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    /// Whole seconds left, 0 when stopped or expired
    pub fn remaining(&self, now: Instant) -> u32 {
        match self.started {
            Some(start) => {
                let elapsed = now.saturating_duration_since(start).as_secs();
                self.duration.as_secs().saturating_sub(elapsed) as u32
            }
            None => 0,
        }
    }

    /// Stop the countdown and lock the seconds left into the time bonus
    pub fn capture(&mut self, now: Instant) -> u32 {
        if self.started.is_some() {
            self.time_bonus = self.remaining(now);
            self.started = None;
        }
        self.time_bonus
    }

    /// Captured bonus not yet consumed
    pub fn time_bonus(&self) -> u32 {
        self.time_bonus
    }

    /// Take the captured bonus, resetting it to 0
    pub fn consume(&mut self) -> u32 {
        std::mem::take(&mut self.time_bonus)
    }
}

/// What changed when a new turn owner was observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TurnChange {
    /// The local player's turn ended
    pub ended_mine: bool,
    /// The local player's turn started
    pub started_mine: bool,
}

/// Local view of turn ownership: one-shot notifications, the countdown,
/// and the bonus tile, all driven by observed turn changes.
#[derive(Debug)]
pub struct TurnState {
    local_player: Option<PlayerId>,
    last_turn: Option<PlayerId>,
    clock: TurnClock,
    notification: bool,
    bonus_tile: Option<BonusTile>,
    odds: BonusOdds,
}

impl TurnState {
    pub fn new(turn_seconds: u64, odds: BonusOdds) -> Self {
        Self {
            local_player: None,
            last_turn: None,
            clock: TurnClock::new(turn_seconds),
            notification: false,
            bonus_tile: None,
            odds,
        }
    }

    /// Bind to the local player and start tracking from a clean slate
    pub fn reset(&mut self, local_player: PlayerId) {
        self.local_player = Some(local_player);
        self.last_turn = None;
        self.clock.cancel();
        self.clock.consume();
        self.notification = false;
    }

    /// Whether `player` is the local player
    pub fn is_local(&self, player: Option<&PlayerId>) -> bool {
        player.is_some() && player == self.local_player.as_ref()
    }

    /// Feed the current turn owner. Only a change of owner does anything.
    pub fn observe<R: Rng + ?Sized>(
        &mut self,
        current: Option<&PlayerId>,
        now: Instant,
        rng: &mut R,
    ) -> TurnChange {
        if current == self.last_turn.as_ref() {
            return TurnChange::default();
        }
        let mut change = TurnChange::default();
        if self.is_local(self.last_turn.as_ref()) {
            self.clock.capture(now);
            change.ended_mine = true;
        }
        if self.is_local(current) {
            self.clock.start(now);
            self.notification = true;
            change.started_mine = true;
        } else {
            self.clock.consume();
        }
        if self.last_turn.is_some() {
            self.regenerate_bonus(rng);
        }
        self.last_turn = current.cloned();
        change
    }

    /// The local player just completed a turn and `current` owns the next
    /// one. The bonus tile is redrawn even when the owner is unchanged, and
    /// a turn that stays local restarts the countdown.
    pub fn complete_turn<R: Rng + ?Sized>(
        &mut self,
        current: Option<&PlayerId>,
        now: Instant,
        rng: &mut R,
    ) -> TurnChange {
        if current != self.last_turn.as_ref() {
            return self.observe(current, now, rng);
        }
        self.regenerate_bonus(rng);
        let mut change = TurnChange::default();
        if self.is_local(current) {
            self.clock.start(now);
            self.notification = true;
            change.ended_mine = true;
            change.started_mine = true;
        }
        change
    }

    /// Draw a fresh bonus tile
    pub fn regenerate_bonus<R: Rng + ?Sized>(&mut self, rng: &mut R) -> BonusTile {
        let tile = draw_bonus_tile(rng, self.odds);
        self.bonus_tile = Some(tile);
        tile
    }

    pub fn bonus_tile(&self) -> Option<&BonusTile> {
        self.bonus_tile.as_ref()
    }

    /// Take the one-shot "your turn" notification
    pub fn take_notification(&mut self) -> bool {
        std::mem::take(&mut self.notification)
    }

    pub fn has_notification(&self) -> bool {
        self.notification
    }

    pub fn clock(&self) -> &TurnClock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut TurnClock {
        &mut self.clock
    }

    /// Last observed turn owner
    pub fn current(&self) -> Option<&PlayerId> {
        self.last_turn.as_ref()
    }
}
