#![allow(dead_code)]
//! Front-end state: a board cursor, a feedback line, and key handlers that
//! turn keystrokes into engine operations.

use super::error::{EngineError, ErrorKind};
use super::session::{GameSession, TurnReport};
use crate::game::board::{Position, BOARD_SIZE};
use crate::storage::Store;
use std::time::Instant;

/// What the next letter key does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Letters are placed at the cursor
    Place,
    /// The next letter is assigned to a blank in the rack
    AssignBlank,
}

/// Main application state
pub struct App<S: Store> {
    pub session: GameSession<S>,
    /// Whether the application should quit
    pub should_quit: bool,
    pub cursor: Position,
    pub mode: InputMode,
    /// Feedback message from the last action
    pub feedback: String,
    /// Set after one restart keypress; a second one confirms
    restart_armed: bool,
}

impl<S: Store> App<S> {
    pub fn new(session: GameSession<S>) -> Self {
        let center = BOARD_SIZE / 2;
        Self {
            session,
            should_quit: false,
            cursor: Position::new(center, center),
            mode: InputMode::Place,
            feedback: String::new(),
            restart_armed: false,
        }
    }

    /// Signal the application to quit
    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    /// Move the cursor, staying on the board
    pub fn move_cursor(&mut self, dx: isize, dy: isize) {
        let clamp = |v: usize, d: isize| v.saturating_add_signed(d).min(BOARD_SIZE - 1);
        self.cursor = Position::new(clamp(self.cursor.x, dx), clamp(self.cursor.y, dy));
    }

    /// Handle a letter key
    pub fn on_char(&mut self, c: char) {
        self.restart_armed = false;
        match self.mode {
            InputMode::AssignBlank => {
                self.mode = InputMode::Place;
                match self.session.assign_blank_letter(c) {
                    Ok(()) => self.feedback = format!("BLANK IS NOW {}", c.to_ascii_uppercase()),
                    Err(e) => self.report_error(&e),
                }
            }
            InputMode::Place => {
                let Position { x, y } = self.cursor;
                match self.session.place(c, x, y) {
                    Ok(()) => {
                        self.feedback.clear();
                        self.advance_cursor();
                    }
                    Err(e) => self.report_error(&e),
                }
            }
        }
    }

    /// Step right after placing, or down if the row's pending tiles run vertically
    fn advance_cursor(&mut self) {
        let pending = self.session.pending_tiles();
        let vertical = pending.len() > 1 && pending.iter().all(|t| t.x == self.cursor.x);
        if vertical {
            self.move_cursor(0, 1);
        } else {
            self.move_cursor(1, 0);
        }
    }

    /// Take back the pending tile under the cursor
    pub fn on_backspace(&mut self) {
        self.restart_armed = false;
        let Position { x, y } = self.cursor;
        let Some(tile) = self.session.pending_at(x, y) else {
            self.feedback = "NOTHING TO TAKE BACK".to_string();
            return;
        };
        match self.session.remove(x, y, tile.letter) {
            Ok(()) => self.feedback.clear(),
            Err(e) => self.report_error(&e),
        }
    }

    /// Submit this turn's tiles
    pub fn on_submit(&mut self) {
        self.restart_armed = false;
        match self.session.submit() {
            Ok(report) => self.feedback = describe_turn(&report),
            Err(e) => self.report_error(&e),
        }
    }

    /// Return every pending tile to the rack
    pub fn on_clear(&mut self) {
        self.restart_armed = false;
        match self.session.clear() {
            Ok(()) => self.feedback = "CLEARED".to_string(),
            Err(e) => self.report_error(&e),
        }
    }

    /// The next letter goes onto a blank
    pub fn begin_blank_assignment(&mut self) {
        if self.session.rack().blank_indices().is_empty() {
            self.feedback = "NO BLANK IN RACK".to_string();
            return;
        }
        self.mode = InputMode::AssignBlank;
        self.feedback = "TYPE A LETTER FOR THE BLANK".to_string();
    }

    /// Restart needs two presses in a row
    pub fn on_restart(&mut self) {
        if !self.restart_armed {
            self.restart_armed = true;
            self.feedback = "PRESS AGAIN TO RESTART THE GAME".to_string();
            return;
        }
        self.restart_armed = false;
        match self.session.restart() {
            Ok(()) => self.feedback = "NEW GAME".to_string(),
            Err(e) => self.report_error(&e),
        }
    }

    pub fn on_reconnect(&mut self) {
        match self.session.manual_reconnect() {
            Ok(()) => self.feedback = "RECONNECTED".to_string(),
            Err(e) => self.report_error(&e),
        }
    }

    /// Drain the store feeds and pick up turn notifications
    pub fn tick(&mut self, now: Instant) {
        self.session.tick(now);
        if self.session.take_turn_notification() {
            self.feedback = "YOUR TURN!".to_string();
        }
    }

    fn report_error(&mut self, error: &EngineError) {
        self.feedback = match error.kind() {
            ErrorKind::Validation => format!("NOPE: {}", error),
            ErrorKind::FatalPersistence => format!("NOT SAVED: {}", error),
            _ => error.to_string(),
        };
    }
}

/// One-line summary of a submitted turn
pub fn describe_turn(report: &TurnReport) -> String {
    let mut line = format!("OK +{} ({})", report.total(), report.main_word);
    let extra = report.words().len().saturating_sub(1);
    if extra > 0 {
        line.push_str(&format!(", {} cross word{}", extra, if extra == 1 { "" } else { "s" }));
    }
    for hit in report.bonus_hits() {
        if let Some(m) = hit.bonus_multiplier {
            line.push_str(&format!(", bonus x{} on {}", m, hit.word));
        }
    }
    if report.score.time_bonus > 0 {
        line.push_str(&format!(", time +{}", report.score.time_bonus));
    }
    line
}
