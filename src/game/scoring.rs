//! Turn scoring: letter and word multipliers, the bonus tile, and the time bonus

use super::board::classify;
use super::tiles::letter_points;
use super::validation::{ExtractedMove, PlacedWord};
use serde::{Deserialize, Serialize};

/// The per-turn bonus: any word containing `letter` is multiplied again.
/// A multiplier of 0 is the blank-bonus and has no scoring effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusTile {
    pub letter: char,
    pub multiplier: u32,
}

impl BonusTile {
    pub fn is_blank_bonus(&self) -> bool {
        self.multiplier == 0
    }

    /// Whether this bonus multiplies `word`
    pub fn applies_to(&self, word: &str) -> bool {
        self.multiplier > 0 && word.chars().any(|c| c.eq_ignore_ascii_case(&self.letter))
    }
}

/// Sum of letter values with letter multipliers applied
pub fn base_letter_sum(word: &PlacedWord) -> u32 {
    word.letters()
        .map(|(letter, pos)| letter_points(letter) * classify(pos).letter_multiplier())
        .sum()
}

/// Product of every word multiplier the word touches
pub fn word_multiplier(word: &PlacedWord) -> u32 {
    word.positions
        .iter()
        .map(|&pos| classify(pos).word_multiplier())
        .product()
}

/// Score of one word without the bonus tile
pub fn word_score(word: &PlacedWord) -> u32 {
    base_letter_sum(word) * word_multiplier(word)
}

/// Scoring breakdown for one word
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordScore {
    pub word: String,
    pub base: u32,
    pub word_multiplier: u32,
    /// Bonus multiplier applied, if the bonus tile matched
    pub bonus_multiplier: Option<u32>,
    pub score: u32,
}

/// Scoring breakdown for a whole turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnScore {
    pub words: Vec<WordScore>,
    pub time_bonus: u32,
    pub total: u32,
}

impl TurnScore {
    /// Words that hit the bonus tile
    pub fn bonus_hits(&self) -> impl Iterator<Item = &WordScore> {
        self.words.iter().filter(|w| w.bonus_multiplier.is_some())
    }
}

/// Score one word, applying the bonus tile after word multipliers
pub fn score_word(word: &PlacedWord, bonus: Option<&BonusTile>) -> WordScore {
    let base = base_letter_sum(word);
    let multiplier = word_multiplier(word);
    let mut score = base * multiplier;
    let bonus_multiplier = bonus
        .filter(|b| b.applies_to(&word.word))
        .map(|b| b.multiplier);
    if let Some(m) = bonus_multiplier {
        score *= m;
    }
    WordScore {
        word: word.word.clone(),
        base,
        word_multiplier: multiplier,
        bonus_multiplier,
        score,
    }
}

/// Score every word of a move and add the time bonus once
pub fn score_move(mv: &ExtractedMove, bonus: Option<&BonusTile>, time_bonus: u32) -> TurnScore {
    let words: Vec<WordScore> = mv.words().map(|w| score_word(w, bonus)).collect();
    let total = words.iter().map(|w| w.score).sum::<u32>() + time_bonus;
    TurnScore {
        words,
        time_bonus,
        total,
    }
}
