//! Test doubles shared by unit tests

use crate::game::dictionary::Lexicon;
use crate::game::{GameId, PlayerId};
use crate::storage::feed::{Subscription, Table};
use crate::storage::{GameRecord, LivePlacement, PlayerRecord, Store, StoreError};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A lexicon that accepts exactly the words it was given
pub struct ScriptedLexicon {
    words: HashSet<String>,
}

impl ScriptedLexicon {
    pub fn new(words: &[&str]) -> Self {
        Self {
            words: words.iter().map(|w| w.to_uppercase()).collect(),
        }
    }
}

impl Lexicon for ScriptedLexicon {
    fn is_valid_word(&self, word: &str) -> bool {
        self.words.contains(&word.to_uppercase())
    }
}

/// Switches shared between a `FailingStore` and the test driving it
#[derive(Debug, Clone, Default)]
pub struct FailureSwitches {
    reads: Arc<AtomicBool>,
    writes: Arc<AtomicBool>,
    player_writes: Arc<AtomicBool>,
}

impl FailureSwitches {
    pub fn fail_reads(&self, on: bool) {
        self.reads.store(on, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, on: bool) {
        self.writes.store(on, Ordering::SeqCst);
    }

    /// Fail only player updates, so a game write can succeed first
    pub fn fail_player_writes(&self, on: bool) {
        self.player_writes.store(on, Ordering::SeqCst);
    }
}

/// Wraps a store and fails selected calls as if the host went away
pub struct FailingStore<S> {
    inner: S,
    switches: FailureSwitches,
}

impl<S: Store> FailingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            switches: FailureSwitches::default(),
        }
    }

    pub fn switches(&self) -> FailureSwitches {
        self.switches.clone()
    }

    pub fn fail_reads(&self, on: bool) {
        self.switches.fail_reads(on);
    }

    pub fn fail_writes(&self, on: bool) {
        self.switches.fail_writes(on);
    }

    fn check(flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("injected failure".to_string()))
        } else {
            Ok(())
        }
    }

    fn read(&self) -> Result<(), StoreError> {
        Self::check(&self.switches.reads)
    }

    fn write(&self) -> Result<(), StoreError> {
        Self::check(&self.switches.writes)
    }
}

impl<S: Store> Store for FailingStore<S> {
    fn get_game(&mut self, id: &GameId) -> Result<Option<GameRecord>, StoreError> {
        self.read()?;
        self.inner.get_game(id)
    }

    fn insert_game(&mut self, game: &GameRecord) -> Result<GameRecord, StoreError> {
        self.write()?;
        self.inner.insert_game(game)
    }

    fn update_game(&mut self, game: &GameRecord) -> Result<GameRecord, StoreError> {
        self.write()?;
        self.inner.update_game(game)
    }

    fn players(&mut self, game_id: &GameId) -> Result<Vec<PlayerRecord>, StoreError> {
        self.read()?;
        self.inner.players(game_id)
    }

    fn insert_player(&mut self, player: &PlayerRecord) -> Result<(), StoreError> {
        self.write()?;
        self.inner.insert_player(player)
    }

    fn update_player(&mut self, player: &PlayerRecord) -> Result<(), StoreError> {
        self.write()?;
        Self::check(&self.switches.player_writes)?;
        self.inner.update_player(player)
    }

    fn placements(&mut self, game_id: &GameId) -> Result<Vec<LivePlacement>, StoreError> {
        self.read()?;
        self.inner.placements(game_id)
    }

    fn upsert_placements(&mut self, placements: &[LivePlacement]) -> Result<(), StoreError> {
        self.write()?;
        self.inner.upsert_placements(placements)
    }

    fn delete_placements(&mut self, game_id: &GameId, player_id: &PlayerId) -> Result<(), StoreError> {
        self.write()?;
        self.inner.delete_placements(game_id, player_id)
    }

    fn subscribe(&mut self, game_id: &GameId, table: Table) -> Result<Subscription, StoreError> {
        self.read()?;
        self.inner.subscribe(game_id, table)
    }
}
