//! The UI-facing engine surface
//!
//! A `GameSession` is everything one client needs to play: the store it
//! writes to, its replica of the joined game, the per-game connection, the
//! lexicon, and a local tile bag. Every operation runs to completion on the
//! caller's thread; store feeds are drained by `tick`.

use super::error::EngineError;
use crate::config::EngineConfig;
use crate::game::board::{Board, Position};
use crate::game::dictionary::LexiconHandle;
use crate::game::scoring::{score_move, BonusTile, TurnScore, WordScore};
use crate::game::tiles::{maybe_substitute_blank, Rack, TileBag};
use crate::game::turn::next_player;
use crate::game::validation::{extract_words, MoveError, PendingTile};
use crate::game::{GameId, PlayerId};
use crate::storage::feed::FeedEvent;
use crate::storage::{GameRecord, GameStatus, LivePlacement, PlayerRecord, Store};
use crate::sync::{placements, ConnectionStatus, Replica, SessionConnection};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::time::Instant;

/// Outcome of a successful submit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReport {
    pub main_word: String,
    pub score: TurnScore,
    /// Who plays next
    pub next_player: Option<PlayerId>,
    /// Tiles drawn to restock the rack
    pub drawn: usize,
}

impl TurnReport {
    pub fn total(&self) -> u32 {
        self.score.total
    }

    pub fn words(&self) -> &[WordScore] {
        &self.score.words
    }

    pub fn bonus_hits(&self) -> impl Iterator<Item = &WordScore> {
        self.score.bonus_hits()
    }
}

/// One client's engine
pub struct GameSession<S: Store> {
    store: S,
    lexicon: LexiconHandle,
    config: EngineConfig,
    rng: StdRng,
    bag: TileBag,
    bag_exhausted: bool,
    replica: Option<Replica>,
    connection: SessionConnection,
    /// Player ids this session has held, for rejoining by name
    identities: HashMap<GameId, PlayerId>,
    selected_blank: Option<usize>,
}

impl<S: Store> GameSession<S> {
    pub fn new(store: S, lexicon: LexiconHandle, config: EngineConfig) -> Self {
        Self::with_rng(store, lexicon, config, StdRng::from_os_rng())
    }

    /// A session with a specific RNG (for testing/seeding)
    pub fn with_rng(store: S, lexicon: LexiconHandle, config: EngineConfig, mut rng: StdRng) -> Self {
        let connection = SessionConnection::new(config.turn_seconds, config.bonus_odds, config.retry_interval);
        let bag = TileBag::new_shuffled_with_rng(&mut rng);
        Self {
            store,
            lexicon,
            config,
            rng,
            bag,
            bag_exhausted: false,
            replica: None,
            connection,
            identities: HashMap::new(),
            selected_blank: None,
        }
    }

    // ---- read-only state ----

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn game_id(&self) -> Option<&GameId> {
        self.replica.as_ref()?.game().map(|g| &g.id)
    }

    pub fn player_id(&self) -> Option<&PlayerId> {
        self.replica.as_ref()?.local_player()
    }

    pub fn player_name(&self) -> Option<&str> {
        self.replica.as_ref()?.local_record().map(|p| p.name.as_str())
    }

    pub fn is_in_game(&self) -> bool {
        self.replica.is_some()
    }

    /// Committed board
    pub fn board(&self) -> Board {
        self.replica.as_ref().map(Replica::board).unwrap_or_default()
    }

    /// Committed board with this turn's pending tiles on it
    pub fn board_with_pending(&self) -> Board {
        self.replica.as_ref().map(Replica::board_with_pending).unwrap_or_default()
    }

    pub fn rack(&self) -> Rack {
        self.replica.as_ref().map(|r| r.rack().clone()).unwrap_or_default()
    }

    pub fn players(&self) -> &[PlayerRecord] {
        self.replica.as_ref().map(Replica::players).unwrap_or(&[])
    }

    pub fn current_turn(&self) -> Option<&PlayerId> {
        self.replica.as_ref()?.current_turn()
    }

    pub fn current_player_name(&self) -> Option<&str> {
        let current = self.current_turn()?;
        self.players().iter().find(|p| &p.id == current).map(|p| p.name.as_str())
    }

    pub fn is_my_turn(&self) -> bool {
        self.replica.as_ref().is_some_and(Replica::is_my_turn)
    }

    pub fn game_status(&self) -> Option<GameStatus> {
        self.replica.as_ref()?.game().map(|g| g.status)
    }

    pub fn last_played(&self) -> &[Position] {
        self.replica
            .as_ref()
            .and_then(Replica::game)
            .map(|g| g.last_played_positions.as_slice())
            .unwrap_or(&[])
    }

    pub fn bonus_tile(&self) -> Option<&BonusTile> {
        self.connection.turn().bonus_tile()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    pub fn pending_tiles(&self) -> &[PendingTile] {
        self.replica.as_ref().map(Replica::pending).unwrap_or(&[])
    }

    /// Other players' unsubmitted tiles
    pub fn live_placements(&self) -> Vec<&LivePlacement> {
        self.replica.as_ref().map(Replica::other_placements).unwrap_or_default()
    }

    /// Seconds left on the local turn countdown
    pub fn countdown(&self, now: Instant) -> u32 {
        self.connection.turn().clock().remaining(now)
    }

    /// Bonus the next submit would add: the running countdown, or a
    /// captured value not yet consumed
    pub fn time_bonus(&self, now: Instant) -> u32 {
        let clock = self.connection.turn().clock();
        if clock.is_running() {
            clock.remaining(now)
        } else {
            clock.time_bonus()
        }
    }

    /// Whether a draw has come up short since the bag was last refilled
    pub fn bag_exhausted(&self) -> bool {
        self.bag_exhausted
    }

    pub fn bag_len(&self) -> usize {
        self.bag.len()
    }

    pub fn selected_blank(&self) -> Option<usize> {
        self.selected_blank
    }

    pub fn is_lexicon_loaded(&mut self) -> bool {
        self.lexicon.is_loaded()
    }

    /// Local edits not yet confirmed by the store
    pub fn is_provisional(&self) -> bool {
        self.replica.as_ref().is_some_and(Replica::is_provisional)
    }

    /// Take the one-shot "your turn" notification
    pub fn take_turn_notification(&mut self) -> bool {
        self.connection.turn_mut().take_notification()
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    // ---- lobby ----

    /// Start a new game with this player as its first seat
    pub fn create_game(&mut self, name: &str) -> Result<GameId, EngineError> {
        let name = valid_name(name)?;
        let player_id = PlayerId::generate();
        let mut game = GameRecord::new(GameId::generate());
        game.current_player_id = Some(player_id.clone());
        let game = self.store.insert_game(&game).map_err(EngineError::from_store)?;

        self.refill_bag();
        let rack = self.deal(self.config.rack_size, self.config.initial_blank_chance);
        let player = PlayerRecord {
            id: player_id.clone(),
            game_id: game.id.clone(),
            name: name.to_string(),
            score: 0,
            rack: Rack::new(rack),
            order_num: 1,
        };
        self.store.insert_player(&player).map_err(EngineError::from_store)?;

        tracing::info!(game_id = %game.id, player_id = %player_id, "game created");
        let game_id = game.id.clone();
        self.enter_game(game, vec![player], player_id);
        Ok(game_id)
    }

    /// Take a seat in an existing game, or reclaim one this session held
    pub fn join_game(&mut self, game_id: &GameId, name: &str) -> Result<PlayerId, EngineError> {
        let name = valid_name(name)?;
        let mut game = self
            .store
            .get_game(game_id)
            .map_err(EngineError::from_store)?
            .ok_or_else(|| EngineError::GameNotFound(game_id.clone()))?;
        let mut players = self.store.players(game_id).map_err(EngineError::from_store)?;

        if let Some(existing) = players.iter().find(|p| p.name == name) {
            if self.identities.get(game_id) != Some(&existing.id) {
                return Err(EngineError::NameTaken(name.to_string()));
            }
            let player_id = existing.id.clone();
            tracing::info!(game_id = %game_id, player_id = %player_id, "rejoined game");
            self.enter_game(game, players, player_id.clone());
            return Ok(player_id);
        }
        if players.len() >= self.config.max_players {
            return Err(EngineError::GameFull(self.config.max_players));
        }

        self.refill_bag();
        let rack = self.deal(self.config.rack_size, self.config.initial_blank_chance);
        let order_num = players.iter().map(|p| p.order_num).max().unwrap_or(0) + 1;
        let player = PlayerRecord {
            id: PlayerId::generate(),
            game_id: game_id.clone(),
            name: name.to_string(),
            score: 0,
            rack: Rack::new(rack),
            order_num,
        };
        self.store.insert_player(&player).map_err(EngineError::from_store)?;
        let player_id = player.id.clone();
        players.push(player);
        tracing::info!(game_id = %game_id, player_id = %player_id, order_num, "joined game");

        if players.len() == self.config.max_players && game.status == GameStatus::Waiting {
            game.status = GameStatus::Active;
            game.current_player_id = players.first().map(|p| p.id.clone());
            game = self.store.update_game(&game).map_err(EngineError::from_store)?;
            tracing::info!(game_id = %game_id, "game is full, now active");
        }

        self.enter_game(game, players, player_id.clone());
        Ok(player_id)
    }

    /// Remember a player id so a later join under that seat's name rejoins
    pub fn remember_identity(&mut self, game_id: GameId, player_id: PlayerId) {
        self.identities.insert(game_id, player_id);
    }

    /// Leave the current game. The seat stays in the store.
    pub fn leave_game(&mut self) {
        if let Some(replica) = self.replica.take() {
            if let (Some(game), Some(me)) = (replica.game(), replica.local_player()) {
                placements::publish(&mut self.store, &game.id, me, &[]);
            }
        }
        self.connection.close();
        self.selected_blank = None;
    }

    fn enter_game(&mut self, game: GameRecord, players: Vec<PlayerRecord>, player_id: PlayerId) {
        let now = Instant::now();
        let game_id = game.id.clone();
        let live = match self.store.placements(&game_id) {
            Ok(rows) => Some(rows),
            Err(e) => {
                tracing::warn!(game_id = %game_id, error = %e, "could not fetch live placements");
                None
            }
        };
        let mut replica = Replica::new(player_id.clone());
        replica.replace(game, players, live);

        if let Err(e) = self.connection.open(&mut self.store, &game_id, now) {
            tracing::warn!(game_id = %game_id, error = %e, "feed subscription failed, will retry");
        }
        let turn = self.connection.turn_mut();
        turn.reset(player_id.clone());
        turn.regenerate_bonus(&mut self.rng);
        turn.observe(replica.current_turn(), now, &mut self.rng);

        self.identities.insert(game_id, player_id);
        self.replica = Some(replica);
        self.selected_blank = None;
    }

    // ---- turn actions ----

    /// Put a rack tile on the board at (x, y)
    pub fn place(&mut self, letter: char, x: usize, y: usize) -> Result<(), EngineError> {
        let replica = self.my_turn_replica()?;
        let pos = Position::new(x, y);
        if !pos.in_bounds() {
            return Err(MoveError::OutOfBounds(pos).into());
        }
        if replica.board_with_pending().is_occupied(pos) {
            return Err(MoveError::CellOccupied(pos).into());
        }
        let letter = letter.to_ascii_uppercase();
        if !replica.place_pending(PendingTile::new(x, y, letter)) {
            return Err(EngineError::NotInRack(letter));
        }
        tracing::debug!(x, y, %letter, "tile placed");
        self.selected_blank = None;
        self.broadcast_pending();
        Ok(())
    }

    /// Take a pending tile back into the rack
    pub fn remove(&mut self, x: usize, y: usize, letter: char) -> Result<(), EngineError> {
        let letter = letter.to_ascii_uppercase();
        let replica = self.my_turn_replica()?;
        if !replica.remove_pending(x, y, letter) {
            return Err(EngineError::NoSuchPending { x, y, letter });
        }
        self.broadcast_pending();
        Ok(())
    }

    /// Pending tile at (x, y), if any
    pub fn pending_at(&self, x: usize, y: usize) -> Option<PendingTile> {
        self.pending_tiles().iter().find(|t| t.x == x && t.y == y).copied()
    }

    /// Return every pending tile to the rack and retract the live placements
    pub fn clear(&mut self) -> Result<(), EngineError> {
        let replica = self.replica.as_mut().ok_or(EngineError::NotInGame)?;
        replica.return_all_pending();
        self.retract_live();
        Ok(())
    }

    /// Choose which rack blank the next letter assignment applies to
    pub fn select_blank(&mut self, index: usize) -> Result<(), EngineError> {
        let replica = self.replica.as_ref().ok_or(EngineError::NotInGame)?;
        if !replica.rack().blank_indices().contains(&index) {
            return Err(EngineError::NoBlankInRack);
        }
        self.selected_blank = Some(index);
        Ok(())
    }

    /// Turn a blank in the rack into `letter`: the selected one, or else
    /// the first blank in rack order
    pub fn assign_blank_letter(&mut self, letter: char) -> Result<(), EngineError> {
        if !letter.is_ascii_alphabetic() {
            return Err(EngineError::InvalidLetter(letter));
        }
        let selected = self.selected_blank.take();
        let replica = self.my_turn_replica()?;
        let blanks = replica.rack().blank_indices();
        let index = selected
            .filter(|i| blanks.contains(i))
            .or_else(|| blanks.first().copied())
            .ok_or(EngineError::NoBlankInRack)?;
        replica.rack_mut().assign_blank(index, letter);

        // Persist the full rack so feed snapshots agree with it
        if let Some(mut me) = replica.local_record().cloned() {
            let mut full = replica.rack().clone();
            full.extend(replica.pending().iter().map(|t| t.letter));
            me.rack = full;
            match self.store.update_player(&me) {
                Ok(()) => {
                    if let Some(replica) = self.replica.as_mut() {
                        replica.clear_spent();
                    }
                }
                Err(e) => {
                    tracing::warn!(player_id = %me.id, error = %e, "could not save blank assignment");
                }
            }
        }
        Ok(())
    }

    /// Validate, score and commit this turn's pending tiles
    pub fn submit(&mut self) -> Result<TurnReport, EngineError> {
        let now = Instant::now();
        let lexicon = self.lexicon.get();
        let replica = self.my_turn_replica()?;
        let lexicon = lexicon.ok_or(EngineError::LexiconLoading)?;

        let board = replica.board();
        let pending = replica.pending().to_vec();
        let mv = extract_words(&board, &pending)?;
        if let Some(bad) = mv.words().find(|w| !lexicon.is_valid_word(&w.word)) {
            tracing::info!(word = %bad.word, "word rejected");
            return Err(EngineError::InvalidWord(bad.word.clone()));
        }

        let me = replica.local_record().cloned().ok_or(EngineError::NotInGame)?;
        let Some(mut game) = replica.game().cloned() else {
            return Err(EngineError::NotInGame);
        };
        let order = replica.player_ids();
        game.board = replica.board_with_pending();

        let turn = self.connection.turn_mut();
        let time_bonus = turn.clock_mut().capture(now);
        let score = score_move(&mv, turn.bonus_tile(), time_bonus);

        let next = next_player(&order, &me.id).cloned();
        game.current_player_id = next.clone();
        game.last_played_positions = mv.main.positions.clone();

        let stored_game = match self.store.update_game(&game) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::error!(game_id = %game.id, error = %e, "submit failed, tiles returned to rack");
                self.return_pending_after_failure();
                return Err(EngineError::Persistence(e));
            }
        };

        let mut rack = self.rack();
        let played_rack = rack.clone();
        let drawn = self.deal(rack.missing(self.config.rack_size), self.config.restock_blank_chance);
        let drawn_count = drawn.len();
        rack.extend(drawn);
        let mut updated = me.clone();
        updated.score += score.total;
        updated.rack = rack;

        if let Err(e) = self.store.update_player(&updated) {
            // The board write landed, so the tiles are committed. Only the
            // score and restock are lost.
            tracing::error!(player_id = %me.id, error = %e, "score update failed after board write");
            self.settle_spent_tiles(me, played_rack);
            self.retract_live();
            return Err(EngineError::Persistence(e));
        }

        self.retract_live();
        let current = stored_game.current_player_id.clone();
        if let Some(replica) = self.replica.as_mut() {
            replica.commit_local(stored_game, updated);
        }
        let turn = self.connection.turn_mut();
        turn.clock_mut().consume();
        turn.complete_turn(current.as_ref(), now, &mut self.rng);

        tracing::info!(word = %mv.main.word, score = score.total, time_bonus, "turn submitted");
        Ok(TurnReport {
            main_word: mv.main.word.clone(),
            score,
            next_player: next,
            drawn: drawn_count,
        })
    }

    /// Start over: new bag, empty board, zero scores, fresh racks
    pub fn restart(&mut self) -> Result<(), EngineError> {
        let replica = self.replica.as_mut().ok_or(EngineError::NotInGame)?;
        let Some(mut game) = replica.game().cloned() else {
            return Err(EngineError::NotInGame);
        };
        let me = replica.local_player().cloned().ok_or(EngineError::NotInGame)?;
        replica.discard_pending();
        let mut players = replica.players().to_vec();
        players.sort_by_key(|p| p.order_num);

        self.refill_bag();
        for player in &mut players {
            let rack = self.deal(self.config.rack_size, self.config.initial_blank_chance);
            player.score = 0;
            player.rack = Rack::new(rack);
        }
        game.board = Board::new();
        game.status = GameStatus::Active;
        game.current_player_id = players.first().map(|p| p.id.clone());
        game.last_played_positions.clear();

        let game = self.store.update_game(&game).map_err(EngineError::from_store)?;
        for player in &players {
            self.store.update_player(player).map_err(EngineError::from_store)?;
            placements::publish(&mut self.store, &game.id, &player.id, &[]);
        }
        tracing::info!(game_id = %game.id, "game restarted");

        // Fresh connection for the fresh game
        self.connection.close();
        self.enter_game(game, players, me);
        Ok(())
    }

    /// Try to reconnect right now
    pub fn manual_reconnect(&mut self) -> Result<(), EngineError> {
        if self.replica.is_none() {
            return Err(EngineError::NotInGame);
        }
        self.reconnect(Instant::now())
    }

    fn reconnect(&mut self, now: Instant) -> Result<(), EngineError> {
        let snapshot = self.connection.reconnect(&mut self.store, now).map_err(EngineError::Sync)?;
        let Some(replica) = self.replica.as_mut() else {
            return Err(EngineError::NotInGame);
        };
        let applied = replica.replace(snapshot.game, snapshot.players, snapshot.placements);
        let current = replica.current_turn().cloned();
        self.connection.turn_mut().observe(current.as_ref(), now, &mut self.rng);
        if !applied.returned.is_empty() {
            self.broadcast_pending();
        }
        Ok(())
    }

    /// Drain feeds, apply them, and retry the connection if it is due.
    /// Returns the number of feed events applied.
    pub fn tick(&mut self, now: Instant) -> usize {
        self.lexicon.poll();
        let Some(replica) = self.replica.as_mut() else {
            return 0;
        };

        let events = self.connection.poll(now);
        let count = events.len();
        let mut returned = false;
        for event in events {
            let is_game = matches!(event, FeedEvent::GameChanged(_));
            let applied = replica.apply(event);
            returned |= !applied.returned.is_empty();
            if is_game && !applied.stale {
                let current = replica.current_turn().cloned();
                self.connection.turn_mut().observe(current.as_ref(), now, &mut self.rng);
            }
        }
        if returned {
            self.broadcast_pending();
        }

        if self.connection.retry_due(now) {
            if let Err(e) = self.reconnect(now) {
                tracing::debug!(error = %e, "scheduled reconnect failed");
            }
        }
        count
    }

    pub fn poll(&mut self) -> usize {
        self.tick(Instant::now())
    }

    // ---- helpers ----

    fn my_turn_replica(&mut self) -> Result<&mut Replica, EngineError> {
        let replica = self.replica.as_mut().ok_or(EngineError::NotInGame)?;
        if !replica.is_my_turn() {
            return Err(EngineError::NotYourTurn);
        }
        Ok(replica)
    }

    fn refill_bag(&mut self) {
        self.bag = TileBag::new_shuffled_with_rng(&mut self.rng);
        self.bag_exhausted = false;
    }

    /// Draw `count` tiles with a chance of one becoming a blank. A short
    /// bag yields what is left and marks the bag exhausted.
    fn deal(&mut self, count: usize, blank_chance: f64) -> Vec<char> {
        let mut drawn = match self.bag.draw(count) {
            Ok(tiles) => tiles,
            Err(short) => {
                tracing::warn!(requested = short.requested, available = short.available, "tile bag exhausted");
                self.bag_exhausted = true;
                self.bag.draw_up_to(count)
            }
        };
        maybe_substitute_blank(&mut self.rng, &mut drawn, blank_chance);
        drawn
    }

    fn broadcast_pending(&mut self) {
        let Some(replica) = self.replica.as_ref() else {
            return;
        };
        if let (Some(game), Some(me)) = (replica.game(), replica.local_player()) {
            placements::publish(&mut self.store, &game.id, me, replica.pending());
        }
    }

    fn retract_live(&mut self) {
        let Some(replica) = self.replica.as_ref() else {
            return;
        };
        if let (Some(game), Some(me)) = (replica.game(), replica.local_player()) {
            placements::publish(&mut self.store, &game.id, me, &[]);
        }
    }

    /// The board holds this turn's tiles but the player row does not know
    /// they were spent. Keep them out of the rack and try once more to save
    /// the rack without them.
    fn settle_spent_tiles(&mut self, mut me: PlayerRecord, played_rack: Rack) {
        let Some(replica) = self.replica.as_mut() else {
            return;
        };
        replica.spend_pending();
        me.rack = played_rack;
        match self.store.update_player(&me) {
            Ok(()) => replica.clear_spent(),
            Err(e) => {
                tracing::warn!(player_id = %me.id, error = %e, "spent tiles not saved, keeping them out of the rack");
            }
        }
    }

    fn return_pending_after_failure(&mut self) {
        if let Some(replica) = self.replica.as_mut() {
            replica.return_all_pending();
        }
        self.retract_live();
    }
}

fn valid_name(name: &str) -> Result<&str, EngineError> {
    let name = name.trim();
    if name.is_empty() {
        Err(EngineError::EmptyName)
    } else {
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::error::ErrorKind;
    use crate::game::board::classify;
    use crate::storage::{SharedStore, SqliteStore};
    use crate::testing::{FailingStore, ScriptedLexicon};
    use std::sync::mpsc::channel;
    use std::sync::Arc;

    type Shared = SharedStore<SqliteStore>;

    fn lexicon(words: &[&str]) -> LexiconHandle {
        LexiconHandle::ready(Arc::new(ScriptedLexicon::new(words)))
    }

    fn session_on(store: Shared, seed: u64) -> GameSession<Shared> {
        GameSession::with_rng(
            store,
            lexicon(&["CAT", "CATS", "AT", "TA"]),
            EngineConfig::default(),
            StdRng::seed_from_u64(seed),
        )
    }

    fn shared() -> Shared {
        SharedStore::new(SqliteStore::open_in_memory().unwrap())
    }

    /// Overwrite the local player's rack in the store and let the feed deliver it
    fn give_rack<T: Store>(session: &mut GameSession<T>, tiles: &str) {
        let mut me = session
            .players()
            .iter()
            .find(|p| Some(&p.id) == session.player_id())
            .cloned()
            .unwrap();
        me.rack = Rack::new(tiles.chars().collect());
        session.store_mut().update_player(&me).unwrap();
        session.poll();
        assert_eq!(session.rack().as_string(), tiles);
    }

    #[test]
    fn test_create_game_seats_creator() {
        let store = shared();
        let mut s = session_on(store, 1);
        let id = s.create_game("  ann ").unwrap();
        assert_eq!(s.game_id(), Some(&id));
        assert_eq!(s.player_name(), Some("ann"));
        assert_eq!(s.players().len(), 1);
        assert_eq!(s.rack().len(), 7);
        assert_eq!(s.game_status(), Some(GameStatus::Waiting));
        assert!(s.is_my_turn());
        assert!(s.bonus_tile().is_some());
        assert!(s.take_turn_notification());
        assert!(!s.take_turn_notification());
        assert_eq!(s.connection_status(), ConnectionStatus::Connected);
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut s = session_on(shared(), 1);
        let err = s.create_game("   ").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UserInput);
        assert!(!s.is_in_game());
    }

    #[test]
    fn test_join_rules() {
        let store = shared();
        let mut host = session_on(store.clone(), 1);
        let id = host.create_game("ann").unwrap();

        let mut bob = session_on(store.clone(), 2);
        let err = bob.join_game(&id, "ann").unwrap_err();
        assert!(matches!(err, EngineError::NameTaken(_)));
        assert_eq!(err.kind(), ErrorKind::ResourceExhaustion);

        bob.join_game(&id, "bob").unwrap();
        assert!(!bob.is_my_turn());
        session_on(store.clone(), 3).join_game(&id, "cat").unwrap();
        let mut dan = session_on(store.clone(), 4);
        dan.join_game(&id, "dan").unwrap();
        assert_eq!(dan.game_status(), Some(GameStatus::Active));
        assert_eq!(dan.players().len(), 4);

        let err = session_on(store.clone(), 5).join_game(&id, "eve").unwrap_err();
        assert!(matches!(err, EngineError::GameFull(4)));

        // The host sees the fourth join activate the game with ann current
        host.poll();
        assert_eq!(host.game_status(), Some(GameStatus::Active));
        assert!(host.is_my_turn());
        assert_eq!(host.players().len(), 4);
    }

    #[test]
    fn test_rejoin_restores_seat() {
        let store = shared();
        let mut s = session_on(store.clone(), 1);
        let id = s.create_game("ann").unwrap();
        let me = s.player_id().cloned().unwrap();
        let rack = s.rack();
        s.leave_game();
        assert!(!s.is_in_game());

        let rejoined = s.join_game(&id, "ann").unwrap();
        assert_eq!(rejoined, me);
        assert_eq!(s.rack(), rack);
        assert_eq!(s.players().len(), 1);
    }

    #[test]
    fn test_join_missing_game() {
        let mut s = session_on(shared(), 1);
        let err = s.join_game(&GameId::from("nope"), "ann").unwrap_err();
        assert!(matches!(err, EngineError::GameNotFound(_)));
    }

    #[test]
    fn test_place_and_remove_broadcast_live_placements() {
        let store = shared();
        let mut ann = session_on(store.clone(), 1);
        let id = ann.create_game("ann").unwrap();
        let mut bob = session_on(store.clone(), 2);
        bob.join_game(&id, "bob").unwrap();
        ann.poll();
        give_rack(&mut ann, "CATSEEE");

        ann.place('c', 7, 7).unwrap();
        ann.place('A', 8, 7).unwrap();
        ann.place('T', 9, 7).unwrap();
        assert_eq!(ann.rack().as_string(), "SEEE");
        assert_eq!(ann.pending_tiles().len(), 3);

        bob.poll();
        assert_eq!(bob.live_placements().len(), 3);
        assert!(ann.live_placements().is_empty());

        ann.remove(9, 7, 'T').unwrap();
        bob.poll();
        assert_eq!(bob.live_placements().len(), 2);

        ann.clear().unwrap();
        assert!(ann.pending_tiles().is_empty());
        assert_eq!(ann.rack().len(), 7);
        bob.poll();
        assert!(bob.live_placements().is_empty());
    }

    #[test]
    fn test_place_rules() {
        let store = shared();
        let mut ann = session_on(store.clone(), 1);
        let id = ann.create_game("ann").unwrap();
        let mut bob = session_on(store.clone(), 2);
        bob.join_game(&id, "bob").unwrap();
        ann.poll();
        give_rack(&mut ann, "CATSEEE");

        assert!(matches!(bob.place('A', 0, 0), Err(EngineError::NotYourTurn)));
        assert!(matches!(ann.place('Q', 0, 0), Err(EngineError::NotInRack('Q'))));
        assert!(matches!(
            ann.place('A', 15, 0),
            Err(EngineError::Move(MoveError::OutOfBounds(_)))
        ));
        ann.place('A', 0, 0).unwrap();
        assert!(matches!(
            ann.place('C', 0, 0),
            Err(EngineError::Move(MoveError::CellOccupied(_)))
        ));
        assert!(matches!(ann.remove(1, 1, 'A'), Err(EngineError::NoSuchPending { .. })));
    }

    #[test]
    fn test_submit_scores_and_passes_turn() {
        let store = shared();
        let mut ann = session_on(store.clone(), 1);
        let id = ann.create_game("ann").unwrap();
        let mut bob = session_on(store.clone(), 2);
        bob.join_game(&id, "bob").unwrap();
        ann.poll();
        give_rack(&mut ann, "CATEEEE");

        // (7,7) (8,7) (9,7) are plain cells
        for pos in [(7, 7), (8, 7), (9, 7)] {
            assert_eq!(classify(Position::new(pos.0, pos.1)).word_multiplier(), 1);
        }
        ann.place('C', 7, 7).unwrap();
        ann.place('A', 8, 7).unwrap();
        ann.place('T', 9, 7).unwrap();
        let report = ann.submit().unwrap();
        assert_eq!(report.main_word, "CAT");
        assert_eq!(report.words().len(), 1);
        assert_eq!(report.drawn, 3);
        assert_eq!(report.next_player.as_ref(), bob.player_id());

        let bonus = report.score.time_bonus;
        assert!(bonus <= 20);
        let base = report.words()[0].score;
        assert_eq!(report.total(), base + bonus);

        assert!(!ann.is_my_turn());
        assert!(ann.pending_tiles().is_empty());
        assert_eq!(ann.rack().len(), 7);
        assert_eq!(ann.time_bonus(Instant::now()), 0);
        assert_eq!(ann.last_played().len(), 3);

        bob.poll();
        assert!(bob.is_my_turn());
        assert!(bob.take_turn_notification());
        assert_eq!(bob.board().get(Position::new(8, 7)), Some('A'));
        let ann_record = bob.players().iter().find(|p| p.name == "ann").unwrap();
        assert_eq!(ann_record.score, report.total());
        assert!(bob.live_placements().is_empty());
    }

    #[test]
    fn test_invalid_word_changes_nothing() {
        let store = shared();
        let mut ann = session_on(store.clone(), 1);
        ann.create_game("ann").unwrap();
        give_rack(&mut ann, "ZZZQEEE");
        for (i, c) in "ZZZQ".chars().enumerate() {
            ann.place(c, 3 + i, 3).unwrap();
        }
        let err = ann.submit().unwrap_err();
        assert!(matches!(err, EngineError::InvalidWord(ref w) if w == "ZZZQ"));
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(ann.board().is_empty());
        assert_eq!(ann.pending_tiles().len(), 4);
        assert_eq!(ann.rack().as_string(), "EEE");
        assert!(ann.is_my_turn());
    }

    #[test]
    fn test_crooked_placement_rejected() {
        let mut ann = session_on(shared(), 1);
        ann.create_game("ann").unwrap();
        give_rack(&mut ann, "CATEEEE");
        ann.place('C', 1, 1).unwrap();
        ann.place('A', 2, 2).unwrap();
        let err = ann.submit().unwrap_err();
        assert!(matches!(err, EngineError::Move(MoveError::NotInLine)));
        assert!(ann.board().is_empty());
        assert_eq!(ann.pending_tiles().len(), 2);
    }

    #[test]
    fn test_submit_refused_while_lexicon_loads() {
        let (_tx, rx) = channel();
        let mut ann = GameSession::with_rng(
            shared(),
            LexiconHandle::pending(rx),
            EngineConfig::default(),
            StdRng::seed_from_u64(1),
        );
        ann.create_game("ann").unwrap();
        give_rack(&mut ann, "CATEEEE");
        ann.place('C', 7, 7).unwrap();
        ann.place('A', 8, 7).unwrap();
        let err = ann.submit().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LexiconLoading);
        assert_eq!(ann.pending_tiles().len(), 2);
    }

    #[test]
    fn test_failed_board_write_returns_tiles() {
        let failing = FailingStore::new(shared());
        let switches = failing.switches();
        let mut ann = GameSession::with_rng(
            failing,
            lexicon(&["CAT"]),
            EngineConfig::default(),
            StdRng::seed_from_u64(1),
        );
        ann.create_game("ann").unwrap();
        give_rack(&mut ann, "CATEEEE");
        ann.place('C', 7, 7).unwrap();
        ann.place('A', 8, 7).unwrap();
        ann.place('T', 9, 7).unwrap();

        switches.fail_writes(true);
        let err = ann.submit().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FatalPersistence);
        assert!(ann.pending_tiles().is_empty());
        assert_eq!(ann.rack().len(), 7);
        assert!(ann.board().is_empty());
        assert!(ann.is_my_turn());
    }

    #[test]
    fn test_failed_player_write_keeps_played_tiles_out_of_rack() {
        let failing = FailingStore::new(shared());
        let switches = failing.switches();
        let mut ann = GameSession::with_rng(
            failing,
            lexicon(&["CAT"]),
            EngineConfig::default(),
            StdRng::seed_from_u64(1),
        );
        ann.create_game("ann").unwrap();
        give_rack(&mut ann, "CATEEEE");
        ann.place('C', 7, 7).unwrap();
        ann.place('A', 8, 7).unwrap();
        ann.place('T', 9, 7).unwrap();

        switches.fail_player_writes(true);
        let err = ann.submit().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FatalPersistence);
        assert!(ann.pending_tiles().is_empty());
        assert_eq!(ann.rack().as_string(), "EEEE");

        // The stored row still lists C, A and T; neither the feed nor a
        // fresh snapshot may put them back
        ann.poll();
        assert_eq!(ann.board().get(Position::new(8, 7)), Some('A'));
        assert_eq!(ann.rack().as_string(), "EEEE");
        switches.fail_player_writes(false);
        ann.manual_reconnect().unwrap();
        assert_eq!(ann.board().get(Position::new(7, 7)), Some('C'));
        assert_eq!(ann.board().get(Position::new(9, 7)), Some('T'));
        assert_eq!(ann.rack().as_string(), "EEEE");
    }

    #[test]
    fn test_solo_submits_start_a_fresh_turn_each_time() {
        let mut ann = session_on(shared(), 4);
        ann.create_game("ann").unwrap();
        assert!(ann.take_turn_notification());

        let mut bonuses = vec![*ann.bonus_tile().unwrap()];
        for row in [1, 3, 5, 9, 11, 13] {
            give_rack(&mut ann, "ATEEEEE");
            ann.place('A', 0, row).unwrap();
            ann.place('T', 1, row).unwrap();
            ann.submit().unwrap();

            assert!(ann.is_my_turn());
            assert!(ann.take_turn_notification());
            assert!(ann.countdown(Instant::now()) >= 19);
            bonuses.push(*ann.bonus_tile().unwrap());
        }
        assert!(bonuses.windows(2).any(|w| w[0] != w[1]));
    }

    #[test]
    fn test_blank_assignment() {
        let store = shared();
        let mut ann = session_on(store.clone(), 1);
        ann.create_game("ann").unwrap();
        give_rack(&mut ann, "CA_EEE_");

        assert!(matches!(ann.select_blank(0), Err(EngineError::NoBlankInRack)));
        ann.select_blank(6).unwrap();
        ann.assign_blank_letter('t').unwrap();
        assert_eq!(ann.rack().as_string(), "CA_EEET");
        ann.assign_blank_letter('S').unwrap();
        assert_eq!(ann.rack().as_string(), "CASEEET");
        assert!(matches!(ann.assign_blank_letter('X'), Err(EngineError::NoBlankInRack)));
        assert!(matches!(ann.assign_blank_letter('3'), Err(EngineError::InvalidLetter('3'))));

        // The assignment is saved, so the feed echo keeps it
        ann.poll();
        assert_eq!(ann.rack().as_string(), "CASEEET");
    }

    #[test]
    fn test_restart_resets_everyone() {
        let store = shared();
        let mut ann = session_on(store.clone(), 1);
        let id = ann.create_game("ann").unwrap();
        let mut bob = session_on(store.clone(), 2);
        bob.join_game(&id, "bob").unwrap();
        ann.poll();
        give_rack(&mut ann, "CATEEEE");
        ann.place('C', 7, 7).unwrap();
        ann.place('A', 8, 7).unwrap();
        ann.place('T', 9, 7).unwrap();
        ann.submit().unwrap();
        bob.poll();
        assert!(bob.is_my_turn());

        bob.restart().unwrap();
        assert!(bob.board().is_empty());
        assert_eq!(bob.game_status(), Some(GameStatus::Active));
        assert!(!bob.is_my_turn());
        assert!(bob.players().iter().all(|p| p.score == 0 && p.rack.len() == 7));
        let racks: Vec<String> = bob.players().iter().map(|p| p.rack.as_string()).collect();
        assert_eq!(racks.len(), 2);

        ann.poll();
        assert!(ann.board().is_empty());
        assert!(ann.is_my_turn());
        assert_eq!(ann.rack().len(), 7);
        assert!(ann.players().iter().all(|p| p.score == 0));
    }

    #[test]
    fn test_turn_change_from_feed_returns_pending() {
        let store = shared();
        let mut ann = session_on(store.clone(), 1);
        let id = ann.create_game("ann").unwrap();
        let mut bob = session_on(store.clone(), 2);
        bob.join_game(&id, "bob").unwrap();
        ann.poll();
        give_rack(&mut ann, "CATEEEE");
        ann.place('C', 7, 7).unwrap();

        // Someone else's write hands the turn to bob
        let mut game = store.clone().get_game(&id).unwrap().unwrap();
        game.current_player_id = bob.player_id().cloned();
        store.clone().update_game(&game).unwrap();

        ann.poll();
        assert!(!ann.is_my_turn());
        assert!(ann.pending_tiles().is_empty());
        assert_eq!(ann.rack().len(), 7);
        bob.poll();
        assert!(bob.live_placements().is_empty());
    }

    #[test]
    fn test_feed_loss_and_reconnect() {
        let failing = FailingStore::new(shared());
        let switches = failing.switches();
        let mut ann = GameSession::with_rng(
            failing,
            lexicon(&["CAT"]),
            EngineConfig::default(),
            StdRng::seed_from_u64(1),
        );
        let id = ann.create_game("ann").unwrap();
        assert_eq!(ann.connection_status(), ConnectionStatus::Connected);

        // Something else advances the game while the feed is down
        let mut game = ann.store_mut().get_game(&id).unwrap().unwrap();
        switches.fail_reads(true);
        ann.connection.mark_disconnected(Instant::now());
        assert_eq!(ann.connection_status(), ConnectionStatus::Disconnected);
        game.board.set(Position::new(0, 0), 'Q');
        ann.store_mut().update_game(&game).unwrap();

        let err = ann.manual_reconnect().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransientSync);
        assert_eq!(ann.connection_status(), ConnectionStatus::Disconnected);

        switches.fail_reads(false);
        ann.manual_reconnect().unwrap();
        assert_eq!(ann.connection_status(), ConnectionStatus::Connected);
        assert_eq!(ann.board().get(Position::new(0, 0)), Some('Q'));
    }

    #[test]
    fn test_scheduled_retry_in_tick() {
        let failing = FailingStore::new(shared());
        let mut ann = GameSession::with_rng(
            failing,
            lexicon(&["CAT"]),
            EngineConfig::default(),
            StdRng::seed_from_u64(1),
        );
        ann.create_game("ann").unwrap();
        let start = Instant::now();
        ann.connection.mark_disconnected(start);
        ann.tick(start);
        assert_eq!(ann.connection_status(), ConnectionStatus::Disconnected);
        ann.tick(start + std::time::Duration::from_secs(5));
        assert_eq!(ann.connection_status(), ConnectionStatus::Connected);
    }

    #[test]
    fn test_bag_exhaustion_is_partial_and_flagged() {
        let mut s = session_on(shared(), 1);
        s.bag = TileBag::from_tiles(vec!['A', 'B']);
        let drawn = s.deal(7, 0.0);
        assert_eq!(drawn, vec!['A', 'B']);
        assert!(s.bag_exhausted());
        assert_eq!(s.bag_len(), 0);
    }
}
