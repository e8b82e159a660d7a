//! A client's replica of one game and the single reducer that applies
//! authoritative feed events to it.
//!
//! Reconciliation policy: the committed board, turn owner and player list
//! always come from the store. Game snapshots carry a store-assigned
//! version; an older one is ignored, anything else replaces the local game
//! wholesale. Pending tiles are a local overlay on top of the committed
//! board and are handed back to the rack when a snapshot makes them
//! impossible (their cell got taken, or the turn moved away).

use crate::game::board::Board;
use crate::game::tiles::Rack;
use crate::game::validation::PendingTile;
use crate::game::PlayerId;
use crate::storage::feed::FeedEvent;
use crate::storage::{GameRecord, LivePlacement, PlayerRecord};

/// What one applied event changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Applied {
    /// The event was older than the replica and ignored
    pub stale: bool,
    /// Pending tiles handed back to the rack
    pub returned: Vec<PendingTile>,
}

/// Local state of one joined game
#[derive(Debug, Clone, Default)]
pub struct Replica {
    local_player: Option<PlayerId>,
    game: Option<GameRecord>,
    players: Vec<PlayerRecord>,
    placements: Vec<LivePlacement>,
    rack: Rack,
    pending: Vec<PendingTile>,
    /// Letters committed to the board that the stored rack still lists
    spent: Vec<char>,
    provisional: bool,
}

impl Replica {
    pub fn new(local_player: PlayerId) -> Self {
        Self {
            local_player: Some(local_player),
            ..Self::default()
        }
    }

    pub fn local_player(&self) -> Option<&PlayerId> {
        self.local_player.as_ref()
    }

    pub fn game(&self) -> Option<&GameRecord> {
        self.game.as_ref()
    }

    /// Committed board, empty before the first snapshot
    pub fn board(&self) -> Board {
        self.game.as_ref().map(|g| g.board.clone()).unwrap_or_default()
    }

    /// Committed board with this turn's pending tiles laid on top
    pub fn board_with_pending(&self) -> Board {
        let mut board = self.board();
        for tile in &self.pending {
            board.set(tile.pos(), tile.letter);
        }
        board
    }

    /// Players in join order
    pub fn players(&self) -> &[PlayerRecord] {
        &self.players
    }

    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.players.iter().map(|p| p.id.clone()).collect()
    }

    pub fn local_record(&self) -> Option<&PlayerRecord> {
        let me = self.local_player.as_ref()?;
        self.players.iter().find(|p| &p.id == me)
    }

    /// Every live placement in the game, including this player's own
    pub fn placements(&self) -> &[LivePlacement] {
        &self.placements
    }

    /// Live placements of the other players
    pub fn other_placements(&self) -> Vec<&LivePlacement> {
        self.placements
            .iter()
            .filter(|p| Some(&p.player_id) != self.local_player.as_ref())
            .collect()
    }

    pub fn rack(&self) -> &Rack {
        &self.rack
    }

    pub fn rack_mut(&mut self) -> &mut Rack {
        self.provisional = true;
        &mut self.rack
    }

    pub fn pending(&self) -> &[PendingTile] {
        &self.pending
    }

    pub fn current_turn(&self) -> Option<&PlayerId> {
        self.game.as_ref()?.current_player_id.as_ref()
    }

    pub fn is_my_turn(&self) -> bool {
        self.local_player.is_some() && self.current_turn() == self.local_player.as_ref()
    }

    /// Version of the last authoritative game snapshot
    pub fn version(&self) -> u64 {
        self.game.as_ref().map(|g| g.version).unwrap_or(0)
    }

    /// Local edits made since the last authoritative snapshot
    pub fn is_provisional(&self) -> bool {
        self.provisional
    }

    /// Apply one authoritative event
    pub fn apply(&mut self, event: FeedEvent) -> Applied {
        match event {
            FeedEvent::GameChanged(game) => self.apply_game(game),
            FeedEvent::PlayersChanged(players) => self.apply_players(players),
            FeedEvent::PlacementsChanged(placements) => {
                self.placements = placements;
                Applied::default()
            }
        }
    }

    fn apply_game(&mut self, game: GameRecord) -> Applied {
        if let Some(current) = &self.game {
            if current.id == game.id && game.version < current.version {
                tracing::debug!(
                    game_id = %game.id,
                    held = current.version,
                    received = game.version,
                    "ignoring stale game snapshot"
                );
                return Applied {
                    stale: true,
                    ..Applied::default()
                };
            }
        }
        self.game = Some(game);
        self.provisional = false;

        let returned = if self.is_my_turn() {
            let board = self.board();
            let (blocked, kept): (Vec<PendingTile>, Vec<PendingTile>) = self
                .pending
                .drain(..)
                .partition(|t| board.is_occupied(t.pos()));
            self.pending = kept;
            blocked
        } else {
            std::mem::take(&mut self.pending)
        };
        for tile in &returned {
            self.rack.put_back(tile.letter);
        }
        if !returned.is_empty() {
            tracing::info!(count = returned.len(), "pending tiles returned to rack");
        }
        Applied {
            stale: false,
            returned,
        }
    }

    /// Players are replaced wholesale. The local rack becomes the stored
    /// rack minus spent letters and the letters sitting on the board as
    /// pending tiles.
    fn apply_players(&mut self, players: Vec<PlayerRecord>) -> Applied {
        self.players = players;
        let Some(stored) = self.local_record().map(|p| p.rack.clone()) else {
            return Applied::default();
        };

        let mut rack = stored;
        for &letter in &self.spent {
            rack.take(letter);
        }
        let mut dropped = Vec::new();
        self.pending.retain(|tile| {
            if rack.take(tile.letter) {
                true
            } else {
                dropped.push(*tile);
                false
            }
        });
        if !dropped.is_empty() {
            tracing::warn!(count = dropped.len(), "pending tiles not in stored rack dropped");
        }
        self.rack = rack;
        Applied::default()
    }

    /// Install a fresh snapshot, as after a reconnect
    pub fn replace(
        &mut self,
        game: GameRecord,
        players: Vec<PlayerRecord>,
        placements: Option<Vec<LivePlacement>>,
    ) -> Applied {
        let applied = self.apply(FeedEvent::GameChanged(game));
        self.apply(FeedEvent::PlayersChanged(players));
        if let Some(placements) = placements {
            self.apply(FeedEvent::PlacementsChanged(placements));
        }
        applied
    }

    /// Lay a tile from the rack onto the board. The caller has already
    /// checked turn and cell. Returns false if the letter is not in the rack.
    pub fn place_pending(&mut self, tile: PendingTile) -> bool {
        if !self.rack.take(tile.letter) {
            return false;
        }
        self.pending.push(tile);
        self.provisional = true;
        true
    }

    /// Take a pending tile back into the rack
    pub fn remove_pending(&mut self, x: usize, y: usize, letter: char) -> bool {
        match self
            .pending
            .iter()
            .position(|t| t.x == x && t.y == y && t.letter == letter)
        {
            Some(index) => {
                let tile = self.pending.remove(index);
                self.rack.put_back(tile.letter);
                self.provisional = true;
                true
            }
            None => false,
        }
    }

    /// Hand every pending tile back to the rack
    pub fn return_all_pending(&mut self) -> Vec<PendingTile> {
        let returned = std::mem::take(&mut self.pending);
        for tile in &returned {
            self.rack.put_back(tile.letter);
        }
        if !returned.is_empty() {
            self.provisional = true;
        }
        returned
    }

    /// Forget pending tiles without returning them
    pub fn discard_pending(&mut self) -> Vec<PendingTile> {
        std::mem::take(&mut self.pending)
    }

    /// The pending tiles were committed to the board but the stored rack
    /// was not updated. Their letters stay out of the rack until
    /// `clear_spent`.
    pub fn spend_pending(&mut self) -> Vec<PendingTile> {
        let spent = std::mem::take(&mut self.pending);
        self.spent.extend(spent.iter().map(|t| t.letter));
        spent
    }

    /// The stored rack no longer lists spent letters
    pub fn clear_spent(&mut self) {
        self.spent.clear();
    }

    pub fn spent(&self) -> &[char] {
        &self.spent
    }

    /// Record the result of this client's own successful writes
    pub fn commit_local(&mut self, game: GameRecord, me: PlayerRecord) {
        self.pending.clear();
        self.spent.clear();
        self.rack = me.rack.clone();
        match self.players.iter_mut().find(|p| p.id == me.id) {
            Some(slot) => *slot = me,
            None => self.players.push(me),
        }
        if game.version >= self.version() {
            self.game = Some(game);
        }
        self.provisional = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::board::Position;
    use crate::game::GameId;
    use crate::storage::GameStatus;

    fn game(version: u64, current: &str) -> GameRecord {
        let mut g = GameRecord::new(GameId::from("g"));
        g.version = version;
        g.status = GameStatus::Active;
        g.current_player_id = Some(PlayerId::from(current));
        g
    }

    fn player(id: &str, order: u32, rack: &str) -> PlayerRecord {
        PlayerRecord {
            id: PlayerId::from(id),
            game_id: GameId::from("g"),
            name: id.to_string(),
            score: 0,
            rack: Rack::new(rack.chars().collect()),
            order_num: order,
        }
    }

    fn my_replica() -> Replica {
        let mut r = Replica::new(PlayerId::from("me"));
        r.apply(FeedEvent::GameChanged(game(1, "me")));
        r.apply(FeedEvent::PlayersChanged(vec![player("me", 1, "CATXYZQ"), player("you", 2, "")]));
        r
    }

    #[test]
    fn test_newer_game_replaces_older_is_ignored() {
        let mut r = my_replica();
        let mut newer = game(3, "you");
        newer.board.set(Position::new(0, 0), 'A');
        assert!(!r.apply(FeedEvent::GameChanged(newer)).stale);
        assert_eq!(r.version(), 3);

        let applied = r.apply(FeedEvent::GameChanged(game(2, "me")));
        assert!(applied.stale);
        assert_eq!(r.version(), 3);
        assert_eq!(r.current_turn(), Some(&PlayerId::from("you")));
        assert!(r.board().is_occupied(Position::new(0, 0)));
    }

    #[test]
    fn test_players_adopt_stored_rack() {
        let r = my_replica();
        assert_eq!(r.rack().as_string(), "CATXYZQ");
        assert_eq!(r.players().len(), 2);
        assert!(r.is_my_turn());
    }

    #[test]
    fn test_place_and_remove_pending() {
        let mut r = my_replica();
        assert!(r.place_pending(PendingTile::new(7, 7, 'C')));
        assert!(!r.place_pending(PendingTile::new(8, 7, 'E')));
        assert_eq!(r.rack().as_string(), "ATXYZQ");
        assert!(r.is_provisional());
        assert_eq!(r.board_with_pending().get(Position::new(7, 7)), Some('C'));
        assert!(r.board().is_empty());

        assert!(!r.remove_pending(7, 7, 'A'));
        assert!(r.remove_pending(7, 7, 'C'));
        assert!(r.pending().is_empty());
        assert_eq!(r.rack().len(), 7);
    }

    #[test]
    fn test_spent_letters_stay_out_of_stale_rack() {
        let mut r = my_replica();
        r.place_pending(PendingTile::new(7, 7, 'C'));
        r.place_pending(PendingTile::new(8, 7, 'A'));
        r.spend_pending();
        assert!(r.pending().is_empty());
        assert_eq!(r.spent(), &['C', 'A']);

        // The stored row was never updated and still lists C and A
        r.apply(FeedEvent::PlayersChanged(vec![player("me", 1, "CATXYZQ"), player("you", 2, "")]));
        assert_eq!(r.rack().as_string(), "TXYZQ");

        r.clear_spent();
        r.apply(FeedEvent::PlayersChanged(vec![player("me", 1, "TXYZQEE"), player("you", 2, "")]));
        assert_eq!(r.rack().as_string(), "TXYZQEE");
    }

    #[test]
    fn test_conflicting_snapshot_returns_pending_tile() {
        let mut r = my_replica();
        r.place_pending(PendingTile::new(7, 7, 'C'));
        r.place_pending(PendingTile::new(8, 7, 'A'));

        let mut snapshot = game(2, "me");
        snapshot.board.set(Position::new(7, 7), 'Z');
        let applied = r.apply(FeedEvent::GameChanged(snapshot));
        assert_eq!(applied.returned, vec![PendingTile::new(7, 7, 'C')]);
        assert_eq!(r.pending(), &[PendingTile::new(8, 7, 'A')]);
        assert!(r.rack().tiles().contains(&'C'));
        assert!(!r.is_provisional());
    }

    #[test]
    fn test_turn_moving_away_returns_everything() {
        let mut r = my_replica();
        r.place_pending(PendingTile::new(7, 7, 'C'));
        let applied = r.apply(FeedEvent::GameChanged(game(2, "you")));
        assert_eq!(applied.returned.len(), 1);
        assert!(r.pending().is_empty());
        assert_eq!(r.rack().len(), 7);
    }

    #[test]
    fn test_players_snapshot_keeps_pending_overlay() {
        let mut r = my_replica();
        r.place_pending(PendingTile::new(7, 7, 'C'));
        // Another player joins; my stored rack is unchanged
        r.apply(FeedEvent::PlayersChanged(vec![
            player("me", 1, "CATXYZQ"),
            player("you", 2, ""),
            player("them", 3, ""),
        ]));
        assert_eq!(r.pending().len(), 1);
        assert_eq!(r.rack().as_string(), "ATXYZQ");
        assert_eq!(r.players().len(), 3);
    }

    #[test]
    fn test_players_snapshot_drops_pending_not_in_rack() {
        let mut r = my_replica();
        r.place_pending(PendingTile::new(7, 7, 'Q'));
        r.apply(FeedEvent::PlayersChanged(vec![player("me", 1, "EEEEEEE")]));
        assert!(r.pending().is_empty());
        assert_eq!(r.rack().as_string(), "EEEEEEE");
    }

    #[test]
    fn test_placements_replaced_wholesale_and_filtered() {
        let mut r = my_replica();
        let lp = |who: &str, x| LivePlacement {
            game_id: GameId::from("g"),
            player_id: PlayerId::from(who),
            x,
            y: 0,
            letter: 'A',
        };
        r.apply(FeedEvent::PlacementsChanged(vec![lp("me", 0), lp("you", 1), lp("you", 2)]));
        assert_eq!(r.placements().len(), 3);
        assert_eq!(r.other_placements().len(), 2);
        r.apply(FeedEvent::PlacementsChanged(vec![lp("you", 5)]));
        assert_eq!(r.placements().len(), 1);
    }

    #[test]
    fn test_commit_local_clears_pending_and_updates_player() {
        let mut r = my_replica();
        r.place_pending(PendingTile::new(7, 7, 'C'));
        let mut g = game(2, "you");
        g.board.set(Position::new(7, 7), 'C');
        let mut me = player("me", 1, "ATXYZQE");
        me.score = 12;
        r.commit_local(g, me);
        assert!(r.pending().is_empty());
        assert_eq!(r.local_record().map(|p| p.score), Some(12));
        assert_eq!(r.rack().as_string(), "ATXYZQE");
        assert_eq!(r.version(), 2);
    }
}
