//! Per-game connection to the store's change feeds
//!
//! A `SessionConnection` exists while a client is in a game. It owns the
//! three table subscriptions, the last-known turn owner, and the retry
//! schedule used while the feed is down. Closing it tears all of that down.

use crate::game::turn::{BonusOdds, TurnState};
use crate::game::GameId;
use crate::storage::feed::{FeedEvent, FeedMessage, Subscription, SubscriptionStatus, Table};
use crate::storage::{GameRecord, LivePlacement, PlayerRecord, Store, StoreError};
use std::time::{Duration, Instant};

/// Interval between reconnect attempts while disconnected
pub const RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Feed health as shown to the player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

impl ConnectionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
        }
    }
}

/// Authoritative state fetched by a reconnect
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub game: GameRecord,
    pub players: Vec<PlayerRecord>,
    /// Absent if the placement fetch failed; placements are advisory
    pub placements: Option<Vec<LivePlacement>>,
}

/// Subscriptions and turn tracking for one joined game
#[derive(Debug)]
pub struct SessionConnection {
    game_id: Option<GameId>,
    subscriptions: Vec<Subscription>,
    status: ConnectionStatus,
    retry_interval: Duration,
    next_retry: Option<Instant>,
    turn: TurnState,
}

impl SessionConnection {
    pub fn new(turn_seconds: u64, odds: BonusOdds, retry_interval: Duration) -> Self {
        Self {
            game_id: None,
            subscriptions: Vec::new(),
            status: ConnectionStatus::Disconnected,
            retry_interval,
            next_retry: None,
            turn: TurnState::new(turn_seconds, odds),
        }
    }

    pub fn game_id(&self) -> Option<&GameId> {
        self.game_id.as_ref()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    pub fn turn(&self) -> &TurnState {
        &self.turn
    }

    pub fn turn_mut(&mut self) -> &mut TurnState {
        &mut self.turn
    }

    /// Subscribe to every table of `game_id`, replacing any earlier game.
    /// On failure the connection is left disconnected with a retry scheduled.
    pub fn open<S: Store + ?Sized>(
        &mut self,
        store: &mut S,
        game_id: &GameId,
        now: Instant,
    ) -> Result<(), StoreError> {
        self.close();
        self.game_id = Some(game_id.clone());
        match self.subscribe_all(store, game_id) {
            Ok(()) => {
                self.status = ConnectionStatus::Connected;
                self.next_retry = None;
                tracing::info!(game_id = %game_id, "subscribed to game feeds");
                Ok(())
            }
            Err(e) => {
                self.mark_disconnected(now);
                Err(e)
            }
        }
    }

    fn subscribe_all<S: Store + ?Sized>(&mut self, store: &mut S, game_id: &GameId) -> Result<(), StoreError> {
        let mut subscriptions = Vec::with_capacity(Table::ALL.len());
        for table in Table::ALL {
            subscriptions.push(store.subscribe(game_id, table)?);
        }
        self.subscriptions = subscriptions;
        Ok(())
    }

    /// Drop subscriptions and forget the game
    pub fn close(&mut self) {
        if let Some(game_id) = self.game_id.take() {
            tracing::debug!(game_id = %game_id, "closing game feeds");
        }
        self.subscriptions.clear();
        self.status = ConnectionStatus::Disconnected;
        self.next_retry = None;
    }

    /// Mark the feed as down and schedule the next reconnect attempt
    pub fn mark_disconnected(&mut self, now: Instant) {
        if self.status == ConnectionStatus::Connected {
            tracing::warn!("game feed lost, will retry");
        }
        self.status = ConnectionStatus::Disconnected;
        self.subscriptions.clear();
        self.next_retry = Some(now + self.retry_interval);
    }

    /// Drain every subscription. A closed or failed subscription flips the
    /// connection to disconnected; events received before that are kept.
    pub fn poll(&mut self, now: Instant) -> Vec<FeedEvent> {
        let mut events = Vec::new();
        let mut lost = false;
        for subscription in &mut self.subscriptions {
            for message in subscription.drain() {
                match message {
                    FeedMessage::Event(event) => events.push(event),
                    FeedMessage::Status(SubscriptionStatus::Subscribed) => {}
                    FeedMessage::Status(SubscriptionStatus::Closed) => lost = true,
                    FeedMessage::Status(SubscriptionStatus::Error(reason)) => {
                        tracing::warn!(table = ?subscription.table(), %reason, "subscription error");
                        lost = true;
                    }
                }
            }
        }
        if lost && self.game_id.is_some() {
            self.mark_disconnected(now);
        }
        events
    }

    /// Whether a reconnect attempt is due
    pub fn retry_due(&self, now: Instant) -> bool {
        self.game_id.is_some()
            && self.status == ConnectionStatus::Disconnected
            && self.next_retry.is_some_and(|at| now >= at)
    }

    /// Fetch the authoritative snapshot and re-subscribe. On failure the
    /// connection stays disconnected and the next attempt is rescheduled.
    pub fn reconnect<S: Store + ?Sized>(&mut self, store: &mut S, now: Instant) -> Result<Snapshot, StoreError> {
        let Some(game_id) = self.game_id.clone() else {
            return Err(StoreError::Unavailable("no game to reconnect to".to_string()));
        };
        match self.try_reconnect(store, &game_id) {
            Ok(snapshot) => {
                self.status = ConnectionStatus::Connected;
                self.next_retry = None;
                tracing::info!(game_id = %game_id, version = snapshot.game.version, "reconnected");
                Ok(snapshot)
            }
            Err(e) => {
                tracing::debug!(game_id = %game_id, error = %e, "reconnect failed");
                self.mark_disconnected(now);
                Err(e)
            }
        }
    }

    fn try_reconnect<S: Store + ?Sized>(&mut self, store: &mut S, game_id: &GameId) -> Result<Snapshot, StoreError> {
        let game = store
            .get_game(game_id)?
            .ok_or_else(|| StoreError::GameNotFound(game_id.clone()))?;
        let players = store.players(game_id)?;
        let placements = match store.placements(game_id) {
            Ok(rows) => Some(rows),
            Err(e) => {
                tracing::debug!(error = %e, "placement fetch failed during reconnect");
                None
            }
        };
        self.subscribe_all(store, game_id)?;
        Ok(Snapshot {
            game,
            players,
            placements,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStore;
    use crate::testing::FailingStore;

    fn connection() -> SessionConnection {
        SessionConnection::new(20, BonusOdds::default(), Duration::from_secs(5))
    }

    fn store_with_game() -> (SqliteStore, GameId) {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let id = GameId::from("g1");
        store.insert_game(&GameRecord::new(id.clone())).unwrap();
        (store, id)
    }

    #[test]
    fn test_open_subscribes_and_polls_events() {
        let (mut store, id) = store_with_game();
        let mut conn = connection();
        let now = Instant::now();
        conn.open(&mut store, &id, now).unwrap();
        assert!(conn.is_connected());
        assert!(conn.poll(now).is_empty());

        let game = store.get_game(&id).unwrap().unwrap();
        store.update_game(&game).unwrap();
        let events = conn.poll(now);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], FeedEvent::GameChanged(g) if g.version == 2));
    }

    #[test]
    fn test_closed_feed_disconnects_and_schedules_retry() {
        let (mut store, id) = store_with_game();
        let mut conn = connection();
        let now = Instant::now();
        conn.open(&mut store, &id, now).unwrap();

        store.close_feeds();
        conn.poll(now);
        assert_eq!(conn.status(), ConnectionStatus::Disconnected);
        assert!(!conn.retry_due(now));
        assert!(!conn.retry_due(now + Duration::from_secs(4)));
        assert!(conn.retry_due(now + Duration::from_secs(5)));
    }

    #[test]
    fn test_reconnect_fetches_snapshot() {
        let (mut store, id) = store_with_game();
        let mut conn = connection();
        let now = Instant::now();
        conn.open(&mut store, &id, now).unwrap();
        store.close_feeds();
        conn.poll(now);

        let snapshot = conn.reconnect(&mut store, now).unwrap();
        assert_eq!(snapshot.game.id, id);
        assert!(snapshot.players.is_empty());
        assert_eq!(snapshot.placements.as_deref().map(|p| p.len()), Some(0));
        assert!(conn.is_connected());
        assert!(!conn.retry_due(now + Duration::from_secs(60)));
    }

    #[test]
    fn test_failed_reconnect_reschedules() {
        let (store, id) = store_with_game();
        let mut store = FailingStore::new(store);
        let mut conn = connection();
        let start = Instant::now();
        conn.open(&mut store, &id, start).unwrap();

        store.fail_reads(true);
        conn.mark_disconnected(start);
        let later = start + Duration::from_secs(5);
        assert!(conn.retry_due(later));
        let err = conn.reconnect(&mut store, later).unwrap_err();
        assert!(err.is_transient());
        assert!(!conn.retry_due(later + Duration::from_secs(1)));
        assert!(conn.retry_due(later + Duration::from_secs(5)));

        store.fail_reads(false);
        conn.reconnect(&mut store, later + Duration::from_secs(5)).unwrap();
        assert!(conn.is_connected());
    }

    #[test]
    fn test_open_failure_leaves_retry_scheduled() {
        let (store, id) = store_with_game();
        let mut store = FailingStore::new(store);
        store.fail_reads(true);
        let mut conn = connection();
        let now = Instant::now();
        assert!(conn.open(&mut store, &id, now).is_err());
        assert_eq!(conn.game_id(), Some(&id));
        assert!(conn.retry_due(now + RETRY_INTERVAL));
    }

    #[test]
    fn test_close_forgets_game() {
        let (mut store, id) = store_with_game();
        let mut conn = connection();
        let now = Instant::now();
        conn.open(&mut store, &id, now).unwrap();
        conn.close();
        assert!(conn.game_id().is_none());
        assert!(!conn.retry_due(now + Duration::from_secs(60)));
    }
}
