//! Change feed: per-game, per-table subscriptions delivering full snapshots.
//!
//! Every write to a table publishes the whole game-scoped slice of that
//! table, never a delta. Subscribers receive a lifecycle status first
//! (`Subscribed`) and a `Closed` status when the feed goes away.

use super::{GameRecord, LivePlacement, PlayerRecord};
use crate::game::GameId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

/// The three record tables a game can be watched on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Games,
    Players,
    LivePlacements,
}

impl Table {
    pub const ALL: [Table; 3] = [Table::Games, Table::Players, Table::LivePlacements];
}

/// Lifecycle of one subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionStatus {
    Subscribed,
    Closed,
    Error(String),
}

/// A full-snapshot change to one slice of a game's state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedEvent {
    GameChanged(GameRecord),
    /// Every player of the game, ordered by `order_num`
    PlayersChanged(Vec<PlayerRecord>),
    /// Every live placement of the game
    PlacementsChanged(Vec<LivePlacement>),
}

impl FeedEvent {
    /// Table this event belongs to
    pub fn table(&self) -> Table {
        match self {
            FeedEvent::GameChanged(_) => Table::Games,
            FeedEvent::PlayersChanged(_) => Table::Players,
            FeedEvent::PlacementsChanged(_) => Table::LivePlacements,
        }
    }
}

/// What a subscription delivers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedMessage {
    Status(SubscriptionStatus),
    Event(FeedEvent),
}

/// Receiving end of one (game, table) subscription
#[derive(Debug)]
pub struct Subscription {
    game_id: GameId,
    table: Table,
    rx: Receiver<FeedMessage>,
    closed: bool,
}

impl Subscription {
    /// A connected sender/subscription pair
    pub fn channel(game_id: GameId, table: Table) -> (Sender<FeedMessage>, Subscription) {
        let (tx, rx) = channel();
        let sub = Subscription {
            game_id,
            table,
            rx,
            closed: false,
        };
        (tx, sub)
    }

    pub fn game_id(&self) -> &GameId {
        &self.game_id
    }

    pub fn table(&self) -> Table {
        self.table
    }

    /// Whether the sending side has gone away
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Take every message delivered so far. Non-blocking.
    /// A vanished sender shows up once as a trailing `Closed` status.
    pub fn drain(&mut self) -> Vec<FeedMessage> {
        let mut messages = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(msg) => {
                    if msg == FeedMessage::Status(SubscriptionStatus::Closed) {
                        self.closed = true;
                    }
                    messages.push(msg);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.closed {
                        self.closed = true;
                        messages.push(FeedMessage::Status(SubscriptionStatus::Closed));
                    }
                    break;
                }
            }
        }
        messages
    }

    /// Wait up to `timeout` for the next message
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<FeedMessage> {
        if self.closed {
            return None;
        }
        match self.rx.recv_timeout(timeout) {
            Ok(msg) => {
                if msg == FeedMessage::Status(SubscriptionStatus::Closed) {
                    self.closed = true;
                }
                Some(msg)
            }
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                self.closed = true;
                Some(FeedMessage::Status(SubscriptionStatus::Closed))
            }
        }
    }
}

/// Sending side of every subscription held by one store
#[derive(Debug, Default)]
pub struct FeedHub {
    subscribers: HashMap<(GameId, Table), Vec<Sender<FeedMessage>>>,
}

impl FeedHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. It is told `Subscribed` straight away.
    pub fn subscribe(&mut self, game_id: &GameId, table: Table) -> Subscription {
        let (tx, sub) = Subscription::channel(game_id.clone(), table);
        let _ = tx.send(FeedMessage::Status(SubscriptionStatus::Subscribed));
        self.subscribers
            .entry((game_id.clone(), table))
            .or_default()
            .push(tx);
        sub
    }

    /// Whether anyone is listening on (game, table)
    pub fn has_subscribers(&self, game_id: &GameId, table: Table) -> bool {
        self.subscribers
            .get(&(game_id.clone(), table))
            .is_some_and(|senders| !senders.is_empty())
    }

    /// Deliver an event to its table's subscribers, dropping the ones that
    /// hung up. Returns how many received it.
    pub fn publish(&mut self, game_id: &GameId, event: FeedEvent) -> usize {
        let key = (game_id.clone(), event.table());
        let Some(senders) = self.subscribers.get_mut(&key) else {
            return 0;
        };
        senders.retain(|tx| tx.send(FeedMessage::Event(event.clone())).is_ok());
        let delivered = senders.len();
        if senders.is_empty() {
            self.subscribers.remove(&key);
        }
        tracing::trace!(game_id = %game_id, table = ?key.1, delivered, "feed published");
        delivered
    }

    /// Tell every subscriber the feed is gone and forget them
    pub fn close_all(&mut self) {
        for senders in self.subscribers.values() {
            for tx in senders {
                let _ = tx.send(FeedMessage::Status(SubscriptionStatus::Closed));
            }
        }
        self.subscribers.clear();
    }

    /// Total live subscriber count
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.values().map(Vec::len).sum()
    }
}
