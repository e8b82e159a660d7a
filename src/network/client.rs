#![allow(dead_code)]
//! TCP client: a `Store` backed by a remote store host
//!
//! The connection is opened lazily and re-opened on the next request after
//! it drops. A dispatcher thread routes pushed feed messages straight into
//! the matching `Subscription`; when the link dies every open subscription
//! receives a `Closed` status.

use super::peer::{Peer, PeerSender};
use super::protocol::{Message, RemoteError, Reply, StoreOp};
use super::server::DEFAULT_PORT;
use crate::game::{GameId, PlayerId};
use crate::storage::feed::{FeedMessage, Subscription, SubscriptionStatus, Table};
use crate::storage::{GameRecord, LivePlacement, PlayerRecord, Store, StoreError};
use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// How long a request may wait for its response
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

type FeedRoutes = Arc<Mutex<HashMap<u64, Sender<FeedMessage>>>>;

/// One live connection to the host
struct Link {
    sender: PeerSender,
    responses: Receiver<(u64, Result<Reply, RemoteError>)>,
    feeds: FeedRoutes,
    /// Subscriptions the local side dropped; unsubscribed on the next request
    abandoned: Arc<Mutex<Vec<u64>>>,
}

impl Link {
    fn open(addr: SocketAddr) -> io::Result<Self> {
        let (sender, incoming) = Peer::connect(addr)?.split();
        let (resp_tx, responses) = channel();
        let feeds: FeedRoutes = Arc::new(Mutex::new(HashMap::new()));
        let abandoned = Arc::new(Mutex::new(Vec::new()));

        let routes = Arc::clone(&feeds);
        let dropped = Arc::clone(&abandoned);
        thread::spawn(move || {
            while let Ok(msg) = incoming.recv() {
                match msg {
                    Message::Response { id, result } => {
                        if resp_tx.send((id, result)).is_err() {
                            break;
                        }
                    }
                    Message::Feed {
                        subscription,
                        message,
                    } => {
                        if let Ok(mut routes) = routes.lock() {
                            let gone = routes
                                .get(&subscription)
                                .is_some_and(|tx| tx.send(message).is_err());
                            if gone {
                                routes.remove(&subscription);
                                if let Ok(mut dropped) = dropped.lock() {
                                    dropped.push(subscription);
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
            tracing::info!(%addr, "connection to store host lost");
            if let Ok(mut routes) = routes.lock() {
                for tx in routes.values() {
                    let _ = tx.send(FeedMessage::Status(SubscriptionStatus::Closed));
                }
                routes.clear();
            }
        });

        tracing::info!(%addr, "connected to store host");
        Ok(Link {
            sender,
            responses,
            feeds,
            abandoned,
        })
    }
}

/// A store living on another machine
pub struct RemoteStore {
    addr: SocketAddr,
    link: Option<Link>,
    next_id: u64,
    timeout: Duration,
}

impl RemoteStore {
    /// A store for `addr` that connects on first use
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            link: None,
            next_id: 1,
            timeout: REQUEST_TIMEOUT,
        }
    }

    /// Connect now, failing if the host is unreachable
    ///
    /// The address can be:
    /// - "IP:PORT" (e.g., "192.168.1.100:55433")
    /// - "IP" (uses the default port)
    /// - "hostname:PORT"
    /// - "hostname" (uses the default port)
    pub fn connect(addr: &str) -> Result<Self, StoreError> {
        let socket_addr = parse_address(addr).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let mut store = Self::new(socket_addr);
        store.ensure_link()?;
        Ok(store)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Whether a connection is currently open
    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// Drop the connection. Open subscriptions see `Closed`.
    pub fn disconnect(&mut self) {
        self.link = None;
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn ensure_link(&mut self) -> Result<&mut Link, StoreError> {
        if self.link.is_none() {
            let link = Link::open(self.addr).map_err(|e| {
                tracing::debug!(addr = %self.addr, error = %e, "store host unreachable");
                StoreError::Unavailable(e.to_string())
            })?;
            self.link = Some(link);
        }
        self.link
            .as_mut()
            .ok_or_else(|| StoreError::Unavailable("not connected".to_string()))
    }

    fn request(&mut self, op: StoreOp) -> Result<Reply, StoreError> {
        let timeout = self.timeout;
        let cleanup: Vec<u64> = {
            let link = self.ensure_link()?;
            link.abandoned
                .lock()
                .map(|mut ids| ids.drain(..).collect())
                .unwrap_or_default()
        };
        for subscription in cleanup {
            let id = self.next_id();
            if let Some(link) = &self.link {
                let _ = link.sender.send(Message::Request {
                    id,
                    op: StoreOp::Unsubscribe { subscription },
                });
            }
        }

        let id = self.next_id();
        let outcome = match &self.link {
            Some(link) => Self::exchange(link, id, op, timeout),
            None => Err(StoreError::Unavailable("not connected".to_string())),
        };
        if matches!(outcome, Err(StoreError::Unavailable(_))) {
            self.disconnect();
        }
        outcome
    }

    fn exchange(link: &Link, id: u64, op: StoreOp, timeout: Duration) -> Result<Reply, StoreError> {
        link.sender
            .send(Message::Request { id, op })
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        loop {
            match link.responses.recv_timeout(timeout) {
                Ok((rid, result)) if rid == id => return result.map_err(StoreError::from),
                // Answer to an earlier fire-and-forget request
                Ok(_) => continue,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(StoreError::Unavailable("request timed out".to_string()))
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(StoreError::Unavailable("connection lost".to_string()))
                }
            }
        }
    }
}

fn unexpected(reply: Reply) -> StoreError {
    StoreError::Protocol(format!("unexpected reply {:?}", reply))
}

impl Store for RemoteStore {
    fn get_game(&mut self, id: &GameId) -> Result<Option<GameRecord>, StoreError> {
        match self.request(StoreOp::GetGame { game_id: id.clone() })? {
            Reply::Game(game) => Ok(game),
            other => Err(unexpected(other)),
        }
    }

    fn insert_game(&mut self, game: &GameRecord) -> Result<GameRecord, StoreError> {
        match self.request(StoreOp::InsertGame { game: game.clone() })? {
            Reply::Stored(game) => Ok(game),
            other => Err(unexpected(other)),
        }
    }

    fn update_game(&mut self, game: &GameRecord) -> Result<GameRecord, StoreError> {
        match self.request(StoreOp::UpdateGame { game: game.clone() })? {
            Reply::Stored(game) => Ok(game),
            other => Err(unexpected(other)),
        }
    }

    fn players(&mut self, game_id: &GameId) -> Result<Vec<PlayerRecord>, StoreError> {
        match self.request(StoreOp::Players { game_id: game_id.clone() })? {
            Reply::Players(players) => Ok(players),
            other => Err(unexpected(other)),
        }
    }

    fn insert_player(&mut self, player: &PlayerRecord) -> Result<(), StoreError> {
        match self.request(StoreOp::InsertPlayer { player: player.clone() })? {
            Reply::Done => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    fn update_player(&mut self, player: &PlayerRecord) -> Result<(), StoreError> {
        match self.request(StoreOp::UpdatePlayer { player: player.clone() })? {
            Reply::Done => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    fn placements(&mut self, game_id: &GameId) -> Result<Vec<LivePlacement>, StoreError> {
        match self.request(StoreOp::Placements { game_id: game_id.clone() })? {
            Reply::Placements(placements) => Ok(placements),
            other => Err(unexpected(other)),
        }
    }

    fn upsert_placements(&mut self, placements: &[LivePlacement]) -> Result<(), StoreError> {
        let op = StoreOp::UpsertPlacements {
            placements: placements.to_vec(),
        };
        match self.request(op)? {
            Reply::Done => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    fn delete_placements(
        &mut self,
        game_id: &GameId,
        player_id: &PlayerId,
    ) -> Result<(), StoreError> {
        let op = StoreOp::DeletePlacements {
            game_id: game_id.clone(),
            player_id: player_id.clone(),
        };
        match self.request(op)? {
            Reply::Done => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    fn subscribe(&mut self, game_id: &GameId, table: Table) -> Result<Subscription, StoreError> {
        let subscription = self.next_id();
        let (tx, sub) = Subscription::channel(game_id.clone(), table);
        {
            let link = self.ensure_link()?;
            let mut routes = link
                .feeds
                .lock()
                .map_err(|_| StoreError::Unavailable("feed routes poisoned".to_string()))?;
            routes.insert(subscription, tx);
        }
        let op = StoreOp::Subscribe {
            subscription,
            game_id: game_id.clone(),
            table,
        };
        match self.request(op)? {
            Reply::Done => Ok(sub),
            other => Err(unexpected(other)),
        }
    }
}

/// Parse an address string into a SocketAddr
///
/// Handles formats:
/// - "192.168.1.100:55433" -> parse directly
/// - "192.168.1.100" -> add default port
/// - "hostname:55433" -> resolve and use port
/// - "hostname" -> resolve and use default port
pub fn parse_address(addr: &str) -> io::Result<SocketAddr> {
    let with_port = if addr.contains(':') {
        addr.to_string()
    } else {
        format!("{}:{}", addr, DEFAULT_PORT)
    };
    with_port
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "could not resolve address"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::server::{Server, StoreHost};
    use crate::storage::feed::FeedEvent;
    use crate::storage::SqliteStore;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Instant;

    fn spawn_host(port: u16) -> (u16, Arc<AtomicBool>, thread::JoinHandle<()>) {
        let server = Server::start_on_port(port).unwrap();
        let port = server.port();
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            let mut host = StoreHost::new(server, SqliteStore::open_in_memory().unwrap());
            host.run(&flag);
        });
        (port, stop, handle)
    }

    fn wait_for_event(sub: &mut Subscription) -> Option<FeedMessage> {
        let start = Instant::now();
        while start.elapsed() < Duration::from_secs(3) {
            match sub.recv_timeout(Duration::from_millis(50)) {
                Some(FeedMessage::Event(e)) => return Some(FeedMessage::Event(e)),
                Some(FeedMessage::Status(SubscriptionStatus::Closed)) => {
                    return Some(FeedMessage::Status(SubscriptionStatus::Closed))
                }
                _ => continue,
            }
        }
        None
    }

    #[test]
    fn test_parse_address_with_port() {
        let addr = parse_address("127.0.0.1:55433").unwrap();
        assert_eq!(addr.port(), 55433);
    }

    #[test]
    fn test_parse_address_without_port() {
        let addr = parse_address("127.0.0.1").unwrap();
        assert_eq!(addr.port(), DEFAULT_PORT);
    }

    #[test]
    fn test_unreachable_host_is_unavailable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let mut store = RemoteStore::new(addr);
        let err = store.get_game(&GameId::from("g")).unwrap_err();
        assert!(err.is_transient());
        assert!(!store.is_connected());
    }

    #[test]
    fn test_remote_store_round_trip_and_feed() {
        let (port, stop, handle) = spawn_host(55510);
        let mut store = RemoteStore::connect(&format!("127.0.0.1:{}", port)).unwrap();

        let game = GameRecord::new(GameId::generate());
        let mut games = store.subscribe(&game.id, Table::Games).unwrap();
        let stored = store.insert_game(&game).unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(store.get_game(&game.id).unwrap(), Some(stored.clone()));

        match wait_for_event(&mut games) {
            Some(FeedMessage::Event(FeedEvent::GameChanged(g))) => assert_eq!(g, stored),
            other => panic!("expected game change, got {:?}", other),
        }

        let player = PlayerRecord {
            id: PlayerId::generate(),
            game_id: game.id.clone(),
            name: "ann".to_string(),
            score: 0,
            rack: Default::default(),
            order_num: 1,
        };
        store.insert_player(&player).unwrap();
        let err = store.insert_player(&player).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateName(_)));

        stop.store(true, Ordering::Relaxed);
        handle.join().unwrap();

        // The host is gone: the subscription is told so
        assert_eq!(
            wait_for_event(&mut games),
            Some(FeedMessage::Status(SubscriptionStatus::Closed))
        );
    }
}
