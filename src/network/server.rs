#![allow(dead_code)]
//! TCP server hosting a shared store
//!
//! `Server` accepts peers and collects their messages; `StoreHost` answers
//! store requests against the store it owns and forwards change-feed
//! messages to the peers that subscribed.

use super::peer::Peer;
use super::protocol::{Message, RemoteError, Reply, StoreOp};
use crate::storage::feed::Subscription;
use crate::storage::{Store, StoreError};
use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::Duration;

/// Default port for store hosts
pub const DEFAULT_PORT: u16 = 55433;

/// Maximum port to try when auto-incrementing
const MAX_PORT: u16 = 55533;

/// A server that accepts peer connections
pub struct Server {
    /// Local address the server is bound to
    addr: SocketAddr,
    /// Channel to receive new peer connections
    new_peers_rx: Receiver<Peer>,
    /// Connected peers
    peers: Vec<Peer>,
    /// Running flag
    running: bool,
}

impl Server {
    /// Start a new server on the default port with auto-increment
    pub fn start() -> io::Result<Self> {
        Self::start_on_port(DEFAULT_PORT)
    }

    /// Start a new server on a specific port with auto-increment fallback
    pub fn start_on_port(start_port: u16) -> io::Result<Self> {
        let mut port = start_port;
        let listener = loop {
            match TcpListener::bind(format!("0.0.0.0:{}", port)) {
                Ok(l) => break l,
                Err(e) if e.kind() == io::ErrorKind::AddrInUse && port < MAX_PORT => {
                    port += 1;
                }
                Err(e) => return Err(e),
            }
        };

        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let (new_peers_tx, new_peers_rx) = channel();

        // Spawn acceptor thread
        thread::spawn(move || {
            accept_loop(listener, new_peers_tx);
        });

        tracing::info!(%addr, "server listening");
        Ok(Server {
            addr,
            new_peers_rx,
            peers: Vec::new(),
            running: true,
        })
    }

    /// Get the address the server is listening on
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the port the server is listening on
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Poll for new connections and messages
    pub fn poll(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();

        // Accept new peers
        loop {
            match self.new_peers_rx.try_recv() {
                Ok(peer) => {
                    events.push(ServerEvent::PeerConnected { addr: peer.addr });
                    self.peers.push(peer);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.running = false;
                    break;
                }
            }
        }

        // Collect messages from peers and track disconnections
        let mut disconnected = Vec::new();
        for (i, peer) in self.peers.iter_mut().enumerate() {
            for msg in peer.recv_all() {
                events.push(ServerEvent::MessageReceived {
                    from: peer.addr,
                    message: msg,
                });
            }
            if !peer.is_alive() {
                disconnected.push(i);
            }
        }

        // Remove disconnected peers (in reverse order to preserve indices)
        for i in disconnected.into_iter().rev() {
            let peer = self.peers.remove(i);
            events.push(ServerEvent::PeerDisconnected { addr: peer.addr });
        }

        events
    }

    /// Broadcast a message to all connected peers
    pub fn broadcast(&self, msg: &Message) {
        for peer in &self.peers {
            let _ = peer.send(msg.clone());
        }
    }

    /// Send a message to a specific peer by address
    pub fn send_to(&self, addr: SocketAddr, msg: Message) -> io::Result<()> {
        match self.peers.iter().find(|p| p.addr == addr) {
            Some(peer) => peer.send(msg),
            None => Err(io::Error::new(io::ErrorKind::NotFound, "peer not found")),
        }
    }

    /// Get the number of connected peers
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Get addresses of all connected peers
    pub fn peer_addrs(&self) -> Vec<SocketAddr> {
        self.peers.iter().map(|p| p.addr).collect()
    }

    /// Check if the server is still running
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Stop the server
    pub fn stop(&mut self) {
        self.running = false;
        self.peers.clear();
    }
}

/// Events from the server
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A new peer connected
    PeerConnected { addr: SocketAddr },
    /// A peer disconnected
    PeerDisconnected { addr: SocketAddr },
    /// A message was received from a peer
    MessageReceived { from: SocketAddr, message: Message },
}

fn accept_loop(listener: TcpListener, tx: Sender<Peer>) {
    loop {
        match listener.accept() {
            Ok((stream, _addr)) => {
                if let Ok(peer) = Peer::new(stream) {
                    if tx.send(peer).is_err() {
                        break;
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(_) => break,
        }
    }
}

/// Serves one store to every connected peer
pub struct StoreHost<S: Store> {
    server: Server,
    store: S,
    /// Feed subscriptions per peer, keyed by the peer's subscription number
    subscriptions: HashMap<SocketAddr, HashMap<u64, Subscription>>,
}

impl<S: Store> StoreHost<S> {
    pub fn new(server: Server, store: S) -> Self {
        Self {
            server,
            store,
            subscriptions: HashMap::new(),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.server.addr()
    }

    pub fn port(&self) -> u16 {
        self.server.port()
    }

    pub fn peer_count(&self) -> usize {
        self.server.peer_count()
    }

    /// Handle pending requests and forward feed changes. Returns the number
    /// of requests answered.
    pub fn poll(&mut self) -> usize {
        let mut handled = 0;
        for event in self.server.poll() {
            match event {
                ServerEvent::PeerConnected { addr } => {
                    tracing::info!(%addr, "client connected");
                }
                ServerEvent::PeerDisconnected { addr } => {
                    self.subscriptions.remove(&addr);
                    tracing::info!(%addr, "client disconnected");
                }
                ServerEvent::MessageReceived { from, message } => match message {
                    Message::Request { id, op } => {
                        let result = self.handle(from, op);
                        if let Err(e) = self.server.send_to(from, Message::Response { id, result }) {
                            tracing::warn!(addr = %from, error = %e, "failed to answer request");
                        }
                        handled += 1;
                    }
                    Message::Ping => {
                        let _ = self.server.send_to(from, Message::Pong);
                    }
                    other => {
                        tracing::debug!(addr = %from, message = ?other, "ignoring unexpected message");
                    }
                },
            }
        }
        self.forward_feeds();
        handled
    }

    /// Serve until `shutdown` is set
    pub fn run(&mut self, shutdown: &AtomicBool) {
        while !shutdown.load(Ordering::Relaxed) && self.server.is_running() {
            if self.poll() == 0 {
                thread::sleep(Duration::from_millis(10));
            }
        }
        tracing::info!("store host stopping");
        self.server.stop();
    }

    fn handle(&mut self, from: SocketAddr, op: StoreOp) -> Result<Reply, RemoteError> {
        tracing::trace!(addr = %from, op = ?op, "store request");
        let result: Result<Reply, StoreError> = match op {
            StoreOp::GetGame { game_id } => self.store.get_game(&game_id).map(Reply::Game),
            StoreOp::InsertGame { game } => self.store.insert_game(&game).map(Reply::Stored),
            StoreOp::UpdateGame { game } => self.store.update_game(&game).map(Reply::Stored),
            StoreOp::Players { game_id } => self.store.players(&game_id).map(Reply::Players),
            StoreOp::InsertPlayer { player } => {
                self.store.insert_player(&player).map(|_| Reply::Done)
            }
            StoreOp::UpdatePlayer { player } => {
                self.store.update_player(&player).map(|_| Reply::Done)
            }
            StoreOp::Placements { game_id } => {
                self.store.placements(&game_id).map(Reply::Placements)
            }
            StoreOp::UpsertPlacements { placements } => {
                self.store.upsert_placements(&placements).map(|_| Reply::Done)
            }
            StoreOp::DeletePlacements { game_id, player_id } => self
                .store
                .delete_placements(&game_id, &player_id)
                .map(|_| Reply::Done),
            StoreOp::Subscribe {
                subscription,
                game_id,
                table,
            } => self.store.subscribe(&game_id, table).map(|sub| {
                self.subscriptions
                    .entry(from)
                    .or_default()
                    .insert(subscription, sub);
                Reply::Done
            }),
            StoreOp::Unsubscribe { subscription } => {
                if let Some(subs) = self.subscriptions.get_mut(&from) {
                    subs.remove(&subscription);
                }
                Ok(Reply::Done)
            }
        };
        result.map_err(|e| {
            tracing::warn!(addr = %from, error = %e, "store request failed");
            RemoteError::from(&e)
        })
    }

    fn forward_feeds(&mut self) {
        for (addr, subs) in self.subscriptions.iter_mut() {
            for (id, sub) in subs.iter_mut() {
                for message in sub.drain() {
                    let msg = Message::Feed {
                        subscription: *id,
                        message,
                    };
                    if let Err(e) = self.server.send_to(*addr, msg) {
                        tracing::debug!(%addr, error = %e, "feed forward failed");
                    }
                }
            }
        }
    }
}
