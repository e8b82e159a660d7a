//! Peer connection handling

use super::protocol::Message;
use std::io::{self, ErrorKind};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread;
use std::time::Duration;

/// Closes the socket when the last owner goes away, unblocking the reader thread
#[derive(Debug)]
struct ShutdownOnDrop(TcpStream);

impl Drop for ShutdownOnDrop {
    fn drop(&mut self) {
        let _ = self.0.shutdown(Shutdown::Both);
    }
}

/// A connected peer
#[derive(Debug)]
pub struct Peer {
    /// Peer's address
    pub addr: SocketAddr,
    /// Channel to send messages to this peer
    tx: Sender<Message>,
    /// Channel to receive messages from this peer
    rx: Receiver<Message>,
    /// Whether the connection is still alive
    alive: bool,
    socket: ShutdownOnDrop,
}

impl Peer {
    /// Create a new peer from a TCP stream
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        let addr = stream.peer_addr()?;

        // The reader blocks on whole frames; dropping the peer shuts the socket down
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(None)?;
        stream.set_write_timeout(Some(Duration::from_secs(5)))?;
        stream.set_nodelay(true)?;

        let (outgoing_tx, outgoing_rx) = channel::<Message>();
        let (incoming_tx, incoming_rx) = channel::<Message>();

        let mut read_stream = stream.try_clone()?;
        let mut write_stream = stream.try_clone()?;

        // Writer thread
        thread::spawn(move || {
            while let Ok(msg) = outgoing_rx.recv() {
                if let Err(e) = msg.write_to(&mut write_stream) {
                    tracing::debug!(%addr, error = %e, "peer write failed");
                    break;
                }
            }
        });

        // Reader thread
        thread::spawn(move || loop {
            match Message::read_from(&mut read_stream) {
                Ok(msg) => {
                    if incoming_tx.send(msg).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::debug!(%addr, error = %e, "peer read ended");
                    break;
                }
            }
        });

        Ok(Peer {
            addr,
            tx: outgoing_tx,
            rx: incoming_rx,
            alive: true,
            socket: ShutdownOnDrop(stream),
        })
    }

    /// Connect to a peer at the given address
    pub fn connect(addr: SocketAddr) -> io::Result<Self> {
        let stream = TcpStream::connect_timeout(&addr, Duration::from_secs(5))?;
        Self::new(stream)
    }

    /// Send a message to this peer
    pub fn send(&self, msg: Message) -> io::Result<()> {
        self.tx
            .send(msg)
            .map_err(|_| io::Error::new(ErrorKind::BrokenPipe, "peer disconnected"))
    }

    /// Try to receive a message from this peer (non-blocking)
    pub fn try_recv(&mut self) -> Option<Message> {
        match self.rx.try_recv() {
            Ok(msg) => Some(msg),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.alive = false;
                None
            }
        }
    }

    /// Wait up to `timeout` for a message
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<Message> {
        match self.rx.recv_timeout(timeout) {
            Ok(msg) => Some(msg),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                self.alive = false;
                None
            }
        }
    }

    /// Receive all pending messages from this peer
    pub fn recv_all(&mut self) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Some(msg) = self.try_recv() {
            messages.push(msg);
        }
        messages
    }

    /// Check if the peer connection is still alive
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Separate the sending half from the incoming message stream, so a
    /// dispatcher thread can own the receiver
    pub fn split(self) -> (PeerSender, Receiver<Message>) {
        let sender = PeerSender {
            addr: self.addr,
            tx: self.tx,
            _socket: self.socket,
        };
        (sender, self.rx)
    }
}

/// Sending half of a split peer. Dropping it closes the connection.
#[derive(Debug)]
pub struct PeerSender {
    pub addr: SocketAddr,
    tx: Sender<Message>,
    _socket: ShutdownOnDrop,
}

impl PeerSender {
    pub fn send(&self, msg: Message) -> io::Result<()> {
        self.tx
            .send(msg)
            .map_err(|_| io::Error::new(ErrorKind::BrokenPipe, "peer disconnected"))
    }
}
