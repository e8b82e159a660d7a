#![allow(dead_code)]
//! Network protocol message types
//!
//! Length-prefixed (4-byte big-endian) JSON messages over TCP. Clients send
//! store requests and get one response per request; subscribed clients also
//! get feed messages pushed whenever the host's store changes.

use crate::game::{GameId, PlayerId};
use crate::storage::feed::{FeedMessage, Table};
use crate::storage::{GameRecord, LivePlacement, PlayerRecord, StoreError};
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};

/// Largest accepted message body
pub const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Messages sent between a store host and its clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Client asks the host to run one store operation
    Request { id: u64, op: StoreOp },
    /// Host answers the request with the same id
    Response {
        id: u64,
        result: Result<Reply, RemoteError>,
    },
    /// Host pushes a change for a client-numbered subscription
    Feed { subscription: u64, message: FeedMessage },
    /// Ping to check connection
    Ping,
    /// Response to ping
    Pong,
}

/// One store operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StoreOp {
    GetGame { game_id: GameId },
    InsertGame { game: GameRecord },
    UpdateGame { game: GameRecord },
    Players { game_id: GameId },
    InsertPlayer { player: PlayerRecord },
    UpdatePlayer { player: PlayerRecord },
    Placements { game_id: GameId },
    UpsertPlacements { placements: Vec<LivePlacement> },
    DeletePlacements { game_id: GameId, player_id: PlayerId },
    /// The client picks the subscription number so it can route feed
    /// messages that arrive right behind the response
    Subscribe {
        subscription: u64,
        game_id: GameId,
        table: Table,
    },
    Unsubscribe { subscription: u64 },
}

/// Successful result of a store operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reply {
    Game(Option<GameRecord>),
    Stored(GameRecord),
    Players(Vec<PlayerRecord>),
    Placements(Vec<LivePlacement>),
    Done,
}

/// A store failure as seen across the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteError {
    GameNotFound(GameId),
    PlayerNotFound(PlayerId),
    DuplicateName(String),
    BadRequest(String),
    Failed(String),
}

impl From<&StoreError> for RemoteError {
    fn from(e: &StoreError) -> Self {
        match e {
            StoreError::GameNotFound(id) => RemoteError::GameNotFound(id.clone()),
            StoreError::PlayerNotFound(id) => RemoteError::PlayerNotFound(id.clone()),
            StoreError::DuplicateName(name) => RemoteError::DuplicateName(name.clone()),
            other => RemoteError::Failed(other.to_string()),
        }
    }
}

impl From<RemoteError> for StoreError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::GameNotFound(id) => StoreError::GameNotFound(id),
            RemoteError::PlayerNotFound(id) => StoreError::PlayerNotFound(id),
            RemoteError::DuplicateName(name) => StoreError::DuplicateName(name),
            RemoteError::BadRequest(reason) => StoreError::Protocol(reason),
            RemoteError::Failed(reason) => StoreError::Remote(reason),
        }
    }
}

impl Message {
    /// Serialize message to bytes (length-prefixed JSON)
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let json = serde_json::to_vec(self).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if json.len() > MAX_MESSAGE_LEN {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "message too large"));
        }
        let len = json.len() as u32;
        let mut bytes = Vec::with_capacity(4 + json.len());
        bytes.extend_from_slice(&len.to_be_bytes());
        bytes.extend_from_slice(&json);
        Ok(bytes)
    }

    /// Deserialize message from bytes (length-prefixed JSON).
    /// Returns the message and the number of bytes consumed.
    pub fn from_bytes(bytes: &[u8]) -> io::Result<(Self, usize)> {
        if bytes.len() < 4 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "need 4 bytes for length"));
        }
        let len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        if len > MAX_MESSAGE_LEN {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "message too large"));
        }
        if bytes.len() < 4 + len {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "incomplete message"));
        }
        let msg = serde_json::from_slice(&bytes[4..4 + len])
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok((msg, 4 + len))
    }

    /// Write message to a stream
    pub fn write_to<W: Write>(&self, stream: &mut W) -> io::Result<()> {
        let bytes = self.to_bytes()?;
        stream.write_all(&bytes)?;
        stream.flush()
    }

    /// Read one message from a stream
    pub fn read_from<R: Read>(stream: &mut R) -> io::Result<Self> {
        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf)?;
        let len = u32::from_be_bytes(len_buf) as usize;

        if len > MAX_MESSAGE_LEN {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "message too large"));
        }

        let mut body = vec![0u8; len];
        stream.read_exact(&mut body)?;
        serde_json::from_slice(&body).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}
