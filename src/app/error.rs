//! Errors surfaced by the UI-facing engine operations

use crate::game::validation::MoveError;
use crate::game::GameId;
use crate::storage::StoreError;

/// Broad class of an engine error, deciding how the front-end treats it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected locally, nothing changed
    UserInput,
    /// A word failed the lexicon; pending tiles stay put
    Validation,
    /// The game cannot take this join
    ResourceExhaustion,
    /// The store could not be reached; retried in the background
    TransientSync,
    /// A submit could not be saved
    FatalPersistence,
    /// The word list has not finished loading
    LexiconLoading,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("join or create a game first")]
    NotInGame,
    #[error("it is not your turn")]
    NotYourTurn,
    #[error("enter a name first")]
    EmptyName,
    #[error("{0}")]
    Move(#[from] MoveError),
    #[error("there is no {0} in your rack")]
    NotInRack(char),
    #[error("no pending {letter} at ({x}, {y})")]
    NoSuchPending { x: usize, y: usize, letter: char },
    #[error("there is no blank tile in your rack")]
    NoBlankInRack,
    #[error("'{0}' is not a letter")]
    InvalidLetter(char),
    #[error("game {0} does not exist")]
    GameNotFound(GameId),
    #[error("\"{0}\" is not in the word list")]
    InvalidWord(String),
    #[error("the word list is still loading, try again in a moment")]
    LexiconLoading,
    #[error("the name {0} is already taken in this game")]
    NameTaken(String),
    #[error("this game is full ({0} players)")]
    GameFull(usize),
    #[error("could not save your move: {0}")]
    Persistence(#[source] StoreError),
    #[error("store unavailable: {0}")]
    Sync(#[source] StoreError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotInGame
            | EngineError::NotYourTurn
            | EngineError::EmptyName
            | EngineError::Move(_)
            | EngineError::NotInRack(_)
            | EngineError::NoSuchPending { .. }
            | EngineError::NoBlankInRack
            | EngineError::InvalidLetter(_)
            | EngineError::GameNotFound(_) => ErrorKind::UserInput,
            EngineError::InvalidWord(_) => ErrorKind::Validation,
            EngineError::LexiconLoading => ErrorKind::LexiconLoading,
            EngineError::NameTaken(_) | EngineError::GameFull(_) => ErrorKind::ResourceExhaustion,
            EngineError::Persistence(_) => ErrorKind::FatalPersistence,
            EngineError::Sync(_) => ErrorKind::TransientSync,
        }
    }

    /// Translate a store failure outside of submit
    pub(crate) fn from_store(error: StoreError) -> Self {
        match error {
            StoreError::GameNotFound(id) => EngineError::GameNotFound(id),
            StoreError::DuplicateName(name) => EngineError::NameTaken(name),
            e if e.is_transient() => EngineError::Sync(e),
            e => EngineError::Persistence(e),
        }
    }
}
