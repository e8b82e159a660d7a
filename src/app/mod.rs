//! The engine surface and the front-end state built on it

pub mod error;
pub mod session;
pub mod state;

pub use error::{EngineError, ErrorKind};
pub use session::{GameSession, TurnReport};
pub use state::{App, InputMode};
