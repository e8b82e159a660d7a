//! Lexicon for word validation
//!
//! A small base word list is embedded at build time and is always available.
//! A fuller list can be loaded from disk on a background thread; until that
//! load reports back, the lexicon is in a distinct loading state and
//! submissions must be refused rather than silently failing validation.

use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;

/// Embedded base wordlist. Lowercase, alphabetic only, one per line.
static WORDS_DATA: &str = include_str!("../../data/words.txt");

/// Pre-built hash set for O(1) lookup of the base list
static BASE_WORDS: Lazy<HashSet<String>> = Lazy::new(|| parse_words(WORDS_DATA));

/// Word validation capability
pub trait Lexicon: Send + Sync {
    /// Case-insensitive membership test
    fn is_valid_word(&self, word: &str) -> bool;
}

/// Errors loading an external word list
#[derive(Debug, thiserror::Error)]
pub enum LexiconError {
    #[error("failed to read word list {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("word list {0} contains no words")]
    Empty(PathBuf),
}

fn parse_words(text: &str) -> HashSet<String> {
    text.lines()
        .map(|line| line.trim().to_uppercase())
        .filter(|word| !word.is_empty() && word.chars().all(|c| c.is_ascii_alphabetic()))
        .collect()
}

/// An in-memory set of uppercase words
#[derive(Debug, Clone, Default)]
pub struct WordList {
    words: HashSet<String>,
}

impl WordList {
    /// Just the embedded base list
    pub fn base() -> Self {
        Self {
            words: BASE_WORDS.clone(),
        }
    }

    /// Parse newline-separated words
    pub fn from_text(text: &str) -> Self {
        Self {
            words: parse_words(text),
        }
    }

    /// Read a newline-separated word list from disk
    pub fn from_file(path: &Path) -> Result<Self, LexiconError> {
        let text = std::fs::read_to_string(path).map_err(|source| LexiconError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let list = Self::from_text(&text);
        if list.is_empty() {
            return Err(LexiconError::Empty(path.to_path_buf()));
        }
        Ok(list)
    }

    /// Add every word of `other`
    pub fn merge(&mut self, other: WordList) {
        self.words.extend(other.words);
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl Lexicon for WordList {
    fn is_valid_word(&self, word: &str) -> bool {
        self.words.contains(&word.to_uppercase())
    }
}

enum LoadState {
    Loading(Receiver<Arc<dyn Lexicon>>),
    Ready(Arc<dyn Lexicon>),
}

/// Handle to a lexicon that may still be loading
pub struct LexiconHandle {
    state: LoadState,
}

impl LexiconHandle {
    /// A lexicon that is available immediately
    pub fn ready(lexicon: Arc<dyn Lexicon>) -> Self {
        Self {
            state: LoadState::Ready(lexicon),
        }
    }

    /// A lexicon delivered later through a channel
    pub fn pending(rx: Receiver<Arc<dyn Lexicon>>) -> Self {
        Self {
            state: LoadState::Loading(rx),
        }
    }

    /// Load the base list plus an optional extra list on a background thread.
    /// A failed extra list falls back to the base list.
    pub fn load_in_background(extra: Option<PathBuf>) -> Self {
        let (tx, rx) = channel::<Arc<dyn Lexicon>>();
        thread::spawn(move || {
            let mut list = WordList::base();
            if let Some(path) = extra {
                match WordList::from_file(&path) {
                    Ok(full) => {
                        list.merge(full);
                        tracing::info!(words = list.len(), "full word list loaded");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "falling back to base word list");
                    }
                }
            }
            let _ = tx.send(Arc::new(list));
        });
        Self::pending(rx)
    }

    /// Check whether the background load finished. Non-blocking.
    pub fn poll(&mut self) -> bool {
        if let LoadState::Loading(rx) = &self.state {
            match rx.try_recv() {
                Ok(lexicon) => self.state = LoadState::Ready(lexicon),
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Disconnected) => {
                    tracing::warn!("lexicon loader exited without a result, using base list");
                    self.state = LoadState::Ready(Arc::new(WordList::base()));
                }
            }
        }
        true
    }

    /// Whether the lexicon can answer queries
    pub fn is_loaded(&mut self) -> bool {
        self.poll()
    }

    /// The loaded lexicon, or `None` while still loading
    pub fn get(&mut self) -> Option<Arc<dyn Lexicon>> {
        self.poll();
        match &self.state {
            LoadState::Ready(lexicon) => Some(Arc::clone(lexicon)),
            LoadState::Loading(_) => None,
        }
    }
}

/// Check a word against the embedded base list only
pub fn is_base_word(word: &str) -> bool {
    BASE_WORDS.contains(&word.to_uppercase())
}
