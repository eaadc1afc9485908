//! Error types for imap-state-check

use crate::session::SessionId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The server reply did not have the shape the handler requires.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Consistency violations were found while running in fatal mode.
    #[error("Session {session}: {violations} fatal consistency error(s)")]
    Fatal {
        session: SessionId,
        violations: usize,
    },

    #[error("Response parsing error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Replay task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Exit status the binary uses for fatal escalations.
    pub const FATAL_EXIT_CODE: i32 = 2;

    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
