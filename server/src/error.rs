//! Error taxonomy for the server.
//!
//! Only `InvalidIdentity` ends a connection. `RateLimited` is reported back to
//! the client, `Rejected` is dropped silently so a client cannot map out the
//! validation boundary, and the remaining variants are logged and absorbed.

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    UnknownSession,
    IdentityMismatch,
    NoActiveMatch,
    MatchFinished,
    MatchInProgress,
    UnknownUnitType,
    NotDeployable,
    InsufficientElixir,
    WrongSideOfRiver,
    OutOfBounds,
    SuperNotCharged,
    NoSuperAbility,
    NotParticipant,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid player identity {0:?}")]
    InvalidIdentity(String),

    #[error("connection {0} exceeded the spawn rate limit")]
    RateLimited(SocketAddr),

    #[error("command rejected: {0:?}")]
    Rejected(Rejection),

    #[error("profile storage failed for {player_id}: {source}")]
    Persistence {
        player_id: String,
        #[source]
        source: io::Error,
    },

    #[error("unit {uid} skipped this tick: {reason}")]
    TickStep { uid: u64, reason: String },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Codec(#[from] bincode::Error),
}

impl From<Rejection> for ServerError {
    fn from(rejection: Rejection) -> Self {
        ServerError::Rejected(rejection)
    }
}

impl ServerError {
    pub fn persistence(player_id: &str, source: impl Into<io::Error>) -> Self {
        ServerError::Persistence {
            player_id: player_id.to_string(),
            source: source.into(),
        }
    }
}
