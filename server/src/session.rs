//! Connection and player-session bookkeeping
//!
//! This module separates two lifetimes that the rest of the server relies on:
//! - Connections are transient: one per remote address, kept alive by any
//!   inbound packet and dropped on disconnect or heartbeat timeout
//! - Player sessions are keyed by the stable player id and survive
//!   disconnects, so a returning client rebinds to its existing state
//!
//! Per-connection rate limiting of spawn-class commands also lives here.

use crate::error::ServerError;
use crate::persistence::ProfileStore;
use log::{error, info, warn};
use shared::{SessionView, Side, AI_PLAYER_ID, MAX_PLAYER_ID_LEN, STARTING_ELIXIR};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A live remote endpoint
#[derive(Debug)]
pub struct Connection {
    /// Server-assigned id, used for logging
    pub id: u32,
    pub addr: SocketAddr,
    /// Last time we received any packet from this connection
    pub last_seen: Instant,
    /// Player bound by a successful registration
    pub player_id: Option<String>,
    /// Arrival times of recent spawn-class commands
    recent_commands: VecDeque<Instant>,
}

impl Connection {
    pub fn new(id: u32, addr: SocketAddr, now: Instant) -> Self {
        Self {
            id,
            addr,
            last_seen: now,
            player_id: None,
            recent_commands: VecDeque::new(),
        }
    }

    /// Returns true if nothing has arrived from this connection within `timeout`
    pub fn is_timed_out(&self, timeout: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.last_seen) > timeout
    }

    /// Records a spawn-class command if the rolling window has room for it
    fn admit_command(&mut self, window: Duration, max: usize, now: Instant) -> bool {
        while let Some(&oldest) = self.recent_commands.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.recent_commands.pop_front();
            } else {
                break;
            }
        }

        if self.recent_commands.len() >= max {
            return false;
        }
        self.recent_commands.push_back(now);
        true
    }
}

/// Per-player state that outlives individual connections
#[derive(Debug, Clone)]
pub struct PlayerSession {
    pub player_id: String,
    /// Current connection handle; None while the player is away
    pub connection: Option<SocketAddr>,
    /// Assigned when a match starts
    pub team: Option<Side>,
    pub elixir: f32,
    pub super_charge: f32,
    pub trophies: u32,
    pub is_ai: bool,
}

impl PlayerSession {
    pub fn new(player_id: &str, trophies: u32) -> Self {
        Self {
            player_id: player_id.to_string(),
            connection: None,
            team: None,
            elixir: STARTING_ELIXIR,
            super_charge: 0.0,
            trophies,
            is_ai: false,
        }
    }

    pub fn reset_pools(&mut self) {
        self.elixir = STARTING_ELIXIR;
        self.super_charge = 0.0;
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            player_id: self.player_id.clone(),
            team: self.team,
            elixir: self.elixir,
            super_charge: self.super_charge,
            trophies: self.trophies,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Created,
    Reconnected,
}

/// A connection dropped by the heartbeat check
#[derive(Debug, Clone, PartialEq)]
pub struct TimedOut {
    pub addr: SocketAddr,
    pub player_id: Option<String>,
}

/// Checks the wire-level identity rules: non-empty, at most 50 characters,
/// and not the id reserved for the computer opponent
pub fn validate_player_id(player_id: &str) -> Result<(), ServerError> {
    if player_id.is_empty()
        || player_id.chars().count() > MAX_PLAYER_ID_LEN
        || player_id == AI_PLAYER_ID
    {
        return Err(ServerError::InvalidIdentity(player_id.to_string()));
    }
    Ok(())
}

/// Owns every connection and player session known to the server
pub struct SessionRegistry {
    connections: HashMap<SocketAddr, Connection>,
    sessions: HashMap<String, PlayerSession>,
    next_connection_id: u32,
    max_clients: usize,
    heartbeat_timeout: Duration,
    rate_limit_window: Duration,
    rate_limit_max: usize,
}

impl SessionRegistry {
    pub fn new(
        max_clients: usize,
        heartbeat_timeout: Duration,
        rate_limit_window: Duration,
        rate_limit_max: usize,
    ) -> Self {
        Self {
            connections: HashMap::new(),
            sessions: HashMap::new(),
            next_connection_id: 1,
            max_clients,
            heartbeat_timeout,
            rate_limit_window,
            rate_limit_max,
        }
    }

    /// Opens a connection for `addr`, or refreshes the existing one
    ///
    /// Returns None if the server is at capacity.
    pub fn connect(&mut self, addr: SocketAddr, now: Instant) -> Option<u32> {
        if let Some(connection) = self.connections.get_mut(&addr) {
            connection.last_seen = now;
            return Some(connection.id);
        }

        if self.connections.len() >= self.max_clients {
            return None;
        }

        let id = self.next_connection_id;
        self.next_connection_id += 1;
        info!("Connection {} opened from {}", id, addr);
        self.connections.insert(addr, Connection::new(id, addr, now));
        Some(id)
    }

    /// Closes a connection; the bound session survives without a handle
    pub fn disconnect(&mut self, addr: &SocketAddr) -> Option<Connection> {
        let connection = self.connections.remove(addr)?;
        if let Some(player_id) = &connection.player_id {
            if let Some(session) = self.sessions.get_mut(player_id) {
                if session.connection == Some(*addr) {
                    session.connection = None;
                }
            }
        }
        info!("Connection {} from {} closed", connection.id, addr);
        Some(connection)
    }

    /// Marks a liveness signal; returns false for unknown addresses
    pub fn touch(&mut self, addr: &SocketAddr, now: Instant) -> bool {
        match self.connections.get_mut(addr) {
            Some(connection) => {
                connection.last_seen = now;
                true
            }
            None => false,
        }
    }

    /// Binds `player_id` to the connection at `addr`
    ///
    /// Known players are rebound to the new connection with their state
    /// intact. New players get a session seeded from the stored profile, or
    /// from the client's claimed trophies when no record exists or the store
    /// cannot be read.
    pub fn register(
        &mut self,
        addr: SocketAddr,
        player_id: &str,
        claimed_trophies: u32,
        store: &dyn ProfileStore,
    ) -> Result<Registration, ServerError> {
        validate_player_id(player_id)?;
        if !self.connections.contains_key(&addr) {
            return Err(crate::error::Rejection::UnknownSession.into());
        }

        let registration = match self.sessions.get_mut(player_id) {
            Some(session) => {
                if let Some(previous) = session.connection.replace(addr) {
                    if previous != addr {
                        if let Some(old) = self.connections.get_mut(&previous) {
                            old.player_id = None;
                        }
                    }
                }
                info!("Player {} reconnected from {}", player_id, addr);
                Registration::Reconnected
            }
            None => {
                let trophies = match store.load(player_id) {
                    Ok(Some(profile)) => profile.trophies,
                    Ok(None) => claimed_trophies,
                    Err(e) => {
                        error!("{}", e);
                        claimed_trophies
                    }
                };
                let mut session = PlayerSession::new(player_id, trophies);
                session.connection = Some(addr);
                self.sessions.insert(player_id.to_string(), session);
                info!("Player {} registered from {} ({} trophies)", player_id, addr, trophies);
                Registration::Created
            }
        };

        if let Some(connection) = self.connections.get_mut(&addr) {
            if let Some(stale) = connection.player_id.replace(player_id.to_string()) {
                if stale != player_id {
                    if let Some(session) = self.sessions.get_mut(&stale) {
                        session.connection = None;
                    }
                }
            }
        }

        Ok(registration)
    }

    /// Inserts a server-driven session that has no connection
    pub fn insert_synthetic(&mut self, player_id: &str, team: Side, trophies: u32) {
        let mut session = PlayerSession::new(player_id, trophies);
        session.team = Some(team);
        session.is_ai = true;
        self.sessions.insert(player_id.to_string(), session);
    }

    pub fn remove_session(&mut self, player_id: &str) -> Option<PlayerSession> {
        let session = self.sessions.remove(player_id)?;
        if let Some(addr) = session.connection {
            if let Some(connection) = self.connections.get_mut(&addr) {
                connection.player_id = None;
            }
        }
        Some(session)
    }

    /// Applies the rolling-window limit to one spawn-class command
    pub fn allow_spawn_command(
        &mut self,
        addr: SocketAddr,
        now: Instant,
    ) -> Result<(), ServerError> {
        let window = self.rate_limit_window;
        let max = self.rate_limit_max;
        let admitted = self
            .connections
            .get_mut(&addr)
            .map(|connection| connection.admit_command(window, max, now));
        match admitted {
            Some(true) => Ok(()),
            Some(false) => {
                warn!("Rate limit hit by {}", addr);
                Err(ServerError::RateLimited(addr))
            }
            None => Err(crate::error::Rejection::UnknownSession.into()),
        }
    }

    /// Drops connections that have been silent past the heartbeat timeout
    ///
    /// Sessions bound to them keep their identity and state.
    pub fn check_timeouts(&mut self, now: Instant) -> Vec<TimedOut> {
        let timeout = self.heartbeat_timeout;
        let silent: Vec<SocketAddr> = self
            .connections
            .values()
            .filter(|connection| connection.is_timed_out(timeout, now))
            .map(|connection| connection.addr)
            .collect();

        silent
            .into_iter()
            .filter_map(|addr| {
                warn!("Heartbeat lost for {}, dropping connection", addr);
                self.disconnect(&addr).map(|connection| TimedOut {
                    addr,
                    player_id: connection.player_id,
                })
            })
            .collect()
    }

    pub fn player_for(&self, addr: &SocketAddr) -> Option<&str> {
        self.connections.get(addr)?.player_id.as_deref()
    }

    pub fn session(&self, player_id: &str) -> Option<&PlayerSession> {
        self.sessions.get(player_id)
    }

    pub fn session_mut(&mut self, player_id: &str) -> Option<&mut PlayerSession> {
        self.sessions.get_mut(player_id)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &PlayerSession> {
        self.sessions.values()
    }

    pub fn connection_addrs(&self) -> Vec<SocketAddr> {
        self.connections.keys().copied().collect()
    }

    /// Returns the number of open connections
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
