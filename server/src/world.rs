//! Single owner of every piece of mutable server state.
//!
//! The network loop feeds packets and timer ticks into `World` one at a time
//! and drains the resulting `Outbound` messages afterwards. Nothing in here
//! touches a socket or the filesystem directly, so each call runs to
//! completion before the next one starts.

use crate::ai::AiDriver;
use crate::commands;
use crate::config::ServerConfig;
use crate::error::{Rejection, ServerError};
use crate::game::{MatchState, Roster};
use crate::matchmaking::{MatchmakingQueue, Opponent, Pairing};
use crate::persistence::{Profile, ProfileStore};
use crate::session::SessionRegistry;
use crate::simulation;
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{Packet, Side, AI_PLAYER_ID};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

pub const QUEUE_NOTICE: &str = "FINDING CHALLENGER...";
pub const RATE_LIMIT_NOTICE: &str = "ACTION OVERLOAD DETECTED";

/// Side effects requested by game logic, carried out by the network layer
#[derive(Debug, Clone)]
pub enum Outbound {
    Send { addr: SocketAddr, packet: Packet },
    /// Sent to every open connection except `exclude`
    Broadcast {
        packet: Packet,
        exclude: Option<SocketAddr>,
    },
    /// Notify with `Disconnected { reason }`; the connection is already gone
    Close { addr: SocketAddr, reason: String },
    Persist { player_id: String, profile: Profile },
}

impl Outbound {
    pub fn broadcast(packet: Packet) -> Self {
        Outbound::Broadcast {
            packet,
            exclude: None,
        }
    }
}

pub struct World {
    sessions: SessionRegistry,
    queue: MatchmakingQueue,
    current: Option<MatchState>,
    ai: AiDriver,
    store: Arc<dyn ProfileStore>,
    rng: StdRng,
    outbox: Vec<Outbound>,
}

impl World {
    pub fn new(config: &ServerConfig, store: Arc<dyn ProfileStore>) -> Self {
        Self::with_rng(config, store, StdRng::from_entropy())
    }

    /// Builds a world with a fixed random source, for reproducible runs.
    pub fn with_rng(config: &ServerConfig, store: Arc<dyn ProfileStore>, rng: StdRng) -> Self {
        Self {
            sessions: SessionRegistry::new(
                config.max_clients,
                config.heartbeat_timeout,
                config.rate_limit_window,
                config.rate_limit_max,
            ),
            queue: MatchmakingQueue::new(config.max_trophy_gap, config.ai_fallback_after),
            current: None,
            ai: AiDriver::new(),
            store,
            rng,
            outbox: Vec::new(),
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn sessions_mut(&mut self) -> &mut SessionRegistry {
        &mut self.sessions
    }

    pub fn queue(&self) -> &MatchmakingQueue {
        &self.queue
    }

    pub fn ai(&self) -> &AiDriver {
        &self.ai
    }

    pub fn current_match(&self) -> Option<&MatchState> {
        self.current.as_ref()
    }

    pub fn current_match_mut(&mut self) -> Option<&mut MatchState> {
        self.current.as_mut()
    }

    pub fn store(&self) -> Arc<dyn ProfileStore> {
        Arc::clone(&self.store)
    }

    /// Hands over everything queued since the last call
    pub fn take_outbound(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }

    fn send(&mut self, addr: SocketAddr, packet: Packet) {
        self.outbox.push(Outbound::Send { addr, packet });
    }

    fn broadcast_all(&mut self, packets: Vec<Packet>) {
        self.outbox.extend(packets.into_iter().map(Outbound::broadcast));
    }

    /// Entry point for every decoded datagram
    pub fn handle_packet(&mut self, packet: Packet, addr: SocketAddr, now: Instant) {
        match packet {
            Packet::Register {
                player_id,
                trophies,
            } => self.register(addr, &player_id, trophies, now),

            Packet::Heartbeat { .. } => {
                if !self.sessions.touch(&addr, now) {
                    debug!("Heartbeat from unknown address {}", addr);
                }
            }

            Packet::Disconnect => self.drop_connection(addr),

            Packet::Spawn { .. }
            | Packet::ActivateSuper { .. }
            | Packet::SendEmote { .. }
            | Packet::RequestRematch { .. }
            | Packet::Leave { .. } => {
                self.sessions.touch(&addr, now);
                if let Err(e) = self.dispatch_command(packet, addr, now) {
                    self.report(addr, e);
                }
            }

            _ => warn!("Unexpected packet type from client at {}", addr),
        }
    }

    fn register(&mut self, addr: SocketAddr, player_id: &str, claimed_trophies: u32, now: Instant) {
        if self.sessions.connect(addr, now).is_none() {
            warn!("Rejecting {}: server full", addr);
            self.outbox.push(Outbound::Close {
                addr,
                reason: "Server full".to_string(),
            });
            return;
        }

        match self
            .sessions
            .register(addr, player_id, claimed_trophies, self.store.as_ref())
        {
            Ok(_) => {}
            Err(e @ ServerError::InvalidIdentity(_)) => {
                warn!("{} from {}, closing connection", e, addr);
                self.sessions.disconnect(&addr);
                self.outbox.push(Outbound::Close {
                    addr,
                    reason: "Invalid player id".to_string(),
                });
                return;
            }
            Err(e) => {
                error!("Registration of {} failed: {}", player_id, e);
                return;
            }
        }

        let Some(session) = self.sessions.session(player_id) else {
            return;
        };
        let view = session.view();

        if self.current.is_none() && self.queue.enqueue(player_id, view.trophies, now) {
            self.send(addr, Packet::announcement(QUEUE_NOTICE, Side::Neutral));
        }

        let state = self.current.as_ref().map(MatchState::snapshot);
        self.send(
            addr,
            Packet::Init {
                state,
                player: view,
            },
        );
    }

    fn dispatch_command(
        &mut self,
        packet: Packet,
        addr: SocketAddr,
        now: Instant,
    ) -> Result<(), ServerError> {
        let bound = self
            .sessions
            .player_for(&addr)
            .ok_or(Rejection::UnknownSession)?
            .to_string();

        let claimed = match &packet {
            Packet::Spawn { player_id, .. }
            | Packet::ActivateSuper { player_id, .. }
            | Packet::SendEmote { player_id, .. }
            | Packet::RequestRematch { player_id }
            | Packet::Leave { player_id } => player_id.as_str(),
            _ => return Ok(()),
        };
        if claimed != bound {
            return Err(Rejection::IdentityMismatch.into());
        }

        match packet {
            Packet::Spawn {
                unit_type,
                x,
                y,
                ..
            } => {
                self.sessions.allow_spawn_command(addr, now)?;
                let state = self.current.as_mut().ok_or(Rejection::NoActiveMatch)?;
                let sessions = &mut self.sessions;
                let notices =
                    commands::spawn(state, sessions, &mut self.rng, &bound, &unit_type, x, y)?;
                self.broadcast_all(notices);
            }
            Packet::ActivateSuper {
                ability_id,
                x,
                y,
                ..
            } => {
                self.sessions.allow_spawn_command(addr, now)?;
                let state = self.current.as_mut().ok_or(Rejection::NoActiveMatch)?;
                let notices =
                    commands::activate_super(state, &mut self.sessions, &bound, &ability_id, x, y)?;
                self.broadcast_all(notices);
            }
            Packet::SendEmote { emote, .. } => {
                let packet = commands::send_emote(&self.sessions, &bound, &emote)?;
                self.outbox.push(Outbound::Broadcast {
                    packet,
                    exclude: Some(addr),
                });
            }
            Packet::RequestRematch { .. } => {
                let state = self.current.as_mut().ok_or(Rejection::NoActiveMatch)?;
                let rematch = commands::request_rematch(state, &mut self.sessions, &bound)?;
                if rematch.restarted {
                    self.ai.reset_timer();
                }
                self.broadcast_all(rematch.notices);
            }
            Packet::Leave { .. } => self.leave(&bound, now)?,
            _ => {}
        }
        Ok(())
    }

    /// Decides how a failed command is surfaced to its sender
    fn report(&mut self, addr: SocketAddr, err: ServerError) {
        match err {
            ServerError::RateLimited(_) => {
                self.send(addr, Packet::announcement(RATE_LIMIT_NOTICE, Side::Neutral));
            }
            ServerError::Rejected(rejection) => {
                debug!("Dropped command from {}: {:?}", addr, rejection);
            }
            other => error!("Command from {} failed: {}", addr, other),
        }
    }

    /// Ends a player's session outright. Not allowed mid-match; a finished
    /// match the player took part in is discarded.
    fn leave(&mut self, player_id: &str, now: Instant) -> Result<(), ServerError> {
        let participant = self
            .current
            .as_ref()
            .filter(|state| state.roster.side_of(player_id).is_some());
        if participant.map_or(false, MatchState::is_running) {
            return Err(Rejection::MatchInProgress.into());
        }
        let was_participant = participant.is_some();

        self.queue.remove(player_id);
        self.sessions.remove_session(player_id);
        info!("Player {} left", player_id);

        if was_participant {
            self.teardown_match(now);
        }
        Ok(())
    }

    fn drop_connection(&mut self, addr: SocketAddr) {
        if let Some(connection) = self.sessions.disconnect(&addr) {
            if let Some(player_id) = connection.player_id {
                self.queue.remove(&player_id);
            }
        }
    }

    /// Advances the current match by one step
    pub fn tick(&mut self, dt: f32) {
        if let Some(state) = self.current.as_mut() {
            simulation::tick(
                state,
                &mut self.sessions,
                &mut self.ai,
                &mut self.rng,
                dt,
                &mut self.outbox,
            );
        }
    }

    /// Pairs waiting players while no match exists
    pub fn run_matchmaking(&mut self, now: Instant) {
        if self.current.is_some() {
            return;
        }
        if let Some(pairing) = self.queue.try_match(now) {
            self.start_match(pairing);
        }
    }

    fn start_match(&mut self, pairing: Pairing) {
        let home = pairing.home.player_id;
        let away = match pairing.away {
            Opponent::Human(entry) => entry.player_id,
            Opponent::Ai { trophies } => {
                self.ai.activate(&mut self.sessions, Side::Away, trophies);
                AI_PLAYER_ID.to_string()
            }
        };

        for (player_id, side) in [(&home, Side::Home), (&away, Side::Away)] {
            if let Some(session) = self.sessions.session_mut(player_id) {
                session.team = Some(side);
                session.reset_pools();
            }
        }

        let state = MatchState::new(Roster::new(&home, &away));
        info!("Match started: {} vs {}", home, away);

        let snapshot = state.snapshot();
        let greetings: Vec<(SocketAddr, Packet)> = [&home, &away]
            .into_iter()
            .filter_map(|id| self.sessions.session(id))
            .filter_map(|session| {
                let addr = session.connection?;
                Some((
                    addr,
                    Packet::Init {
                        state: Some(snapshot.clone()),
                        player: session.view(),
                    },
                ))
            })
            .collect();
        for (addr, packet) in greetings {
            self.send(addr, packet);
        }
        self.outbox.push(Outbound::broadcast(Packet::Announcement {
            text: "BATTLE STARTED!".to_string(),
            subtext: Some(format!("{} VS {}", home, away)),
            team: Side::Neutral,
        }));

        self.current = Some(state);
    }

    /// Drops silent connections, then discards a finished match once any
    /// human participant is gone.
    pub fn check_heartbeats(&mut self, now: Instant) {
        for timed_out in self.sessions.check_timeouts(now) {
            if let Some(player_id) = &timed_out.player_id {
                self.queue.remove(player_id);
            }
            self.outbox.push(Outbound::Close {
                addr: timed_out.addr,
                reason: "Heartbeat timeout".to_string(),
            });
        }

        // A rematch needs every human, so one missing human ends the match.
        let abandoned = self.current.as_ref().map_or(false, |state| {
            !state.is_running()
                && state.roster.players().any(|id| match self.sessions.session(id) {
                    Some(session) => !session.is_ai && session.connection.is_none(),
                    None => true,
                })
        });
        if abandoned {
            self.teardown_match(now);
        }
    }

    /// Discards the current match and returns every connected human to the queue.
    fn teardown_match(&mut self, now: Instant) {
        let Some(state) = self.current.take() else {
            return;
        };
        self.ai.deactivate(&mut self.sessions);
        for player_id in state.roster.players() {
            if let Some(session) = self.sessions.session_mut(player_id) {
                session.team = None;
            }
        }
        let players: Vec<&str> = state.roster.players().collect();
        info!("Match between {} discarded", players.join(" and "));

        let mut waiting: Vec<(String, u32, SocketAddr)> = self
            .sessions
            .sessions()
            .filter(|s| !s.is_ai)
            .filter_map(|s| Some((s.player_id.clone(), s.trophies, s.connection?)))
            .collect();
        waiting.sort();
        for (player_id, trophies, addr) in waiting {
            if self.queue.enqueue(&player_id, trophies, now) {
                self.send(addr, Packet::announcement(QUEUE_NOTICE, Side::Neutral));
            }
        }
    }
}
