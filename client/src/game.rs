use log::{debug, info, warn};
use rand::seq::IteratorRandom;
use rand::Rng;
use shared::catalog::{deployable, lookup};
use shared::{
    MatchSnapshot, Outcome, Packet, SessionView, Side, BOARD_HEIGHT, BOARD_WIDTH,
    MAX_SUPER_CHARGE, RIVER_MARGIN, RIVER_Y,
};

/// Keeps deployments clear of the board edge.
const EDGE_MARGIN: f32 = 30.0;

/// What the bot knows about its own match, rebuilt from server packets.
#[derive(Debug, Clone)]
pub struct BotState {
    pub player_id: String,
    pub team: Option<Side>,
    pub elixir: f32,
    pub super_charge: f32,
    pub trophies: u32,
    pub snapshot: Option<MatchSnapshot>,
    pub last_outcome: Option<Outcome>,
}

impl BotState {
    pub fn new(player_id: &str, trophies: u32) -> Self {
        Self {
            player_id: player_id.to_string(),
            team: None,
            elixir: 0.0,
            super_charge: 0.0,
            trophies,
            snapshot: None,
            last_outcome: None,
        }
    }

    fn apply_view(&mut self, view: &SessionView) {
        self.team = view.team;
        self.elixir = view.elixir;
        self.super_charge = view.super_charge;
        self.trophies = view.trophies;
    }

    pub fn in_running_match(&self) -> bool {
        self.team.is_some()
            && self
                .snapshot
                .as_ref()
                .is_some_and(|snapshot| snapshot.outcome.is_none())
    }

    /// Folds a server packet into the local view and returns the reply, if any.
    pub fn handle_packet(&mut self, packet: Packet) -> Option<Packet> {
        match packet {
            Packet::Init { state, player } => {
                info!(
                    "Init for {} (team {:?}, {} trophies)",
                    player.player_id, player.team, player.trophies
                );
                self.apply_view(&player);
                self.snapshot = state;
                None
            }

            Packet::Snapshot { state, players } => {
                if let Some(view) = players.iter().find(|p| p.player_id == self.player_id) {
                    self.apply_view(view);
                }
                self.snapshot = Some(state);
                None
            }

            Packet::Announcement { text, subtext, .. } => {
                match subtext {
                    Some(subtext) => info!("[{}] {}", text, subtext),
                    None => info!("[{}]", text),
                }
                None
            }

            Packet::SuperEffect {
                kind,
                x,
                y,
                team,
                spell,
                ..
            } => {
                debug!(
                    "{} {:?} effect at ({:.0}, {:.0}) spell={}",
                    team.label(),
                    kind,
                    x,
                    y,
                    spell
                );
                None
            }

            Packet::Emote {
                emote,
                player_id,
                ..
            } => {
                info!("{} says {}", player_id, emote);
                None
            }

            Packet::MatchResult {
                outcome,
                trophy_change,
                trophies,
            } => {
                info!(
                    "Match over: {:?}, trophies {:+} (now {})",
                    outcome, trophy_change, trophies
                );
                self.trophies = trophies;
                self.last_outcome = Some(outcome);
                Some(Packet::RequestRematch {
                    player_id: self.player_id.clone(),
                })
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.team = None;
                self.snapshot = None;
                None
            }

            other => {
                warn!("Unexpected packet type: {:?}", other);
                None
            }
        }
    }

    /// Picks a random affordable unit and drops it on our half of the board.
    pub fn choose_deployment<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Packet> {
        if !self.in_running_match() {
            return None;
        }
        let team = self.team?;
        let (low, high) = own_half(team)?;

        let choice = deployable()
            .filter(|stats| stats.cost as f32 <= self.elixir)
            .choose(rng)?;

        Some(Packet::Spawn {
            unit_type: choice.id.to_string(),
            x: rng.gen_range(EDGE_MARGIN..BOARD_WIDTH - EDGE_MARGIN),
            y: rng.gen_range(low..high),
            player_id: self.player_id.clone(),
        })
    }

    /// Fires a super once charged, centred on one of our units that carries an ability.
    pub fn choose_super<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Packet> {
        if !self.in_running_match() || self.super_charge < MAX_SUPER_CHARGE {
            return None;
        }
        let team = self.team?;
        let snapshot = self.snapshot.as_ref()?;

        let unit = snapshot
            .units
            .iter()
            .filter(|unit| unit.side == team)
            .filter(|unit| {
                lookup(&unit.unit_type).is_some_and(|stats| stats.super_ability.is_some())
            })
            .choose(rng)?;

        Some(Packet::ActivateSuper {
            player_id: self.player_id.clone(),
            ability_id: unit.unit_type.clone(),
            x: unit.state.x,
            y: unit.state.y,
        })
    }
}

/// Deployable y-range for `team`.
fn own_half(team: Side) -> Option<(f32, f32)> {
    match team {
        Side::Home => Some((RIVER_Y + RIVER_MARGIN, BOARD_HEIGHT - EDGE_MARGIN)),
        Side::Away => Some((EDGE_MARGIN, RIVER_Y - RIVER_MARGIN)),
        Side::Neutral => None,
    }
}
