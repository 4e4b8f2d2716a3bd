//! Computer opponent used when no second human is available.
//!
//! The driver goes through the same spawn handler as a client would, so its
//! deployments pay elixir and obey the river rule like anyone else's.

use crate::commands;
use crate::game::MatchState;
use crate::session::SessionRegistry;
use log::{debug, info};
use rand::seq::IteratorRandom;
use rand::Rng;
use shared::catalog::deployable;
use shared::{Packet, Side, AI_PLAYER_ID, LANE_XS, RIVER_Y};

/// Simulated seconds between decisions
pub const DECISION_INTERVAL: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AiState {
    Idle,
    Active { timer: f32 },
}

/// A deployment the driver made this tick
#[derive(Debug)]
pub struct AiMove {
    pub unit_type: &'static str,
    /// Broadcasts produced by the spawn handler (spell effects)
    pub notices: Vec<Packet>,
}

#[derive(Debug)]
pub struct AiDriver {
    state: AiState,
}

impl Default for AiDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl AiDriver {
    pub fn new() -> Self {
        Self {
            state: AiState::Idle,
        }
    }

    pub fn state(&self) -> AiState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, AiState::Active { .. })
    }

    /// Creates the synthetic session for `side` with starting resources.
    pub fn activate(&mut self, sessions: &mut SessionRegistry, side: Side, trophies: u32) {
        sessions.insert_synthetic(AI_PLAYER_ID, side, trophies);
        self.state = AiState::Active { timer: 0.0 };
        info!("AI opponent activated on {} side", side.label());
    }

    pub fn deactivate(&mut self, sessions: &mut SessionRegistry) {
        if self.is_active() {
            sessions.remove_session(AI_PLAYER_ID);
            self.state = AiState::Idle;
            info!("AI opponent deactivated");
        }
    }

    /// Restarts the decision cadence, used when a rematch begins.
    pub fn reset_timer(&mut self) {
        if let AiState::Active { timer } = &mut self.state {
            *timer = 0.0;
        }
    }

    /// Advances the decision timer and, when it elapses, tries one random
    /// deployment.
    pub fn tick<R: Rng + ?Sized>(
        &mut self,
        state: &mut MatchState,
        sessions: &mut SessionRegistry,
        rng: &mut R,
        dt: f32,
    ) -> Option<AiMove> {
        let AiState::Active { timer } = &mut self.state else {
            return None;
        };
        if !state.is_running() {
            return None;
        }

        *timer += dt;
        if *timer < DECISION_INTERVAL {
            return None;
        }
        *timer = 0.0;

        let choice = deployable().choose(rng)?;
        let elixir = sessions.session(AI_PLAYER_ID)?.elixir;
        if elixir < choice.cost as f32 {
            debug!("AI saving up for {} ({:.1} elixir)", choice.id, elixir);
            return None;
        }

        let x = LANE_XS[rng.gen_range(0..LANE_XS.len())];
        let y = RIVER_Y - 50.0 - rng.gen::<f32>() * 50.0;
        match commands::spawn(state, sessions, rng, AI_PLAYER_ID, choice.id, x, y) {
            Ok(notices) => {
                info!("AI deployed {} at ({:.0}, {:.0})", choice.id, x, y);
                Some(AiMove {
                    unit_type: choice.id,
                    notices,
                })
            }
            Err(e) => {
                debug!("AI deployment of {} failed: {}", choice.id, e);
                None
            }
        }
    }
}
