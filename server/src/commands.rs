//! Client intents applied against the running match.
//!
//! Every handler validates fully before it mutates anything, so a rejected
//! command leaves both the match and the requester's resource pools untouched.
//! Accepted commands return the packets to broadcast.

use crate::combat::{apply_area_damage, apply_area_heal, apply_rush};
use crate::error::{Rejection, ServerError};
use crate::game::MatchState;
use crate::session::SessionRegistry;
use log::{debug, info};
use rand::Rng;
use shared::catalog::{
    lookup, AbilityKind, Deployment, ABILITY_DAMAGE, ABILITY_HEAL, RUSH_DURATION, RUSH_MULTIPLIER,
};
use shared::{Packet, Side, BOARD_HEIGHT, BOARD_WIDTH, MAX_SUPER_CHARGE, RIVER_MARGIN, RIVER_Y};

/// Squad members are scattered this far around the requested point
const SQUAD_JITTER: f32 = 20.0;

#[derive(Debug)]
pub struct Rematch {
    pub notices: Vec<Packet>,
    /// True once every human participant has asked and the match was reset
    pub restarted: bool,
}

fn participant_side(state: &MatchState, player_id: &str) -> Result<Side, ServerError> {
    if !state.is_running() {
        return Err(Rejection::MatchFinished.into());
    }
    state
        .roster
        .side_of(player_id)
        .ok_or_else(|| Rejection::NotParticipant.into())
}

fn in_bounds(x: f32, y: f32) -> bool {
    x.is_finite()
        && y.is_finite()
        && (0.0..=BOARD_WIDTH).contains(&x)
        && (0.0..=BOARD_HEIGHT).contains(&y)
}

/// Home deploys below the river, away above it, each with a safety margin.
pub fn on_own_side(side: Side, y: f32) -> bool {
    match side {
        Side::Home => y >= RIVER_Y + RIVER_MARGIN,
        Side::Away => y <= RIVER_Y - RIVER_MARGIN,
        Side::Neutral => false,
    }
}

/// Deploys a unit (or squad) for `player_id`, or resolves a spell on the spot.
pub fn spawn<R: Rng + ?Sized>(
    state: &mut MatchState,
    sessions: &mut SessionRegistry,
    rng: &mut R,
    player_id: &str,
    unit_type: &str,
    x: f32,
    y: f32,
) -> Result<Vec<Packet>, ServerError> {
    let side = participant_side(state, player_id)?;
    let stats = lookup(unit_type).ok_or(Rejection::UnknownUnitType)?;
    if !stats.is_deployable() {
        return Err(Rejection::NotDeployable.into());
    }
    if !in_bounds(x, y) {
        return Err(Rejection::OutOfBounds.into());
    }

    let session = sessions
        .session_mut(player_id)
        .ok_or(Rejection::UnknownSession)?;
    let cost = stats.cost as f32;
    if session.elixir < cost {
        return Err(Rejection::InsufficientElixir.into());
    }
    if !on_own_side(side, y) {
        return Err(Rejection::WrongSideOfRiver.into());
    }
    session.elixir -= cost;

    match stats.deployment {
        Deployment::Spell { radius } => {
            let hits = apply_area_damage(state, side, x, y, radius, stats.damage);
            debug!("{} cast {} at ({:.0}, {:.0}), {} hit", player_id, stats.id, x, y, hits);
            Ok(vec![Packet::SuperEffect {
                kind: AbilityKind::Damage,
                radius,
                x,
                y,
                team: side,
                spell: true,
            }])
        }
        Deployment::Troop | Deployment::Boss => {
            for _ in 0..stats.count {
                let (jx, jy) = if stats.count > 1 {
                    (
                        (rng.gen::<f32>() - 0.5) * SQUAD_JITTER,
                        (rng.gen::<f32>() - 0.5) * SQUAD_JITTER,
                    )
                } else {
                    (0.0, 0.0)
                };
                state.spawn_unit(stats, side, Some(player_id), x + jx, y + jy);
            }
            debug!("{} deployed {}x {} at ({:.0}, {:.0})", player_id, stats.count, stats.id, x, y);
            Ok(Vec::new())
        }
    }
}

/// Spends a full super charge on the ability bound to `ability_id`.
pub fn activate_super(
    state: &mut MatchState,
    sessions: &mut SessionRegistry,
    player_id: &str,
    ability_id: &str,
    x: f32,
    y: f32,
) -> Result<Vec<Packet>, ServerError> {
    let side = participant_side(state, player_id)?;
    if !(x.is_finite() && y.is_finite()) {
        return Err(Rejection::OutOfBounds.into());
    }

    let session = sessions
        .session_mut(player_id)
        .ok_or(Rejection::UnknownSession)?;
    if session.super_charge < MAX_SUPER_CHARGE {
        return Err(Rejection::SuperNotCharged.into());
    }
    let stats = lookup(ability_id).ok_or(Rejection::NoSuperAbility)?;
    let ability = stats.super_ability.ok_or(Rejection::NoSuperAbility)?;
    session.super_charge = 0.0;

    let radius = ability.radius;
    let affected = match ability.kind {
        AbilityKind::Damage => apply_area_damage(state, side, x, y, radius, ABILITY_DAMAGE),
        AbilityKind::Heal => apply_area_heal(state, side, x, y, radius, ABILITY_HEAL),
        AbilityKind::Rush => apply_rush(state, side, x, y, radius, RUSH_MULTIPLIER, RUSH_DURATION),
    };
    info!("{} activated {:?} super ({}), {} affected", player_id, ability.kind, stats.id, affected);

    Ok(vec![
        Packet::announcement(&format!("{} ACTIVATED SUPER!", stats.name), side),
        Packet::SuperEffect {
            kind: ability.kind,
            radius: ability.radius,
            x,
            y,
            team: side,
            spell: false,
        },
    ])
}

/// Records a rematch vote; restarts the match once every human participant
/// has voted.
pub fn request_rematch(
    state: &mut MatchState,
    sessions: &mut SessionRegistry,
    player_id: &str,
) -> Result<Rematch, ServerError> {
    if state.is_running() {
        return Err(Rejection::MatchInProgress.into());
    }
    let side = state.roster.side_of(player_id).ok_or(Rejection::NotParticipant)?;
    let is_human = |id: &str| sessions.session(id).map_or(false, |s| !s.is_ai);
    if !is_human(player_id) {
        return Err(Rejection::NotParticipant.into());
    }

    state.rematch_requests.insert(player_id.to_string());
    let mut notices = vec![Packet::announcement(
        &format!("{} REQUESTED REMATCH", side.label()),
        side,
    )];

    let humans: Vec<String> = state
        .roster
        .players()
        .filter(|id| is_human(*id))
        .map(str::to_string)
        .collect();
    let unanimous = humans.iter().all(|id| state.rematch_requests.contains(id));
    if !unanimous {
        return Ok(Rematch {
            notices,
            restarted: false,
        });
    }

    state.restart();
    let players: Vec<String> = state.roster.players().map(str::to_string).collect();
    for id in players {
        if let Some(session) = sessions.session_mut(&id) {
            session.reset_pools();
        }
    }
    info!("Rematch started for {}", humans.join(" and "));
    notices.push(Packet::announcement("REMATCH STARTED!", Side::Neutral));
    Ok(Rematch {
        notices,
        restarted: true,
    })
}

/// Builds the emote packet to relay to everyone except the sender.
pub fn send_emote(
    sessions: &SessionRegistry,
    player_id: &str,
    emote: &str,
) -> Result<Packet, ServerError> {
    let session = sessions.session(player_id).ok_or(Rejection::UnknownSession)?;
    Ok(Packet::Emote {
        emote: emote.to_string(),
        team: session.team.unwrap_or(Side::Neutral),
        player_id: player_id.to_string(),
    })
}
