//! Target acquisition, damage accumulation and area effects.
//!
//! Units decide what to do against the state as it was at the start of the
//! tick; their damage is collected in a `DamageLedger` and applied in a single
//! pass afterwards, so the order in which attackers are processed never
//! changes the result.

use crate::error::ServerError;
use crate::game::{MatchState, UnitId};
use rand::Rng;
use shared::{distance, Side, SpeedBuff, TargetPriority, Unit, SPEED_SCALE};
use std::collections::HashMap;

/// Neutral units walk at a flat pixel rate, ignoring catalog speed and buffs.
pub const NEUTRAL_SPEED: f32 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetId {
    /// Index into `MatchState::towers`; towers are never removed mid-match
    Tower(usize),
    Unit(UnitId),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnitAction {
    Attack { target: TargetId, damage: f32 },
    Move { x: f32, y: f32 },
    Idle,
}

#[derive(Debug, Default)]
pub struct DamageLedger {
    pending: HashMap<TargetId, f32>,
}

impl DamageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, target: TargetId, amount: f32) {
        *self.pending.entry(target).or_insert(0.0) += amount;
    }

    pub fn total_for(&self, target: TargetId) -> f32 {
        self.pending.get(&target).copied().unwrap_or(0.0)
    }

    /// Subtracts every summed entry from its target. Tower hit points floor
    /// at zero; unit hit points may go negative and are culled by the caller.
    pub fn apply(self, state: &mut MatchState) {
        for (target, amount) in self.pending {
            match target {
                TargetId::Tower(index) => {
                    if let Some(tower) = state.towers.get_mut(index) {
                        tower.hp = (tower.hp - amount).max(0.0);
                    }
                }
                TargetId::Unit(uid) => {
                    if let Some(unit) = state.units.get_mut(&uid) {
                        unit.state.hp -= amount;
                    }
                }
            }
        }
    }
}

/// Uniform damage variance so identical trades do not resolve identically.
pub fn roll_variance<R: Rng + ?Sized>(rng: &mut R) -> f32 {
    rng.gen_range(0.95..=1.05)
}

/// Finds the nearest hostile target and its distance. Towers are considered
/// before units so a tie goes to the building.
pub fn acquire_target(state: &MatchState, unit: &Unit) -> Option<(TargetId, f32)> {
    let origin = unit.position();
    let hostile = |side: Side| unit.side.is_hostile_to(side);
    let reach = |to: (f32, f32)| distance(origin, to);

    let towers = state
        .towers
        .iter()
        .enumerate()
        .filter(|(_, t)| !t.is_destroyed() && hostile(t.side))
        .map(|(i, t)| (TargetId::Tower(i), reach(t.position())));

    let units = state
        .units
        .values()
        .filter(|_| unit.stats.targets == TargetPriority::Any)
        .filter(|other| other.is_alive() && hostile(other.side))
        .map(|other| (TargetId::Unit(other.uid), reach(other.position())));

    towers
        .chain(units)
        .filter(|(_, d)| d.is_finite())
        .fold(None, |nearest, candidate| match nearest {
            Some((_, best)) if best <= candidate.1 => nearest,
            _ => Some(candidate),
        })
}

fn target_position(state: &MatchState, target: TargetId) -> Option<(f32, f32)> {
    match target {
        TargetId::Tower(index) => state.towers.get(index).map(|t| t.position()),
        TargetId::Unit(uid) => state.units.get(&uid).map(|u| u.position()),
    }
}

/// Decides one unit's action for this tick without mutating anything.
pub fn plan_unit(
    state: &MatchState,
    unit: &Unit,
    dt: f32,
    variance: f32,
) -> Result<UnitAction, ServerError> {
    let (x, y) = unit.position();
    let stats = unit.stats;
    if !(x.is_finite() && y.is_finite()) {
        return Err(ServerError::TickStep {
            uid: unit.uid,
            reason: format!("non-finite position ({}, {})", x, y),
        });
    }
    if !(stats.damage.is_finite() && stats.speed.is_finite() && stats.range.is_finite()) {
        return Err(ServerError::TickStep {
            uid: unit.uid,
            reason: "non-finite combat stats".to_string(),
        });
    }

    let Some((target, dist)) = acquire_target(state, unit) else {
        return Ok(UnitAction::Idle);
    };

    if dist <= stats.range {
        return Ok(UnitAction::Attack {
            target,
            damage: stats.damage * dt * variance,
        });
    }

    let (tx, ty) = target_position(state, target).ok_or_else(|| ServerError::TickStep {
        uid: unit.uid,
        reason: format!("target {:?} vanished", target),
    })?;
    let step = if unit.side == Side::Neutral {
        NEUTRAL_SPEED * dt
    } else {
        let buff = unit.speed_multiplier(state.elapsed);
        stats.speed * SPEED_SCALE * buff * state.speed_multiplier * dt
    };
    let step = step.min(dist);
    Ok(UnitAction::Move {
        x: x + (tx - x) / dist * step,
        y: y + (ty - y) / dist * step,
    })
}

/// Deals `damage` to every hostile unit and standing tower within `radius`.
/// Returns the number of targets hit.
pub fn apply_area_damage(
    state: &mut MatchState,
    team: Side,
    x: f32,
    y: f32,
    radius: f32,
    damage: f32,
) -> usize {
    let mut hits = 0;
    for unit in state.units.values_mut() {
        if unit.is_alive()
            && team.is_hostile_to(unit.side)
            && distance((x, y), unit.position()) <= radius
        {
            unit.state.hp -= damage;
            hits += 1;
        }
    }
    for tower in state.towers.iter_mut() {
        if !tower.is_destroyed()
            && team.is_hostile_to(tower.side)
            && distance((x, y), tower.position()) <= radius
        {
            tower.hp = (tower.hp - damage).max(0.0);
            hits += 1;
        }
    }
    hits
}

pub fn apply_area_heal(
    state: &mut MatchState,
    team: Side,
    x: f32,
    y: f32,
    radius: f32,
    amount: f32,
) -> usize {
    let mut healed = 0;
    for unit in state.units.values_mut() {
        if unit.is_alive() && unit.side == team && distance((x, y), unit.position()) <= radius {
            unit.state.hp = (unit.state.hp + amount).min(unit.stats.max_hp);
            healed += 1;
        }
    }
    healed
}

/// Grants allied units in range a temporary speed multiplier that lapses on
/// its own once the match clock passes the expiry.
pub fn apply_rush(
    state: &mut MatchState,
    team: Side,
    x: f32,
    y: f32,
    radius: f32,
    multiplier: f32,
    duration: f32,
) -> usize {
    let expires_at = state.elapsed + duration;
    let mut buffed = 0;
    for unit in state.units.values_mut() {
        if unit.is_alive() && unit.side == team && distance((x, y), unit.position()) <= radius {
            unit.state.speed_buff = Some(SpeedBuff {
                multiplier,
                expires_at,
            });
            buffed += 1;
        }
    }
    buffed
}
