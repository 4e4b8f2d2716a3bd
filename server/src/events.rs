//! Timed match modifiers.
//!
//! Two tables drive them. Rule events change economy or movement multipliers
//! and are checked against the exact countdown; arena shifts reshape the
//! board and are checked against the floored countdown. Both record their id
//! in `MatchState::triggered_events` so each fires at most once per match.

use crate::game::MatchState;
use log::info;
use shared::catalog::{lookup, BOSS_ID};
use shared::{standard_bridges, Landmark, Packet, Side, Tower, LANE_XS, RIVER_Y};

pub const NEUTRAL_OUTPOST_ID: &str = "neutral-pentagon";
const NEUTRAL_OUTPOST_HEALTH: f32 = 3000.0;
const RIVER_CENTRE: (f32, f32) = (200.0, RIVER_Y);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RuleEffect {
    SpeedMultiplier(f32),
    ElixirMultiplier(f32),
    TowerRegen,
}

#[derive(Debug, Clone, Copy)]
pub struct RuleEvent {
    pub id: &'static str,
    /// Fires once `time_remaining` is at or below this many seconds
    pub threshold: f32,
    pub name: &'static str,
    pub text: &'static str,
    pub effect: RuleEffect,
}

pub static RULE_EVENTS: &[RuleEvent] = &[
    RuleEvent {
        id: "infrastructure",
        threshold: 150.0,
        name: "INFRASTRUCTURE BILL",
        text: "ALL UNITS GAIN +30% SPEED!",
        effect: RuleEffect::SpeedMultiplier(1.3),
    },
    RuleEvent {
        id: "tax_cut",
        threshold: 60.0,
        name: "TAX CUT",
        text: "TRIPLE ELIXIR REGEN!",
        effect: RuleEffect::ElixirMultiplier(3.0),
    },
    RuleEvent {
        id: "boom",
        threshold: 30.0,
        name: "ECONOMIC BOOM",
        text: "TOWERS REGENERATING HP!",
        effect: RuleEffect::TowerRegen,
    },
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShiftEffect {
    /// Only the bridge at this lane stays standing
    CollapseBridges { keep_x: f32 },
    NeutralOutpost,
    RestoreBridges { speed_multiplier: f32 },
    SpawnBoss,
}

#[derive(Debug, Clone, Copy)]
pub struct ArenaShift {
    pub id: &'static str,
    /// Compared against the floored countdown
    pub threshold: i32,
    pub text: &'static str,
    pub subtext: &'static str,
    pub effect: ShiftEffect,
}

pub static ARENA_SHIFTS: &[ArenaShift] = &[
    ArenaShift {
        id: "bridge_collapse",
        threshold: 120,
        text: "WEST BRIDGE COLLAPSED!",
        subtext: "Lanes have shifted!",
        effect: ShiftEffect::CollapseBridges { keep_x: LANE_XS[1] },
    },
    ArenaShift {
        id: "pentagon",
        threshold: 60,
        text: "PENTAGON OUTPOST DEPLOYED!",
        subtext: "Secure the center!",
        effect: ShiftEffect::NeutralOutpost,
    },
    ArenaShift {
        id: "recall",
        threshold: 30,
        text: "INFRASTRUCTURE RESTORED!",
        subtext: "Hyper-drive active!",
        effect: ShiftEffect::RestoreBridges {
            speed_multiplier: 1.5,
        },
    },
    ArenaShift {
        id: "boss",
        threshold: 15,
        text: "THE CONSTITUTION OF THE UNITED STATES",
        subtext: "THE SUPREME LAW HAS ARRIVED!",
        effect: ShiftEffect::SpawnBoss,
    },
];

fn neutral_notice(text: String, subtext: &str) -> Packet {
    Packet::Announcement {
        text,
        subtext: Some(subtext.to_string()),
        team: Side::Neutral,
    }
}

/// Applies every rule event whose threshold the countdown has reached.
/// Returns the announcements to broadcast.
pub fn fire_rule_events(state: &mut MatchState) -> Vec<Packet> {
    let mut notices = Vec::new();
    for event in RULE_EVENTS {
        if state.time_remaining > event.threshold || state.triggered_events.contains(event.id) {
            continue;
        }
        state.triggered_events.insert(event.id);

        match event.effect {
            RuleEffect::SpeedMultiplier(m) => state.speed_multiplier = m,
            RuleEffect::ElixirMultiplier(m) => state.elixir_multiplier = m,
            RuleEffect::TowerRegen => state.tower_regen = true,
        }
        info!("Event {} fired at {:.1}s", event.id, state.time_remaining);
        let title = format!("EVENT: {}!", event.name);
        notices.push(neutral_notice(title, event.text));
    }
    notices
}

/// Applies every arena shift whose threshold the floored countdown has reached.
pub fn fire_arena_shifts(state: &mut MatchState) -> Vec<Packet> {
    let countdown = state.time_remaining.floor() as i32;
    let mut notices = Vec::new();

    for shift in ARENA_SHIFTS {
        if countdown > shift.threshold || state.triggered_events.contains(shift.id) {
            continue;
        }
        state.triggered_events.insert(shift.id);

        match shift.effect {
            ShiftEffect::CollapseBridges { keep_x } => {
                state.bridges.retain(|bridge| bridge.x == keep_x);
            }
            ShiftEffect::NeutralOutpost => {
                let (x, y) = RIVER_CENTRE;
                let mut outpost =
                    Tower::new(NEUTRAL_OUTPOST_ID, x, y, Side::Neutral, Landmark::Pentagon);
                outpost.hp = NEUTRAL_OUTPOST_HEALTH;
                outpost.max_hp = NEUTRAL_OUTPOST_HEALTH;
                state.towers.push(outpost);
            }
            ShiftEffect::RestoreBridges { speed_multiplier } => {
                state.bridges = standard_bridges();
                state.speed_multiplier = speed_multiplier;
            }
            ShiftEffect::SpawnBoss => {
                if let Some(boss) = lookup(BOSS_ID) {
                    let (x, y) = RIVER_CENTRE;
                    state.spawn_unit(boss, Side::Neutral, None, x, y);
                    info!("Boss {} spawned", BOSS_ID);
                }
            }
        }
        info!("Arena shift {} at {}s", shift.id, countdown);
        notices.push(neutral_notice(shift.text.to_string(), shift.subtext));
    }
    notices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Roster;

    fn fresh() -> MatchState {
        MatchState::new(Roster::new("alice", "bob"))
    }

    #[test]
    fn test_no_events_at_kickoff() {
        let mut state = fresh();
        assert!(fire_rule_events(&mut state).is_empty());
        assert!(fire_arena_shifts(&mut state).is_empty());
        assert!(state.triggered_events.is_empty());
    }

    #[test]
    fn test_infrastructure_fires_once() {
        let mut state = fresh();
        state.time_remaining = 149.97;

        let notices = fire_rule_events(&mut state);
        assert_eq!(notices.len(), 1);
        assert_eq!(state.speed_multiplier, 1.3);
        match &notices[0] {
            Packet::Announcement {
                text,
                subtext,
                team,
            } => {
                assert_eq!(text, "EVENT: INFRASTRUCTURE BILL!");
                assert_eq!(subtext.as_deref(), Some("ALL UNITS GAIN +30% SPEED!"));
                assert_eq!(*team, Side::Neutral);
            }
            other => panic!("unexpected packet {:?}", other),
        }

        for _ in 0..20 {
            state.time_remaining -= 0.05;
            assert!(fire_rule_events(&mut state).is_empty());
        }
    }

    #[test]
    fn test_late_join_fires_all_passed_rule_events() {
        let mut state = fresh();
        state.time_remaining = 10.0;

        assert_eq!(fire_rule_events(&mut state).len(), 3);
        assert_eq!(state.elixir_multiplier, 3.0);
        assert!(state.tower_regen);
    }

    #[test]
    fn test_bridge_collapse_keeps_east_bridge() {
        let mut state = fresh();
        state.time_remaining = 120.9;

        let notices = fire_arena_shifts(&mut state);
        assert_eq!(notices.len(), 1);
        assert_eq!(state.bridges.len(), 1);
        assert_eq!(state.bridges[0].x, LANE_XS[1]);
        assert!(state.triggered_events.contains("bridge_collapse"));
    }

    #[test]
    fn test_skipped_second_still_triggers_shift() {
        let mut state = fresh();
        state.time_remaining = 119.2;
        fire_arena_shifts(&mut state);
        assert!(state.triggered_events.contains("bridge_collapse"));
    }

    #[test]
    fn test_outpost_and_recall() {
        let mut state = fresh();
        state.time_remaining = 60.5;
        fire_arena_shifts(&mut state);

        let outpost = state.towers.iter().find(|t| t.id == NEUTRAL_OUTPOST_ID).unwrap();
        assert_eq!(outpost.side, Side::Neutral);
        assert_eq!(outpost.hp, 3000.0);
        assert!(!outpost.is_king);
        assert_eq!(state.bridges.len(), 1);

        state.time_remaining = 30.0;
        fire_arena_shifts(&mut state);
        assert_eq!(state.bridges, standard_bridges());
        assert_eq!(state.speed_multiplier, 1.5);
        assert_eq!(state.towers.iter().filter(|t| t.id == NEUTRAL_OUTPOST_ID).count(), 1);
    }

    #[test]
    fn test_boss_spawns_once() {
        let mut state = fresh();
        state.time_remaining = 15.99;

        fire_arena_shifts(&mut state);
        fire_arena_shifts(&mut state);

        let bosses: Vec<_> = state.units.values().filter(|u| u.unit_type == BOSS_ID).collect();
        assert_eq!(bosses.len(), 1);
        assert_eq!(bosses[0].side, Side::Neutral);
        assert_eq!(bosses[0].position(), RIVER_CENTRE);
        assert_eq!(state.triggered_events.len(), ARENA_SHIFTS.len());
    }
}
