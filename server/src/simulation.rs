//! The fixed-timestep match step.
//!
//! One call advances the match by `dt` seconds: timed events, regeneration,
//! the AI, unit targeting and movement, damage, culling, and the terminal
//! check. It always ends by broadcasting a snapshot, including after the
//! match is decided.

use crate::ai::AiDriver;
use crate::combat::{plan_unit, roll_variance, DamageLedger, UnitAction};
use crate::events::{fire_arena_shifts, fire_rule_events};
use crate::game::MatchState;
use crate::persistence::Profile;
use crate::session::SessionRegistry;
use crate::world::Outbound;
use log::{debug, info, warn};
use rand::Rng;
use shared::{
    Outcome, Packet, Side, DOUBLE_ELIXIR_THRESHOLD, ELIXIR_REGEN_RATE, MAX_ELIXIR,
    MAX_SUPER_CHARGE, SUPER_CHARGE_RATE, TOWER_REGEN_RATE,
};

pub const WIN_TROPHIES: i32 = 30;
pub const LOSS_TROPHIES: i32 = -20;

/// Trophy delta for the player on `side` once `outcome` is known.
pub fn trophy_change(outcome: Outcome, side: Side) -> i32 {
    match outcome.winner() {
        None => 0,
        Some(winner) if winner == side => WIN_TROPHIES,
        Some(_) => LOSS_TROPHIES,
    }
}

pub fn tick<R: Rng + ?Sized>(
    state: &mut MatchState,
    sessions: &mut SessionRegistry,
    ai: &mut AiDriver,
    rng: &mut R,
    dt: f32,
    outbox: &mut Vec<Outbound>,
) {
    if state.is_running() {
        for notice in fire_rule_events(state) {
            outbox.push(Outbound::broadcast(notice));
        }
        if state.tower_regen {
            regenerate_towers(state, dt);
        }

        state.time_remaining -= dt;
        state.elapsed += dt;
        regenerate_pools(state, sessions, dt);

        if let Some(ai_move) = ai.tick(state, sessions, rng, dt) {
            outbox.extend(ai_move.notices.into_iter().map(Outbound::broadcast));
        }
        for notice in fire_arena_shifts(state) {
            outbox.push(Outbound::broadcast(notice));
        }

        let culled = resolve_combat(state, rng, dt);
        if culled > 0 {
            debug!("{} units fell, {} remain", culled, state.units.len());
        }

        if let Some(outcome) = evaluate_outcome(state) {
            state.outcome = Some(outcome);
            settle_match(state, sessions, outcome, outbox);
        }
    }

    let players = state
        .roster
        .players()
        .filter_map(|id| sessions.session(id))
        .map(|session| session.view())
        .collect();
    outbox.push(Outbound::broadcast(Packet::Snapshot {
        state: state.snapshot(),
        players,
    }));
}

fn regenerate_towers(state: &mut MatchState, dt: f32) {
    for tower in state.towers.iter_mut().filter(|t| !t.is_destroyed()) {
        tower.hp = (tower.hp + TOWER_REGEN_RATE * dt).min(tower.max_hp);
    }
}

fn regenerate_pools(state: &MatchState, sessions: &mut SessionRegistry, dt: f32) {
    let late_game = if state.time_remaining < DOUBLE_ELIXIR_THRESHOLD { 2.0 } else { 1.0 };
    let elixir_rate = ELIXIR_REGEN_RATE * late_game * state.elixir_multiplier;

    for player_id in state.roster.players() {
        if let Some(session) = sessions.session_mut(player_id) {
            session.elixir = (session.elixir + elixir_rate * dt).min(MAX_ELIXIR);
            session.super_charge =
                (session.super_charge + SUPER_CHARGE_RATE * dt).min(MAX_SUPER_CHARGE);
        }
    }
}

/// Plans every living unit against the start-of-tick state, then moves units
/// and applies the summed damage. Returns how many units were removed.
fn resolve_combat<R: Rng + ?Sized>(state: &mut MatchState, rng: &mut R, dt: f32) -> usize {
    let mut plans = Vec::with_capacity(state.units.len());
    for unit in state.units.values().filter(|u| u.is_alive()) {
        match plan_unit(state, unit, dt, roll_variance(rng)) {
            Ok(action) => plans.push((unit.uid, action)),
            Err(e) => warn!("{}", e),
        }
    }

    let elapsed = state.elapsed;
    let mut ledger = DamageLedger::new();
    for (uid, action) in plans {
        let Some(unit) = state.units.get_mut(&uid) else {
            continue;
        };
        if matches!(unit.state.speed_buff, Some(buff) if elapsed >= buff.expires_at) {
            unit.state.speed_buff = None;
        }
        match action {
            UnitAction::Attack { target, damage } => {
                unit.state.attacking = true;
                ledger.add(target, damage);
            }
            UnitAction::Move { x, y } => {
                unit.state.attacking = false;
                unit.state.x = x;
                unit.state.y = y;
            }
            UnitAction::Idle => unit.state.attacking = false,
        }
    }
    ledger.apply(state);

    let before = state.units.len();
    state.units.retain(|_, unit| unit.is_alive());
    before - state.units.len()
}

/// Home king first, so a double knockout goes to the away side.
fn evaluate_outcome(state: &MatchState) -> Option<Outcome> {
    let fallen = |side| state.king(side).map_or(false, |king| king.is_destroyed());
    if fallen(Side::Home) {
        Some(Outcome::AwayVictory)
    } else if fallen(Side::Away) {
        Some(Outcome::HomeVictory)
    } else if state.time_remaining <= 0.0 {
        Some(Outcome::Draw)
    } else {
        None
    }
}

fn settle_match(
    state: &MatchState,
    sessions: &mut SessionRegistry,
    outcome: Outcome,
    outbox: &mut Vec<Outbound>,
) {
    info!("Match over: {:?}", outcome);
    for player_id in state.roster.players() {
        let Some(side) = state.roster.side_of(player_id) else {
            continue;
        };
        let Some(session) = sessions.session_mut(player_id) else {
            continue;
        };
        if session.is_ai {
            continue;
        }

        let change = trophy_change(outcome, side);
        session.trophies = session.trophies.saturating_add_signed(change);
        info!("{} {:+} trophies, now {}", player_id, change, session.trophies);

        outbox.push(Outbound::Persist {
            player_id: player_id.to_string(),
            profile: Profile {
                trophies: session.trophies,
            },
        });
        if let Some(addr) = session.connection {
            outbox.push(Outbound::Send {
                addr,
                packet: Packet::MatchResult {
                    outcome,
                    trophy_change: change,
                    trophies: session.trophies,
                },
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Roster;
    use crate::persistence::MemoryProfileStore;
    use assert_approx_eq::assert_approx_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use shared::catalog::lookup;
    use shared::{SpeedBuff, AI_PLAYER_ID, MATCH_DURATION, SPEED_SCALE, STARTING_ELIXIR, TICK_DT};
    use std::net::SocketAddr;
    use std::time::{Duration, Instant};

    struct Harness {
        state: MatchState,
        sessions: SessionRegistry,
        ai: AiDriver,
        rng: StdRng,
        outbox: Vec<Outbound>,
    }

    impl Harness {
        fn new(alice_trophies: u32, bob_trophies: u32) -> Self {
            let store = MemoryProfileStore::new();
            let mut sessions =
                SessionRegistry::new(8, Duration::from_secs(5), Duration::from_secs(5), 50);
            let now = Instant::now();
            for (id, trophies, team) in [
                ("alice", alice_trophies, Side::Home),
                ("bob", bob_trophies, Side::Away),
            ] {
                sessions.connect(addr(id), now);
                sessions.register(addr(id), id, trophies, &store).unwrap();
                sessions.session_mut(id).unwrap().team = Some(team);
            }
            Self {
                state: MatchState::new(Roster::new("alice", "bob")),
                sessions,
                ai: AiDriver::new(),
                rng: StdRng::seed_from_u64(11),
                outbox: Vec::new(),
            }
        }

        fn step(&mut self) {
            tick(
                &mut self.state,
                &mut self.sessions,
                &mut self.ai,
                &mut self.rng,
                TICK_DT,
                &mut self.outbox,
            );
        }

        fn match_results(&self) -> Vec<(SocketAddr, i32, u32)> {
            self.outbox
                .iter()
                .filter_map(|out| match out {
                    Outbound::Send {
                        addr,
                        packet: Packet::MatchResult {
                            trophy_change,
                            trophies,
                            ..
                        },
                    } => Some((*addr, *trophy_change, *trophies)),
                    _ => None,
                })
                .collect()
        }

        fn persisted(&self) -> Vec<(String, u32)> {
            self.outbox
                .iter()
                .filter_map(|out| match out {
                    Outbound::Persist { player_id, profile } => {
                        Some((player_id.clone(), profile.trophies))
                    }
                    _ => None,
                })
                .collect()
        }
    }

    fn addr(id: &str) -> SocketAddr {
        let port = if id == "alice" { 7001 } else { 7002 };
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn tower_index(state: &MatchState, id: &str) -> usize {
        state.towers.iter().position(|t| t.id == id).unwrap()
    }

    #[test]
    fn test_trophy_change_table() {
        assert_eq!(trophy_change(Outcome::HomeVictory, Side::Home), 30);
        assert_eq!(trophy_change(Outcome::HomeVictory, Side::Away), -20);
        assert_eq!(trophy_change(Outcome::AwayVictory, Side::Away), 30);
        assert_eq!(trophy_change(Outcome::Draw, Side::Home), 0);
    }

    #[test]
    fn test_clock_and_snapshot_every_tick() {
        let mut h = Harness::new(1000, 1000);
        h.step();

        assert_approx_eq!(h.state.time_remaining, MATCH_DURATION - TICK_DT, 1e-4);
        assert_approx_eq!(h.state.elapsed, TICK_DT, 1e-6);
        match h.outbox.last() {
            Some(Outbound::Broadcast {
                packet: Packet::Snapshot { players, .. },
                exclude: None,
            }) => assert_eq!(players.len(), 2),
            other => panic!("expected snapshot broadcast, got {:?}", other),
        }
    }

    #[test]
    fn test_elixir_regen_rates() {
        let mut h = Harness::new(1000, 1000);
        h.step();
        let alice = h.sessions.session("alice").unwrap();
        assert_approx_eq!(alice.elixir, STARTING_ELIXIR + 0.3 * TICK_DT, 1e-5);
        assert_approx_eq!(h.sessions.session("bob").unwrap().super_charge, 5.0 * TICK_DT, 1e-5);

        // Inside the last minute: doubled, and tripled again by the tax cut
        h.state.time_remaining = 59.0;
        h.sessions.session_mut("alice").unwrap().elixir = 0.0;
        h.step();
        assert!(h.state.triggered_events.contains("tax_cut"));
        let alice = h.sessions.session("alice").unwrap();
        assert_approx_eq!(alice.elixir, 0.3 * 2.0 * 3.0 * TICK_DT, 1e-5);
    }

    #[test]
    fn test_pools_clamp_at_maximum() {
        let mut h = Harness::new(1000, 1000);
        {
            let alice = h.sessions.session_mut("alice").unwrap();
            alice.elixir = MAX_ELIXIR - 0.001;
            alice.super_charge = MAX_SUPER_CHARGE - 0.01;
        }
        for _ in 0..10 {
            h.step();
        }
        let alice = h.sessions.session("alice").unwrap();
        assert_eq!(alice.elixir, MAX_ELIXIR);
        assert_eq!(alice.super_charge, MAX_SUPER_CHARGE);
    }

    #[test]
    fn test_tower_regen_skips_destroyed_towers() {
        let mut h = Harness::new(1000, 1000);
        h.state.time_remaining = 29.0;
        h.state.triggered_events.insert("boom");
        h.state.tower_regen = true;
        let damaged = tower_index(&h.state, "home-left");
        let dead = tower_index(&h.state, "away-left");
        h.state.towers[damaged].hp = 1000.0;
        h.state.towers[dead].hp = 0.0;

        h.step();

        assert_approx_eq!(h.state.towers[damaged].hp, 1000.0 + TOWER_REGEN_RATE * TICK_DT, 1e-3);
        assert_eq!(h.state.towers[dead].hp, 0.0);
        let king = h.state.king(Side::Home).unwrap();
        assert_eq!(king.hp, king.max_hp);
    }

    #[test]
    fn test_simultaneous_attackers_sum_damage() {
        let mut h = Harness::new(1000, 1000);
        let idx = tower_index(&h.state, "away-left");
        let trump = lookup("donald_trump").unwrap();
        let washington = lookup("george_washington").unwrap();
        h.state.spawn_unit(trump, Side::Home, Some("alice"), 100.0, 110.0);
        h.state.spawn_unit(washington, Side::Home, Some("alice"), 110.0, 100.0);
        let before = h.state.towers[idx].hp;

        h.step();

        let dealt = before - h.state.towers[idx].hp;
        let base = (trump.damage + washington.damage) * TICK_DT;
        assert!(dealt >= base * 0.95 - 1e-3 && dealt <= base * 1.05 + 1e-3, "dealt {}", dealt);
        assert!(h.state.units.values().all(|u| u.state.attacking));
    }

    #[test]
    fn test_dead_units_removed_same_tick() {
        let mut h = Harness::new(1000, 1000);
        let squad = lookup("secret_service").unwrap();
        let victim = h.state.spawn_unit(squad, Side::Away, Some("bob"), 100.0, 300.0);
        h.state.units.get_mut(&victim).unwrap().state.hp = 0.5;
        let trump = lookup("donald_trump").unwrap();
        h.state.spawn_unit(trump, Side::Home, Some("alice"), 100.0, 310.0);

        h.step();

        assert!(!h.state.units.contains_key(&victim));
        assert_eq!(h.state.units.len(), 1);
    }

    #[test]
    fn test_broken_unit_does_not_stall_others() {
        let mut h = Harness::new(1000, 1000);
        let obama = lookup("obama").unwrap();
        let washington = lookup("george_washington").unwrap();
        let broken = h.state.spawn_unit(obama, Side::Away, None, f32::NAN, 200.0);
        let healthy = h.state.spawn_unit(washington, Side::Home, Some("alice"), 100.0, 500.0);

        h.step();

        assert!(h.state.units[&healthy].state.y < 500.0);
        assert!(h.state.units[&broken].state.x.is_nan());
    }

    #[test]
    fn test_rush_expires_without_timer() {
        let mut h = Harness::new(1000, 1000);
        let grant_stats = lookup("grant").unwrap();
        let grant = h.state.spawn_unit(grant_stats, Side::Home, Some("alice"), 100.0, 600.0);
        h.state.units.get_mut(&grant).unwrap().state.speed_buff = Some(SpeedBuff {
            multiplier: 2.0,
            expires_at: 3.0,
        });
        let step_len = 1.1 * SPEED_SCALE * TICK_DT;

        let y0 = h.state.units[&grant].state.y;
        h.step();
        let y1 = h.state.units[&grant].state.y;
        assert_approx_eq!(y0 - y1, step_len * 2.0, 1e-3);

        while h.state.elapsed < 3.05 {
            h.step();
        }
        let unit = &h.state.units[&grant];
        assert!(unit.state.speed_buff.is_none());
        let y_before = unit.state.y;
        h.step();
        assert_approx_eq!(y_before - h.state.units[&grant].state.y, step_len, 1e-3);
    }

    #[test]
    fn test_king_down_ends_match_once() {
        let mut h = Harness::new(10, 1200);
        let king = tower_index(&h.state, "home-king");
        h.state.towers[king].hp = 0.0;

        h.step();

        assert_eq!(h.state.outcome, Some(Outcome::AwayVictory));
        assert_eq!(h.sessions.session("alice").unwrap().trophies, 0);
        assert_eq!(h.sessions.session("bob").unwrap().trophies, 1230);
        let mut results = h.match_results();
        results.sort();
        assert_eq!(results, vec![(addr("alice"), -20, 0), (addr("bob"), 30, 1230)]);
        let mut persisted = h.persisted();
        persisted.sort();
        assert_eq!(persisted, vec![("alice".to_string(), 0), ("bob".to_string(), 1230)]);

        let frozen_clock = h.state.time_remaining;
        h.outbox.clear();
        for _ in 0..5 {
            h.step();
        }
        assert!(h.match_results().is_empty());
        assert!(h.persisted().is_empty());
        assert_eq!(h.state.time_remaining, frozen_clock);
        assert_eq!(h.sessions.session("bob").unwrap().trophies, 1230);
        assert_eq!(h.outbox.len(), 5);
    }

    #[test]
    fn test_home_king_checked_first() {
        let mut h = Harness::new(100, 100);
        for id in ["home-king", "away-king"] {
            let idx = tower_index(&h.state, id);
            h.state.towers[idx].hp = 0.0;
        }
        h.step();
        assert_eq!(h.state.outcome, Some(Outcome::AwayVictory));
    }

    #[test]
    fn test_timeout_is_a_draw() {
        let mut h = Harness::new(500, 500);
        h.state.time_remaining = TICK_DT / 2.0;
        h.step();

        assert_eq!(h.state.outcome, Some(Outcome::Draw));
        assert!(h
            .match_results()
            .iter()
            .all(|&(_, change, trophies)| change == 0 && trophies == 500));
    }

    #[test]
    fn test_ai_gets_no_trophies_or_result() {
        let mut h = Harness::new(400, 0);
        h.sessions.remove_session("bob");
        h.ai.activate(&mut h.sessions, Side::Away, 400);
        h.state = MatchState::new(Roster::new("alice", AI_PLAYER_ID));
        let king = tower_index(&h.state, "away-king");
        h.state.towers[king].hp = 0.0;

        h.step();

        assert_eq!(h.match_results(), vec![(addr("alice"), 30, 430)]);
        assert_eq!(h.persisted(), vec![("alice".to_string(), 430)]);
        assert_eq!(h.sessions.session(AI_PLAYER_ID).unwrap().trophies, 400);
    }

    #[test]
    fn test_events_announced_once_while_ticking() {
        let mut h = Harness::new(1000, 1000);
        h.state.time_remaining = 150.1;
        for _ in 0..10 {
            h.step();
        }
        let announcements = h
            .outbox
            .iter()
            .filter(|out| {
                matches!(
                    out,
                    Outbound::Broadcast {
                        packet: Packet::Announcement { .. },
                        ..
                    }
                )
            })
            .count();
        assert_eq!(announcements, 1);
        assert_eq!(h.state.speed_multiplier, 1.3);
    }
}
