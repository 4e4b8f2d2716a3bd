use log::info;
use shared::catalog::UnitStats;
use shared::{
    standard_bridges, Bridge, Landmark, MatchSnapshot, Outcome, Side, Tower, Unit, UnitState,
    BOARD_HEIGHT, LANE_XS, MATCH_DURATION,
};
use std::collections::{BTreeMap, BTreeSet};

pub type UnitId = u64;

/// Which player occupies each team slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Roster {
    pub home: Option<String>,
    pub away: Option<String>,
}

impl Roster {
    pub fn new(home: &str, away: &str) -> Self {
        Self {
            home: Some(home.to_string()),
            away: Some(away.to_string()),
        }
    }

    pub fn player(&self, side: Side) -> Option<&str> {
        match side {
            Side::Home => self.home.as_deref(),
            Side::Away => self.away.as_deref(),
            Side::Neutral => None,
        }
    }

    pub fn side_of(&self, player_id: &str) -> Option<Side> {
        if self.home.as_deref() == Some(player_id) {
            Some(Side::Home)
        } else if self.away.as_deref() == Some(player_id) {
            Some(Side::Away)
        } else {
            None
        }
    }

    pub fn players(&self) -> impl Iterator<Item = &str> {
        self.home.as_deref().into_iter().chain(self.away.as_deref())
    }
}

/// Canonical state of one match. Mutated only by command handlers and the
/// simulation tick.
#[derive(Debug, Clone)]
pub struct MatchState {
    pub time_remaining: f32,
    /// Simulated seconds since the match started; the clock buff expiries use
    pub elapsed: f32,
    pub towers: Vec<Tower>,
    pub units: BTreeMap<UnitId, Unit>,
    pub bridges: Vec<Bridge>,
    pub triggered_events: BTreeSet<&'static str>,
    pub speed_multiplier: f32,
    pub elixir_multiplier: f32,
    pub tower_regen: bool,
    pub outcome: Option<Outcome>,
    pub rematch_requests: BTreeSet<String>,
    pub roster: Roster,
    next_unit_id: UnitId,
}

impl MatchState {
    pub fn new(roster: Roster) -> Self {
        Self {
            time_remaining: MATCH_DURATION,
            elapsed: 0.0,
            towers: standard_towers(),
            units: BTreeMap::new(),
            bridges: standard_bridges(),
            triggered_events: BTreeSet::new(),
            speed_multiplier: 1.0,
            elixir_multiplier: 1.0,
            tower_regen: false,
            outcome: None,
            rematch_requests: BTreeSet::new(),
            roster,
            next_unit_id: 1,
        }
    }

    /// Starts over with the same players in the same slots.
    pub fn restart(&mut self) {
        let roster = std::mem::take(&mut self.roster);
        *self = Self::new(roster);
        info!("Match state reset");
    }

    pub fn is_running(&self) -> bool {
        self.outcome.is_none()
    }

    /// Places one unit at full health; returns its match-unique id.
    pub fn spawn_unit(
        &mut self,
        stats: &UnitStats,
        side: Side,
        owner: Option<&str>,
        x: f32,
        y: f32,
    ) -> UnitId {
        let uid = self.next_unit_id;
        self.next_unit_id += 1;

        let unit = Unit {
            uid,
            unit_type: stats.id.to_string(),
            side,
            owner: owner.map(str::to_string),
            stats: stats.combat_stats(),
            state: UnitState {
                x,
                y,
                hp: stats.health,
                attacking: false,
                speed_buff: None,
            },
        };
        self.units.insert(uid, unit);
        uid
    }

    pub fn king(&self, side: Side) -> Option<&Tower> {
        self.towers.iter().find(|t| t.is_king && t.side == side)
    }

    pub fn tower_mut(&mut self, id: &str) -> Option<&mut Tower> {
        self.towers.iter_mut().find(|t| t.id == id)
    }

    pub fn units_of(&self, side: Side) -> impl Iterator<Item = &Unit> {
        self.units.values().filter(move |u| u.side == side)
    }

    pub fn snapshot(&self) -> MatchSnapshot {
        MatchSnapshot {
            time_remaining: self.time_remaining,
            towers: self.towers.clone(),
            units: self.units.values().cloned().collect(),
            bridges: self.bridges.clone(),
            triggered_events: self.triggered_events.iter().map(|id| id.to_string()).collect(),
            speed_multiplier: self.speed_multiplier,
            elixir_multiplier: self.elixir_multiplier,
            tower_regen: self.tower_regen,
            outcome: self.outcome,
            rematch_requests: self.rematch_requests.iter().cloned().collect(),
        }
    }
}

/// Two crown towers per side guarding the lanes, plus a king tower behind them.
#[rustfmt::skip]
pub fn standard_towers() -> Vec<Tower> {
    let [west, east] = LANE_XS;
    let centre = (west + east) / 2.0;
    vec![
        Tower::new("home-left", west, BOARD_HEIGHT - 100.0, Side::Home, Landmark::LincolnMemorial),
        Tower::new("home-right", east, BOARD_HEIGHT - 100.0, Side::Home, Landmark::Pentagon),
        Tower::king("home-king", centre, BOARD_HEIGHT - 50.0, Side::Home),
        Tower::new("away-left", west, 100.0, Side::Away, Landmark::LincolnMemorial),
        Tower::new("away-right", east, 100.0, Side::Away, Landmark::Pentagon),
        Tower::king("away-king", centre, 50.0, Side::Away),
    ]
}
