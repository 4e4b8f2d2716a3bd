use serde::{Deserialize, Serialize};

pub mod catalog;

use catalog::AbilityKind;

pub const BOARD_WIDTH: f32 = 400.0;
pub const BOARD_HEIGHT: f32 = 700.0;
pub const RIVER_Y: f32 = BOARD_HEIGHT / 2.0;
pub const RIVER_MARGIN: f32 = 20.0;
pub const LANE_XS: [f32; 2] = [100.0, 300.0];
pub const BRIDGE_WIDTH: f32 = 60.0;

pub const TICK_DT: f32 = 0.05;
pub const MATCH_DURATION: f32 = 180.0;
/// Elixir regenerates twice as fast once the countdown drops below this.
pub const DOUBLE_ELIXIR_THRESHOLD: f32 = 60.0;

pub const STARTING_ELIXIR: f32 = 5.0;
pub const MAX_ELIXIR: f32 = 10.0;
pub const ELIXIR_REGEN_RATE: f32 = 0.3;
pub const MAX_SUPER_CHARGE: f32 = 100.0;
pub const SUPER_CHARGE_RATE: f32 = 5.0;

pub const TOWER_HEALTH: f32 = 1500.0;
pub const TOWER_REGEN_RATE: f32 = 20.0;
/// Catalog speeds are expressed in tiles; one tile per second is this many pixels.
pub const SPEED_SCALE: f32 = 60.0;

pub const MAX_PLAYER_ID_LEN: usize = 50;
pub const AI_PLAYER_ID: &str = "computer_executive";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Home,
    Away,
    Neutral,
}

impl Side {
    /// Sides are hostile to every side but their own, so neutral entities
    /// fight (and are fought by) both teams.
    pub fn is_hostile_to(self, other: Side) -> bool {
        self != other
    }

    pub fn label(self) -> &'static str {
        match self {
            Side::Home => "HOME",
            Side::Away => "AWAY",
            Side::Neutral => "NEUTRAL",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    HomeVictory,
    AwayVictory,
    Draw,
}

impl Outcome {
    pub fn winner(self) -> Option<Side> {
        match self {
            Outcome::HomeVictory => Some(Side::Home),
            Outcome::AwayVictory => Some(Side::Away),
            Outcome::Draw => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum TargetPriority {
    Any,
    BuildingsOnly,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Landmark {
    LincolnMemorial,
    Pentagon,
    WhiteHouse,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Tower {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub hp: f32,
    pub max_hp: f32,
    pub side: Side,
    pub is_king: bool,
    pub landmark: Option<Landmark>,
}

impl Tower {
    pub fn new(id: &str, x: f32, y: f32, side: Side, landmark: Landmark) -> Self {
        Self {
            id: id.to_string(),
            x,
            y,
            hp: TOWER_HEALTH,
            max_hp: TOWER_HEALTH,
            side,
            is_king: false,
            landmark: Some(landmark),
        }
    }

    /// King towers carry double the base hit points and end the match when destroyed.
    pub fn king(id: &str, x: f32, y: f32, side: Side) -> Self {
        Self {
            hp: TOWER_HEALTH * 2.0,
            max_hp: TOWER_HEALTH * 2.0,
            is_king: true,
            ..Self::new(id, x, y, side, Landmark::WhiteHouse)
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.hp <= 0.0
    }

    pub fn position(&self) -> (f32, f32) {
        (self.x, self.y)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct CombatStats {
    pub max_hp: f32,
    pub damage: f32,
    pub speed: f32,
    pub range: f32,
    pub targets: TargetPriority,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct SpeedBuff {
    pub multiplier: f32,
    /// Match-elapsed second at which the buff stops applying.
    pub expires_at: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UnitState {
    pub x: f32,
    pub y: f32,
    pub hp: f32,
    pub attacking: bool,
    pub speed_buff: Option<SpeedBuff>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Unit {
    pub uid: u64,
    pub unit_type: String,
    pub side: Side,
    pub owner: Option<String>,
    pub stats: CombatStats,
    pub state: UnitState,
}

impl Unit {
    pub fn is_alive(&self) -> bool {
        self.state.hp > 0.0
    }

    pub fn position(&self) -> (f32, f32) {
        (self.state.x, self.state.y)
    }

    pub fn speed_multiplier(&self, elapsed: f32) -> f32 {
        match self.state.speed_buff {
            Some(buff) if elapsed < buff.expires_at => buff.multiplier,
            _ => 1.0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Bridge {
    pub x: f32,
    pub y: f32,
    pub width: f32,
}

pub fn standard_bridges() -> Vec<Bridge> {
    LANE_XS
        .iter()
        .map(|&x| Bridge {
            x,
            y: RIVER_Y,
            width: BRIDGE_WIDTH,
        })
        .collect()
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SessionView {
    pub player_id: String,
    pub team: Option<Side>,
    pub elixir: f32,
    pub super_charge: f32,
    pub trophies: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MatchSnapshot {
    pub time_remaining: f32,
    pub towers: Vec<Tower>,
    pub units: Vec<Unit>,
    pub bridges: Vec<Bridge>,
    pub triggered_events: Vec<String>,
    pub speed_multiplier: f32,
    pub elixir_multiplier: f32,
    pub tower_regen: bool,
    pub outcome: Option<Outcome>,
    pub rematch_requests: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Register {
        player_id: String,
        trophies: u32,
    },
    Spawn {
        unit_type: String,
        x: f32,
        y: f32,
        player_id: String,
    },
    ActivateSuper {
        player_id: String,
        ability_id: String,
        x: f32,
        y: f32,
    },
    SendEmote {
        emote: String,
        player_id: String,
    },
    RequestRematch {
        player_id: String,
    },
    Leave {
        player_id: String,
    },
    Heartbeat {
        timestamp: u64,
    },
    Disconnect,

    Init {
        state: Option<MatchSnapshot>,
        player: SessionView,
    },
    Snapshot {
        state: MatchSnapshot,
        players: Vec<SessionView>,
    },
    Announcement {
        text: String,
        subtext: Option<String>,
        team: Side,
    },
    SuperEffect {
        kind: AbilityKind,
        radius: f32,
        x: f32,
        y: f32,
        team: Side,
        spell: bool,
    },
    Emote {
        emote: String,
        team: Side,
        player_id: String,
    },
    MatchResult {
        outcome: Outcome,
        trophy_change: i32,
        trophies: u32,
    },
    Disconnected {
        reason: String,
    },
}

impl Packet {
    pub fn announcement(text: &str, team: Side) -> Self {
        Packet::Announcement {
            text: text.to_string(),
            subtext: None,
            team,
        }
    }
}

pub fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    let dx = b.0 - a.0;
    let dy = b.1 - a.1;
    (dx * dx + dy * dy).sqrt()
}
