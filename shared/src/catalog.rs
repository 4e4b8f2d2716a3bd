//! Static unit catalog.
//!
//! Read-only stat table consumed by spawn validation, super abilities, the AI
//! driver and the arena's boss event. Speeds are in tiles (see `SPEED_SCALE`).

use crate::{CombatStats, TargetPriority};
use serde::{Deserialize, Serialize};

pub const BOSS_ID: &str = "the_constitution";

pub const ABILITY_DAMAGE: f32 = 300.0;
pub const ABILITY_HEAL: f32 = 400.0;
pub const RUSH_MULTIPLIER: f32 = 2.0;
pub const RUSH_DURATION: f32 = 3.0;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum AbilityKind {
    Damage,
    Heal,
    Rush,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuperAbility {
    pub kind: AbilityKind,
    pub radius: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Deployment {
    /// Placed as one or more persistent units.
    Troop,
    /// Resolved instantly as area damage; never becomes a unit.
    Spell { radius: f32 },
    /// Spawned only by arena events.
    Boss,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitStats {
    pub id: &'static str,
    pub name: &'static str,
    pub cost: u32,
    pub health: f32,
    pub damage: f32,
    pub speed: f32,
    pub range: f32,
    pub targets: TargetPriority,
    pub count: u32,
    pub deployment: Deployment,
    pub super_ability: Option<SuperAbility>,
}

impl UnitStats {
    const fn troop(
        id: &'static str,
        name: &'static str,
        cost: u32,
        health: f32,
        damage: f32,
        speed: f32,
        range: f32,
    ) -> Self {
        Self {
            id,
            name,
            cost,
            health,
            damage,
            speed,
            range,
            targets: TargetPriority::Any,
            count: 1,
            deployment: Deployment::Troop,
            super_ability: None,
        }
    }

    const fn buildings_only(mut self) -> Self {
        self.targets = TargetPriority::BuildingsOnly;
        self
    }

    const fn squad(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    const fn with_super(mut self, kind: AbilityKind, radius: f32) -> Self {
        self.super_ability = Some(SuperAbility { kind, radius });
        self
    }

    pub fn is_deployable(&self) -> bool {
        !matches!(self.deployment, Deployment::Boss)
    }

    pub fn combat_stats(&self) -> CombatStats {
        CombatStats {
            max_hp: self.health,
            damage: self.damage,
            speed: self.speed,
            range: self.range,
            targets: self.targets,
        }
    }
}

#[rustfmt::skip]
pub static CATALOG: &[UnitStats] = &[
    UnitStats::troop("george_washington", "George Washington", 3, 1224.0, 159.0, 1.2, 20.0),
    UnitStats::troop("sacagawea", "Sacagawea", 4, 599.0, 162.0, 1.0, 120.0),
    UnitStats::troop("einstein_advisor", "Einstein", 5, 598.0, 231.0, 1.0, 110.0),
    UnitStats::troop("deep_state_agent", "Deep State Agent", 3, 1000.0, 160.0, 1.2, 20.0),
    UnitStats::troop("eleanor_roosevelt", "Eleanor Roosevelt", 5, 1000.0, 225.0, 1.0, 100.0)
        .with_super(AbilityKind::Damage, 200.0),
    UnitStats::troop("abraham_lincoln", "Abraham Lincoln", 5, 4091.0, 254.0, 0.8, 20.0)
        .buildings_only(),
    UnitStats::troop("donald_trump", "Donald Trump", 4, 1361.0, 698.0, 1.8, 20.0),
    UnitStats::troop("obama", "Barack Obama", 4, 1152.0, 160.0, 1.5, 80.0),
    UnitStats::troop("jfk_space", "JFK", 4, 1696.0, 318.0, 2.5, 20.0).buildings_only(),
    UnitStats::troop("secret_service", "Secret Service", 3, 81.0, 81.0, 2.0, 20.0).squad(15),
    UnitStats {
        deployment: Deployment::Spell { radius: 100.0 },
        ..UnitStats::troop("executive_order", "Executive Order", 4, 0.0, 689.0, 0.0, 0.0)
    },
    UnitStats::troop("fdr", "FDR", 5, 3200.0, 150.0, 0.7, 20.0)
        .with_super(AbilityKind::Heal, 150.0),
    UnitStats::troop("truman", "Harry Truman", 4, 700.0, 180.0, 1.0, 130.0)
        .with_super(AbilityKind::Damage, 120.0),
    UnitStats::troop("grant", "Ulysses Grant", 4, 1400.0, 190.0, 1.1, 20.0)
        .with_super(AbilityKind::Rush, 180.0),
    UnitStats {
        deployment: Deployment::Boss,
        ..UnitStats::troop(BOSS_ID, "THE CONSTITUTION", 0, 12000.0, 800.0, 0.5, 40.0)
    },
];

pub fn lookup(id: &str) -> Option<&'static UnitStats> {
    CATALOG.iter().find(|stats| stats.id == id)
}

pub fn deployable() -> impl Iterator<Item = &'static UnitStats> {
    CATALOG.iter().filter(|stats| stats.is_deployable())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_are_unique() {
        let ids: HashSet<_> = CATALOG.iter().map(|s| s.id).collect();
        assert_eq!(ids.len(), CATALOG.len());
    }

    #[test]
    fn test_lookup() {
        let lincoln = lookup("abraham_lincoln").unwrap();
        assert_eq!(lincoln.cost, 5);
        assert_eq!(lincoln.targets, TargetPriority::BuildingsOnly);
        assert!(lookup("millard_fillmore").is_none());
    }

    #[test]
    fn test_boss_is_not_deployable() {
        let boss = lookup(BOSS_ID).unwrap();
        assert!(!boss.is_deployable());
        assert!(deployable().all(|s| s.id != BOSS_ID));
        assert_eq!(deployable().count(), CATALOG.len() - 1);
    }

    #[test]
    fn test_deployable_costs_fit_elixir_pool() {
        for stats in deployable() {
            assert!(stats.cost > 0, "{} has no cost", stats.id);
            assert!(stats.cost as f32 <= crate::MAX_ELIXIR);
        }
    }

    #[test]
    fn test_spell_and_squad_entries() {
        let order = lookup("executive_order").unwrap();
        assert_eq!(order.deployment, Deployment::Spell { radius: 100.0 });
        assert!(order.is_deployable());

        let guards = lookup("secret_service").unwrap();
        assert_eq!(guards.count, 15);
        assert_eq!(guards.deployment, Deployment::Troop);
    }

    #[test]
    fn test_super_abilities() {
        assert_eq!(
            lookup("grant").unwrap().super_ability,
            Some(SuperAbility {
                kind: AbilityKind::Rush,
                radius: 180.0
            })
        );
        assert!(lookup("obama").unwrap().super_ability.is_none());
    }
}
