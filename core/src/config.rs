//! Level configuration records.
//!
//! These records mirror the authored level documents. They are read-only once
//! loaded; systems resolve them into their own runtime archetypes and clamp
//! values into the ranges they support.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::{ArchetypeId, DamageType, GridCoord, TargetPriority};

/// Lives a level starts with when the document does not say otherwise.
pub const DEFAULT_STARTING_LIVES: u32 = 20;

/// Complete description of a playable level.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelConfig {
    /// Identifier of the level.
    pub id: String,
    /// Lives the player starts with.
    pub starting_lives: u32,
    /// Layout of the buildable grid.
    pub grid: GridConfig,
    /// Waypoint paths units may follow. The first path is the default.
    pub paths: Vec<PathConfig>,
    /// Unit archetypes available to spawns.
    pub units: Vec<UnitArchetypeConfig>,
    /// Emplacement archetypes available to placement.
    pub emplacements: Vec<EmplacementArchetypeConfig>,
    /// Waves processed in order once waves start.
    pub waves: Vec<WaveConfig>,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            starting_lives: DEFAULT_STARTING_LIVES,
            grid: GridConfig::default(),
            paths: Vec::new(),
            units: Vec::new(),
            emplacements: Vec::new(),
            waves: Vec::new(),
        }
    }
}

/// Dimensions and initial tile state of the placement grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Number of tile columns.
    pub width: u32,
    /// Number of tile rows.
    pub height: u32,
    /// Side length of a tile in world units.
    pub cell_size: f32,
    /// World position of the grid's lower-left corner.
    pub origin: Vec2,
    /// Whether tiles start out buildable.
    pub buildable_by_default: bool,
    /// Tiles that never allow construction.
    pub blocked: Vec<GridCoord>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            width: 10,
            height: 10,
            cell_size: 1.0,
            origin: Vec2::ZERO,
            buildable_by_default: true,
            blocked: Vec::new(),
        }
    }
}

/// Ordered waypoint sequence.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Identifier referenced by spawn groups.
    pub id: String,
    /// Waypoints in travel order.
    pub waypoints: Vec<Vec2>,
    /// Whether travel wraps from the last waypoint back to the first.
    pub looping: bool,
}

/// Damage reduction against a single damage type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResistanceConfig {
    /// Damage type the reduction applies to.
    pub damage_type: DamageType,
    /// Fraction of damage removed, in `[0, 1]`.
    pub reduction: f32,
}

/// Stat block shared by every unit of an archetype.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitArchetypeConfig {
    /// Identifier referenced by spawn requests.
    pub id: ArchetypeId,
    /// Health a unit spawns with.
    pub max_health: u32,
    /// Travel speed in world units per second.
    pub move_speed: f32,
    /// Fraction of non-true damage removed, in `[0, 0.95]`.
    pub armor: f32,
    /// Additional per-type reductions.
    pub resistances: Vec<ResistanceConfig>,
    /// Distance at which a waypoint counts as reached.
    pub arrival_tolerance: f32,
    /// Offset from the unit position that projectiles home on.
    pub aim_offset: Vec2,
    /// Lives removed when a unit reaches the end of its path.
    pub damage_to_player: u32,
    /// Number of instances created up front.
    pub pool_size: usize,
}

impl Default for UnitArchetypeConfig {
    fn default() -> Self {
        Self {
            id: ArchetypeId::default(),
            max_health: 10,
            move_speed: 1.5,
            armor: 0.0,
            resistances: Vec::new(),
            arrival_tolerance: 0.1,
            aim_offset: Vec2::ZERO,
            damage_to_player: 1,
            pool_size: 0,
        }
    }
}

/// Projectile template launched by an emplacement archetype.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectileConfig {
    /// Travel speed in world units per second.
    pub speed: f32,
    /// Seconds a projectile may fly before it expires.
    pub lifetime: f32,
    /// Number of projectiles created up front.
    pub pool_size: usize,
}

impl Default for ProjectileConfig {
    fn default() -> Self {
        Self {
            speed: 10.0,
            lifetime: 3.0,
            pool_size: 8,
        }
    }
}

/// Multipliers applied by a single emplacement upgrade.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpgradeConfig {
    /// Identifier of the upgrade.
    pub id: String,
    /// Multiplier applied to damage.
    pub damage_modifier: f32,
    /// Multiplier applied to range.
    pub range_modifier: f32,
    /// Multiplier applied to fire rate.
    pub fire_rate_modifier: f32,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            damage_modifier: 1.0,
            range_modifier: 1.0,
            fire_rate_modifier: 1.0,
        }
    }
}

/// Stat block shared by every emplacement of an archetype.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmplacementArchetypeConfig {
    /// Identifier referenced by placement requests.
    pub id: ArchetypeId,
    /// Targeting radius in world units.
    pub range: f32,
    /// Shots per second.
    pub fire_rate: f32,
    /// Nominal damage per projectile.
    pub damage: u32,
    /// Damage type delivered by projectiles.
    pub damage_type: DamageType,
    /// Target selection policy.
    pub priority: TargetPriority,
    /// Projectile template; archetypes without one are rejected at load.
    pub projectile: Option<ProjectileConfig>,
    /// Seconds between target re-evaluations.
    pub retarget_interval: f32,
    /// Offset from the emplacement position projectiles launch from.
    pub fire_offset: Vec2,
    /// Upgrades applied in order.
    pub upgrades: Vec<UpgradeConfig>,
}

impl Default for EmplacementArchetypeConfig {
    fn default() -> Self {
        Self {
            id: ArchetypeId::default(),
            range: 5.0,
            fire_rate: 1.0,
            damage: 1,
            damage_type: DamageType::Physical,
            priority: TargetPriority::First,
            projectile: None,
            retarget_interval: 0.1,
            fire_offset: Vec2::ZERO,
            upgrades: Vec::new(),
        }
    }
}

/// A single wave of spawn groups.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveConfig {
    /// Identifier of the wave.
    pub id: String,
    /// Seconds to wait before the wave starts.
    pub start_delay: f32,
    /// Groups spawned in order.
    pub groups: Vec<SpawnGroupConfig>,
}

/// Homogeneous batch of spawns within a wave.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnGroupConfig {
    /// Unit archetype to spawn.
    pub archetype: ArchetypeId,
    /// Number of units to spawn.
    pub count: u32,
    /// Seconds waited after each spawn.
    pub interval: f32,
    /// Path to follow; the level's first path when absent.
    pub path: Option<String>,
}

impl Default for SpawnGroupConfig {
    fn default() -> Self {
        Self {
            archetype: ArchetypeId::default(),
            count: 1,
            interval: 1.0,
            path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn omitted_fields_fall_back_to_defaults() {
        let level: LevelConfig = toml::from_str(
            r#"
            id = "meadow"

            [[units]]
            id = "grunt"
            armor = 0.25

            [[emplacements]]
            id = "arrow"
            priority = "strongest"
            projectile = {}

            [[waves]]
            [[waves.groups]]
            archetype = "grunt"
            count = 3
            "#,
        )
        .expect("level parses");

        assert_eq!(level.grid, GridConfig::default());
        assert_eq!(level.starting_lives, DEFAULT_STARTING_LIVES);
        let grunt = &level.units[0];
        assert_eq!(grunt.max_health, 10);
        assert_eq!(grunt.damage_to_player, 1);
        assert!((grunt.move_speed - 1.5).abs() < f32::EPSILON);
        assert!((grunt.armor - 0.25).abs() < f32::EPSILON);

        let arrow = &level.emplacements[0];
        assert_eq!(arrow.priority, TargetPriority::Strongest);
        assert_eq!(arrow.projectile, Some(ProjectileConfig::default()));

        let group = &level.waves[0].groups[0];
        assert_eq!(group.count, 3);
        assert!((group.interval - 1.0).abs() < f32::EPSILON);
        assert_eq!(group.path, None);
    }

    #[test]
    fn emplacement_without_projectile_parses_as_missing_template() {
        let level: LevelConfig = toml::from_str(
            r#"
            [[emplacements]]
            id = "broken"
            "#,
        )
        .expect("level parses");

        assert_eq!(level.emplacements[0].projectile, None);
    }
}
