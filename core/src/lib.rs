#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the tower defence simulation.
//!
//! This crate defines the message surface that connects adapters, the
//! authoritative world, and the per-frame systems. Adapters submit [`Command`]
//! values describing desired mutations, the world executes those commands via
//! its `apply` entry point, and then broadcasts [`Event`] values describing
//! what happened. Identifiers handed out here are non-owning: holding a
//! [`UnitId`] or [`ProjectileId`] never keeps the referenced object alive, and
//! every use must be re-validated against the owning system.

pub mod config;
mod signal;

use std::{fmt, time::Duration};

use glam::Vec2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use signal::{Signal, SubscriptionId};

/// Generational key identifying a slot inside a reuse pool.
///
/// The generation advances every time the slot is returned to its pool, so a
/// key captured before the release no longer resolves once the slot is reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PoolKey {
    index: u32,
    generation: u32,
}

impl PoolKey {
    /// Creates a key for the provided slot index and generation.
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Zero-based slot index within the owning pool.
    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Generation of the slot at the time the key was issued.
    #[must_use]
    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

/// Dense index of a resolved archetype inside its catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArchetypeIndex(u32);

impl ArchetypeIndex {
    /// Creates a new archetype index wrapper.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric index.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Index usable for slice access.
    #[must_use]
    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

/// Textual archetype identifier as written in level configuration.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArchetypeId(String);

impl ArchetypeId {
    /// Creates a new archetype identifier.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrows the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArchetypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ArchetypeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Weak handle to a hostile unit owned by the unit simulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId {
    /// Archetype whose pool owns the unit.
    pub archetype: ArchetypeIndex,
    /// Slot key inside that pool.
    pub key: PoolKey,
}

impl UnitId {
    /// Creates a unit handle from its owning archetype and pool key.
    #[must_use]
    pub const fn new(archetype: ArchetypeIndex, key: PoolKey) -> Self {
        Self { archetype, key }
    }
}

/// Weak handle to an in-flight projectile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectileId {
    /// Emplacement archetype whose projectile pool owns the projectile.
    pub archetype: ArchetypeIndex,
    /// Slot key inside that pool.
    pub key: PoolKey,
}

impl ProjectileId {
    /// Creates a projectile handle from its owning archetype and pool key.
    #[must_use]
    pub const fn new(archetype: ArchetypeIndex, key: PoolKey) -> Self {
        Self { archetype, key }
    }
}

/// Unique identifier assigned to a placed emplacement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EmplacementId(u32);

impl EmplacementId {
    /// Creates a new emplacement identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Identifier of a registered waypoint path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PathId(u32);

impl PathId {
    /// Creates a new path identifier.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Location of a grid tile expressed as signed column and row coordinates.
///
/// Coordinates are signed so that conversions from world space can describe
/// positions outside the grid; bounds are enforced by the grid itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridCoord {
    /// Zero-based column.
    pub x: i32,
    /// Zero-based row.
    pub y: i32,
}

impl GridCoord {
    /// Creates a new grid coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for GridCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Occupancy of the reuse pool owned by one archetype.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Archetype whose pool is described.
    pub archetype: ArchetypeId,
    /// Instances currently handed out.
    pub active: usize,
    /// Instances parked on the free-list.
    pub free: usize,
}

/// Kinds of damage delivered by emplacements.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DamageType {
    /// Kinetic damage reduced by armor.
    #[default]
    Physical,
    /// Arcane damage.
    Magic,
    /// Burning damage.
    Fire,
    /// Freezing damage.
    Frost,
    /// Toxic damage.
    Poison,
    /// Damage that bypasses every form of mitigation.
    True,
}

/// Policy an emplacement applies when choosing among candidates in range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetPriority {
    /// Prefer the unit furthest along its path.
    #[default]
    First,
    /// Prefer the unit least far along its path.
    Last,
    /// Prefer the unit with the most remaining health.
    Strongest,
}

/// Commands that express all permissible world mutations.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Advances the simulation clock by the provided delta time.
    Tick {
        /// Duration of wall time that elapsed since the previous tick.
        dt: Duration,
    },
    /// Requests that a unit of the given archetype enter the simulation.
    SpawnUnit {
        /// Archetype of the unit to spawn.
        archetype: ArchetypeId,
        /// Path to follow; the level's default path when absent.
        path: Option<PathId>,
        /// Spawn position; the path's first waypoint when absent.
        position: Option<Vec2>,
    },
    /// Requests placement of an emplacement on a grid tile.
    PlaceEmplacement {
        /// Archetype of the emplacement to build.
        archetype: ArchetypeId,
        /// Tile that should host the emplacement.
        coord: GridCoord,
    },
    /// Requests removal of an existing emplacement.
    RemoveEmplacement {
        /// Emplacement targeted for removal.
        emplacement: EmplacementId,
    },
    /// Requests that the next upgrade be applied to an emplacement.
    UpgradeEmplacement {
        /// Emplacement targeted for the upgrade.
        emplacement: EmplacementId,
    },
    /// Starts processing the loaded wave configuration.
    StartWaves,
    /// Stops wave progression and discards pending waves.
    StopWaves,
    /// Changes the simulation time scale.
    SetGameSpeed {
        /// Requested multiplier applied to every tick.
        speed: f32,
    },
    /// Pauses or resumes simulation ticks.
    SetPaused {
        /// Whether ticks should be suspended.
        paused: bool,
    },
}

/// Notifications raised by the unit simulation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum UnitEvent {
    /// A unit entered the simulation.
    Spawned {
        /// Handle of the spawned unit.
        unit: UnitId,
        /// Archetype the unit was spawned from.
        archetype: ArchetypeId,
        /// Position the unit spawned at.
        position: Vec2,
    },
    /// A unit's health changed.
    HealthChanged {
        /// Handle of the affected unit.
        unit: UnitId,
        /// Health remaining after the change.
        current: u32,
        /// Maximum health of the unit.
        max: u32,
    },
    /// A unit's health reached zero.
    Died {
        /// Handle of the unit that died.
        unit: UnitId,
    },
    /// A unit reached the final waypoint of its path.
    ReachedGoal {
        /// Handle of the unit that escaped.
        unit: UnitId,
    },
}

/// Notifications raised by emplacements and their projectiles.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum EmplacementEvent {
    /// An emplacement was built.
    Placed {
        /// Identifier assigned to the emplacement.
        emplacement: EmplacementId,
        /// Archetype of the emplacement.
        archetype: ArchetypeId,
        /// Tile the emplacement occupies.
        coord: GridCoord,
    },
    /// An emplacement was removed and its tile released.
    Removed {
        /// Identifier of the removed emplacement.
        emplacement: EmplacementId,
        /// Tile the emplacement occupied.
        coord: GridCoord,
    },
    /// An emplacement received an upgrade.
    Upgraded {
        /// Identifier of the upgraded emplacement.
        emplacement: EmplacementId,
        /// Number of upgrades applied so far.
        level: u32,
    },
    /// An emplacement locked onto a new target.
    TargetAcquired {
        /// Emplacement that acquired the target.
        emplacement: EmplacementId,
        /// Unit that became the target.
        unit: UnitId,
    },
    /// An emplacement dropped its target.
    TargetLost {
        /// Emplacement that lost the target.
        emplacement: EmplacementId,
        /// Unit that was previously targeted.
        unit: UnitId,
    },
    /// An emplacement launched a projectile.
    ShotFired {
        /// Emplacement that fired.
        emplacement: EmplacementId,
        /// Projectile that was launched.
        projectile: ProjectileId,
        /// Unit the projectile is homing on.
        target: UnitId,
    },
}

/// Notifications raised by the wave scheduler.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum WaveEvent {
    /// A wave finished its start delay and began spawning.
    Started {
        /// Zero-based index of the wave within the level.
        wave: u32,
    },
    /// Every spawn group of a wave has been processed.
    Completed {
        /// Zero-based index of the wave within the level.
        wave: u32,
    },
    /// The last wave was dequeued; no further spawns will be issued.
    AllSpawnsIssued,
    /// Every spawn was issued and every spawned unit has despawned.
    LevelCompleted,
}

/// Events broadcast by the world after processing commands.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Event {
    /// Indicates that the simulation clock advanced.
    TimeAdvanced {
        /// Scaled duration of simulated time that elapsed in the tick.
        dt: Duration,
    },
    /// Unit simulation notification.
    Unit(UnitEvent),
    /// Emplacement notification.
    Emplacement(EmplacementEvent),
    /// Wave scheduler notification.
    Wave(WaveEvent),
    /// Reports that a spawn request was rejected.
    SpawnRejected {
        /// Archetype requested for spawning.
        archetype: ArchetypeId,
        /// Specific reason the spawn failed.
        reason: SpawnError,
    },
    /// Reports that an emplacement placement request was rejected.
    PlacementRejected {
        /// Archetype requested for placement.
        archetype: ArchetypeId,
        /// Tile provided in the placement request.
        coord: GridCoord,
        /// Specific reason the placement failed.
        reason: PlacementError,
    },
    /// Reports that an emplacement removal request was rejected.
    RemovalRejected {
        /// Emplacement targeted for removal.
        emplacement: EmplacementId,
        /// Specific reason the removal failed.
        reason: RemovalError,
    },
    /// Reports that an upgrade request was rejected.
    UpgradeRejected {
        /// Emplacement targeted for the upgrade.
        emplacement: EmplacementId,
        /// Specific reason the upgrade failed.
        reason: UpgradeError,
    },
    /// Reports that waves could not be started.
    StartWavesRejected {
        /// Specific reason the start failed.
        reason: StartWavesError,
    },
    /// Announces a new simulation time scale.
    GameSpeedChanged {
        /// Multiplier now applied to every tick.
        speed: f32,
    },
    /// Announces that the simulation was paused or resumed.
    PauseChanged {
        /// Whether ticks are now suspended.
        paused: bool,
    },
    /// Reports that escaping units cost the player lives.
    LivesChanged {
        /// Lives remaining after the loss.
        lives: u32,
        /// Lives removed by the escape.
        lost: u32,
    },
    /// The player ran out of lives; the simulation stops advancing.
    Defeated,
}

/// Reasons a unit spawn request may be rejected.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Error, Serialize)]
pub enum SpawnError {
    /// No unit archetype with the provided identifier is loaded.
    #[error("unknown unit archetype '{0}'")]
    UnknownArchetype(ArchetypeId),
    /// No path is registered under the provided identifier.
    #[error("unknown path {0:?}")]
    UnknownPath(Option<PathId>),
    /// The path has no waypoints to follow.
    #[error("path {0:?} has no waypoints")]
    EmptyPath(PathId),
    /// The archetype's pool cannot address another unit.
    #[error("unit pool for '{0}' is exhausted")]
    PoolExhausted(ArchetypeId),
}

/// Reasons an emplacement placement request may be rejected.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Error, Serialize)]
pub enum PlacementError {
    /// No emplacement archetype with the provided identifier is loaded.
    #[error("unknown emplacement archetype '{0}'")]
    UnknownArchetype(ArchetypeId),
    /// The requested tile lies outside the grid.
    #[error("tile is outside the grid")]
    OutOfBounds,
    /// The requested tile does not allow construction.
    #[error("tile is not buildable")]
    NotBuildable,
    /// The requested tile already hosts a structure.
    #[error("tile is occupied")]
    Occupied,
}

/// Reasons an emplacement removal request may be rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Error, Serialize)]
pub enum RemovalError {
    /// No emplacement with the provided identifier exists.
    #[error("emplacement does not exist")]
    MissingEmplacement,
}

/// Reasons an emplacement upgrade request may be rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Error, Serialize)]
pub enum UpgradeError {
    /// No emplacement with the provided identifier exists.
    #[error("emplacement does not exist")]
    MissingEmplacement,
    /// Every upgrade listed by the archetype has already been applied.
    #[error("emplacement is fully upgraded")]
    FullyUpgraded,
}

/// Reasons a request to start waves may be rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Error, Serialize)]
pub enum StartWavesError {
    /// No wave configuration has been loaded.
    #[error("no wave configuration is loaded")]
    NotConfigured,
    /// Waves are already being processed.
    #[error("waves are already running")]
    AlreadyRunning,
}
