#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Hostile unit simulation: path following, damage mitigation and lifetime.
//!
//! Units live in one pool per archetype. A unit is `Moving` from the moment it
//! spawns until it either dies or reaches the end of its path; both terminal
//! transitions publish a [`UnitEvent`] and hand the unit back to its pool in
//! the same call, which invalidates every [`UnitId`] held for it.

mod mitigation;
mod path;

use std::collections::{BTreeMap, HashMap};

use glam::Vec2;
use thiserror::Error;
use tower_defense_core::{
    config::UnitArchetypeConfig, ArchetypeId, ArchetypeIndex, DamageType, PathId, PoolStats,
    SpawnError, UnitEvent, UnitId,
};
use tower_defense_pool::{Activation, Pool};

pub use mitigation::{Mitigation, MAX_ARMOR, MIN_MULTIPLIER};
pub use path::WaypointPath;

/// Upper bound on waypoint arrivals processed for one unit in one tick.
pub const MAX_WAYPOINT_ADVANCES: u32 = 32;

const MIN_ARRIVAL_TOLERANCE: f32 = 0.001;

/// Problems detected while registering archetypes and paths.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum UnitConfigError {
    /// An archetype with the same identifier is already registered.
    #[error("duplicate unit archetype '{0}'")]
    DuplicateArchetype(ArchetypeId),
    /// A path with the same identifier is already registered.
    #[error("duplicate path {0:?}")]
    DuplicatePath(PathId),
    /// The path has no waypoints.
    #[error("path {0:?} has no waypoints")]
    EmptyPath(PathId),
    /// The archetype catalog cannot address another entry.
    #[error("too many unit archetypes to register '{0}'")]
    TooManyArchetypes(ArchetypeId),
}

/// Resolved, immutable stat block of a unit archetype.
#[derive(Clone, Debug, PartialEq)]
pub struct UnitArchetype {
    id: ArchetypeId,
    max_health: u32,
    move_speed: f32,
    arrival_tolerance: f32,
    aim_offset: Vec2,
    damage_to_player: u32,
    mitigation: Mitigation,
}

impl UnitArchetype {
    /// Resolves a configuration record, clamping stats into supported ranges.
    #[must_use]
    pub fn from_config(config: &UnitArchetypeConfig) -> Self {
        let move_speed = if config.move_speed.is_finite() {
            config.move_speed.max(0.0)
        } else {
            0.0
        };
        Self {
            id: config.id.clone(),
            max_health: config.max_health.max(1),
            move_speed,
            arrival_tolerance: config.arrival_tolerance.max(MIN_ARRIVAL_TOLERANCE),
            aim_offset: config.aim_offset,
            damage_to_player: config.damage_to_player,
            mitigation: Mitigation::new(config.armor, &config.resistances),
        }
    }

    /// Identifier of the archetype.
    #[must_use]
    pub fn id(&self) -> &ArchetypeId {
        &self.id
    }

    /// Health units spawn with.
    #[must_use]
    pub fn max_health(&self) -> u32 {
        self.max_health
    }

    /// Travel speed in world units per second.
    #[must_use]
    pub fn move_speed(&self) -> f32 {
        self.move_speed
    }

    /// Lives removed when a unit of this archetype escapes.
    #[must_use]
    pub fn damage_to_player(&self) -> u32 {
        self.damage_to_player
    }

    /// Damage reduction profile.
    #[must_use]
    pub fn mitigation(&self) -> &Mitigation {
        &self.mitigation
    }
}

/// Lifecycle state of a unit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum UnitState {
    /// Following its path and accepting damage.
    #[default]
    Moving,
    /// Health reached zero.
    Dead,
    /// Arrived at the final waypoint of its path.
    ReachedGoal,
}

/// Outcome of advancing a single unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnitTick {
    /// The unit is still travelling.
    Moving,
    /// The unit left the simulation or the handle was already stale.
    Despawned,
}

/// Read-only view of an active unit.
#[derive(Clone, Debug, PartialEq)]
pub struct UnitSnapshot {
    /// Handle of the unit.
    pub id: UnitId,
    /// Archetype the unit was spawned from.
    pub archetype: ArchetypeId,
    /// Current position.
    pub position: Vec2,
    /// Remaining health.
    pub health: u32,
    /// Health the unit spawned with.
    pub max_health: u32,
    /// Fraction of the path covered, in `[0, 1]`.
    pub progress: f32,
}

#[derive(Debug, Default)]
struct Unit {
    path: Option<PathId>,
    position: Vec2,
    health: u32,
    previous_waypoint: usize,
    next_waypoint: usize,
    progress: f32,
    state: UnitState,
}

/// Owns every unit archetype, path and active unit.
#[derive(Debug, Default)]
pub struct UnitSimulation {
    archetypes: Vec<UnitArchetype>,
    lookup: HashMap<ArchetypeId, ArchetypeIndex>,
    pools: Vec<Pool<Unit>>,
    paths: BTreeMap<PathId, WaypointPath>,
    default_path: Option<PathId>,
    events: Vec<UnitEvent>,
}

impl UnitSimulation {
    /// Creates a simulation without archetypes or paths.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an archetype and pre-warms its pool.
    pub fn register_archetype(
        &mut self,
        config: &UnitArchetypeConfig,
    ) -> Result<ArchetypeIndex, UnitConfigError> {
        if self.lookup.contains_key(&config.id) {
            return Err(UnitConfigError::DuplicateArchetype(config.id.clone()));
        }

        let index = u32::try_from(self.archetypes.len())
            .map(ArchetypeIndex::new)
            .map_err(|_| UnitConfigError::TooManyArchetypes(config.id.clone()))?;
        self.archetypes.push(UnitArchetype::from_config(config));
        self.pools.push(Pool::with_capacity(config.pool_size));
        let _ = self.lookup.insert(config.id.clone(), index);
        Ok(index)
    }

    /// Registers a path. The first registered path becomes the default.
    pub fn register_path(&mut self, id: PathId, path: WaypointPath) -> Result<(), UnitConfigError> {
        if path.is_empty() {
            return Err(UnitConfigError::EmptyPath(id));
        }
        if self.paths.contains_key(&id) {
            return Err(UnitConfigError::DuplicatePath(id));
        }

        let _ = self.paths.insert(id, path);
        if self.default_path.is_none() {
            self.default_path = Some(id);
        }
        Ok(())
    }

    /// Path used by spawns that do not name one.
    #[must_use]
    pub fn default_path(&self) -> Option<PathId> {
        self.default_path
    }

    /// Looks up a registered path.
    #[must_use]
    pub fn path(&self, id: PathId) -> Option<&WaypointPath> {
        self.paths.get(&id)
    }

    /// Resolves an archetype identifier to its catalog index.
    #[must_use]
    pub fn archetype_index(&self, id: &ArchetypeId) -> Option<ArchetypeIndex> {
        self.lookup.get(id).copied()
    }

    /// Looks up a registered archetype.
    #[must_use]
    pub fn archetype(&self, index: ArchetypeIndex) -> Option<&UnitArchetype> {
        self.archetypes.get(index.as_usize())
    }

    /// Brings a unit into the simulation.
    ///
    /// The unit starts at `position`, or at the first waypoint of its path when
    /// no position is given, with full health and heading for the second
    /// waypoint.
    pub fn spawn(
        &mut self,
        archetype: &ArchetypeId,
        path: Option<PathId>,
        position: Option<Vec2>,
    ) -> Result<UnitId, SpawnError> {
        let index = self
            .archetype_index(archetype)
            .ok_or_else(|| SpawnError::UnknownArchetype(archetype.clone()))?;
        let path_id = path
            .or(self.default_path)
            .ok_or(SpawnError::UnknownPath(path))?;
        let route = self
            .paths
            .get(&path_id)
            .ok_or(SpawnError::UnknownPath(Some(path_id)))?;
        let start = route.waypoint(0).ok_or(SpawnError::EmptyPath(path_id))?;
        let (Some(stats), Some(pool)) = (
            self.archetypes.get(index.as_usize()),
            self.pools.get_mut(index.as_usize()),
        ) else {
            return Err(SpawnError::UnknownArchetype(archetype.clone()));
        };

        let key = pool
            .acquire(Activation::Active)
            .ok_or_else(|| SpawnError::PoolExhausted(archetype.clone()))?;
        let id = UnitId::new(index, key);
        let position = position.unwrap_or(start);
        if let Some(unit) = pool.get_mut(key) {
            let next_waypoint = usize::from(route.len() > 1);
            *unit = Unit {
                path: Some(path_id),
                position,
                health: stats.max_health,
                previous_waypoint: 0,
                next_waypoint,
                progress: route.progress(0, next_waypoint, position),
                state: UnitState::Moving,
            };
        }

        tracing::debug!(%archetype, ?id, ?path_id, "unit spawned");
        self.events.push(UnitEvent::Spawned {
            unit: id,
            archetype: archetype.clone(),
            position,
        });
        Ok(id)
    }

    /// Advances a unit along its path by `dt` seconds.
    pub fn tick(&mut self, id: UnitId, dt: f32) -> UnitTick {
        let Some(stats) = self.archetypes.get(id.archetype.as_usize()) else {
            return UnitTick::Despawned;
        };
        let Some(pool) = self.pools.get_mut(id.archetype.as_usize()) else {
            return UnitTick::Despawned;
        };
        let Some(unit) = pool.get_mut(id.key) else {
            return UnitTick::Despawned;
        };
        if unit.state != UnitState::Moving {
            return UnitTick::Despawned;
        }
        let Some(route) = unit.path.and_then(|path| self.paths.get(&path)) else {
            return UnitTick::Moving;
        };

        if !advance_along(unit, route, stats, dt) {
            return UnitTick::Moving;
        }

        unit.state = UnitState::ReachedGoal;
        unit.progress = 1.0;
        let _ = pool.release(id.key);
        tracing::debug!(?id, "unit reached goal");
        self.events.push(UnitEvent::ReachedGoal { unit: id });
        UnitTick::Despawned
    }

    /// Applies a hit to a moving unit and returns the damage that landed.
    ///
    /// Hits on dead, escaped or stale units and zero-point hits are ignored.
    pub fn apply_damage(&mut self, id: UnitId, amount: u32, damage_type: DamageType) -> Option<u32> {
        if amount == 0 {
            return None;
        }
        let stats = self.archetypes.get(id.archetype.as_usize())?;
        let pool = self.pools.get_mut(id.archetype.as_usize())?;
        let unit = pool.get_mut(id.key)?;
        if unit.state != UnitState::Moving {
            return None;
        }

        let landed = stats.mitigation.mitigate(amount, damage_type);
        let health = unit.health.saturating_sub(landed);
        if health == unit.health {
            return None;
        }
        unit.health = health;
        self.events.push(UnitEvent::HealthChanged {
            unit: id,
            current: health,
            max: stats.max_health,
        });

        if health == 0 {
            unit.state = UnitState::Dead;
            let _ = pool.release(id.key);
            tracing::debug!(?id, "unit died");
            self.events.push(UnitEvent::Died { unit: id });
        }
        Some(landed)
    }

    /// Forces a moving unit to die. Returns `false` when it was not moving.
    pub fn kill(&mut self, id: UnitId) -> bool {
        let Some(stats) = self.archetypes.get(id.archetype.as_usize()) else {
            return false;
        };
        let Some(pool) = self.pools.get_mut(id.archetype.as_usize()) else {
            return false;
        };
        let Some(unit) = pool.get_mut(id.key) else {
            return false;
        };
        if unit.state != UnitState::Moving {
            return false;
        }

        unit.health = 0;
        unit.state = UnitState::Dead;
        let _ = pool.release(id.key);
        self.events.push(UnitEvent::HealthChanged {
            unit: id,
            current: 0,
            max: stats.max_health,
        });
        self.events.push(UnitEvent::Died { unit: id });
        true
    }

    /// Reports whether the handle refers to a unit that is still moving.
    #[must_use]
    pub fn is_alive(&self, id: UnitId) -> bool {
        self.unit(id)
            .map_or(false, |unit| unit.state == UnitState::Moving && unit.health > 0)
    }

    /// Current position of an active unit.
    #[must_use]
    pub fn position(&self, id: UnitId) -> Option<Vec2> {
        self.unit(id).map(|unit| unit.position)
    }

    /// Point projectiles home on: position plus the archetype's aim offset.
    #[must_use]
    pub fn aim_point(&self, id: UnitId) -> Option<Vec2> {
        let offset = self.archetype(id.archetype)?.aim_offset;
        self.position(id).map(|position| position + offset)
    }

    /// Remaining health of an active unit.
    #[must_use]
    pub fn health(&self, id: UnitId) -> Option<u32> {
        self.unit(id).map(|unit| unit.health)
    }

    /// Path progress of an active unit.
    #[must_use]
    pub fn progress(&self, id: UnitId) -> Option<f32> {
        self.unit(id).map(|unit| unit.progress)
    }

    /// Snapshot of a single active unit.
    #[must_use]
    pub fn snapshot(&self, id: UnitId) -> Option<UnitSnapshot> {
        let stats = self.archetype(id.archetype)?;
        self.unit(id).map(|unit| snapshot_of(id, stats, unit))
    }

    /// Snapshots of every active unit, grouped by archetype.
    pub fn snapshots(&self) -> impl Iterator<Item = UnitSnapshot> + '_ {
        self.archetypes
            .iter()
            .zip(&self.pools)
            .enumerate()
            .flat_map(|(index, (stats, pool))| {
                let archetype = ArchetypeIndex::new(index as u32);
                pool.iter()
                    .map(move |(key, unit)| snapshot_of(UnitId::new(archetype, key), stats, unit))
            })
    }

    /// Collects every moving unit whose position lies within `radius` of `center`.
    pub fn units_within(&self, center: Vec2, radius: f32, out: &mut Vec<UnitId>) {
        let radius_sq = radius * radius;
        for (index, pool) in self.pools.iter().enumerate() {
            let archetype = ArchetypeIndex::new(index as u32);
            for (key, unit) in pool.iter() {
                if unit.state == UnitState::Moving
                    && unit.position.distance_squared(center) <= radius_sq
                {
                    out.push(UnitId::new(archetype, key));
                }
            }
        }
    }

    /// Number of units currently in the simulation.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.pools.iter().map(Pool::active_len).sum()
    }

    /// Occupancy of every archetype pool.
    #[must_use]
    pub fn pool_stats(&self) -> Vec<PoolStats> {
        self.archetypes
            .iter()
            .zip(&self.pools)
            .map(|(stats, pool)| PoolStats {
                archetype: stats.id.clone(),
                active: pool.active_len(),
                free: pool.free_len(),
            })
            .collect()
    }

    /// Moves buffered notifications into `out`.
    pub fn drain_events(&mut self, out: &mut Vec<UnitEvent>) {
        out.append(&mut self.events);
    }

    fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.pools.get(id.archetype.as_usize())?.get(id.key)
    }
}

fn snapshot_of(id: UnitId, stats: &UnitArchetype, unit: &Unit) -> UnitSnapshot {
    UnitSnapshot {
        id,
        archetype: stats.id.clone(),
        position: unit.position,
        health: unit.health,
        max_health: stats.max_health,
        progress: unit.progress,
    }
}

/// Spends the unit's travel budget for the frame. Returns `true` when the
/// final waypoint of a non-looping path was reached.
fn advance_along(unit: &mut Unit, route: &WaypointPath, stats: &UnitArchetype, dt: f32) -> bool {
    let mut remaining = stats.move_speed * dt.max(0.0);
    let mut advances = 0;

    while remaining > 0.0 && advances < MAX_WAYPOINT_ADVANCES {
        advances += 1;
        let Some(target) = route.waypoint(unit.next_waypoint) else {
            break;
        };
        let to_target = target - unit.position;
        let distance = to_target.length();

        if distance <= stats.arrival_tolerance {
            if route.is_goal(unit.next_waypoint) {
                return true;
            }
            unit.previous_waypoint = unit.next_waypoint;
            unit.next_waypoint = route.next_index(unit.next_waypoint);
            unit.progress = route.progress(unit.previous_waypoint, unit.next_waypoint, unit.position);
            continue;
        }

        let step = distance.min(remaining);
        unit.position += to_target / distance * step;
        remaining -= step;
        unit.progress = route.progress(unit.previous_waypoint, unit.next_waypoint, unit.position);

        if step < distance {
            break;
        }
    }
    false
}
