#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Defensive emplacements: target acquisition, firing cadence and projectiles.
//!
//! Emplacements hold only weak [`UnitId`] references to their targets and
//! re-validate them every frame. Projectiles are pooled per emplacement
//! archetype and are returned to their pool in the same frame their target
//! becomes invalid, their lifetime runs out, or they strike.

mod projectile;
mod targeting;

use std::collections::{BTreeMap, HashMap};

use glam::Vec2;
use thiserror::Error;
use tower_defense_core::{
    config::{EmplacementArchetypeConfig, ProjectileConfig, UpgradeConfig},
    ArchetypeId, ArchetypeIndex, DamageType, EmplacementEvent, EmplacementId, GridCoord,
    PlacementError, PoolStats, ProjectileId, RemovalError, TargetPriority, UnitId, UpgradeError,
};
use tower_defense_grid::SpatialGrid;
use tower_defense_pool::{Activation, Pool};
use tower_defense_units::UnitSimulation;

use projectile::{Flight, Projectile};

pub use projectile::ProjectileTick;
pub use targeting::{select_target, Candidate};

/// Shortest supported interval between target re-evaluations, in seconds.
pub const MIN_RETARGET_INTERVAL: f32 = 0.02;

/// Read access to the units emplacements shoot at.
pub trait UnitQuery {
    /// Collects units whose position lies within `radius` of `center`.
    fn units_within(&self, center: Vec2, radius: f32, out: &mut Vec<UnitId>);
    /// Reports whether the unit is still alive and active.
    fn is_alive(&self, unit: UnitId) -> bool;
    /// Current position of the unit.
    fn position(&self, unit: UnitId) -> Option<Vec2>;
    /// Point projectiles home on.
    fn aim_point(&self, unit: UnitId) -> Option<Vec2>;
    /// Fraction of its path the unit has covered.
    fn progress(&self, unit: UnitId) -> Option<f32>;
    /// Remaining health of the unit.
    fn health(&self, unit: UnitId) -> Option<u32>;
}

/// Units that projectiles can damage.
pub trait DamageReceiver: UnitQuery {
    /// Applies a hit and returns the damage that landed.
    fn receive_damage(&mut self, unit: UnitId, amount: u32, damage_type: DamageType)
        -> Option<u32>;
}

impl UnitQuery for UnitSimulation {
    fn units_within(&self, center: Vec2, radius: f32, out: &mut Vec<UnitId>) {
        UnitSimulation::units_within(self, center, radius, out);
    }

    fn is_alive(&self, unit: UnitId) -> bool {
        UnitSimulation::is_alive(self, unit)
    }

    fn position(&self, unit: UnitId) -> Option<Vec2> {
        UnitSimulation::position(self, unit)
    }

    fn aim_point(&self, unit: UnitId) -> Option<Vec2> {
        UnitSimulation::aim_point(self, unit)
    }

    fn progress(&self, unit: UnitId) -> Option<f32> {
        UnitSimulation::progress(self, unit)
    }

    fn health(&self, unit: UnitId) -> Option<u32> {
        UnitSimulation::health(self, unit)
    }
}

impl DamageReceiver for UnitSimulation {
    fn receive_damage(
        &mut self,
        unit: UnitId,
        amount: u32,
        damage_type: DamageType,
    ) -> Option<u32> {
        self.apply_damage(unit, amount, damage_type)
    }
}

/// Problems detected while registering emplacement archetypes.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EmplacementConfigError {
    /// An archetype with the same identifier is already registered.
    #[error("duplicate emplacement archetype '{0}'")]
    DuplicateArchetype(ArchetypeId),
    /// The archetype does not describe the projectile it launches.
    #[error("emplacement archetype '{0}' has no projectile template")]
    MissingProjectile(ArchetypeId),
    /// The archetype catalog cannot address another entry.
    #[error("too many emplacement archetypes to register '{0}'")]
    TooManyArchetypes(ArchetypeId),
}

/// Resolved, immutable stat block of an emplacement archetype.
#[derive(Clone, Debug, PartialEq)]
pub struct EmplacementArchetype {
    id: ArchetypeId,
    range: f32,
    fire_rate: f32,
    damage: u32,
    damage_type: DamageType,
    priority: TargetPriority,
    projectile: ProjectileConfig,
    retarget_interval: f32,
    fire_offset: Vec2,
    upgrades: Vec<UpgradeConfig>,
}

impl EmplacementArchetype {
    /// Resolves a configuration record, clamping stats into supported ranges.
    pub fn from_config(
        config: &EmplacementArchetypeConfig,
    ) -> Result<Self, EmplacementConfigError> {
        let projectile = config
            .projectile
            .ok_or_else(|| EmplacementConfigError::MissingProjectile(config.id.clone()))?;

        Ok(Self {
            id: config.id.clone(),
            range: non_negative(config.range),
            fire_rate: config.fire_rate,
            damage: config.damage,
            damage_type: config.damage_type,
            priority: config.priority,
            projectile: ProjectileConfig {
                speed: non_negative(projectile.speed),
                lifetime: non_negative(projectile.lifetime),
                pool_size: projectile.pool_size,
            },
            retarget_interval: config.retarget_interval.max(MIN_RETARGET_INTERVAL),
            fire_offset: config.fire_offset,
            upgrades: config.upgrades.clone(),
        })
    }

    /// Identifier of the archetype.
    #[must_use]
    pub fn id(&self) -> &ArchetypeId {
        &self.id
    }

    /// Target selection policy.
    #[must_use]
    pub fn priority(&self) -> TargetPriority {
        self.priority
    }

    /// Seconds between target re-evaluations.
    #[must_use]
    pub fn retarget_interval(&self) -> f32 {
        self.retarget_interval
    }

    /// Number of upgrades the archetype offers.
    #[must_use]
    pub fn upgrade_count(&self) -> usize {
        self.upgrades.len()
    }
}

/// Outcome of advancing a single emplacement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmplacementTick {
    /// The emplacement did not fire this frame.
    Idle,
    /// The emplacement launched a projectile that now needs ticking.
    Fired(ProjectileId),
    /// The emplacement no longer exists.
    Missing,
}

/// Read-only view of a placed emplacement.
#[derive(Clone, Debug, PartialEq)]
pub struct EmplacementSnapshot {
    /// Identifier of the emplacement.
    pub id: EmplacementId,
    /// Archetype the emplacement was built from.
    pub archetype: ArchetypeId,
    /// Tile the emplacement occupies.
    pub coord: GridCoord,
    /// World position of the tile centre.
    pub position: Vec2,
    /// Currently held target.
    pub target: Option<UnitId>,
    /// Seconds until the next shot may be fired.
    pub cooldown: f32,
    /// Number of upgrades applied.
    pub level: u32,
    /// Damage per projectile after upgrades.
    pub damage: u32,
    /// Targeting radius after upgrades.
    pub range: f32,
    /// Shots per second after upgrades.
    pub fire_rate: f32,
}

#[derive(Clone, Debug)]
struct Emplacement {
    archetype: ArchetypeIndex,
    coord: GridCoord,
    position: Vec2,
    target: Option<UnitId>,
    cooldown: f32,
    retarget_timer: f32,
    level: u32,
    damage: u32,
    range: f32,
    fire_rate: f32,
    damage_multiplier: f32,
    range_multiplier: f32,
    fire_rate_multiplier: f32,
}

impl Emplacement {
    fn holds_valid<Q>(&self, units: &Q, unit: UnitId) -> bool
    where
        Q: UnitQuery + ?Sized,
    {
        units.is_alive(unit)
            && units.position(unit).map_or(false, |position| {
                position.distance_squared(self.position) <= self.range * self.range
            })
    }

    fn release_target(&mut self, id: EmplacementId, events: &mut Vec<EmplacementEvent>) {
        if let Some(unit) = self.target.take() {
            events.push(EmplacementEvent::TargetLost {
                emplacement: id,
                unit,
            });
        }
    }

    fn acquire_target(&mut self, id: EmplacementId, unit: UnitId, events: &mut Vec<EmplacementEvent>) {
        if self.target == Some(unit) {
            return;
        }
        self.release_target(id, events);
        self.target = Some(unit);
        events.push(EmplacementEvent::TargetAcquired {
            emplacement: id,
            unit,
        });
    }
}

/// Owns emplacement archetypes, placed emplacements and their projectiles.
#[derive(Debug, Default)]
pub struct Emplacements {
    archetypes: Vec<EmplacementArchetype>,
    lookup: HashMap<ArchetypeId, ArchetypeIndex>,
    projectiles: Vec<Pool<Projectile>>,
    placed: BTreeMap<EmplacementId, Emplacement>,
    next_id: u32,
    scratch: Vec<UnitId>,
    events: Vec<EmplacementEvent>,
}

impl Emplacements {
    /// Creates an empty emplacement system.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an archetype and pre-warms its projectile pool.
    pub fn register_archetype(
        &mut self,
        config: &EmplacementArchetypeConfig,
    ) -> Result<ArchetypeIndex, EmplacementConfigError> {
        if self.lookup.contains_key(&config.id) {
            return Err(EmplacementConfigError::DuplicateArchetype(config.id.clone()));
        }
        let archetype = EmplacementArchetype::from_config(config)?;

        let index = u32::try_from(self.archetypes.len())
            .map(ArchetypeIndex::new)
            .map_err(|_| EmplacementConfigError::TooManyArchetypes(config.id.clone()))?;
        self.projectiles
            .push(Pool::with_capacity(archetype.projectile.pool_size));
        self.archetypes.push(archetype);
        let _ = self.lookup.insert(config.id.clone(), index);
        Ok(index)
    }

    /// Resolves an archetype identifier to its catalog index.
    #[must_use]
    pub fn archetype_index(&self, id: &ArchetypeId) -> Option<ArchetypeIndex> {
        self.lookup.get(id).copied()
    }

    /// Looks up a registered archetype.
    #[must_use]
    pub fn archetype(&self, index: ArchetypeIndex) -> Option<&EmplacementArchetype> {
        self.archetypes.get(index.as_usize())
    }

    /// Reserves the tile and builds an emplacement on it.
    ///
    /// The grid is left untouched when the request fails.
    pub fn place(
        &mut self,
        grid: &mut SpatialGrid,
        archetype: &ArchetypeId,
        coord: GridCoord,
    ) -> Result<EmplacementId, PlacementError> {
        let index = self
            .archetype_index(archetype)
            .ok_or_else(|| PlacementError::UnknownArchetype(archetype.clone()))?;
        let stats = self
            .archetypes
            .get(index.as_usize())
            .ok_or_else(|| PlacementError::UnknownArchetype(archetype.clone()))?;
        grid.try_reserve(coord)?;

        let id = EmplacementId::new(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        let _ = self.placed.insert(
            id,
            Emplacement {
                archetype: index,
                coord,
                position: grid.grid_to_world(coord),
                target: None,
                cooldown: 0.0,
                retarget_timer: 0.0,
                level: 0,
                damage: stats.damage,
                range: stats.range,
                fire_rate: stats.fire_rate,
                damage_multiplier: 1.0,
                range_multiplier: 1.0,
                fire_rate_multiplier: 1.0,
            },
        );

        tracing::debug!(%archetype, %coord, ?id, "emplacement placed");
        self.events.push(EmplacementEvent::Placed {
            emplacement: id,
            archetype: archetype.clone(),
            coord,
        });
        Ok(id)
    }

    /// Tears down an emplacement, releasing its tile and its target.
    pub fn remove(
        &mut self,
        grid: &mut SpatialGrid,
        id: EmplacementId,
    ) -> Result<GridCoord, RemovalError> {
        let mut emplacement = self
            .placed
            .remove(&id)
            .ok_or(RemovalError::MissingEmplacement)?;

        emplacement.release_target(id, &mut self.events);
        let _ = grid.release(emplacement.coord);
        tracing::debug!(?id, coord = %emplacement.coord, "emplacement removed");
        self.events.push(EmplacementEvent::Removed {
            emplacement: id,
            coord: emplacement.coord,
        });
        Ok(emplacement.coord)
    }

    /// Applies the archetype's next upgrade and returns the new level.
    pub fn upgrade(&mut self, id: EmplacementId) -> Result<u32, UpgradeError> {
        let emplacement = self
            .placed
            .get_mut(&id)
            .ok_or(UpgradeError::MissingEmplacement)?;
        let stats = self
            .archetypes
            .get(emplacement.archetype.as_usize())
            .ok_or(UpgradeError::MissingEmplacement)?;
        let upgrade = stats
            .upgrades
            .get(emplacement.level as usize)
            .ok_or(UpgradeError::FullyUpgraded)?;

        emplacement.damage_multiplier *= upgrade.damage_modifier;
        emplacement.range_multiplier *= upgrade.range_modifier;
        emplacement.fire_rate_multiplier *= upgrade.fire_rate_modifier;
        emplacement.damage =
            non_negative(stats.damage as f32 * emplacement.damage_multiplier).round() as u32;
        emplacement.range = non_negative(stats.range * emplacement.range_multiplier);
        emplacement.fire_rate = stats.fire_rate * emplacement.fire_rate_multiplier;
        emplacement.level += 1;

        tracing::debug!(?id, level = emplacement.level, upgrade = %upgrade.id, "emplacement upgraded");
        self.events.push(EmplacementEvent::Upgraded {
            emplacement: id,
            level: emplacement.level,
        });
        Ok(emplacement.level)
    }

    /// Runs one frame of targeting and firing for an emplacement.
    pub fn tick<Q>(&mut self, id: EmplacementId, dt: f32, units: &Q) -> EmplacementTick
    where
        Q: UnitQuery + ?Sized,
    {
        let Some(emplacement) = self.placed.get_mut(&id) else {
            return EmplacementTick::Missing;
        };
        let Some(stats) = self.archetypes.get(emplacement.archetype.as_usize()) else {
            return EmplacementTick::Missing;
        };

        emplacement.retarget_timer -= dt;
        if emplacement.retarget_timer <= 0.0 {
            emplacement.retarget_timer = stats.retarget_interval;
            self.scratch.clear();
            units.units_within(emplacement.position, emplacement.range, &mut self.scratch);

            let incumbent = emplacement
                .target
                .filter(|unit| emplacement.holds_valid(units, *unit))
                .and_then(|unit| candidate(units, unit));
            let best = select_target(
                stats.priority,
                incumbent,
                self.scratch
                    .iter()
                    .copied()
                    .filter(|unit| emplacement.holds_valid(units, *unit))
                    .filter_map(|unit| candidate(units, unit)),
            );

            match best {
                Some(best) => emplacement.acquire_target(id, best.unit, &mut self.events),
                None => emplacement.release_target(id, &mut self.events),
            }
        }

        let Some(target) = emplacement.target else {
            return EmplacementTick::Idle;
        };
        if !emplacement.holds_valid(units, target) {
            emplacement.release_target(id, &mut self.events);
            return EmplacementTick::Idle;
        }

        emplacement.cooldown = (emplacement.cooldown - dt).max(0.0);
        if emplacement.cooldown > 0.0 {
            return EmplacementTick::Idle;
        }

        let Some(pool) = self.projectiles.get_mut(emplacement.archetype.as_usize()) else {
            return EmplacementTick::Idle;
        };
        let Some(key) = pool.acquire(Activation::Active) else {
            tracing::warn!(?id, "projectile pool exhausted, holding fire");
            return EmplacementTick::Idle;
        };
        if let Some(projectile) = pool.get_mut(key) {
            *projectile = Projectile {
                target: Some(target),
                damage: emplacement.damage,
                damage_type: stats.damage_type,
                speed: stats.projectile.speed,
                remaining: stats.projectile.lifetime,
                position: emplacement.position + stats.fire_offset,
            };
        }
        emplacement.cooldown = if emplacement.fire_rate > 0.0 {
            1.0 / emplacement.fire_rate
        } else {
            0.0
        };

        let projectile = ProjectileId::new(emplacement.archetype, key);
        tracing::trace!(?id, ?projectile, ?target, "shot fired");
        self.events.push(EmplacementEvent::ShotFired {
            emplacement: id,
            projectile,
            target,
        });
        EmplacementTick::Fired(projectile)
    }

    /// Runs one frame of flight for a projectile.
    pub fn tick_projectile<U>(&mut self, id: ProjectileId, dt: f32, units: &mut U) -> ProjectileTick
    where
        U: DamageReceiver + ?Sized,
    {
        let Some(pool) = self.projectiles.get_mut(id.archetype.as_usize()) else {
            return ProjectileTick::Released;
        };
        let Some(projectile) = pool.get_mut(id.key) else {
            return ProjectileTick::Released;
        };

        match projectile.step(&*units, dt) {
            Flight::Moved => return ProjectileTick::InFlight,
            Flight::Impact(target) => {
                let landed = units.receive_damage(target, projectile.damage, projectile.damage_type);
                tracing::trace!(?id, ?target, ?landed, "projectile impact");
            }
            Flight::Expired | Flight::TargetGone => {}
        }

        projectile.target = None;
        let _ = pool.release(id.key);
        ProjectileTick::Released
    }

    /// Snapshot of a single emplacement.
    #[must_use]
    pub fn snapshot(&self, id: EmplacementId) -> Option<EmplacementSnapshot> {
        self.placed
            .get(&id)
            .and_then(|emplacement| self.snapshot_of(id, emplacement))
    }

    /// Snapshots of every emplacement in identifier order.
    pub fn snapshots(&self) -> impl Iterator<Item = EmplacementSnapshot> + '_ {
        self.placed
            .iter()
            .filter_map(|(id, emplacement)| self.snapshot_of(*id, emplacement))
    }

    /// Currently held target of an emplacement.
    #[must_use]
    pub fn target(&self, id: EmplacementId) -> Option<UnitId> {
        self.placed.get(&id).and_then(|emplacement| emplacement.target)
    }

    /// Reports whether the emplacement exists.
    #[must_use]
    pub fn contains(&self, id: EmplacementId) -> bool {
        self.placed.contains_key(&id)
    }

    /// Number of placed emplacements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.placed.len()
    }

    /// Reports whether no emplacement is placed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.placed.is_empty()
    }

    /// Position of an in-flight projectile.
    #[must_use]
    pub fn projectile_position(&self, id: ProjectileId) -> Option<Vec2> {
        self.projectiles
            .get(id.archetype.as_usize())?
            .get(id.key)
            .map(|projectile| projectile.position)
    }

    /// Number of projectiles in flight.
    #[must_use]
    pub fn projectile_count(&self) -> usize {
        self.projectiles.iter().map(Pool::active_len).sum()
    }

    /// Occupancy of every projectile pool.
    #[must_use]
    pub fn pool_stats(&self) -> Vec<PoolStats> {
        self.archetypes
            .iter()
            .zip(&self.projectiles)
            .map(|(stats, pool)| PoolStats {
                archetype: stats.id.clone(),
                active: pool.active_len(),
                free: pool.free_len(),
            })
            .collect()
    }

    /// Moves buffered notifications into `out`.
    pub fn drain_events(&mut self, out: &mut Vec<EmplacementEvent>) {
        out.append(&mut self.events);
    }

    fn snapshot_of(&self, id: EmplacementId, emplacement: &Emplacement) -> Option<EmplacementSnapshot> {
        let stats = self.archetypes.get(emplacement.archetype.as_usize())?;
        Some(EmplacementSnapshot {
            id,
            archetype: stats.id.clone(),
            coord: emplacement.coord,
            position: emplacement.position,
            target: emplacement.target,
            cooldown: emplacement.cooldown,
            level: emplacement.level,
            damage: emplacement.damage,
            range: emplacement.range,
            fire_rate: emplacement.fire_rate,
        })
    }
}

fn candidate<Q>(units: &Q, unit: UnitId) -> Option<Candidate>
where
    Q: UnitQuery + ?Sized,
{
    Some(Candidate {
        unit,
        progress: units.progress(unit)?,
        health: units.health(unit)?,
    })
}

fn non_negative(value: f32) -> f32 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower_defense_core::config::GridConfig;

    fn arrow() -> EmplacementArchetypeConfig {
        EmplacementArchetypeConfig {
            id: ArchetypeId::from("arrow"),
            damage: 4,
            projectile: Some(ProjectileConfig::default()),
            upgrades: vec![UpgradeConfig {
                id: "fletching".to_owned(),
                damage_modifier: 1.5,
                range_modifier: 2.0,
                fire_rate_modifier: 1.0,
            }],
            ..EmplacementArchetypeConfig::default()
        }
    }

    fn setup() -> (Emplacements, SpatialGrid) {
        let mut emplacements = Emplacements::new();
        let _ = emplacements.register_archetype(&arrow()).expect("archetype");
        (emplacements, SpatialGrid::new(&GridConfig::default()))
    }

    #[test]
    fn archetype_without_projectile_is_rejected() {
        let mut emplacements = Emplacements::new();
        let config = EmplacementArchetypeConfig {
            id: ArchetypeId::from("dud"),
            ..EmplacementArchetypeConfig::default()
        };
        assert_eq!(
            emplacements.register_archetype(&config),
            Err(EmplacementConfigError::MissingProjectile(ArchetypeId::from("dud")))
        );
        assert!(emplacements.archetype_index(&ArchetypeId::from("dud")).is_none());
    }

    #[test]
    fn retarget_interval_has_lower_bound() {
        let config = EmplacementArchetypeConfig {
            retarget_interval: 0.0,
            ..arrow()
        };
        let archetype = EmplacementArchetype::from_config(&config).expect("valid");
        assert_eq!(archetype.retarget_interval(), MIN_RETARGET_INTERVAL);
    }

    #[test]
    fn placement_reserves_tile_and_removal_releases_it() {
        let (mut emplacements, mut grid) = setup();
        let coord = GridCoord::new(3, 4);

        let id = emplacements
            .place(&mut grid, &ArchetypeId::from("arrow"), coord)
            .expect("placement");
        assert!(grid.is_occupied(coord));
        assert_eq!(
            emplacements.place(&mut grid, &ArchetypeId::from("arrow"), coord),
            Err(PlacementError::Occupied)
        );

        assert_eq!(emplacements.remove(&mut grid, id), Ok(coord));
        assert!(!grid.is_occupied(coord));
        assert_eq!(
            emplacements.remove(&mut grid, id),
            Err(RemovalError::MissingEmplacement)
        );
    }

    #[test]
    fn unknown_archetype_leaves_grid_untouched() {
        let (mut emplacements, mut grid) = setup();
        let coord = GridCoord::new(0, 0);

        assert_eq!(
            emplacements.place(&mut grid, &ArchetypeId::from("cannon"), coord),
            Err(PlacementError::UnknownArchetype(ArchetypeId::from("cannon")))
        );
        assert!(!grid.is_occupied(coord));
    }

    #[test]
    fn upgrades_apply_in_order_until_exhausted() {
        let (mut emplacements, mut grid) = setup();
        let id = emplacements
            .place(&mut grid, &ArchetypeId::from("arrow"), GridCoord::new(1, 1))
            .expect("placement");

        assert_eq!(emplacements.upgrade(id), Ok(1));
        let snapshot = emplacements.snapshot(id).expect("placed");
        assert_eq!(snapshot.damage, 6);
        assert_eq!(snapshot.range, 10.0);
        assert_eq!(emplacements.upgrade(id), Err(UpgradeError::FullyUpgraded));
        assert_eq!(
            emplacements.upgrade(EmplacementId::new(99)),
            Err(UpgradeError::MissingEmplacement)
        );
    }
}
