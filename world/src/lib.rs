#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative world state for the tower defence simulation.
//!
//! The world owns one instance of every simulation system and a single
//! [`TickScheduler`] through which all per-frame work is dispatched. Adapters
//! mutate it exclusively through [`apply`] and observe it through the
//! [`query`] module, the events appended by `apply`, or the per-component
//! signals exposed by [`World::signals_mut`].

mod level;

use std::{collections::BTreeMap, fs, path::Path, time::Duration};

use glam::Vec2;
use tower_defense_core::{
    config::LevelConfig, ArchetypeId, Command, EmplacementEvent, EmplacementId, Event, GridCoord,
    PathId, PlacementError, ProjectileId, RemovalError, Signal, SpawnError, StartWavesError,
    UnitEvent, UnitId, UpgradeError, WaveEvent,
};
use tower_defense_emplacements::{EmplacementTick, Emplacements, ProjectileTick};
use tower_defense_grid::SpatialGrid;
use tower_defense_tick::TickScheduler;
use tower_defense_units::{UnitArchetype, UnitSimulation, UnitTick};
use tower_defense_waves::WaveScheduler;

use level::Level;
pub use level::{ConfigIssue, LevelLoadError};

/// Slowest supported simulation time scale.
pub const MIN_GAME_SPEED: f32 = 0.1;
/// Fastest supported simulation time scale.
pub const MAX_GAME_SPEED: f32 = 5.0;

/// Participant in the per-frame dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Tickable {
    Unit(UnitId),
    Emplacement(EmplacementId),
    Projectile(ProjectileId),
    Waves,
}

/// Per-component notification channels.
///
/// Subscribers are invoked after the owning system reports an event and
/// before the event is appended to the caller's buffer. Dropping the world
/// drops every subscription.
#[derive(Debug, Default)]
pub struct Signals {
    /// Unit lifecycle and health notifications.
    pub units: Signal<UnitEvent>,
    /// Emplacement, targeting and firing notifications.
    pub emplacements: Signal<EmplacementEvent>,
    /// Wave and level lifecycle notifications.
    pub waves: Signal<WaveEvent>,
}

#[derive(Debug, Default)]
struct Outbox {
    events: Vec<Event>,
    signals: Signals,
    unit_events: Vec<UnitEvent>,
    emplacement_events: Vec<EmplacementEvent>,
    wave_events: Vec<WaveEvent>,
}

/// Lives left to the player. Defeat is terminal for the level.
#[derive(Debug)]
struct Lives {
    remaining: u32,
    defeated: bool,
}

#[derive(Debug)]
struct Systems {
    grid: SpatialGrid,
    units: UnitSimulation,
    emplacements: Emplacements,
    waves: WaveScheduler,
    lives: Lives,
}

impl Systems {
    fn dispatch(
        &mut self,
        handle: Tickable,
        dt: f32,
        scheduler: &mut TickScheduler<Tickable>,
        outbox: &mut Outbox,
    ) {
        match handle {
            Tickable::Unit(unit) => {
                if self.units.tick(unit, dt) == UnitTick::Despawned {
                    scheduler.unregister(handle);
                }
            }
            Tickable::Emplacement(emplacement) => {
                match self.emplacements.tick(emplacement, dt, &self.units) {
                    EmplacementTick::Idle => {}
                    EmplacementTick::Fired(projectile) => {
                        scheduler.register(Tickable::Projectile(projectile));
                    }
                    EmplacementTick::Missing => scheduler.unregister(handle),
                }
            }
            Tickable::Projectile(projectile) => {
                let flight = self
                    .emplacements
                    .tick_projectile(projectile, dt, &mut self.units);
                if flight == ProjectileTick::Released {
                    scheduler.unregister(handle);
                }
            }
            Tickable::Waves => {
                let units = &mut self.units;
                let events = &mut outbox.events;
                self.waves.tick(dt, |group| {
                    match units.spawn(&group.archetype, group.path, None) {
                        Ok(unit) => {
                            scheduler.register(Tickable::Unit(unit));
                            Some(unit)
                        }
                        Err(reason) => {
                            tracing::warn!(archetype = %group.archetype, %reason, "wave spawn rejected");
                            events.push(Event::SpawnRejected {
                                archetype: group.archetype.clone(),
                                reason,
                            });
                            None
                        }
                    }
                });
                if !self.waves.is_running() {
                    scheduler.unregister(handle);
                }
            }
        }

        self.collect(scheduler, outbox);
    }

    /// Removes the escaped unit's toll from the player's lives. Returns `true`
    /// when this escape defeated the player.
    fn charge_escape(&mut self, unit: UnitId, events: &mut Vec<Event>) -> bool {
        if self.lives.defeated {
            return false;
        }
        let toll = self
            .units
            .archetype(unit.archetype)
            .map_or(0, UnitArchetype::damage_to_player);
        if toll == 0 {
            return false;
        }

        let lost = toll.min(self.lives.remaining);
        self.lives.remaining -= lost;
        tracing::info!(?unit, lost, lives = self.lives.remaining, "unit escaped");
        events.push(Event::LivesChanged {
            lives: self.lives.remaining,
            lost,
        });
        if self.lives.remaining > 0 {
            return false;
        }

        self.lives.defeated = true;
        let _ = self.waves.stop_waves();
        tracing::info!("player defeated");
        events.push(Event::Defeated);
        true
    }

    /// Moves system notifications into the outbox, reacting to despawns.
    fn collect(&mut self, scheduler: &mut TickScheduler<Tickable>, outbox: &mut Outbox) {
        self.units.drain_events(&mut outbox.unit_events);
        for event in outbox.unit_events.drain(..) {
            let despawned = match &event {
                UnitEvent::Died { unit } => Some((*unit, false)),
                UnitEvent::ReachedGoal { unit } => Some((*unit, true)),
                _ => None,
            };
            outbox.signals.units.emit(&event);
            outbox.events.push(Event::Unit(event));

            let Some((unit, escaped)) = despawned else {
                continue;
            };
            scheduler.unregister(Tickable::Unit(unit));
            if escaped && self.charge_escape(unit, &mut outbox.events) {
                scheduler.unregister(Tickable::Waves);
            }
            if !self.lives.defeated {
                self.waves.notify_despawned(unit);
            }
        }

        self.emplacements
            .drain_events(&mut outbox.emplacement_events);
        for event in outbox.emplacement_events.drain(..) {
            outbox.signals.emplacements.emit(&event);
            outbox.events.push(Event::Emplacement(event));
        }

        self.waves.drain_events(&mut outbox.wave_events);
        for event in outbox.wave_events.drain(..) {
            outbox.signals.waves.emit(&event);
            outbox.events.push(Event::Wave(event));
        }
    }
}

/// Represents the authoritative tower defence world state.
#[derive(Debug)]
pub struct World {
    level_id: String,
    scheduler: TickScheduler<Tickable>,
    systems: Systems,
    outbox: Outbox,
    paths: BTreeMap<String, PathId>,
    issues: Vec<ConfigIssue>,
    time_scale: f32,
    paused: bool,
    elapsed: Duration,
    tick_index: u64,
}

impl World {
    /// Creates an empty world on a default grid without paths or archetypes.
    #[must_use]
    pub fn new() -> Self {
        Self::from_level(&LevelConfig::default())
    }

    /// Builds a world from a level description.
    ///
    /// Invalid entries are skipped and reported through
    /// [`query::config_issues`].
    #[must_use]
    pub fn from_level(config: &LevelConfig) -> Self {
        let Level {
            grid,
            units,
            emplacements,
            waves,
            paths,
            issues,
        } = Level::build(config);

        tracing::info!(
            level = %config.id,
            paths = paths.len(),
            waves = config.waves.len(),
            issues = issues.len(),
            "level loaded"
        );

        Self {
            level_id: config.id.clone(),
            scheduler: TickScheduler::new(),
            systems: Systems {
                grid,
                units,
                emplacements,
                waves,
                lives: Lives {
                    remaining: config.starting_lives,
                    defeated: false,
                },
            },
            outbox: Outbox::default(),
            paths,
            issues,
            time_scale: 1.0,
            paused: false,
            elapsed: Duration::ZERO,
            tick_index: 0,
        }
    }

    /// Parses a TOML level document and builds a world from it.
    pub fn from_level_str(document: &str) -> Result<Self, LevelLoadError> {
        let config: LevelConfig = toml::from_str(document)?;
        Ok(Self::from_level(&config))
    }

    /// Reads a TOML level document from disk and builds a world from it.
    pub fn load_level_file(path: impl AsRef<Path>) -> Result<Self, LevelLoadError> {
        let path = path.as_ref();
        let document = fs::read_to_string(path).map_err(|source| LevelLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_level_str(&document)
    }

    /// Provides access to the per-component signals for subscription.
    pub fn signals_mut(&mut self) -> &mut Signals {
        &mut self.outbox.signals
    }

    /// Advances every registered participant by `dt` scaled by the game speed.
    ///
    /// Does nothing while the world is paused or once the player is defeated.
    pub fn tick(&mut self, dt: Duration) {
        if self.paused || self.systems.lives.defeated {
            return;
        }

        let scaled = Duration::try_from_secs_f64(dt.as_secs_f64() * f64::from(self.time_scale))
            .unwrap_or(Duration::MAX);
        let seconds = scaled.as_secs_f32();
        self.tick_index = self.tick_index.saturating_add(1);
        self.elapsed = self.elapsed.saturating_add(scaled);
        self.outbox.events.push(Event::TimeAdvanced { dt: scaled });

        let systems = &mut self.systems;
        let outbox = &mut self.outbox;
        self.scheduler.advance(seconds, |handle, dt, scheduler| {
            systems.dispatch(handle, dt, scheduler, outbox);
        });
        tracing::trace!(
            tick = self.tick_index,
            participants = self.scheduler.len(),
            "tick advanced"
        );
    }

    /// Spawns a unit outside of the wave schedule.
    ///
    /// The unit gates level completion exactly like a wave spawn.
    pub fn spawn_unit(
        &mut self,
        archetype: &ArchetypeId,
        path: Option<PathId>,
        position: Option<Vec2>,
    ) -> Result<UnitId, SpawnError> {
        let unit = self.systems.units.spawn(archetype, path, position)?;
        self.scheduler.register(Tickable::Unit(unit));
        self.systems.waves.notify_spawned(unit);
        self.collect();
        Ok(unit)
    }

    /// Forces a unit to die. Returns `false` when the unit was not moving.
    pub fn kill_unit(&mut self, unit: UnitId) -> bool {
        let killed = self.systems.units.kill(unit);
        self.collect();
        killed
    }

    /// Builds an emplacement on a grid tile.
    pub fn place_emplacement(
        &mut self,
        archetype: &ArchetypeId,
        coord: GridCoord,
    ) -> Result<EmplacementId, PlacementError> {
        let Systems {
            grid, emplacements, ..
        } = &mut self.systems;
        let emplacement = emplacements.place(grid, archetype, coord)?;
        self.scheduler.register(Tickable::Emplacement(emplacement));
        self.collect();
        Ok(emplacement)
    }

    /// Removes an emplacement and frees its tile.
    pub fn remove_emplacement(
        &mut self,
        emplacement: EmplacementId,
    ) -> Result<GridCoord, RemovalError> {
        let Systems {
            grid, emplacements, ..
        } = &mut self.systems;
        let coord = emplacements.remove(grid, emplacement)?;
        self.scheduler.unregister(Tickable::Emplacement(emplacement));
        self.collect();
        Ok(coord)
    }

    /// Applies the next upgrade of an emplacement and returns its new level.
    pub fn upgrade_emplacement(&mut self, emplacement: EmplacementId) -> Result<u32, UpgradeError> {
        let level = self.systems.emplacements.upgrade(emplacement)?;
        self.collect();
        Ok(level)
    }

    /// Starts processing the level's waves.
    pub fn start_waves(&mut self) -> Result<(), StartWavesError> {
        self.systems.waves.start_waves()?;
        self.scheduler.register(Tickable::Waves);
        self.collect();
        Ok(())
    }

    /// Stops wave progression. Returns `false` when waves were not running.
    pub fn stop_waves(&mut self) -> bool {
        let stopped = self.systems.waves.stop_waves();
        self.scheduler.unregister(Tickable::Waves);
        self.collect();
        stopped
    }

    /// Changes the time scale, clamped to the supported range.
    ///
    /// Non-finite requests are ignored.
    pub fn set_game_speed(&mut self, speed: f32) {
        if !speed.is_finite() {
            tracing::warn!(speed, "ignoring non-finite game speed");
            return;
        }
        self.time_scale = speed.clamp(MIN_GAME_SPEED, MAX_GAME_SPEED);
        tracing::info!(speed = self.time_scale, "game speed changed");
        self.outbox.events.push(Event::GameSpeedChanged {
            speed: self.time_scale,
        });
    }

    /// Suspends or resumes simulation ticks.
    pub fn set_paused(&mut self, paused: bool) {
        if self.paused == paused {
            return;
        }
        self.paused = paused;
        tracing::info!(paused, "pause changed");
        self.outbox.events.push(Event::PauseChanged { paused });
    }

    /// Moves every buffered event into `out`.
    pub fn drain_events(&mut self, out: &mut Vec<Event>) {
        out.append(&mut self.outbox.events);
    }

    fn collect(&mut self) {
        self.systems.collect(&mut self.scheduler, &mut self.outbox);
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

/// Applies the provided command to the world, mutating state deterministically.
///
/// Every event raised while executing the command, including rejections, is
/// appended to `out_events`.
pub fn apply(world: &mut World, command: Command, out_events: &mut Vec<Event>) {
    match command {
        Command::Tick { dt } => world.tick(dt),
        Command::SpawnUnit {
            archetype,
            path,
            position,
        } => {
            if let Err(reason) = world.spawn_unit(&archetype, path, position) {
                tracing::warn!(%archetype, %reason, "spawn rejected");
                world
                    .outbox
                    .events
                    .push(Event::SpawnRejected { archetype, reason });
            }
        }
        Command::PlaceEmplacement { archetype, coord } => {
            if let Err(reason) = world.place_emplacement(&archetype, coord) {
                tracing::warn!(%archetype, %coord, %reason, "placement rejected");
                world.outbox.events.push(Event::PlacementRejected {
                    archetype,
                    coord,
                    reason,
                });
            }
        }
        Command::RemoveEmplacement { emplacement } => {
            if let Err(reason) = world.remove_emplacement(emplacement) {
                tracing::warn!(?emplacement, %reason, "removal rejected");
                world.outbox.events.push(Event::RemovalRejected {
                    emplacement,
                    reason,
                });
            }
        }
        Command::UpgradeEmplacement { emplacement } => {
            if let Err(reason) = world.upgrade_emplacement(emplacement) {
                tracing::warn!(?emplacement, %reason, "upgrade rejected");
                world.outbox.events.push(Event::UpgradeRejected {
                    emplacement,
                    reason,
                });
            }
        }
        Command::StartWaves => {
            if let Err(reason) = world.start_waves() {
                tracing::warn!(%reason, "wave start rejected");
                world
                    .outbox
                    .events
                    .push(Event::StartWavesRejected { reason });
            }
        }
        Command::StopWaves => {
            if !world.stop_waves() {
                tracing::debug!("stop requested while waves were idle");
            }
        }
        Command::SetGameSpeed { speed } => world.set_game_speed(speed),
        Command::SetPaused { paused } => world.set_paused(paused),
    }

    world.drain_events(out_events);
}

/// Query functions that provide read-only access to the world state.
pub mod query {
    use std::time::Duration;

    use tower_defense_core::{EmplacementId, PathId, PoolStats, UnitId};
    use tower_defense_grid::SpatialGrid;

    pub use tower_defense_emplacements::EmplacementSnapshot;
    pub use tower_defense_units::UnitSnapshot;
    pub use tower_defense_waves::WaveProgress;

    use super::{ConfigIssue, World};

    /// Identifier of the loaded level.
    #[must_use]
    pub fn level_id(world: &World) -> &str {
        &world.level_id
    }

    /// Snapshots of every active unit in deterministic order.
    #[must_use]
    pub fn units(world: &World) -> Vec<UnitSnapshot> {
        world.systems.units.snapshots().collect()
    }

    /// Snapshot of a single active unit.
    #[must_use]
    pub fn unit(world: &World, unit: UnitId) -> Option<UnitSnapshot> {
        world.systems.units.snapshot(unit)
    }

    /// Number of units currently in the simulation.
    #[must_use]
    pub fn unit_count(world: &World) -> usize {
        world.systems.units.active_count()
    }

    /// Snapshots of every emplacement ordered by identifier.
    #[must_use]
    pub fn emplacements(world: &World) -> Vec<EmplacementSnapshot> {
        world.systems.emplacements.snapshots().collect()
    }

    /// Snapshot of a single emplacement.
    #[must_use]
    pub fn emplacement(world: &World, emplacement: EmplacementId) -> Option<EmplacementSnapshot> {
        world.systems.emplacements.snapshot(emplacement)
    }

    /// Number of projectiles in flight.
    #[must_use]
    pub fn projectile_count(world: &World) -> usize {
        world.systems.emplacements.projectile_count()
    }

    /// Progress of the wave scheduler.
    #[must_use]
    pub fn wave_progress(world: &World) -> WaveProgress {
        world.systems.waves.progress()
    }

    /// Whether the level completion signal has fired.
    #[must_use]
    pub fn level_completed(world: &World) -> bool {
        world.systems.waves.level_completed()
    }

    /// Lives the player has left.
    #[must_use]
    pub fn lives(world: &World) -> u32 {
        world.systems.lives.remaining
    }

    /// Whether escaping units exhausted the player's lives.
    #[must_use]
    pub fn is_defeated(world: &World) -> bool {
        world.systems.lives.defeated
    }

    /// Occupancy of every unit pool.
    #[must_use]
    pub fn unit_pools(world: &World) -> Vec<PoolStats> {
        world.systems.units.pool_stats()
    }

    /// Occupancy of every projectile pool.
    #[must_use]
    pub fn projectile_pools(world: &World) -> Vec<PoolStats> {
        world.systems.emplacements.pool_stats()
    }

    /// Read-only access to the placement grid.
    #[must_use]
    pub fn grid(world: &World) -> &SpatialGrid {
        &world.systems.grid
    }

    /// Resolves a path name declared by the level.
    #[must_use]
    pub fn path_id(world: &World, name: &str) -> Option<PathId> {
        world.paths.get(name).copied()
    }

    /// Problems found while loading the level.
    #[must_use]
    pub fn config_issues(world: &World) -> &[ConfigIssue] {
        &world.issues
    }

    /// Current simulation time scale.
    #[must_use]
    pub fn game_speed(world: &World) -> f32 {
        world.time_scale
    }

    /// Whether ticks are suspended.
    #[must_use]
    pub fn is_paused(world: &World) -> bool {
        world.paused
    }

    /// Total scaled simulation time.
    #[must_use]
    pub fn elapsed(world: &World) -> Duration {
        world.elapsed
    }

    /// Number of ticks processed.
    #[must_use]
    pub fn tick_index(world: &World) -> u64 {
        world.tick_index
    }

    /// Number of participants registered for per-frame dispatch.
    #[must_use]
    pub fn tickable_count(world: &World) -> usize {
        world.scheduler.len()
    }
}
