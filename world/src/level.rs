//! Resolution of level documents into runtime systems.

use std::{collections::BTreeMap, io, path::PathBuf};

use glam::Vec2;
use thiserror::Error;
use tower_defense_core::{config::LevelConfig, ArchetypeId, PathId};
use tower_defense_emplacements::{EmplacementConfigError, Emplacements};
use tower_defense_grid::SpatialGrid;
use tower_defense_units::{UnitConfigError, UnitSimulation, WaypointPath};
use tower_defense_waves::{SpawnGroup, Wave, WaveScheduler};

/// Problem found in a level document. The offending entry is skipped.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConfigIssue {
    /// A unit archetype or path could not be registered.
    #[error(transparent)]
    Unit(#[from] UnitConfigError),
    /// An emplacement archetype could not be registered.
    #[error(transparent)]
    Emplacement(#[from] EmplacementConfigError),
    /// Two paths share the same identifier.
    #[error("duplicate path '{0}'")]
    DuplicatePath(String),
    /// A path has no waypoints.
    #[error("path '{0}' has no waypoints")]
    EmptyPath(String),
    /// A spawn group names a unit archetype that was not loaded.
    #[error("wave '{wave}' spawns unknown unit archetype '{archetype}'")]
    UnknownSpawnArchetype {
        /// Wave containing the group.
        wave: String,
        /// Archetype the group names.
        archetype: ArchetypeId,
    },
    /// A spawn group names a path that was not loaded.
    #[error("wave '{wave}' follows unknown path '{path}'")]
    UnknownSpawnPath {
        /// Wave containing the group.
        wave: String,
        /// Path the group names.
        path: String,
    },
}

/// Failure to obtain a level document.
#[derive(Debug, Error)]
pub enum LevelLoadError {
    /// The level file could not be read.
    #[error("failed to read level file {}", .path.display())]
    Io {
        /// File that was requested.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// The document is not a valid level description.
    #[error("failed to parse level document")]
    Parse(#[from] toml::de::Error),
}

/// Systems built from a level document.
#[derive(Debug)]
pub(crate) struct Level {
    pub(crate) grid: SpatialGrid,
    pub(crate) units: UnitSimulation,
    pub(crate) emplacements: Emplacements,
    pub(crate) waves: WaveScheduler,
    pub(crate) paths: BTreeMap<String, PathId>,
    pub(crate) issues: Vec<ConfigIssue>,
}

impl Level {
    pub(crate) fn build(config: &LevelConfig) -> Self {
        let mut grid = SpatialGrid::new(&config.grid);
        let mut units = UnitSimulation::new();
        let mut emplacements = Emplacements::new();
        let mut paths: BTreeMap<String, PathId> = BTreeMap::new();
        let mut issues = Vec::new();

        for path in &config.paths {
            if paths.contains_key(&path.id) {
                issues.push(ConfigIssue::DuplicatePath(path.id.clone()));
                continue;
            }
            if path.waypoints.is_empty() {
                issues.push(ConfigIssue::EmptyPath(path.id.clone()));
                continue;
            }

            let id = PathId::new(paths.len() as u32);
            if let Err(error) = units.register_path(id, WaypointPath::from_config(path)) {
                issues.push(error.into());
                continue;
            }
            let _ = paths.insert(path.id.clone(), id);
            block_path(&mut grid, &path.waypoints, path.looping);
        }

        for archetype in &config.units {
            if let Err(error) = units.register_archetype(archetype) {
                issues.push(error.into());
            }
        }

        for archetype in &config.emplacements {
            if let Err(error) = emplacements.register_archetype(archetype) {
                issues.push(error.into());
            }
        }

        let waves = config
            .waves
            .iter()
            .enumerate()
            .map(|(index, wave)| {
                let name = if wave.id.is_empty() {
                    format!("#{index}")
                } else {
                    wave.id.clone()
                };
                let groups = wave
                    .groups
                    .iter()
                    .filter_map(|group| {
                        if units.archetype_index(&group.archetype).is_none() {
                            issues.push(ConfigIssue::UnknownSpawnArchetype {
                                wave: name.clone(),
                                archetype: group.archetype.clone(),
                            });
                            return None;
                        }
                        let path = match &group.path {
                            Some(path) => match paths.get(path) {
                                Some(id) => Some(*id),
                                None => {
                                    issues.push(ConfigIssue::UnknownSpawnPath {
                                        wave: name.clone(),
                                        path: path.clone(),
                                    });
                                    return None;
                                }
                            },
                            None => None,
                        };
                        Some(SpawnGroup::new(
                            group.archetype.clone(),
                            group.count,
                            group.interval,
                            path,
                        ))
                    })
                    .collect();
                Wave::new(name, wave.start_delay, groups)
            })
            .collect();

        for issue in &issues {
            tracing::warn!(level = %config.id, %issue, "level configuration issue");
        }

        Self {
            grid,
            units,
            emplacements,
            waves: WaveScheduler::new(waves),
            paths,
            issues,
        }
    }
}

fn block_path(grid: &mut SpatialGrid, waypoints: &[Vec2], looping: bool) {
    if let [only] = waypoints {
        if let Some(coord) = grid.world_to_grid(*only) {
            let _ = grid.set_buildable(coord, false);
        }
        return;
    }

    for segment in waypoints.windows(2) {
        let _ = grid.block_segment(segment[0], segment[1]);
    }
    if looping {
        if let (Some(last), Some(first)) = (waypoints.last(), waypoints.first()) {
            let _ = grid.block_segment(*last, *first);
        }
    }
}
