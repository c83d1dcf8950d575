#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Placement grid that maps between tile coordinates and world positions.
//!
//! Tiles carry a buildable flag authored by the level and an occupied flag
//! driven exclusively by [`SpatialGrid::reserve`] and [`SpatialGrid::release`].
//! Queries against coordinates outside the grid never panic: they report the
//! tile as unusable instead.

use glam::{DVec2, Vec2};
use tower_defense_core::{config::GridConfig, GridCoord, PlacementError};

const MIN_CELL_SIZE: f32 = 0.001;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Tile {
    buildable: bool,
    occupied: bool,
}

/// Buildable/occupied tile state with world-space conversion.
#[derive(Clone, Debug)]
pub struct SpatialGrid {
    width: u32,
    height: u32,
    cell_size: f32,
    origin: Vec2,
    tiles: Vec<Tile>,
}

impl SpatialGrid {
    /// Builds a grid from level configuration.
    ///
    /// Blocked tiles outside the grid are ignored with a warning.
    #[must_use]
    pub fn new(config: &GridConfig) -> Self {
        let cell_size = if config.cell_size.is_finite() {
            config.cell_size.max(MIN_CELL_SIZE)
        } else {
            1.0
        };
        let tile = Tile {
            buildable: config.buildable_by_default,
            occupied: false,
        };
        let mut grid = Self {
            width: config.width,
            height: config.height,
            cell_size,
            origin: config.origin,
            tiles: vec![tile; config.width as usize * config.height as usize],
        };

        for coord in &config.blocked {
            if !grid.set_buildable(*coord, false) {
                tracing::warn!(%coord, "blocked tile lies outside the grid");
            }
        }
        grid
    }

    /// Number of tile columns.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Number of tile rows.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Side length of a tile in world units.
    #[must_use]
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// World position of the grid's lower-left corner.
    #[must_use]
    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    /// Reports whether the coordinate addresses a tile of this grid.
    #[must_use]
    pub fn contains(&self, coord: GridCoord) -> bool {
        self.index(coord).is_some()
    }

    /// Converts a world position to the tile containing it.
    #[must_use]
    pub fn world_to_grid(&self, position: Vec2) -> Option<GridCoord> {
        let local = (position - self.origin) / self.cell_size;
        if !local.is_finite() {
            return None;
        }
        let coord = GridCoord::new(local.x.floor() as i32, local.y.floor() as i32);
        self.contains(coord).then_some(coord)
    }

    /// World position of the centre of a tile.
    ///
    /// Coordinates outside the grid are converted with the same formula so
    /// callers can reason about neighbouring space.
    #[must_use]
    pub fn grid_to_world(&self, coord: GridCoord) -> Vec2 {
        let cell = Vec2::new(coord.x as f32 + 0.5, coord.y as f32 + 0.5);
        self.origin + cell * self.cell_size
    }

    /// Whether the tile allows construction. False outside the grid.
    #[must_use]
    pub fn is_buildable(&self, coord: GridCoord) -> bool {
        self.tile(coord).map_or(false, |tile| tile.buildable)
    }

    /// Whether the tile hosts a structure. True outside the grid.
    #[must_use]
    pub fn is_occupied(&self, coord: GridCoord) -> bool {
        self.tile(coord).map_or(true, |tile| tile.occupied)
    }

    /// Whether a structure could be placed on the tile right now.
    #[must_use]
    pub fn can_place(&self, coord: GridCoord) -> bool {
        self.check_placement(coord).is_ok()
    }

    /// Explains why a structure could not be placed on the tile.
    pub fn check_placement(&self, coord: GridCoord) -> Result<(), PlacementError> {
        let tile = self.tile(coord).ok_or(PlacementError::OutOfBounds)?;
        if !tile.buildable {
            return Err(PlacementError::NotBuildable);
        }
        if tile.occupied {
            return Err(PlacementError::Occupied);
        }
        Ok(())
    }

    /// Checks the tile and marks it occupied in one step.
    ///
    /// On failure the grid is left untouched.
    pub fn try_reserve(&mut self, coord: GridCoord) -> Result<(), PlacementError> {
        self.check_placement(coord)?;
        if let Some(tile) = self.tile_mut(coord) {
            tile.occupied = true;
        }
        Ok(())
    }

    /// Boolean form of [`SpatialGrid::try_reserve`].
    pub fn reserve(&mut self, coord: GridCoord) -> bool {
        self.try_reserve(coord).is_ok()
    }

    /// Clears the occupied flag. Returns `false` when nothing was reserved.
    pub fn release(&mut self, coord: GridCoord) -> bool {
        match self.tile_mut(coord) {
            Some(tile) if tile.occupied => {
                tile.occupied = false;
                true
            }
            _ => false,
        }
    }

    /// Updates the buildable flag. Returns `false` outside the grid.
    pub fn set_buildable(&mut self, coord: GridCoord, buildable: bool) -> bool {
        match self.tile_mut(coord) {
            Some(tile) => {
                tile.buildable = buildable;
                true
            }
            None => false,
        }
    }

    /// Marks every tile crossed by the segment as non-buildable and returns
    /// how many tiles changed.
    ///
    /// Only the part of the segment inside the grid is sampled, so far-away
    /// endpoints cost no more than a segment spanning the grid.
    pub fn block_segment(&mut self, from: Vec2, to: Vec2) -> usize {
        if !from.is_finite() || !to.is_finite() {
            return 0;
        }
        let extent = Vec2::new(self.width as f32, self.height as f32) * self.cell_size;
        let Some((from, to)) = clip_segment(
            from.as_dvec2(),
            to.as_dvec2(),
            self.origin.as_dvec2(),
            (self.origin + extent).as_dvec2(),
        ) else {
            return 0;
        };
        let (from, to) = (from.as_vec2(), to.as_vec2());

        let step = self.cell_size * 0.25;
        let max_samples = (self.width as usize + self.height as usize) * 4 + 1;
        let samples = ((from.distance(to) / step).ceil() as usize).min(max_samples);

        let mut blocked = 0;
        for sample in 0..=samples {
            let t = if samples == 0 {
                0.0
            } else {
                sample as f32 / samples as f32
            };
            let Some(coord) = self.world_to_grid(from.lerp(to, t)) else {
                continue;
            };
            if self.is_buildable(coord) && self.set_buildable(coord, false) {
                blocked += 1;
            }
        }
        blocked
    }

    /// Number of tiles currently hosting a structure.
    #[must_use]
    pub fn occupied_count(&self) -> usize {
        self.tiles.iter().filter(|tile| tile.occupied).count()
    }

    fn index(&self, coord: GridCoord) -> Option<usize> {
        let x = u32::try_from(coord.x).ok()?;
        let y = u32::try_from(coord.y).ok()?;
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }

    fn tile(&self, coord: GridCoord) -> Option<&Tile> {
        self.index(coord).and_then(|index| self.tiles.get(index))
    }

    fn tile_mut(&mut self, coord: GridCoord) -> Option<&mut Tile> {
        self.index(coord).and_then(|index| self.tiles.get_mut(index))
    }
}

/// Clips a segment to an axis-aligned rectangle, returning the portion
/// inside it.
fn clip_segment(from: DVec2, to: DVec2, min: DVec2, max: DVec2) -> Option<(DVec2, DVec2)> {
    let delta = to - from;
    let mut enter = 0.0_f64;
    let mut exit = 1.0_f64;
    for (direction, slack) in [
        (-delta.x, from.x - min.x),
        (delta.x, max.x - from.x),
        (-delta.y, from.y - min.y),
        (delta.y, max.y - from.y),
    ] {
        if direction == 0.0 {
            if slack < 0.0 {
                return None;
            }
            continue;
        }
        let t = slack / direction;
        if direction < 0.0 {
            enter = enter.max(t);
        } else {
            exit = exit.min(t);
        }
        if enter > exit {
            return None;
        }
    }
    let start = if enter > 0.0 { from + delta * enter } else { from };
    let end = if exit < 1.0 { from + delta * exit } else { to };
    Some((start.clamp(min, max), end.clamp(min, max)))
}

#[cfg(test)]
mod tests {
    use super::SpatialGrid;
    use glam::Vec2;
    use tower_defense_core::{config::GridConfig, GridCoord, PlacementError};

    fn grid(width: u32, height: u32) -> SpatialGrid {
        SpatialGrid::new(&GridConfig {
            width,
            height,
            ..GridConfig::default()
        })
    }

    #[test]
    fn reserve_is_exclusive_until_released() {
        let mut grid = grid(4, 4);
        let coord = GridCoord::new(2, 1);

        assert!(grid.reserve(coord));
        assert!(!grid.reserve(coord));
        assert!(grid.release(coord));
        assert!(grid.reserve(coord));
    }

    #[test]
    fn failed_reservation_has_no_side_effect() {
        let mut grid = grid(3, 3);
        let coord = GridCoord::new(0, 0);
        assert!(grid.set_buildable(coord, false));

        assert_eq!(grid.try_reserve(coord), Err(PlacementError::NotBuildable));
        assert!(!grid.is_occupied(coord));
        assert_eq!(grid.occupied_count(), 0);
    }

    #[test]
    fn out_of_bounds_coordinates_report_unusable_tiles() {
        let mut grid = grid(2, 2);
        let outside = GridCoord::new(-1, 5);

        assert!(!grid.is_buildable(outside));
        assert!(grid.is_occupied(outside));
        assert_eq!(grid.try_reserve(outside), Err(PlacementError::OutOfBounds));
        assert!(!grid.release(outside));
        assert!(!grid.set_buildable(outside, true));
    }

    #[test]
    fn conversions_use_cell_centres() {
        let grid = SpatialGrid::new(&GridConfig {
            width: 5,
            height: 5,
            cell_size: 2.0,
            origin: Vec2::new(-1.0, 3.0),
            ..GridConfig::default()
        });

        let centre = grid.grid_to_world(GridCoord::new(1, 2));
        assert_eq!(centre, Vec2::new(2.0, 8.0));
        assert_eq!(grid.world_to_grid(centre), Some(GridCoord::new(1, 2)));
        assert_eq!(
            grid.world_to_grid(Vec2::new(-1.0, 3.0)),
            Some(GridCoord::new(0, 0))
        );
        assert_eq!(grid.world_to_grid(Vec2::new(-1.5, 3.0)), None);
    }

    #[test]
    fn blocked_tiles_from_config_are_not_buildable() {
        let grid = SpatialGrid::new(&GridConfig {
            width: 3,
            height: 3,
            blocked: vec![GridCoord::new(1, 1), GridCoord::new(9, 9)],
            ..GridConfig::default()
        });

        assert!(!grid.is_buildable(GridCoord::new(1, 1)));
        assert!(grid.is_buildable(GridCoord::new(0, 1)));
    }

    #[test]
    fn segments_block_every_crossed_tile() {
        let mut grid = grid(5, 3);
        let from = grid.grid_to_world(GridCoord::new(0, 1));
        let to = grid.grid_to_world(GridCoord::new(4, 1));

        assert_eq!(grid.block_segment(from, to), 5);
        for x in 0..5 {
            assert!(!grid.is_buildable(GridCoord::new(x, 1)));
        }
        assert!(grid.is_buildable(GridCoord::new(2, 0)));
        assert_eq!(grid.block_segment(from, to), 0, "already blocked");
    }

    #[test]
    fn far_away_segment_end_is_clipped_to_the_grid() {
        let mut grid = grid(10, 4);
        let from = Vec2::new(0.5, 0.5);

        assert_eq!(grid.block_segment(from, Vec2::new(1.0e12, 0.5)), 10);
        for x in 0..10 {
            assert!(!grid.is_buildable(GridCoord::new(x, 0)));
        }
        assert!(grid.is_buildable(GridCoord::new(0, 1)));

        assert_eq!(
            grid.block_segment(Vec2::new(1.0e12, 2.5), Vec2::new(0.5, 2.5)),
            10
        );
        assert!(grid.block_segment(Vec2::new(-f32::MAX, 3.5), Vec2::new(f32::MAX, 3.5)) <= 10);
        assert_eq!(
            grid.block_segment(Vec2::new(-5.0, -5.0), Vec2::new(-1.0e20, 3.0)),
            0,
            "segment never enters the grid"
        );
        assert_eq!(grid.block_segment(from, Vec2::new(f32::INFINITY, 0.5)), 0);
    }
}
