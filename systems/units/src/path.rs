//! Ordered waypoint sequences followed by units.

use glam::Vec2;
use tower_defense_core::config::PathConfig;

/// Waypoints a unit travels through, optionally wrapping back to the start.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WaypointPath {
    waypoints: Vec<Vec2>,
    looping: bool,
}

impl WaypointPath {
    /// Creates a path from waypoints in travel order.
    #[must_use]
    pub fn new(waypoints: Vec<Vec2>, looping: bool) -> Self {
        Self { waypoints, looping }
    }

    /// Creates a path from its configuration record.
    #[must_use]
    pub fn from_config(config: &PathConfig) -> Self {
        Self::new(config.waypoints.clone(), config.looping)
    }

    /// Number of waypoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    /// Reports whether the path has no waypoints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// Whether travel wraps from the last waypoint back to the first.
    #[must_use]
    pub fn looping(&self) -> bool {
        self.looping
    }

    /// Waypoints in travel order.
    #[must_use]
    pub fn waypoints(&self) -> &[Vec2] {
        &self.waypoints
    }

    /// Position of a waypoint, clamping the index into range.
    #[must_use]
    pub fn waypoint(&self, index: usize) -> Option<Vec2> {
        let last = self.waypoints.len().checked_sub(1)?;
        self.waypoints.get(index.min(last)).copied()
    }

    /// Index following `index`; wraps on looping paths, saturates otherwise.
    #[must_use]
    pub fn next_index(&self, index: usize) -> usize {
        let Some(last) = self.waypoints.len().checked_sub(1) else {
            return 0;
        };
        if index >= last {
            if self.looping {
                0
            } else {
                last
            }
        } else {
            index + 1
        }
    }

    /// Reports whether arriving at `index` ends travel.
    #[must_use]
    pub fn is_goal(&self, index: usize) -> bool {
        !self.looping && index + 1 >= self.waypoints.len()
    }

    /// Fraction of the path covered by a traveller between `previous` and
    /// `next` standing at `position`.
    #[must_use]
    pub fn progress(&self, previous: usize, next: usize, position: Vec2) -> f32 {
        if self.waypoints.len() <= 1 {
            return 0.0;
        }
        let (Some(from), Some(to)) = (self.waypoint(previous), self.waypoint(next)) else {
            return 0.0;
        };

        let segment = from.distance(to);
        let along = if segment <= 0.0 {
            0.0
        } else {
            (from.distance(position) / segment).clamp(0.0, 1.0)
        };
        let segments = (self.waypoints.len() - 1) as f32;
        ((previous.min(self.waypoints.len() - 1) as f32 + along) / segments).clamp(0.0, 1.0)
    }
}
