//! Homing projectile flight.

use glam::Vec2;
use tower_defense_core::{DamageType, UnitId};

use crate::UnitQuery;

/// Outcome of advancing a single projectile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProjectileTick {
    /// The projectile is still travelling.
    InFlight,
    /// The projectile was returned to its pool, or the handle was stale.
    Released,
}

/// State of a launched projectile.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct Projectile {
    pub(crate) target: Option<UnitId>,
    pub(crate) damage: u32,
    pub(crate) damage_type: DamageType,
    pub(crate) speed: f32,
    pub(crate) remaining: f32,
    pub(crate) position: Vec2,
}

/// What a projectile does this frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Flight {
    Moved,
    Impact(UnitId),
    Expired,
    TargetGone,
}

impl Projectile {
    /// Advances the projectile towards its target's aim point.
    pub(crate) fn step<Q>(&mut self, units: &Q, dt: f32) -> Flight
    where
        Q: UnitQuery + ?Sized,
    {
        let Some(target) = self.target.filter(|unit| units.is_alive(*unit)) else {
            return Flight::TargetGone;
        };

        self.remaining -= dt;
        if self.remaining <= 0.0 {
            return Flight::Expired;
        }

        let Some(aim) = units.aim_point(target) else {
            return Flight::TargetGone;
        };
        let to_target = aim - self.position;
        let travel = self.speed * dt;
        if to_target.length_squared() <= travel * travel {
            return Flight::Impact(target);
        }

        self.position += to_target.normalize_or_zero() * travel;
        Flight::Moved
    }
}
