//! Target selection policies.

use tower_defense_core::{TargetPriority, UnitId};

/// Attributes of a unit considered for targeting.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    /// Handle of the unit.
    pub unit: UnitId,
    /// Fraction of its path the unit has covered.
    pub progress: f32,
    /// Remaining health of the unit.
    pub health: u32,
}

impl Candidate {
    /// Reports whether `self` strictly outranks `incumbent` under the policy.
    ///
    /// Ties never outrank, so the earlier candidate keeps its place.
    #[must_use]
    pub fn outranks(&self, incumbent: &Self, priority: TargetPriority) -> bool {
        match priority {
            TargetPriority::First => self.progress > incumbent.progress,
            TargetPriority::Last => self.progress < incumbent.progress,
            TargetPriority::Strongest => self.health > incumbent.health,
        }
    }
}

/// Picks the best candidate, starting from the currently held target.
pub fn select_target<I>(
    priority: TargetPriority,
    incumbent: Option<Candidate>,
    candidates: I,
) -> Option<Candidate>
where
    I: IntoIterator<Item = Candidate>,
{
    candidates
        .into_iter()
        .fold(incumbent, |best, candidate| match best {
            Some(current) if !candidate.outranks(&current, priority) => Some(current),
            _ => Some(candidate),
        })
}
