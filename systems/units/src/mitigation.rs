//! Armor and resistance reduction of incoming damage.

use tower_defense_core::{config::ResistanceConfig, DamageType};

/// Smallest fraction of nominal damage that always lands.
pub const MIN_MULTIPLIER: f32 = 0.05;
/// Largest armor value an archetype may carry.
pub const MAX_ARMOR: f32 = 0.95;

/// Damage reduction profile of a unit archetype.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mitigation {
    armor: f32,
    resistances: Vec<(DamageType, f32)>,
}

impl Mitigation {
    /// Creates a profile, clamping armor to `[0, 0.95]` and reductions to `[0, 1]`.
    #[must_use]
    pub fn new(armor: f32, resistances: &[ResistanceConfig]) -> Self {
        Self {
            armor: clamp_or_zero(armor, MAX_ARMOR),
            resistances: resistances
                .iter()
                .map(|resistance| {
                    (
                        resistance.damage_type,
                        clamp_or_zero(resistance.reduction, 1.0),
                    )
                })
                .collect(),
        }
    }

    /// Armor after clamping.
    #[must_use]
    pub fn armor(&self) -> f32 {
        self.armor
    }

    /// Fraction of nominal damage of the given type that lands.
    #[must_use]
    pub fn multiplier(&self, damage_type: DamageType) -> f32 {
        if damage_type == DamageType::True {
            return 1.0;
        }

        let multiplier = self
            .resistances
            .iter()
            .filter(|(kind, _)| *kind == damage_type)
            .fold(1.0 - self.armor, |acc, (_, reduction)| acc * (1.0 - reduction));
        multiplier.clamp(MIN_MULTIPLIER, 1.0)
    }

    /// Damage that lands from a hit of `amount` nominal points.
    ///
    /// Non-true hits always land at least one point; zero-point hits land nothing.
    #[must_use]
    pub fn mitigate(&self, amount: u32, damage_type: DamageType) -> u32 {
        if amount == 0 || damage_type == DamageType::True {
            return amount;
        }

        let scaled = (amount as f32 * self.multiplier(damage_type)).round();
        (scaled as u32).clamp(1, amount)
    }
}

fn clamp_or_zero(value: f32, max: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, max)
    }
}

#[cfg(test)]
mod tests {
    use super::{Mitigation, MIN_MULTIPLIER};
    use tower_defense_core::{config::ResistanceConfig, DamageType};

    const ALL_TYPES: [DamageType; 6] = [
        DamageType::Physical,
        DamageType::Magic,
        DamageType::Fire,
        DamageType::Frost,
        DamageType::Poison,
        DamageType::True,
    ];

    fn resist(damage_type: DamageType, reduction: f32) -> ResistanceConfig {
        ResistanceConfig {
            damage_type,
            reduction,
        }
    }

    #[test]
    fn half_armor_halves_physical_damage() {
        let mitigation = Mitigation::new(0.5, &[]);
        assert_eq!(mitigation.mitigate(4, DamageType::Physical), 2);
    }

    #[test]
    fn matching_resistances_stack_multiplicatively() {
        let mitigation = Mitigation::new(
            0.2,
            &[
                resist(DamageType::Fire, 0.5),
                resist(DamageType::Fire, 0.5),
                resist(DamageType::Frost, 0.9),
            ],
        );
        assert!((mitigation.multiplier(DamageType::Fire) - 0.2).abs() < 1e-6);
        assert!((mitigation.multiplier(DamageType::Magic) - 0.8).abs() < 1e-6);
    }

    #[test]
    fn multiplier_never_drops_below_floor() {
        let mitigation = Mitigation::new(0.95, &[resist(DamageType::Poison, 1.0)]);
        assert_eq!(mitigation.multiplier(DamageType::Poison), MIN_MULTIPLIER);
        assert_eq!(mitigation.mitigate(100, DamageType::Poison), 5);
    }

    #[test]
    fn armor_and_reductions_are_clamped() {
        let mitigation = Mitigation::new(3.0, &[resist(DamageType::Magic, -1.0)]);
        assert_eq!(mitigation.armor(), 0.95);
        assert!((mitigation.multiplier(DamageType::Magic) - 0.05).abs() < 1e-6);
    }

    #[test]
    fn landed_damage_stays_within_bounds_for_every_input() {
        let profiles = [
            Mitigation::new(0.0, &[]),
            Mitigation::new(0.5, &[]),
            Mitigation::new(0.95, &[resist(DamageType::Fire, 0.99)]),
            Mitigation::new(0.3, &[resist(DamageType::Magic, 0.4)]),
        ];

        for profile in &profiles {
            for damage_type in ALL_TYPES {
                for amount in [1_u32, 2, 3, 7, 19, 250, 10_000] {
                    let landed = profile.mitigate(amount, damage_type);
                    if damage_type == DamageType::True {
                        assert_eq!(landed, amount);
                    } else {
                        assert!(
                            (1..=amount).contains(&landed),
                            "{amount} {damage_type:?} landed {landed}"
                        );
                    }
                }
            }
        }
    }
}
