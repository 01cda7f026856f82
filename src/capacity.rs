// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Capacity policy.
//!
//! Pure functions turning purchased capacity units into storage limits. The
//! per-unit constants come from [`ShopConfig`](crate::ShopConfig).

use crate::error::{CapacityExceeded, CapacityResource};
use serde::{Deserialize, Serialize};

/// Purchased capacity units, as stored in the state snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Capacities {
    pub potion_units: i64,
    pub ml_units: i64,
}

/// Storage limits derived from [`Capacities`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct CapacityLimits {
    pub max_ml: i64,
    pub max_potions: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityPolicy {
    ml_per_unit: i64,
    potions_per_unit: i64,
}

impl CapacityPolicy {
    pub const fn new(ml_per_unit: i64, potions_per_unit: i64) -> Self {
        Self {
            ml_per_unit,
            potions_per_unit,
        }
    }

    pub fn limits(&self, capacities: Capacities) -> CapacityLimits {
        CapacityLimits {
            max_ml: capacities.ml_units.saturating_mul(self.ml_per_unit),
            max_potions: capacities.potion_units.saturating_mul(self.potions_per_unit),
        }
    }

    /// Checks proposed totals against the limits for `capacities`.
    ///
    /// Only inventory-increasing mutations need this; totals that go down can
    /// never break a limit that held before.
    ///
    /// # Errors
    ///
    /// Returns [`CapacityExceeded`] for the first limit broken, ml first.
    pub fn validate(
        &self,
        proposed_total_ml: i64,
        proposed_total_potions: i64,
        capacities: Capacities,
    ) -> Result<(), CapacityExceeded> {
        let limits = self.limits(capacities);
        if proposed_total_ml > limits.max_ml {
            return Err(CapacityExceeded {
                resource: CapacityResource::Ml,
                proposed: proposed_total_ml,
                max: limits.max_ml,
            });
        }
        if proposed_total_potions > limits.max_potions {
            return Err(CapacityExceeded {
                resource: CapacityResource::Potions,
                proposed: proposed_total_potions,
                max: limits.max_potions,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE_EACH: Capacities = Capacities {
        potion_units: 1,
        ml_units: 1,
    };

    #[test]
    fn limits_scale_with_units() {
        let policy = CapacityPolicy::new(10_000, 50);
        let limits = policy.limits(Capacities {
            potion_units: 3,
            ml_units: 2,
        });
        assert_eq!(limits.max_ml, 20_000);
        assert_eq!(limits.max_potions, 150);
    }

    #[test]
    fn totals_at_the_limit_are_allowed() {
        let policy = CapacityPolicy::new(10_000, 50);
        assert_eq!(policy.validate(10_000, 50, ONE_EACH), Ok(()));
    }

    #[test]
    fn ml_over_limit_is_rejected() {
        let policy = CapacityPolicy::new(10_000, 50);
        let err = policy.validate(10_001, 0, ONE_EACH).unwrap_err();
        assert_eq!(err.resource, CapacityResource::Ml);
        assert_eq!(err.max, 10_000);
    }

    #[test]
    fn potions_over_limit_are_rejected() {
        let policy = CapacityPolicy::new(10_000, 50);
        let err = policy.validate(0, 51, ONE_EACH).unwrap_err();
        assert_eq!(err.resource, CapacityResource::Potions);
        assert_eq!(err.proposed, 51);
    }

    #[test]
    fn constants_are_injected() {
        let policy = CapacityPolicy::new(500, 5);
        assert!(policy.validate(501, 0, ONE_EACH).is_err());
        assert!(policy.validate(0, 6, ONE_EACH).is_err());
        assert!(policy.validate(500, 5, ONE_EACH).is_ok());
    }
}
