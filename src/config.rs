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

//! Shop configuration.
//!
//! Every field has a default, so a TOML file only needs the keys it changes:
//!
//! ```
//! use potion_shop::ShopConfig;
//!
//! let config = ShopConfig::from_toml_str("ml_per_unit = 5000").unwrap();
//! assert_eq!(config.ml_per_unit, 5000);
//! assert_eq!(config.potions_per_unit, 50);
//! ```

use crate::capacity::CapacityPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Upper bound on any configured gold amount, so prices times stock stay
/// well inside `i64`.
pub const MAX_GOLD_AMOUNT: i64 = 1_000_000_000_000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShopConfig {
    /// Milliliters of storage granted by one ml capacity unit.
    pub ml_per_unit: i64,
    /// Potions of storage granted by one potion capacity unit.
    pub potions_per_unit: i64,
    /// Gold granted by the reset seed entry.
    pub initial_gold: i64,
    /// Price of every potion in the default catalog.
    pub potion_price: i64,
    /// Gold cost of one capacity unit of either kind.
    pub capacity_unit_price: i64,
    /// Maximum number of potions listed by the storefront catalog.
    pub catalog_limit: usize,
    /// Strategy activated by reset.
    pub initial_strategy: String,
    /// How long a transaction waits for a row lock before giving up.
    pub lock_timeout_ms: u64,
}

impl Default for ShopConfig {
    fn default() -> Self {
        Self {
            ml_per_unit: 10_000,
            potions_per_unit: 50,
            initial_gold: 100,
            potion_price: 50,
            capacity_unit_price: 1_000,
            catalog_limit: 6,
            initial_strategy: "PREMIUM".to_string(),
            lock_timeout_ms: 5_000,
        }
    }
}

impl ShopConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: ShopConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let input = std::fs::read_to_string(path)?;
        Self::from_toml_str(&input)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ml_per_unit <= 0 || self.potions_per_unit <= 0 {
            return Err(ConfigError::Invalid("capacity per unit must be positive"));
        }
        if self.initial_gold < 0 || self.potion_price < 0 || self.capacity_unit_price < 0 {
            return Err(ConfigError::Invalid("gold amounts cannot be negative"));
        }
        if [self.initial_gold, self.potion_price, self.capacity_unit_price]
            .into_iter()
            .any(|amount| amount > MAX_GOLD_AMOUNT)
        {
            return Err(ConfigError::Invalid("gold amount is too large"));
        }
        Ok(())
    }

    pub fn capacity_policy(&self) -> CapacityPolicy {
        CapacityPolicy::new(self.ml_per_unit, self.potions_per_unit)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}
