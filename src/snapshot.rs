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

//! Current-state snapshot.
//!
//! A single row holding the shop's live totals. It is only ever changed by
//! [`apply_delta`] (or overwritten by reset), in the same transaction that
//! appends the matching ledger entry.

use crate::ShopError;
use crate::base::ColorMl;
use crate::capacity::Capacities;
use crate::ledger::InventoryDelta;
use crate::locks::LockKey;
use crate::store::Transaction;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub gold: i64,
    pub red_ml: i64,
    pub green_ml: i64,
    pub blue_ml: i64,
    pub dark_ml: i64,
    pub total_ml: i64,
    pub total_potions: i64,
    pub potion_capacity_units: i64,
    pub ml_capacity_units: i64,
}

impl StateSnapshot {
    /// The totals reset starts from before the seed grant is applied: no
    /// gold or inventory and one capacity unit of each kind.
    pub const fn zeroed() -> Self {
        Self {
            gold: 0,
            red_ml: 0,
            green_ml: 0,
            blue_ml: 0,
            dark_ml: 0,
            total_ml: 0,
            total_potions: 0,
            potion_capacity_units: 1,
            ml_capacity_units: 1,
        }
    }

    pub fn ml(&self) -> ColorMl {
        ColorMl::new(self.red_ml, self.green_ml, self.blue_ml, self.dark_ml)
    }

    pub fn capacities(&self) -> Capacities {
        Capacities {
            potion_units: self.potion_capacity_units,
            ml_units: self.ml_capacity_units,
        }
    }

    /// Returns `self + delta` with `total_ml` recomputed, without checking
    /// for negative balances.
    pub fn plus(&self, delta: &InventoryDelta) -> Self {
        let ml = self.ml() + delta.ml;
        Self {
            gold: self.gold + delta.gold,
            red_ml: ml.red,
            green_ml: ml.green,
            blue_ml: ml.blue,
            dark_ml: ml.dark,
            total_ml: ml.total(),
            total_potions: self.total_potions + delta.potions,
            potion_capacity_units: self.potion_capacity_units + delta.potion_capacity_units,
            ml_capacity_units: self.ml_capacity_units + delta.ml_capacity_units,
        }
    }

    /// Returns `self + delta`.
    ///
    /// # Errors
    ///
    /// Returns [`ShopError::NegativeBalance`] naming the first quantity that
    /// would go below zero.
    pub fn with_delta(&self, delta: &InventoryDelta) -> Result<Self, ShopError> {
        let next = self.plus(delta);
        if next.gold < 0 {
            return Err(ShopError::NegativeBalance("gold"));
        }
        if let Some(color) = next.ml().first_negative() {
            return Err(ShopError::NegativeBalance(color));
        }
        if next.total_potions < 0 {
            return Err(ShopError::NegativeBalance("potions"));
        }
        if next.potion_capacity_units < 0 {
            return Err(ShopError::NegativeBalance("potion_capacity_units"));
        }
        if next.ml_capacity_units < 0 {
            return Err(ShopError::NegativeBalance("ml_capacity_units"));
        }
        Ok(next)
    }

    /// `total_ml` agrees with the per-color amounts.
    pub fn ml_totals_agree(&self) -> bool {
        self.total_ml == self.ml().total()
    }
}

/// Reads the snapshot, locking the row for the rest of the transaction.
///
/// # Errors
///
/// Returns [`ShopError::ConsistencyFailure`] if the row is missing, which
/// only happens before the first reset.
pub fn read(tx: &mut Transaction<'_>) -> Result<StateSnapshot, ShopError> {
    tx.lock(LockKey::Snapshot)?;
    tx.get::<StateSnapshot>(&())
        .ok_or_else(|| ShopError::ConsistencyFailure("state snapshot row is missing".to_string()))
}

/// Adds `delta` to the snapshot in place and returns the new totals.
pub fn apply_delta(
    tx: &mut Transaction<'_>,
    delta: &InventoryDelta,
) -> Result<StateSnapshot, ShopError> {
    let next = read(tx)?.with_delta(delta)?;
    tx.put(next);
    Ok(next)
}

/// Replaces the snapshot wholesale. Only reset does this.
pub(crate) fn overwrite(tx: &mut Transaction<'_>, snapshot: StateSnapshot) -> Result<(), ShopError> {
    tx.lock(LockKey::Snapshot)?;
    tx.put(snapshot);
    Ok(())
}
