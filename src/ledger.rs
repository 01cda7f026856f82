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

//! Ledger store.
//!
//! Every change to gold, ml, potion counts or capacity is recorded as an
//! immutable [`LedgerEntry`] in the same transaction that applies it to the
//! [state snapshot](crate::snapshot). Entries are never updated; only reset
//! truncates the ledger.

use crate::ShopError;
use crate::base::{ColorMl, EntryId, Sku, TimeId};
use crate::clock;
use crate::locks::LockKey;
use crate::store::Transaction;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::AddAssign;

/// Kind of economic event an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryType {
    AdminChange,
    CartVisit,
    CartCheckout,
    BarrelPurchase,
    PotionBottling,
    CapacityUpgrade,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AdminChange => "ADMIN_CHANGE",
            Self::CartVisit => "CART_VISIT",
            Self::CartCheckout => "CART_CHECKOUT",
            Self::BarrelPurchase => "BARREL_PURCHASE",
            Self::PotionBottling => "POTION_BOTTLING",
            Self::CapacityUpgrade => "CAPACITY_UPGRADE",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signed change to the shop's totals.
///
/// `potions` is the aggregate potion-count change. `potions_by_sku` is
/// optional per-SKU detail; when present it must sum to `potions`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryDelta {
    pub gold: i64,
    pub ml: ColorMl,
    pub potions: i64,
    pub potions_by_sku: BTreeMap<Sku, i64>,
    pub potion_capacity_units: i64,
    pub ml_capacity_units: i64,
}

/// Sum of many ledger entries' deltas.
pub type AggregateDelta = InventoryDelta;

impl InventoryDelta {
    pub fn gold(gold: i64) -> Self {
        Self {
            gold,
            ..Self::default()
        }
    }

    pub fn with_ml(mut self, ml: ColorMl) -> Self {
        self.ml += ml;
        self
    }

    /// Adds an aggregate potion-count change without per-SKU detail.
    pub fn with_potions(mut self, potions: i64) -> Self {
        self.potions += potions;
        self
    }

    /// Adds a potion-count change attributed to `sku`.
    pub fn with_sku_potions(mut self, sku: Sku, potions: i64) -> Self {
        *self.potions_by_sku.entry(sku).or_default() += potions;
        self.potions += potions;
        self
    }

    pub fn with_capacity(mut self, potion_units: i64, ml_units: i64) -> Self {
        self.potion_capacity_units += potion_units;
        self.ml_capacity_units += ml_units;
        self
    }

    pub fn is_zero(&self) -> bool {
        self.gold == 0
            && self.ml.is_zero()
            && self.potions == 0
            && self.potions_by_sku.values().all(|delta| *delta == 0)
            && self.potion_capacity_units == 0
            && self.ml_capacity_units == 0
    }

    fn sku_detail_matches(&self) -> bool {
        self.potions_by_sku.is_empty() || self.potions_by_sku.values().sum::<i64>() == self.potions
    }
}

impl AddAssign<&InventoryDelta> for InventoryDelta {
    fn add_assign(&mut self, rhs: &InventoryDelta) {
        self.gold += rhs.gold;
        self.ml += rhs.ml;
        self.potions += rhs.potions;
        for (sku, delta) in &rhs.potions_by_sku {
            *self.potions_by_sku.entry(sku.clone()).or_default() += delta;
        }
        self.potion_capacity_units += rhs.potion_capacity_units;
        self.ml_capacity_units += rhs.ml_capacity_units;
    }
}

/// Immutable record of one economic event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: EntryId,
    pub time_reference: TimeId,
    pub entry_type: EntryType,
    pub gold_change: i64,
    pub ml_changes: ColorMl,
    pub potion_change: i64,
    pub potion_changes: BTreeMap<Sku, i64>,
    pub potion_capacity_change: i64,
    pub ml_capacity_change: i64,
}

impl LedgerEntry {
    pub fn delta(&self) -> InventoryDelta {
        InventoryDelta {
            gold: self.gold_change,
            ml: self.ml_changes,
            potions: self.potion_change,
            potions_by_sku: self.potion_changes.clone(),
            potion_capacity_units: self.potion_capacity_change,
            ml_capacity_units: self.ml_capacity_change,
        }
    }
}

/// Appends an entry inside `tx`.
///
/// Takes the ledger lock and keeps it until `tx` ends, so entry IDs are
/// assigned contiguously in commit order.
///
/// # Errors
///
/// - [`ShopError::InvalidTimeReference`] - `time_reference` is not a known tick.
/// - [`ShopError::ConsistencyFailure`] - per-SKU detail does not sum to the
///   aggregate potion change.
/// - [`ShopError::LockTimeout`] - the ledger is held by another transaction.
pub fn append(
    tx: &mut Transaction<'_>,
    time_reference: TimeId,
    entry_type: EntryType,
    delta: &InventoryDelta,
) -> Result<EntryId, ShopError> {
    if !clock::exists(tx, time_reference) {
        return Err(ShopError::InvalidTimeReference(time_reference));
    }
    if !delta.sku_detail_matches() {
        return Err(ShopError::ConsistencyFailure(format!(
            "{entry_type} entry per-sku potion changes do not sum to {}",
            delta.potions
        )));
    }

    tx.lock(LockKey::Ledger)?;
    let entry_id = EntryId(
        tx.last::<LedgerEntry>()
            .map_or(1, |entry| entry.entry_id.0 + 1),
    );

    tx.put(LedgerEntry {
        entry_id,
        time_reference,
        entry_type,
        gold_change: delta.gold,
        ml_changes: delta.ml,
        potion_change: delta.potions,
        potion_changes: delta
            .potions_by_sku
            .iter()
            .filter(|(_, change)| **change != 0)
            .map(|(sku, change)| (sku.clone(), *change))
            .collect(),
        potion_capacity_change: delta.potion_capacity_units,
        ml_capacity_change: delta.ml_capacity_units,
    });
    Ok(entry_id)
}

/// Sums every entry after `checkpoint`, or every entry since the last reset
/// when `checkpoint` is `None`.
pub fn sum_since(
    tx: &mut Transaction<'_>,
    checkpoint: Option<EntryId>,
) -> Result<AggregateDelta, ShopError> {
    let mut total = AggregateDelta::default();
    for entry in entries(tx)? {
        if checkpoint.is_none_or(|checkpoint| entry.entry_id > checkpoint) {
            total += &entry.delta();
        }
    }
    Ok(total)
}

/// Returns all entries in ID order, locking the ledger for a stable view.
pub fn entries(tx: &mut Transaction<'_>) -> Result<Vec<LedgerEntry>, ShopError> {
    tx.lock(LockKey::Ledger)?;
    Ok(tx.scan::<LedgerEntry>())
}
