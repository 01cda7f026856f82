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

//! Potion catalog.
//!
//! Potion rows carry both the catalog definition (recipe, price) and the
//! on-hand quantity. Quantities change only through checkout, bottling and
//! reset.

use crate::ShopError;
use crate::base::{ColorMl, Sku};
use crate::locks::LockKey;
use crate::store::Transaction;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Potion {
    pub sku: Sku,
    pub name: String,
    pub price: i64,
    /// Milliliters of each color one potion is made of.
    pub recipe: ColorMl,
    pub current_quantity: i64,
    pub description: String,
}

impl Potion {
    pub fn total_ml(&self) -> i64 {
        self.recipe.total()
    }
}

/// Storefront view of a potion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub sku: Sku,
    pub name: String,
    pub quantity: i64,
    pub price: i64,
    /// `[red, green, blue, dark]` milliliters.
    pub potion_type: [i64; 4],
}

impl From<Potion> for CatalogItem {
    fn from(potion: Potion) -> Self {
        Self {
            potion_type: potion.recipe.to_array(),
            sku: potion.sku,
            name: potion.name,
            quantity: potion.current_quantity,
            price: potion.price,
        }
    }
}

const DEFAULT_POTIONS: [(&str, &str, [i64; 4], &str); 7] = [
    ("RED_POTION", "Red Potion", [100, 0, 0, 0], "A fiery draught of pure red."),
    ("GREEN_POTION", "Green Potion", [0, 100, 0, 0], "Tastes faintly of moss."),
    ("BLUE_POTION", "Blue Potion", [0, 0, 100, 0], "Cool and calming."),
    ("DARK_POTION", "Dark Potion", [0, 0, 0, 100], "Best not to ask."),
    ("PURPLE_POTION", "Purple Potion", [50, 0, 50, 0], "Half red, half blue."),
    ("TEAL_POTION", "Teal Potion", [0, 50, 50, 0], "Half green, half blue."),
    ("YELLOW_POTION", "Yellow Potion", [50, 50, 0, 0], "Half red, half green."),
];

/// The catalog reset restores, every potion at `price` with nothing on hand.
pub fn default_catalog(price: i64) -> Vec<Potion> {
    DEFAULT_POTIONS
        .iter()
        .map(|(sku, name, recipe, description)| Potion {
            sku: Sku::from(*sku),
            name: name.to_string(),
            price,
            recipe: ColorMl::from_array(*recipe),
            current_quantity: 0,
            description: description.to_string(),
        })
        .collect()
}

/// Makes the catalog exactly the default set: missing SKUs are inserted,
/// existing ones are reset in place and anything else is removed.
///
/// Returns the number of potions in the catalog afterwards.
pub fn seed_defaults(tx: &mut Transaction<'_>, price: i64) -> Result<usize, ShopError> {
    let defaults = default_catalog(price);
    let existing = tx.scan::<Potion>();
    tx.lock_all(
        existing
            .iter()
            .map(|potion| potion.sku.clone())
            .chain(defaults.iter().map(|potion| potion.sku.clone()))
            .map(LockKey::Potion),
    )?;

    for stale in existing
        .iter()
        .filter(|potion| !defaults.iter().any(|default| default.sku == potion.sku))
    {
        tx.delete::<Potion>(&stale.sku);
    }
    let count = defaults.len();
    for potion in defaults {
        tx.put(potion);
    }
    Ok(count)
}

pub fn exists(tx: &Transaction<'_>, sku: &Sku) -> bool {
    tx.get::<Potion>(sku).is_some()
}

pub fn get(tx: &Transaction<'_>, sku: &Sku) -> Result<Potion, ShopError> {
    tx.get::<Potion>(sku)
        .ok_or_else(|| ShopError::UnknownSku(sku.clone()))
}

/// Locks the potion row and reads it.
pub fn get_for_update(tx: &mut Transaction<'_>, sku: &Sku) -> Result<Potion, ShopError> {
    tx.lock(LockKey::Potion(sku.clone()))?;
    get(tx, sku)
}

/// Writes back a potion row. The caller must hold its lock.
pub(crate) fn update(tx: &mut Transaction<'_>, potion: Potion) {
    debug_assert!(potion.current_quantity >= 0, "potion quantity went negative");
    tx.put(potion);
}

pub fn all(tx: &Transaction<'_>) -> Vec<Potion> {
    tx.scan::<Potion>()
}

pub fn total_quantity(tx: &Transaction<'_>) -> i64 {
    all(tx).iter().map(|potion| potion.current_quantity).sum()
}

/// Lists potions offered for sale: priced above zero, best stocked first,
/// at most `limit` entries.
pub fn list_available(tx: &Transaction<'_>, limit: usize) -> Vec<CatalogItem> {
    let mut potions: Vec<Potion> = all(tx)
        .into_iter()
        .filter(|potion| potion.price > 0)
        .collect();
    potions.sort_by(|a, b| {
        b.current_quantity
            .cmp(&a.current_quantity)
            .then_with(|| a.sku.cmp(&b.sku))
    });
    potions
        .into_iter()
        .take(limit)
        .map(CatalogItem::from)
        .collect()
}
