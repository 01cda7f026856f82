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

//! Inventory-increasing operations.
//!
//! These are the mutations the capacity policy guards: buying barrels of ml,
//! bottling ml into potions, and buying more capacity. Each one reads the
//! snapshot under lock, validates, then applies its delta and appends its
//! ledger entry in the caller's transaction.

use crate::ShopError;
use crate::base::{ColorMl, Sku, TimeId};
use crate::capacity::CapacityPolicy;
use crate::catalog;
use crate::ledger::{self, EntryType, InventoryDelta};
use crate::snapshot::{self, StateSnapshot};
use crate::store::Transaction;
use serde::{Deserialize, Serialize};

/// A barrel order line from a wholesale delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Barrel {
    pub sku: String,
    pub ml_per_barrel: i64,
    /// One-hot `[red, green, blue, dark]` color of the barrel's contents.
    pub potion_type: [i64; 4],
    pub price: i64,
    pub quantity: i64,
}

impl Barrel {
    fn validate(&self) -> Result<(), ShopError> {
        let one_hot = self.potion_type.iter().all(|part| *part == 0 || *part == 1)
            && self.potion_type.iter().sum::<i64>() == 1;
        if !one_hot || self.ml_per_barrel <= 0 || self.quantity <= 0 || self.price < 0 {
            return Err(ShopError::InvalidQuantity);
        }
        Ok(())
    }

    /// Total ml delivered by this line. Overflow is an invalid quantity.
    pub fn ml(&self) -> Result<ColorMl, ShopError> {
        self.ml_per_barrel
            .checked_mul(self.quantity)
            .and_then(|ml| ColorMl::from_array(self.potion_type).checked_scaled(ml))
            .ok_or(ShopError::InvalidQuantity)
    }

    pub fn cost(&self) -> Result<i64, ShopError> {
        self.price
            .checked_mul(self.quantity)
            .ok_or(ShopError::InvalidQuantity)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarrelDelivery {
    pub gold_paid: i64,
    pub ml_added: ColorMl,
}

fn ensure_gold(snapshot: &StateSnapshot, needed: i64) -> Result<(), ShopError> {
    if needed > snapshot.gold {
        return Err(ShopError::InsufficientGold {
            needed,
            available: snapshot.gold,
        });
    }
    Ok(())
}

/// Pays for `barrels` and adds their contents to the ml stock.
///
/// # Errors
///
/// - [`ShopError::InvalidQuantity`] - an empty order, a malformed barrel, or
///   an order whose cost or volume does not fit in an `i64`.
/// - [`ShopError::InsufficientGold`] - the order costs more than the shop has.
/// - [`ShopError::CapacityExceeded`] - the ml would not fit.
pub fn deliver_barrels(
    tx: &mut Transaction<'_>,
    policy: &CapacityPolicy,
    barrels: &[Barrel],
    time_reference: TimeId,
) -> Result<BarrelDelivery, ShopError> {
    if barrels.is_empty() {
        return Err(ShopError::InvalidQuantity);
    }
    let mut gold_paid = 0_i64;
    let mut ml_added = ColorMl::ZERO;
    for barrel in barrels {
        barrel.validate()?;
        gold_paid = gold_paid
            .checked_add(barrel.cost()?)
            .ok_or(ShopError::InvalidQuantity)?;
        ml_added = ml_added
            .checked_add(barrel.ml()?)
            .ok_or(ShopError::InvalidQuantity)?;
    }

    let current = snapshot::read(tx)?;
    let proposed_ml = ml_added
        .checked_total()
        .and_then(|ml| ml.checked_add(current.total_ml))
        .ok_or(ShopError::InvalidQuantity)?;
    ensure_gold(&current, gold_paid)?;
    policy.validate(proposed_ml, current.total_potions, current.capacities())?;

    let delta = InventoryDelta::gold(-gold_paid).with_ml(ml_added);
    snapshot::apply_delta(tx, &delta)?;
    ledger::append(tx, time_reference, EntryType::BarrelPurchase, &delta)?;
    Ok(BarrelDelivery {
        gold_paid,
        ml_added,
    })
}

/// Turns ml into `quantity` potions of `sku`. Returns the new on-hand count.
///
/// # Errors
///
/// - [`ShopError::InvalidQuantity`] - `quantity` is zero.
/// - [`ShopError::UnknownSku`] - `sku` is not in the catalog.
/// - [`ShopError::CapacityExceeded`] - the potions would not fit.
/// - [`ShopError::NegativeBalance`] - not enough ml of some color.
pub fn bottle_potions(
    tx: &mut Transaction<'_>,
    policy: &CapacityPolicy,
    sku: &Sku,
    quantity: u32,
    time_reference: TimeId,
) -> Result<i64, ShopError> {
    if quantity == 0 {
        return Err(ShopError::InvalidQuantity);
    }
    let quantity = i64::from(quantity);
    let mut potion = catalog::get_for_update(tx, sku)?;

    let current = snapshot::read(tx)?;
    let ml_used = potion.recipe.scaled(quantity);
    policy.validate(
        current.total_ml - ml_used.total(),
        current.total_potions + quantity,
        current.capacities(),
    )?;

    let delta = InventoryDelta::default()
        .with_ml(-ml_used)
        .with_sku_potions(sku.clone(), quantity);
    snapshot::apply_delta(tx, &delta)?;
    ledger::append(tx, time_reference, EntryType::PotionBottling, &delta)?;

    potion.current_quantity += quantity;
    let on_hand = potion.current_quantity;
    catalog::update(tx, potion);
    Ok(on_hand)
}

/// Buys extra capacity units at `unit_price` gold each.
///
/// # Errors
///
/// - [`ShopError::InvalidQuantity`] - no units requested, or a cost that
///   overflows.
/// - [`ShopError::InsufficientGold`] - the shop cannot afford them.
pub fn purchase_capacity(
    tx: &mut Transaction<'_>,
    potion_units: u32,
    ml_units: u32,
    unit_price: i64,
    time_reference: TimeId,
) -> Result<i64, ShopError> {
    if potion_units == 0 && ml_units == 0 {
        return Err(ShopError::InvalidQuantity);
    }
    let units = i64::from(potion_units) + i64::from(ml_units);
    let cost = units
        .checked_mul(unit_price)
        .ok_or(ShopError::InvalidQuantity)?;

    let current = snapshot::read(tx)?;
    ensure_gold(&current, cost)?;

    let delta =
        InventoryDelta::gold(-cost).with_capacity(i64::from(potion_units), i64::from(ml_units));
    snapshot::apply_delta(tx, &delta)?;
    ledger::append(tx, time_reference, EntryType::CapacityUpgrade, &delta)?;
    Ok(cost)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock;
    use crate::error::CapacityResource;
    use crate::store::Store;
    use std::time::Duration;

    const POLICY: CapacityPolicy = CapacityPolicy::new(10_000, 50);

    fn shop(gold: i64) -> Store {
        let store = Store::new(Duration::from_millis(100));
        let mut tx = store.begin_exclusive();
        for tick in clock::calendar().into_iter().take(4) {
            tx.put(tick);
        }
        catalog::seed_defaults(&mut tx, 50).unwrap();
        snapshot::overwrite(&mut tx, StateSnapshot::zeroed()).unwrap();
        snapshot::apply_delta(&mut tx, &InventoryDelta::gold(gold)).unwrap();
        tx.commit();
        store
    }

    fn red_barrel(ml_per_barrel: i64, price: i64, quantity: i64) -> Barrel {
        Barrel {
            sku: "SMALL_RED_BARREL".to_string(),
            ml_per_barrel,
            potion_type: [1, 0, 0, 0],
            price,
            quantity,
        }
    }

    #[test]
    fn barrels_add_ml_and_cost_gold() {
        let store = shop(500);
        let mut tx = store.begin();
        let delivery =
            deliver_barrels(&mut tx, &POLICY, &[red_barrel(500, 100, 2)], TimeId(1)).unwrap();
        assert_eq!(delivery.gold_paid, 200);
        assert_eq!(delivery.ml_added, ColorMl::new(1_000, 0, 0, 0));

        let snapshot = snapshot::read(&mut tx).unwrap();
        assert_eq!(snapshot.gold, 300);
        assert_eq!(snapshot.red_ml, 1_000);
        assert_eq!(snapshot.total_ml, 1_000);
    }

    #[test]
    fn barrels_over_capacity_are_rejected() {
        let store = shop(10_000);
        let mut tx = store.begin();
        let result = deliver_barrels(&mut tx, &POLICY, &[red_barrel(10_000, 1, 2)], TimeId(1));
        assert!(matches!(
            result,
            Err(ShopError::CapacityExceeded(err)) if err.resource == CapacityResource::Ml
        ));
    }

    #[test]
    fn barrels_need_gold() {
        let store = shop(50);
        let mut tx = store.begin();
        assert_eq!(
            deliver_barrels(&mut tx, &POLICY, &[red_barrel(500, 60, 1)], TimeId(1)),
            Err(ShopError::InsufficientGold {
                needed: 60,
                available: 50
            })
        );
    }

    #[test]
    fn malformed_barrel_is_rejected() {
        let store = shop(500);
        let mut tx = store.begin();
        let mut barrel = red_barrel(500, 10, 1);
        barrel.potion_type = [1, 1, 0, 0];
        assert_eq!(
            deliver_barrels(&mut tx, &POLICY, &[barrel], TimeId(1)),
            Err(ShopError::InvalidQuantity)
        );
    }

    #[test]
    fn overflowing_barrel_cost_is_rejected_not_wrapped() {
        let store = shop(100);
        let mut tx = store.begin();
        assert_eq!(
            deliver_barrels(&mut tx, &POLICY, &[red_barrel(1, 1 << 62, 4)], TimeId(1)),
            Err(ShopError::InvalidQuantity)
        );
        assert_eq!(
            deliver_barrels(&mut tx, &POLICY, &[red_barrel(i64::MAX, 0, 2)], TimeId(1)),
            Err(ShopError::InvalidQuantity)
        );
        drop(tx);

        let mut tx = store.begin();
        let after = snapshot::read(&mut tx).unwrap();
        assert_eq!(after.gold, 100);
        assert_eq!(after.total_ml, 0);
        assert!(ledger::entries(&mut tx).unwrap().is_empty());
    }

    #[test]
    fn overflowing_order_total_is_rejected() {
        let store = shop(100);
        let mut tx = store.begin();
        let half = red_barrel(1, i64::MAX / 2 + 1, 1);
        assert_eq!(
            deliver_barrels(&mut tx, &POLICY, &[half.clone(), half], TimeId(1)),
            Err(ShopError::InvalidQuantity)
        );
    }

    #[test]
    fn bottling_converts_ml_into_potions() {
        let store = shop(500);
        let mut tx = store.begin();
        deliver_barrels(&mut tx, &POLICY, &[red_barrel(500, 100, 1)], TimeId(1)).unwrap();
        let on_hand = bottle_potions(&mut tx, &POLICY, &Sku::from("RED_POTION"), 3, TimeId(2)).unwrap();
        assert_eq!(on_hand, 3);

        let snapshot = snapshot::read(&mut tx).unwrap();
        assert_eq!(snapshot.red_ml, 200);
        assert_eq!(snapshot.total_potions, 3);
    }

    #[test]
    fn bottling_without_ml_is_rejected() {
        let store = shop(500);
        let mut tx = store.begin();
        assert_eq!(
            bottle_potions(&mut tx, &POLICY, &Sku::from("GREEN_POTION"), 1, TimeId(1)),
            Err(ShopError::NegativeBalance("green_ml"))
        );
    }

    #[test]
    fn bottling_over_potion_capacity_is_rejected() {
        let policy = CapacityPolicy::new(10_000, 2);
        let store = shop(500);
        let mut tx = store.begin();
        deliver_barrels(&mut tx, &policy, &[red_barrel(500, 100, 1)], TimeId(1)).unwrap();
        let result = bottle_potions(&mut tx, &policy, &Sku::from("RED_POTION"), 3, TimeId(1));
        assert!(matches!(
            result,
            Err(ShopError::CapacityExceeded(err)) if err.resource == CapacityResource::Potions
        ));
    }

    #[test]
    fn capacity_purchase_raises_limits() {
        let store = shop(2_500);
        let mut tx = store.begin();
        assert_eq!(purchase_capacity(&mut tx, 1, 1, 1_000, TimeId(1)), Ok(2_000));
        let snapshot = snapshot::read(&mut tx).unwrap();
        assert_eq!(snapshot.potion_capacity_units, 2);
        assert_eq!(snapshot.ml_capacity_units, 2);
        assert_eq!(snapshot.gold, 500);
    }

    #[test]
    fn capacity_purchase_needs_gold() {
        let store = shop(100);
        let mut tx = store.begin();
        assert!(matches!(
            purchase_capacity(&mut tx, 1, 0, 1_000, TimeId(1)),
            Err(ShopError::InsufficientGold { .. })
        ));
    }

    #[test]
    fn overflowing_capacity_cost_is_rejected() {
        let store = shop(100);
        let mut tx = store.begin();
        assert_eq!(
            purchase_capacity(&mut tx, 2, 0, i64::MAX, TimeId(1)),
            Err(ShopError::InvalidQuantity)
        );
    }
}
