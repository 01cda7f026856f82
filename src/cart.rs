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

//! Cart lifecycle.
//!
//! Carts follow a two-state machine:
//!
//! ```text
//! OPEN ──set_item_quantity──► OPEN
//!   │
//!   └──────process_checkout──► CHECKED_OUT (terminal)
//! ```
//!
//! Checkout is the only cart operation that touches inventory, gold or the
//! ledger, and it does so all-or-nothing inside the caller's transaction.

use crate::ShopError;
use crate::base::{CartId, Sku, TimeId, VisitId};
use crate::catalog::{self, Potion};
use crate::clock;
use crate::ledger::{self, EntryType, InventoryDelta};
use crate::locks::LockKey;
use crate::snapshot;
use crate::store::{Sequence, Transaction};
use serde::{Deserialize, Serialize};

/// A visiting customer, as reported by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_name: String,
    pub character_class: String,
    pub level: u32,
}

/// A customer recorded as part of a visit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRecord {
    pub customer_id: u64,
    pub visit_id: VisitId,
    pub customer: Customer,
}

/// A batch of customers entering the shop at one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visit {
    pub visit_id: VisitId,
    /// Identifier the caller used for this visit.
    pub external_visit_id: u64,
    pub time_reference: TimeId,
    pub customer_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CartStatus {
    Open,
    CheckedOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub cart_id: CartId,
    pub customer: Customer,
    pub visit_id: VisitId,
    pub status: CartStatus,
    pub created_at_time_reference: TimeId,
    pub payment_method: Option<String>,
    pub checked_out_at: Option<TimeId>,
}

/// One SKU's requested quantity within a cart. Always positive; a quantity
/// of zero removes the row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub cart_id: CartId,
    pub item_sku: Sku,
    pub quantity: i64,
    pub updated_at: TimeId,
}

/// Per-SKU audit record written by checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutLineItem {
    pub line_item_id: u64,
    pub cart_id: CartId,
    pub item_sku: Sku,
    pub customer_name: String,
    pub quantity: i64,
    pub line_item_total: i64,
    pub time_reference: TimeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutResult {
    pub total_potions_bought: i64,
    pub total_gold_paid: i64,
}

/// Records a batch of customers arriving at `time_reference`.
///
/// Writes the visit, one row per customer and a zero-valued `CART_VISIT`
/// ledger entry.
pub fn record_customer_visit(
    tx: &mut Transaction<'_>,
    external_visit_id: u64,
    customers: &[Customer],
    time_reference: TimeId,
) -> Result<VisitId, ShopError> {
    clock::get(tx, time_reference)?;

    let visit_id = VisitId(tx.next_id(Sequence::Visit));
    tx.put(Visit {
        visit_id,
        external_visit_id,
        time_reference,
        customer_count: customers.len(),
    });
    for customer in customers {
        let customer_id = tx.next_id(Sequence::Customer);
        tx.put(CustomerRecord {
            customer_id,
            visit_id,
            customer: customer.clone(),
        });
    }
    ledger::append(
        tx,
        time_reference,
        EntryType::CartVisit,
        &InventoryDelta::default(),
    )?;
    Ok(visit_id)
}

pub fn latest_visit(tx: &Transaction<'_>) -> Result<Visit, ShopError> {
    tx.last::<Visit>().ok_or(ShopError::NoVisitRecorded)
}

pub fn visit_customers(tx: &Transaction<'_>, visit_id: VisitId) -> Vec<CustomerRecord> {
    tx.scan::<CustomerRecord>()
        .into_iter()
        .filter(|record| record.visit_id == visit_id)
        .collect()
}

/// Opens a cart for `customer` during `visit_id`.
///
/// # Errors
///
/// - [`ShopError::InvalidTimeReference`] - unknown tick.
/// - [`ShopError::VisitNotFound`] - unknown visit.
pub fn create_cart(
    tx: &mut Transaction<'_>,
    customer: Customer,
    time_reference: TimeId,
    visit_id: VisitId,
) -> Result<CartId, ShopError> {
    clock::get(tx, time_reference)?;
    if tx.get::<Visit>(&visit_id).is_none() {
        return Err(ShopError::VisitNotFound(visit_id));
    }

    let cart_id = CartId(tx.next_id(Sequence::Cart));
    tx.put(Cart {
        cart_id,
        customer,
        visit_id,
        status: CartStatus::Open,
        created_at_time_reference: time_reference,
        payment_method: None,
        checked_out_at: None,
    });
    Ok(cart_id)
}

pub fn get_cart(tx: &Transaction<'_>, cart_id: CartId) -> Result<Cart, ShopError> {
    tx.get::<Cart>(&cart_id)
        .ok_or(ShopError::CartNotFound(cart_id))
}

/// Locks the cart and checks it can still be changed.
fn lock_open_cart(tx: &mut Transaction<'_>, cart_id: CartId) -> Result<Cart, ShopError> {
    tx.lock(LockKey::Cart(cart_id))?;
    let cart = get_cart(tx, cart_id)?;
    if cart.status == CartStatus::CheckedOut {
        return Err(ShopError::CartAlreadyCheckedOut(cart_id));
    }
    Ok(cart)
}

/// Returns the cart's line items in SKU order.
pub fn cart_items(tx: &Transaction<'_>, cart_id: CartId) -> Vec<CartItem> {
    tx.scan::<CartItem>()
        .into_iter()
        .filter(|item| item.cart_id == cart_id)
        .collect()
}

/// Sets how many of `sku` the cart wants. Zero removes the line.
///
/// Only the pending order changes; inventory, gold and the ledger are left
/// alone until checkout.
///
/// # Errors
///
/// - [`ShopError::CartNotFound`] - unknown cart.
/// - [`ShopError::CartAlreadyCheckedOut`] - the cart is closed.
/// - [`ShopError::UnknownSku`] - `sku` is not in the catalog.
/// - [`ShopError::InvalidTimeReference`] - unknown tick.
pub fn set_item_quantity(
    tx: &mut Transaction<'_>,
    cart_id: CartId,
    sku: &Sku,
    quantity: u32,
    time_reference: TimeId,
) -> Result<(), ShopError> {
    lock_open_cart(tx, cart_id)?;
    if !catalog::exists(tx, sku) {
        return Err(ShopError::UnknownSku(sku.clone()));
    }
    clock::get(tx, time_reference)?;

    let key = (cart_id, sku.clone());
    if quantity == 0 {
        if tx.get::<CartItem>(&key).is_some() {
            tx.delete::<CartItem>(&key);
        }
        return Ok(());
    }
    tx.put(CartItem {
        cart_id,
        item_sku: sku.clone(),
        quantity: i64::from(quantity),
        updated_at: time_reference,
    });
    Ok(())
}

/// Converts the cart's line items into a sale.
///
/// Every potion row in the cart is locked in SKU order and every line is
/// checked against stock before anything is written, so a rejected checkout
/// leaves no trace. On success the potion quantities drop, gold rises, one
/// aggregate `CART_CHECKOUT` entry is appended, a line-item audit row is
/// written per SKU and the cart is closed.
///
/// # Errors
///
/// - [`ShopError::CartNotFound`] / [`ShopError::CartAlreadyCheckedOut`]
/// - [`ShopError::EmptyCart`] - no line items.
/// - [`ShopError::InsufficientStock`] - some line asks for more than is on hand.
/// - [`ShopError::InvalidQuantity`] - the cart total does not fit in an `i64`.
/// - [`ShopError::InvalidTimeReference`] - unknown tick.
pub fn process_checkout(
    tx: &mut Transaction<'_>,
    cart_id: CartId,
    payment_method: &str,
    time_reference: TimeId,
) -> Result<CheckoutResult, ShopError> {
    let mut cart = lock_open_cart(tx, cart_id)?;
    clock::get(tx, time_reference)?;

    let items = cart_items(tx, cart_id);
    if items.is_empty() {
        return Err(ShopError::EmptyCart(cart_id));
    }

    tx.lock_all(
        items
            .iter()
            .map(|item| LockKey::Potion(item.item_sku.clone())),
    )?;
    let mut lines: Vec<(CartItem, Potion, i64)> = Vec::with_capacity(items.len());
    let mut total_gold_paid = 0_i64;
    for item in items {
        let potion = catalog::get(tx, &item.item_sku)?;
        if item.quantity > potion.current_quantity {
            return Err(ShopError::InsufficientStock {
                sku: item.item_sku,
                requested: item.quantity,
                available: potion.current_quantity,
            });
        }
        let line_item_total = item
            .quantity
            .checked_mul(potion.price)
            .ok_or(ShopError::InvalidQuantity)?;
        total_gold_paid = total_gold_paid
            .checked_add(line_item_total)
            .ok_or(ShopError::InvalidQuantity)?;
        lines.push((item, potion, line_item_total));
    }
    let total_potions_bought: i64 = lines.iter().map(|(item, _, _)| item.quantity).sum();

    for (item, mut potion, line_item_total) in lines {
        potion.current_quantity -= item.quantity;
        let line_item_id = tx.next_id(Sequence::LineItem);
        tx.put(CheckoutLineItem {
            line_item_id,
            cart_id,
            item_sku: item.item_sku,
            customer_name: cart.customer.customer_name.clone(),
            quantity: item.quantity,
            line_item_total,
            time_reference,
        });
        catalog::update(tx, potion);
    }

    let delta = InventoryDelta::gold(total_gold_paid).with_potions(-total_potions_bought);
    snapshot::apply_delta(tx, &delta)?;
    ledger::append(tx, time_reference, EntryType::CartCheckout, &delta)?;

    cart.status = CartStatus::CheckedOut;
    cart.payment_method = Some(payment_method.to_string());
    cart.checked_out_at = Some(time_reference);
    tx.put(cart);
    tx.retire_lock(LockKey::Cart(cart_id));

    Ok(CheckoutResult {
        total_potions_bought,
        total_gold_paid,
    })
}

/// Returns the checkout audit log in write order.
pub fn line_items(tx: &Transaction<'_>) -> Vec<CheckoutLineItem> {
    tx.scan::<CheckoutLineItem>()
}
