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

//! Shop engine.
//!
//! The [`Engine`] owns the [`Store`] and the shop configuration, and is the
//! entry point for every operation. Each call runs as one transaction:
//!
//! - **Success**: the component's writes are committed together.
//! - **Failure**: the transaction is dropped, so nothing it wrote is kept.
//!
//! # Thread Safety
//!
//! `Engine` is `Sync`; share it between threads by reference or `Arc`.
//! Operations that touch different carts and potions run in parallel, while
//! operations on the same rows serialize on row locks. [`Engine::reset`]
//! waits for in-flight operations and holds off new ones until it finishes.

use crate::ShopError;
use crate::base::{CartId, Sku, TimeId, VisitId};
use crate::capacity::CapacityPolicy;
use crate::cart::{self, Cart, CartItem, CheckoutLineItem, CheckoutResult, Customer, Visit};
use crate::catalog::{self, CatalogItem, Potion};
use crate::clock;
use crate::config::ShopConfig;
use crate::error::ErrorCategory;
use crate::inventory::{self, Barrel, BarrelDelivery};
use crate::ledger::{self, LedgerEntry};
use crate::reset;
use crate::snapshot::{self, StateSnapshot};
use crate::store::{Store, Transaction};
use crate::strategy::{self, Strategy};
use crate::validator::{self, CurrentState, Reconciliation};

/// Transactional potion shop.
///
/// # Invariants
///
/// - The snapshot always equals the sum of the ledger since the last reset.
/// - Potion quantities, gold and ml never go negative.
/// - Inventory never exceeds purchased capacity.
/// - A checked-out cart never changes again.
#[derive(Debug)]
pub struct Engine {
    store: Store,
    config: ShopConfig,
    policy: CapacityPolicy,
}

impl Engine {
    /// Creates a shop with the calendar and strategies seeded, then resets
    /// it.
    ///
    /// # Errors
    ///
    /// Fails if the initial reset fails, for example when
    /// `config.initial_strategy` names an unknown strategy.
    pub fn new(config: ShopConfig) -> Result<Self, ShopError> {
        let engine = Engine {
            store: Store::new(config.lock_timeout()),
            policy: config.capacity_policy(),
            config,
        };

        let mut tx = engine.store.begin_exclusive();
        for tick in clock::calendar() {
            tx.put(tick);
        }
        for strategy in strategy::defaults() {
            tx.put(strategy);
        }
        reset::reset(&mut tx, &engine.config)?;
        tx.commit();
        Ok(engine)
    }

    pub fn config(&self) -> &ShopConfig {
        &self.config
    }

    /// Runs `work` in a transaction and commits it if `work` succeeds.
    fn transact<T>(
        &self,
        operation: &'static str,
        work: impl FnOnce(&mut Transaction<'_>) -> Result<T, ShopError>,
    ) -> Result<T, ShopError> {
        let tx = self.store.begin();
        self.finish(operation, tx, work)
    }

    fn transact_exclusive<T>(
        &self,
        operation: &'static str,
        work: impl FnOnce(&mut Transaction<'_>) -> Result<T, ShopError>,
    ) -> Result<T, ShopError> {
        let tx = self.store.begin_exclusive();
        self.finish(operation, tx, work)
    }

    fn finish<T>(
        &self,
        operation: &'static str,
        mut tx: Transaction<'_>,
        work: impl FnOnce(&mut Transaction<'_>) -> Result<T, ShopError>,
    ) -> Result<T, ShopError> {
        tracing::debug!(operation, txn = tx.id().0, "begin");
        match work(&mut tx) {
            Ok(value) => {
                tx.commit();
                Ok(value)
            }
            Err(err) => {
                log_failure(operation, &err);
                Err(err)
            }
        }
    }

    /// Runs read-only `work`. Nothing is committed.
    fn read<T>(
        &self,
        work: impl FnOnce(&mut Transaction<'_>) -> Result<T, ShopError>,
    ) -> Result<T, ShopError> {
        let mut tx = self.store.begin();
        work(&mut tx)
    }

    /// Returns the shop to its initial state. See [`reset::reset`].
    pub fn reset(&self) -> Result<TimeId, ShopError> {
        self.transact_exclusive("reset", |tx| reset::reset(tx, &self.config))
    }

    pub fn current_time(&self) -> Result<TimeId, ShopError> {
        self.read(|tx| clock::current(tx))
    }

    /// Moves the game clock to `day` at `hour`.
    ///
    /// # Errors
    ///
    /// Returns [`ShopError::UnknownGameTime`] if the calendar has no such tick.
    pub fn set_current_time(&self, day: &str, hour: u8) -> Result<TimeId, ShopError> {
        let time_id = self.transact("set_current_time", |tx| {
            let time_id = clock::find(tx, day, hour).ok_or_else(|| ShopError::UnknownGameTime {
                day: day.to_string(),
                hour,
            })?;
            clock::set_current(tx, time_id)?;
            Ok(time_id)
        })?;
        tracing::info!(%time_id, day, hour, "game time set");
        Ok(time_id)
    }

    pub fn record_visit(
        &self,
        external_visit_id: u64,
        customers: &[Customer],
        time_reference: TimeId,
    ) -> Result<VisitId, ShopError> {
        let visit_id = self.transact("record_visit", |tx| {
            cart::record_customer_visit(tx, external_visit_id, customers, time_reference)
        })?;
        tracing::info!(%visit_id, customers = customers.len(), "visit recorded");
        Ok(visit_id)
    }

    pub fn latest_visit(&self) -> Result<Visit, ShopError> {
        self.read(|tx| cart::latest_visit(tx))
    }

    pub fn create_cart(
        &self,
        customer: Customer,
        time_reference: TimeId,
        visit_id: VisitId,
    ) -> Result<CartId, ShopError> {
        let cart_id = self.transact("create_cart", |tx| {
            cart::create_cart(tx, customer, time_reference, visit_id)
        })?;
        tracing::info!(%cart_id, %visit_id, "cart created");
        Ok(cart_id)
    }

    pub fn set_item_quantity(
        &self,
        cart_id: CartId,
        sku: &Sku,
        quantity: u32,
        time_reference: TimeId,
    ) -> Result<(), ShopError> {
        self.transact("set_item_quantity", |tx| {
            cart::set_item_quantity(tx, cart_id, sku, quantity, time_reference)
        })?;
        tracing::debug!(%cart_id, %sku, quantity, "cart item set");
        Ok(())
    }

    /// Checks the cart out. See [`cart::process_checkout`].
    pub fn checkout(
        &self,
        cart_id: CartId,
        payment_method: &str,
        time_reference: TimeId,
    ) -> Result<CheckoutResult, ShopError> {
        let result = self.transact("checkout", |tx| {
            cart::process_checkout(tx, cart_id, payment_method, time_reference)
        })?;
        tracing::info!(
            %cart_id,
            potions = result.total_potions_bought,
            gold = result.total_gold_paid,
            "cart checked out"
        );
        Ok(result)
    }

    pub fn deliver_barrels(
        &self,
        barrels: &[Barrel],
        time_reference: TimeId,
    ) -> Result<BarrelDelivery, ShopError> {
        let delivery = self.transact("deliver_barrels", |tx| {
            inventory::deliver_barrels(tx, &self.policy, barrels, time_reference)
        })?;
        tracing::info!(
            gold = delivery.gold_paid,
            ml = delivery.ml_added.total(),
            "barrels delivered"
        );
        Ok(delivery)
    }

    /// Bottles `quantity` potions of `sku` and returns the new on-hand count.
    pub fn bottle_potions(
        &self,
        sku: &Sku,
        quantity: u32,
        time_reference: TimeId,
    ) -> Result<i64, ShopError> {
        let on_hand = self.transact("bottle_potions", |tx| {
            inventory::bottle_potions(tx, &self.policy, sku, quantity, time_reference)
        })?;
        tracing::info!(%sku, quantity, on_hand, "potions bottled");
        Ok(on_hand)
    }

    /// Buys capacity units at the configured unit price and returns the cost.
    pub fn purchase_capacity(
        &self,
        potion_units: u32,
        ml_units: u32,
        time_reference: TimeId,
    ) -> Result<i64, ShopError> {
        let cost = self.transact("purchase_capacity", |tx| {
            inventory::purchase_capacity(
                tx,
                potion_units,
                ml_units,
                self.config.capacity_unit_price,
                time_reference,
            )
        })?;
        tracing::info!(potion_units, ml_units, cost, "capacity purchased");
        Ok(cost)
    }

    pub fn activate_strategy(&self, name: &str, time_reference: TimeId) -> Result<(), ShopError> {
        self.transact("activate_strategy", |tx| {
            let strategy_id = strategy::lookup(tx, name)?;
            strategy::activate(tx, strategy_id, time_reference)
        })?;
        tracing::info!(strategy = name, "strategy activated");
        Ok(())
    }

    pub fn active_strategy(&self) -> Option<Strategy> {
        let tx = self.store.begin();
        strategy::current(&tx)
    }

    /// The storefront listing: priced potions, best stocked first, up to the
    /// configured limit. Sold-out potions stay listed.
    pub fn catalog(&self) -> Vec<CatalogItem> {
        let tx = self.store.begin();
        catalog::list_available(&tx, self.config.catalog_limit)
    }

    /// Every potion in the catalog, in SKU order.
    pub fn potions(&self) -> Vec<Potion> {
        let tx = self.store.begin();
        catalog::all(&tx)
    }

    pub fn potion(&self, sku: &Sku) -> Result<Potion, ShopError> {
        self.read(|tx| catalog::get(tx, sku))
    }

    pub fn cart(&self, cart_id: CartId) -> Result<Cart, ShopError> {
        self.read(|tx| cart::get_cart(tx, cart_id))
    }

    pub fn cart_items(&self, cart_id: CartId) -> Result<Vec<CartItem>, ShopError> {
        self.read(|tx| {
            cart::get_cart(tx, cart_id)?;
            Ok(cart::cart_items(tx, cart_id))
        })
    }

    pub fn state(&self) -> Result<CurrentState, ShopError> {
        self.read(|tx| validator::get_current_state(tx))
    }

    pub fn snapshot(&self) -> Result<StateSnapshot, ShopError> {
        self.read(|tx| snapshot::read(tx))
    }

    /// Returns the ledger since the last reset, oldest first.
    pub fn ledger(&self) -> Result<Vec<LedgerEntry>, ShopError> {
        self.read(|tx| ledger::entries(tx))
    }

    pub fn line_items(&self) -> Vec<CheckoutLineItem> {
        let tx = self.store.begin();
        cart::line_items(&tx)
    }

    /// Compares the snapshot with the ledger and the catalog.
    pub fn reconcile(&self) -> Result<Reconciliation, ShopError> {
        let reconciliation = self.read(|tx| validator::reconcile(tx))?;
        if !reconciliation.is_consistent() {
            tracing::error!(
                discrepancies = reconciliation.discrepancies.len(),
                "reconciliation found discrepancies"
            );
        }
        Ok(reconciliation)
    }

    pub fn verify_reset_state(&self) -> bool {
        let mut tx = self.store.begin();
        validator::verify_reset_state(&mut tx, self.config.initial_gold)
    }
}

fn log_failure(operation: &'static str, err: &ShopError) {
    match err.category() {
        ErrorCategory::ConsistencyFailure => {
            tracing::error!(operation, error = %err, "consistency failure, rolled back");
        }
        category => {
            tracing::warn!(
                operation,
                %category,
                retryable = category.is_retryable(),
                error = %err,
                "operation rejected"
            );
        }
    }
}
