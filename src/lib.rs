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

//! # Potion Shop
//!
//! A transactional inventory and ledger engine for a potion shop. Every
//! change to gold, ml or potion stock is an entry in an append-only ledger,
//! and the current-state snapshot is kept equal to the sum of that ledger.
//!
//! ## Core Components
//!
//! - [`Engine`]: Runs each shop operation as one atomic transaction
//! - [`Store`]: Embedded tables with row locks and commit/rollback
//! - [`LedgerEntry`]: One signed change to the shop's inventory
//! - [`StateSnapshot`]: Live totals, reconciled against the ledger
//! - [`ShopError`]: Operation failures, grouped by [`ErrorCategory`]
//!
//! ## Example
//!
//! ```
//! use potion_shop::{Customer, Engine, ShopConfig, Sku};
//!
//! let engine = Engine::new(ShopConfig::default()).unwrap();
//! let now = engine.current_time().unwrap();
//!
//! let visit = engine.record_visit(1, &[], now).unwrap();
//! let customer = Customer {
//!     customer_name: "Ada".to_string(),
//!     character_class: "Wizard".to_string(),
//!     level: 7,
//! };
//! let cart = engine.create_cart(customer, now, visit).unwrap();
//! engine.set_item_quantity(cart, &Sku::from("RED_POTION"), 0, now).unwrap();
//!
//! assert_eq!(engine.state().unwrap().gold, 100);
//! assert!(engine.reconcile().unwrap().is_consistent());
//! ```
//!
//! ## Thread Safety
//!
//! The engine handles concurrent operations, serializing only those that
//! touch the same cart or potion rows.

mod base;
pub mod capacity;
pub mod cart;
pub mod catalog;
pub mod clock;
pub mod config;
mod engine;
pub mod error;
pub mod inventory;
pub mod ledger;
pub mod locks;
pub mod reset;
pub mod snapshot;
pub mod store;
pub mod strategy;
pub mod validator;

pub use base::{CartId, ColorMl, EntryId, Sku, StrategyId, TimeId, VisitId};
pub use capacity::{Capacities, CapacityLimits, CapacityPolicy};
pub use cart::{Cart, CartItem, CartStatus, CheckoutLineItem, CheckoutResult, Customer, Visit};
pub use catalog::{CatalogItem, Potion};
pub use config::{ConfigError, ShopConfig};
pub use engine::Engine;
pub use error::{CapacityExceeded, CapacityResource, ErrorCategory, ShopError};
pub use inventory::{Barrel, BarrelDelivery};
pub use ledger::{EntryType, InventoryDelta, LedgerEntry};
pub use snapshot::StateSnapshot;
pub use store::{Store, Transaction};
pub use validator::{CurrentState, Discrepancy, Reconciliation};
