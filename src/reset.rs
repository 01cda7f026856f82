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

//! Shop reset.
//!
//! Returns the shop to its starting state in one exclusive transaction.
//! Nothing is visible to other callers until the transaction commits, and a
//! failure at any step leaves the previous state untouched.

use crate::ShopError;
use crate::base::TimeId;
use crate::cart::{Cart, CartItem, CheckoutLineItem, CustomerRecord, Visit};
use crate::catalog;
use crate::clock::{self, ClockEntry};
use crate::config::ShopConfig;
use crate::ledger::{self, EntryType, InventoryDelta, LedgerEntry};
use crate::snapshot::{self, StateSnapshot};
use crate::store::Transaction;
use crate::strategy::{self, ActiveStrategy};
use crate::validator;

/// Resets the shop and returns the tick it now starts at.
///
/// Clears all transactional history, restores the default catalog with no
/// stock, zeroes the snapshot, restarts the clock at the first tick, grants
/// `initial_gold` through an `ADMIN_CHANGE` ledger entry and activates
/// `initial_strategy`. The result is verified before returning.
///
/// # Errors
///
/// - [`ShopError::ConsistencyFailure`] - `tx` is not exclusive, the calendar
///   is missing, or the resulting state fails verification.
/// - [`ShopError::StrategyNotFound`] - `initial_strategy` is not defined.
pub fn reset(tx: &mut Transaction<'_>, config: &ShopConfig) -> Result<TimeId, ShopError> {
    if !tx.is_exclusive() {
        return Err(ShopError::ConsistencyFailure(
            "reset requires an exclusive transaction".to_string(),
        ));
    }

    tx.truncate::<ActiveStrategy>()?;
    tx.truncate::<ClockEntry>()?;
    tx.truncate::<LedgerEntry>()?;
    tx.truncate::<CheckoutLineItem>()?;
    tx.truncate::<CartItem>()?;
    tx.truncate::<Cart>()?;
    tx.truncate::<CustomerRecord>()?;
    tx.truncate::<Visit>()?;
    tx.prune_locks();

    let potions = catalog::seed_defaults(tx, config.potion_price)?;
    snapshot::overwrite(tx, StateSnapshot::zeroed())?;

    let start = clock::earliest(tx)?;
    clock::set_current(tx, start)?;

    let grant = InventoryDelta::gold(config.initial_gold);
    snapshot::apply_delta(tx, &grant)?;
    ledger::append(tx, start, EntryType::AdminChange, &grant)?;

    let strategy_id = strategy::lookup(tx, &config.initial_strategy)?;
    strategy::activate(tx, strategy_id, start)?;

    if !validator::verify_reset_state(tx, config.initial_gold) {
        return Err(ShopError::ConsistencyFailure(
            "state after reset does not match reset values".to_string(),
        ));
    }

    tracing::info!(
        %start,
        potions,
        gold = config.initial_gold,
        strategy = %config.initial_strategy,
        "shop reset"
    );
    Ok(start)
}
