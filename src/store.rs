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

//! Embedded transactional store.
//!
//! The store holds every table the shop uses and hands out [`Transaction`]s,
//! the unit of work passed explicitly through every operation:
//!
//! - Writes are buffered in the transaction and published together at
//!   [`Transaction::commit`]. Dropping a transaction rolls it back.
//! - Readers see committed rows plus their own pending writes (read committed).
//! - Rows that are read in order to be modified are locked first with
//!   [`Transaction::lock`] and stay locked until the transaction ends.
//! - [`Store::begin_exclusive`] waits for every other transaction and blocks
//!   new ones, which is what table truncation needs.

use crate::ShopError;
use crate::base::{CartId, EntryId, Sku, StrategyId, TimeId, VisitId};
use crate::cart::{Cart, CartItem, CheckoutLineItem, CustomerRecord, Visit};
use crate::catalog::Potion;
use crate::clock::{ClockEntry, GameTime};
use crate::ledger::LedgerEntry;
use crate::locks::{LockKey, LockManager, TxnId};
use crate::snapshot::StateSnapshot;
use crate::strategy::{ActiveStrategy, Strategy};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Committed rows of one table, ordered by key.
#[derive(Debug, Clone)]
pub(crate) struct Table<K, V> {
    rows: BTreeMap<K, V>,
}

impl<K, V> Default for Table<K, V> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
        }
    }
}

/// Pending changes to one table. `None` marks a deleted row.
#[derive(Debug)]
pub(crate) struct TableWrites<K, V> {
    changes: BTreeMap<K, Option<V>>,
    truncated: bool,
}

impl<K, V> Default for TableWrites<K, V> {
    fn default() -> Self {
        Self {
            changes: BTreeMap::new(),
            truncated: false,
        }
    }
}

impl<K: Ord + Clone, V: Clone> TableWrites<K, V> {
    fn get(&self, base: &Table<K, V>, key: &K) -> Option<V> {
        match self.changes.get(key) {
            Some(change) => change.clone(),
            None if self.truncated => None,
            None => base.rows.get(key).cloned(),
        }
    }

    fn scan(&self, base: &Table<K, V>) -> Vec<V> {
        let mut merged: BTreeMap<&K, &V> = if self.truncated {
            BTreeMap::new()
        } else {
            base.rows.iter().collect()
        };
        for (key, change) in &self.changes {
            match change {
                Some(row) => merged.insert(key, row),
                None => merged.remove(key),
            };
        }
        merged.into_values().cloned().collect()
    }

    fn last(&self, base: &Table<K, V>) -> Option<V> {
        let pending = self
            .changes
            .iter()
            .rev()
            .find_map(|(key, change)| change.as_ref().map(|row| (key, row)));
        let committed = if self.truncated {
            None
        } else {
            base.rows
                .iter()
                .rev()
                .find(|(key, _)| !self.changes.contains_key(*key))
        };
        match (pending, committed) {
            (Some(pending), Some(committed)) if committed.0 > pending.0 => Some(committed.1.clone()),
            (Some(pending), _) => Some(pending.1.clone()),
            (None, committed) => committed.map(|(_, row)| row.clone()),
        }
    }

    fn put(&mut self, key: K, row: V) {
        self.changes.insert(key, Some(row));
    }

    fn delete(&mut self, key: K) {
        self.changes.insert(key, None);
    }

    fn truncate(&mut self) {
        self.changes.clear();
        self.truncated = true;
    }

    fn is_empty(&self) -> bool {
        self.changes.is_empty() && !self.truncated
    }

    fn apply(self, base: &mut Table<K, V>) {
        if self.truncated {
            base.rows.clear();
        }
        for (key, change) in self.changes {
            match change {
                Some(row) => base.rows.insert(key, row),
                None => base.rows.remove(&key),
            };
        }
    }
}

/// A record type stored in one of the store's tables.
pub(crate) trait Row: Clone {
    type Key: Ord + Clone;

    fn key(&self) -> Self::Key;
    fn table(tables: &Tables) -> &Table<Self::Key, Self>;
    fn writes(writes: &Writes) -> &TableWrites<Self::Key, Self>;
    fn writes_mut(writes: &mut Writes) -> &mut TableWrites<Self::Key, Self>;
}

macro_rules! tables {
    ($($table:ident: $row:ty => $key:ty, |$r:ident| $row_key:expr;)*) => {
        #[derive(Debug, Default)]
        pub(crate) struct Tables {
            $($table: Table<$key, $row>,)*
        }

        #[derive(Debug, Default)]
        pub(crate) struct Writes {
            $($table: TableWrites<$key, $row>,)*
        }

        impl Writes {
            fn is_empty(&self) -> bool {
                true $(&& self.$table.is_empty())*
            }

            fn apply(self, tables: &mut Tables) {
                $(self.$table.apply(&mut tables.$table);)*
            }
        }

        $(
            impl Row for $row {
                type Key = $key;

                fn key(&self) -> $key {
                    let $r = self;
                    $row_key
                }

                fn table(tables: &Tables) -> &Table<$key, $row> {
                    &tables.$table
                }

                fn writes(writes: &Writes) -> &TableWrites<$key, $row> {
                    &writes.$table
                }

                fn writes_mut(writes: &mut Writes) -> &mut TableWrites<$key, $row> {
                    &mut writes.$table
                }
            }
        )*
    };
}

tables! {
    snapshot: StateSnapshot => (), |_row| ();
    ledger: LedgerEntry => EntryId, |entry| entry.entry_id;
    potions: Potion => Sku, |potion| potion.sku.clone();
    carts: Cart => CartId, |cart| cart.cart_id;
    cart_items: CartItem => (CartId, Sku), |item| (item.cart_id, item.item_sku.clone());
    line_items: CheckoutLineItem => u64, |line| line.line_item_id;
    customers: CustomerRecord => u64, |customer| customer.customer_id;
    visits: Visit => VisitId, |visit| visit.visit_id;
    game_time: GameTime => TimeId, |tick| tick.time_id;
    current_game_time: ClockEntry => u64, |entry| entry.seq;
    strategies: Strategy => StrategyId, |strategy| strategy.strategy_id;
    active_strategy: ActiveStrategy => u64, |active| active.seq;
}

/// Identifier sequences. Like database sequences they are not rolled back,
/// so a failed transaction leaves a gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Sequence {
    Cart,
    Visit,
    Customer,
    LineItem,
    ClockEntry,
    ActiveStrategy,
}

#[derive(Debug, Default)]
struct Sequences {
    cart: AtomicU64,
    visit: AtomicU64,
    customer: AtomicU64,
    line_item: AtomicU64,
    clock_entry: AtomicU64,
    active_strategy: AtomicU64,
}

impl Sequences {
    fn next(&self, sequence: Sequence) -> u64 {
        let counter = match sequence {
            Sequence::Cart => &self.cart,
            Sequence::Visit => &self.visit,
            Sequence::Customer => &self.customer,
            Sequence::LineItem => &self.line_item,
            Sequence::ClockEntry => &self.clock_entry,
            Sequence::ActiveStrategy => &self.active_strategy,
        };
        counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// The shop's only shared mutable resource.
#[derive(Debug)]
pub struct Store {
    tables: RwLock<Tables>,
    locks: LockManager,
    /// Shared by ordinary transactions, exclusive for truncation.
    gate: RwLock<()>,
    sequences: Sequences,
    next_txn: AtomicU64,
    lock_timeout: Duration,
}

impl Store {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            locks: LockManager::new(),
            gate: RwLock::new(()),
            sequences: Sequences::default(),
            next_txn: AtomicU64::new(1),
            lock_timeout,
        }
    }

    /// Number of row lock entries currently tracked.
    pub fn lock_table_len(&self) -> usize {
        self.locks.len()
    }

    /// Starts an ordinary transaction.
    pub fn begin(&self) -> Transaction<'_> {
        let access = Access::Shared(self.gate.read());
        self.start(access)
    }

    /// Starts a transaction with the whole store to itself.
    pub fn begin_exclusive(&self) -> Transaction<'_> {
        let access = Access::Exclusive(self.gate.write());
        self.start(access)
    }

    fn start<'s>(&'s self, access: Access<'s>) -> Transaction<'s> {
        Transaction {
            store: self,
            id: TxnId(self.next_txn.fetch_add(1, Ordering::SeqCst)),
            access,
            held: Vec::new(),
            retired: Vec::new(),
            writes: Writes::default(),
            committed: false,
        }
    }
}

#[derive(Debug)]
enum Access<'s> {
    Shared(#[allow(dead_code)] RwLockReadGuard<'s, ()>),
    Exclusive(#[allow(dead_code)] RwLockWriteGuard<'s, ()>),
}

/// A unit of work against the [`Store`].
#[derive(Debug)]
pub struct Transaction<'s> {
    store: &'s Store,
    id: TxnId,
    access: Access<'s>,
    held: Vec<LockKey>,
    /// Lock entries to drop from the lock table once this transaction commits.
    retired: Vec<LockKey>,
    writes: Writes,
    committed: bool,
}

impl<'s> Transaction<'s> {
    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn is_exclusive(&self) -> bool {
        matches!(self.access, Access::Exclusive(_))
    }

    /// Locks `key` until this transaction ends.
    ///
    /// # Errors
    ///
    /// Returns [`ShopError::LockTimeout`] if another transaction keeps the row
    /// locked past the store's lock timeout.
    pub fn lock(&mut self, key: LockKey) -> Result<(), ShopError> {
        if self
            .store
            .locks
            .acquire(&key, self.id, self.store.lock_timeout)?
        {
            self.held.push(key);
        }
        Ok(())
    }

    /// Locks every key in ascending lock order.
    pub fn lock_all(&mut self, keys: impl IntoIterator<Item = LockKey>) -> Result<(), ShopError> {
        let mut keys: Vec<LockKey> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();
        for key in keys {
            self.lock(key)?;
        }
        Ok(())
    }

    pub(crate) fn get<R: Row>(&self, key: &R::Key) -> Option<R> {
        let tables = self.store.tables.read();
        R::writes(&self.writes).get(R::table(&tables), key)
    }

    pub(crate) fn scan<R: Row>(&self) -> Vec<R> {
        let tables = self.store.tables.read();
        R::writes(&self.writes).scan(R::table(&tables))
    }

    /// Returns the row with the greatest key.
    pub(crate) fn last<R: Row>(&self) -> Option<R> {
        let tables = self.store.tables.read();
        R::writes(&self.writes).last(R::table(&tables))
    }

    pub(crate) fn put<R: Row>(&mut self, row: R) {
        R::writes_mut(&mut self.writes).put(row.key(), row);
    }

    pub(crate) fn delete<R: Row>(&mut self, key: &R::Key) {
        R::writes_mut(&mut self.writes).delete(key.clone());
    }

    /// Empties a table.
    ///
    /// # Errors
    ///
    /// Returns [`ShopError::ConsistencyFailure`] outside an exclusive
    /// transaction, since other transactions could hold locks on the rows.
    pub(crate) fn truncate<R: Row>(&mut self) -> Result<(), ShopError> {
        if !self.is_exclusive() {
            return Err(ShopError::ConsistencyFailure(
                "truncate requires an exclusive transaction".to_string(),
            ));
        }
        R::writes_mut(&mut self.writes).truncate();
        Ok(())
    }

    pub(crate) fn next_id(&self, sequence: Sequence) -> u64 {
        self.store.sequences.next(sequence)
    }

    /// Drops lock table entries nobody holds. Exclusive transactions only.
    pub(crate) fn prune_locks(&self) {
        if self.is_exclusive() {
            self.store.locks.prune();
        }
    }

    /// Marks `key` as no longer needed after a successful commit, so its lock
    /// table entry can be dropped. Ignored on rollback.
    pub(crate) fn retire_lock(&mut self, key: LockKey) {
        self.retired.push(key);
    }

    /// Publishes every pending write at once and releases the locks.
    pub fn commit(mut self) {
        let writes = std::mem::take(&mut self.writes);
        if !writes.is_empty() {
            let mut tables = self.store.tables.write();
            writes.apply(&mut tables);
        }
        self.committed = true;
        tracing::trace!(txn = self.id.0, "committed");
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.committed && !self.writes.is_empty() {
            tracing::trace!(txn = self.id.0, "rolled back");
        }
        for key in self.held.drain(..).rev() {
            self.store.locks.release(&key, self.id);
        }
        if self.committed {
            for key in self.retired.drain(..) {
                self.store.locks.discard(&key);
            }
        }
    }
}
