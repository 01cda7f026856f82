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

//! Row lock manager.
//!
//! Provides the `SELECT ... FOR UPDATE` half of the store: a transaction
//! locks the rows it is about to read-modify-write and keeps them until it
//! commits or rolls back. Locks are exclusive and re-entrant per transaction.
//!
//! Lock ordering: `Clock`, `Cart`, `Potion` (ascending SKU), `Snapshot`,
//! `Ledger`. The derived `Ord` on [`LockKey`] follows that order.

use crate::ShopError;
use crate::base::{CartId, Sku};
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A lockable row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockKey {
    Clock,
    Cart(CartId),
    Potion(Sku),
    Snapshot,
    Ledger,
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clock => f.write_str("current game time"),
            Self::Cart(cart_id) => write!(f, "cart {cart_id}"),
            Self::Potion(sku) => write!(f, "potion {sku}"),
            Self::Snapshot => f.write_str("state snapshot"),
            Self::Ledger => f.write_str("ledger"),
        }
    }
}

/// Identifier of a store transaction, used as the lock owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxnId(pub u64);

#[derive(Debug, Default)]
struct RowLock {
    owner: Mutex<Option<TxnId>>,
    released: Condvar,
}

/// Table of row locks.
///
/// Uses a [`DashMap`] so lock lookups for different rows do not contend;
/// each row carries its own mutex and condvar so waiters only wake for the
/// row they want.
#[derive(Debug, Default)]
pub struct LockManager {
    rows: DashMap<LockKey, Arc<RowLock>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
        }
    }

    /// Locks `key` for `txn`, waiting up to `timeout` for the current owner.
    ///
    /// Returns `Ok(true)` if the lock was newly acquired and `Ok(false)` if
    /// `txn` already held it.
    ///
    /// # Errors
    ///
    /// Returns [`ShopError::LockTimeout`] if the row is still owned by another
    /// transaction when the timeout elapses.
    pub fn acquire(&self, key: &LockKey, txn: TxnId, timeout: Duration) -> Result<bool, ShopError> {
        // Clone the Arc out so the shard guard is released before blocking.
        let row = Arc::clone(&self.rows.entry(key.clone()).or_default());
        let deadline = Instant::now() + timeout;

        let mut owner = row.owner.lock();
        loop {
            match *owner {
                None => {
                    *owner = Some(txn);
                    return Ok(true);
                }
                Some(holder) if holder == txn => return Ok(false),
                Some(_) => {
                    if row.released.wait_until(&mut owner, deadline).timed_out()
                        && owner.is_some()
                    {
                        return Err(ShopError::LockTimeout(key.to_string()));
                    }
                }
            }
        }
    }

    /// Releases `key` if `txn` owns it.
    pub fn release(&self, key: &LockKey, txn: TxnId) {
        let Some(row) = self.rows.get(key).map(|row| Arc::clone(&row)) else {
            return;
        };
        let mut owner = row.owner.lock();
        if *owner == Some(txn) {
            *owner = None;
            row.released.notify_all();
        }
    }

    /// Returns the current owner of `key`, if any.
    pub fn owner(&self, key: &LockKey) -> Option<TxnId> {
        let row = self.rows.get(key).map(|row| Arc::clone(&row))?;
        let owner = *row.owner.lock();
        owner
    }

    /// Drops every unowned row lock entry.
    ///
    /// Called by reset, which truncates the carts those entries refer to.
    pub fn prune(&self) {
        self.rows.retain(|_, row| row.owner.lock().is_some());
    }

    /// Drops the entry for `key` if nobody owns it or is waiting on it.
    ///
    /// Waiters hold a clone of the row, so a strong count of one under the
    /// shard lock means the row is idle.
    pub fn discard(&self, key: &LockKey) -> bool {
        self.rows
            .remove_if(key, |_, row| {
                Arc::strong_count(row) == 1 && row.owner.lock().is_none()
            })
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    const SHORT: Duration = Duration::from_millis(50);

    #[test]
    fn acquire_is_reentrant() {
        let locks = LockManager::new();
        assert_eq!(locks.acquire(&LockKey::Snapshot, TxnId(1), SHORT), Ok(true));
        assert_eq!(locks.acquire(&LockKey::Snapshot, TxnId(1), SHORT), Ok(false));
        assert_eq!(locks.owner(&LockKey::Snapshot), Some(TxnId(1)));
    }

    #[test]
    fn second_owner_times_out() {
        let locks = LockManager::new();
        locks.acquire(&LockKey::Ledger, TxnId(1), SHORT).unwrap();
        assert_eq!(
            locks.acquire(&LockKey::Ledger, TxnId(2), SHORT),
            Err(ShopError::LockTimeout("ledger".to_string()))
        );
    }

    #[test]
    fn release_hands_lock_to_waiter() {
        let locks = Arc::new(LockManager::new());
        let key = LockKey::Potion(Sku::from("RED_POTION"));
        locks.acquire(&key, TxnId(1), SHORT).unwrap();

        let waiter = {
            let locks = Arc::clone(&locks);
            let key = key.clone();
            thread::spawn(move || locks.acquire(&key, TxnId(2), Duration::from_secs(5)))
        };

        thread::sleep(Duration::from_millis(20));
        locks.release(&key, TxnId(1));
        assert_eq!(waiter.join().unwrap(), Ok(true));
        assert_eq!(locks.owner(&key), Some(TxnId(2)));
    }

    #[test]
    fn release_by_non_owner_is_ignored() {
        let locks = LockManager::new();
        locks.acquire(&LockKey::Clock, TxnId(1), SHORT).unwrap();
        locks.release(&LockKey::Clock, TxnId(2));
        assert_eq!(locks.owner(&LockKey::Clock), Some(TxnId(1)));
    }

    #[test]
    fn prune_keeps_held_locks() {
        let locks = LockManager::new();
        locks.acquire(&LockKey::Cart(CartId(1)), TxnId(1), SHORT).unwrap();
        locks.acquire(&LockKey::Cart(CartId(2)), TxnId(1), SHORT).unwrap();
        locks.release(&LockKey::Cart(CartId(2)), TxnId(1));

        locks.prune();
        assert_eq!(locks.len(), 1);
        assert_eq!(locks.owner(&LockKey::Cart(CartId(1))), Some(TxnId(1)));
    }

    #[test]
    fn discard_only_drops_idle_rows() {
        let locks = LockManager::new();
        let key = LockKey::Cart(CartId(3));
        locks.acquire(&key, TxnId(1), SHORT).unwrap();
        assert!(!locks.discard(&key));

        locks.release(&key, TxnId(1));
        let waiter = locks.rows.get(&key).map(|row| Arc::clone(&row)).unwrap();
        assert!(!locks.discard(&key));

        drop(waiter);
        assert!(locks.discard(&key));
        assert!(locks.is_empty());
        assert!(!locks.discard(&key));
    }

    #[test]
    fn lock_order_follows_declaration() {
        let mut keys = vec![
            LockKey::Ledger,
            LockKey::Potion(Sku::from("B")),
            LockKey::Snapshot,
            LockKey::Cart(CartId(1)),
            LockKey::Potion(Sku::from("A")),
            LockKey::Clock,
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                LockKey::Clock,
                LockKey::Cart(CartId(1)),
                LockKey::Potion(Sku::from("A")),
                LockKey::Potion(Sku::from("B")),
                LockKey::Snapshot,
                LockKey::Ledger,
            ]
        );
    }
}
