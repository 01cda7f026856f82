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

//! State validation and reconciliation.
//!
//! Read-only checks that the snapshot agrees with the ledger and the catalog.
//! [`reconcile`] is the general check; [`verify_reset_state`] is the narrower
//! post-reset check the reset controller relies on.

use crate::ShopError;
use crate::base::EntryId;
use crate::catalog;
use crate::ledger::{self, EntryType};
use crate::snapshot::{self, StateSnapshot};
use crate::store::Transaction;
use crate::strategy;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The headline totals, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentState {
    pub gold: i64,
    pub total_potions: i64,
    pub total_ml: i64,
}

impl From<StateSnapshot> for CurrentState {
    fn from(snapshot: StateSnapshot) -> Self {
        Self {
            gold: snapshot.gold,
            total_potions: snapshot.total_potions,
            total_ml: snapshot.total_ml,
        }
    }
}

/// One way the stored state disagrees with what it should be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Discrepancy {
    /// A snapshot field differs from the ledger sum.
    Ledger {
        field: &'static str,
        expected: i64,
        actual: i64,
    },
    /// `total_ml` differs from the sum of the colors.
    TotalMl { expected: i64, actual: i64 },
    /// `total_potions` differs from the sum of potion quantities.
    PotionCount { expected: i64, actual: i64 },
    /// Ledger IDs are not contiguous from 1.
    LedgerGap { expected: EntryId, found: EntryId },
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ledger {
                field,
                expected,
                actual,
            } => write!(f, "{field}: ledger says {expected}, snapshot has {actual}"),
            Self::TotalMl { expected, actual } => {
                write!(f, "total_ml: colors sum to {expected}, snapshot has {actual}")
            }
            Self::PotionCount { expected, actual } => write!(
                f,
                "total_potions: catalog holds {expected}, snapshot has {actual}"
            ),
            Self::LedgerGap { expected, found } => {
                write!(f, "ledger gap: expected entry {expected}, found {found}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    /// Snapshot rebuilt from the ledger.
    pub expected: StateSnapshot,
    /// Snapshot as stored.
    pub actual: StateSnapshot,
    pub entries: usize,
    pub discrepancies: Vec<Discrepancy>,
}

impl Reconciliation {
    pub fn is_consistent(&self) -> bool {
        self.discrepancies.is_empty()
    }

    /// Converts discrepancies into a [`ShopError::ConsistencyFailure`].
    pub fn into_result(self) -> Result<Self, ShopError> {
        if self.is_consistent() {
            return Ok(self);
        }
        let details: Vec<String> = self.discrepancies.iter().map(ToString::to_string).collect();
        Err(ShopError::ConsistencyFailure(details.join("; ")))
    }
}

pub fn get_current_state(tx: &mut Transaction<'_>) -> Result<CurrentState, ShopError> {
    snapshot::read(tx).map(CurrentState::from)
}

/// Rebuilds the snapshot from the ledger and compares it with the stored one.
///
/// Locks the snapshot and then the ledger, which every writer of either holds
/// until commit, so the comparison sees a single point in time.
pub fn reconcile(tx: &mut Transaction<'_>) -> Result<Reconciliation, ShopError> {
    let actual = snapshot::read(tx)?;
    let entries = ledger::entries(tx)?;
    let mut discrepancies = Vec::new();

    for (expected_id, entry) in (1u64..).map(EntryId).zip(&entries) {
        if entry.entry_id != expected_id {
            discrepancies.push(Discrepancy::LedgerGap {
                expected: expected_id,
                found: entry.entry_id,
            });
            break;
        }
    }

    let expected = entries
        .iter()
        .fold(StateSnapshot::zeroed(), |state, entry| state.plus(&entry.delta()));
    let fields = [
        ("gold", expected.gold, actual.gold),
        ("red_ml", expected.red_ml, actual.red_ml),
        ("green_ml", expected.green_ml, actual.green_ml),
        ("blue_ml", expected.blue_ml, actual.blue_ml),
        ("dark_ml", expected.dark_ml, actual.dark_ml),
        ("total_ml", expected.total_ml, actual.total_ml),
        ("total_potions", expected.total_potions, actual.total_potions),
        (
            "potion_capacity_units",
            expected.potion_capacity_units,
            actual.potion_capacity_units,
        ),
        (
            "ml_capacity_units",
            expected.ml_capacity_units,
            actual.ml_capacity_units,
        ),
    ];
    discrepancies.extend(
        fields
            .into_iter()
            .filter(|(_, expected, actual)| expected != actual)
            .map(|(field, expected, actual)| Discrepancy::Ledger {
                field,
                expected,
                actual,
            }),
    );

    if !actual.ml_totals_agree() {
        discrepancies.push(Discrepancy::TotalMl {
            expected: actual.ml().total(),
            actual: actual.total_ml,
        });
    }
    let on_hand = catalog::total_quantity(tx);
    if on_hand != actual.total_potions {
        discrepancies.push(Discrepancy::PotionCount {
            expected: on_hand,
            actual: actual.total_potions,
        });
    }

    Ok(Reconciliation {
        expected,
        actual,
        entries: entries.len(),
        discrepancies,
    })
}

/// Checks the shop looks exactly like a fresh reset: `initial_gold` gold, no
/// potions or ml, a single `ADMIN_CHANGE` ledger entry and one active
/// strategy.
///
/// Never fails; read errors count as a mismatch.
pub fn verify_reset_state(tx: &mut Transaction<'_>, initial_gold: i64) -> bool {
    let state = match get_current_state(tx) {
        Ok(state) => state,
        Err(err) => {
            tracing::warn!(error = %err, "reset verification could not read state");
            return false;
        }
    };
    let entries = match ledger::entries(tx) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(error = %err, "reset verification could not read ledger");
            return false;
        }
    };

    let seed_only = matches!(
        entries.as_slice(),
        [entry] if entry.entry_type == EntryType::AdminChange && entry.gold_change == initial_gold
    );
    let active_strategies = strategy::activations(tx).len();

    let ok = state.gold == initial_gold
        && state.total_potions == 0
        && state.total_ml == 0
        && seed_only
        && active_strategies == 1;
    if !ok {
        tracing::warn!(
            gold = state.gold,
            total_potions = state.total_potions,
            total_ml = state.total_ml,
            ledger_entries = entries.len(),
            active_strategies,
            "state does not match reset values"
        );
    }
    ok
}
