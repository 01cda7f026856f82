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

//! Strategy store.

use crate::ShopError;
use crate::base::{StrategyId, TimeId};
use crate::clock;
use crate::store::{Sequence, Transaction};
use serde::{Deserialize, Serialize};

pub const STRATEGY_NAMES: [&str; 3] = ["PREMIUM", "BALANCED", "VALUE"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strategy {
    pub strategy_id: StrategyId,
    pub name: String,
}

/// A strategy activation, effective from `time_reference` onwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveStrategy {
    pub seq: u64,
    pub strategy_id: StrategyId,
    pub time_reference: TimeId,
}

pub fn defaults() -> Vec<Strategy> {
    STRATEGY_NAMES
        .iter()
        .zip(1u32..)
        .map(|(name, id)| Strategy {
            strategy_id: StrategyId(id),
            name: name.to_string(),
        })
        .collect()
}

pub fn lookup(tx: &Transaction<'_>, name: &str) -> Result<StrategyId, ShopError> {
    tx.scan::<Strategy>()
        .into_iter()
        .find(|strategy| strategy.name == name)
        .map(|strategy| strategy.strategy_id)
        .ok_or_else(|| ShopError::StrategyNotFound(name.to_string()))
}

pub fn activate(
    tx: &mut Transaction<'_>,
    strategy_id: StrategyId,
    time_reference: TimeId,
) -> Result<(), ShopError> {
    clock::get(tx, time_reference)?;
    let seq = tx.next_id(Sequence::ActiveStrategy);
    tx.put(ActiveStrategy {
        seq,
        strategy_id,
        time_reference,
    });
    Ok(())
}

pub fn activations(tx: &Transaction<'_>) -> Vec<ActiveStrategy> {
    tx.scan::<ActiveStrategy>()
}

/// Returns the most recently activated strategy.
pub fn current(tx: &Transaction<'_>) -> Option<Strategy> {
    let active = tx.last::<ActiveStrategy>()?;
    tx.get::<Strategy>(&active.strategy_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use std::time::Duration;

    fn store() -> Store {
        let store = Store::new(Duration::from_millis(50));
        let mut tx = store.begin_exclusive();
        for strategy in defaults() {
            tx.put(strategy);
        }
        for tick in clock::calendar().into_iter().take(2) {
            tx.put(tick);
        }
        tx.commit();
        store
    }

    #[test]
    fn lookup_by_name() {
        let store = store();
        let tx = store.begin();
        assert_eq!(lookup(&tx, "PREMIUM"), Ok(StrategyId(1)));
        assert_eq!(
            lookup(&tx, "DISCOUNT"),
            Err(ShopError::StrategyNotFound("DISCOUNT".to_string()))
        );
    }

    #[test]
    fn latest_activation_wins() {
        let store = store();
        let mut tx = store.begin();
        assert_eq!(current(&tx), None);
        activate(&mut tx, StrategyId(1), TimeId(1)).unwrap();
        activate(&mut tx, StrategyId(3), TimeId(2)).unwrap();
        assert_eq!(current(&tx).unwrap().name, "VALUE");
        assert_eq!(activations(&tx).len(), 2);
    }

    #[test]
    fn activation_needs_known_tick() {
        let store = store();
        let mut tx = store.begin();
        assert_eq!(
            activate(&mut tx, StrategyId(1), TimeId(77)),
            Err(ShopError::InvalidTimeReference(TimeId(77)))
        );
    }
}
