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

//! Game clock.
//!
//! The calendar of time ticks is seeded once and never truncated. The
//! "current game time" is a history table whose latest row is the tick the
//! shop is currently at; reset clears it and starts again from the earliest
//! tick.

use crate::ShopError;
use crate::base::TimeId;
use crate::locks::LockKey;
use crate::store::{Sequence, Transaction};
use serde::{Deserialize, Serialize};

/// Days of the in-game week, in calendar order.
pub const DAYS: [&str; 7] = [
    "Hearthday",
    "Crownday",
    "Blesseday",
    "Soulday",
    "Edgeday",
    "Bloomday",
    "Arcanaday",
];

/// Ticks happen every other hour.
pub const HOURS: [u8; 12] = [0, 2, 4, 6, 8, 10, 12, 14, 16, 18, 20, 22];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameTime {
    pub time_id: TimeId,
    pub day: String,
    pub hour: u8,
}

/// One row of the current-game-time history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockEntry {
    pub seq: u64,
    pub time_id: TimeId,
}

/// Builds the full calendar, with IDs starting at 1 in chronological order.
pub fn calendar() -> Vec<GameTime> {
    DAYS.iter()
        .flat_map(|day| HOURS.iter().map(move |hour| (*day, *hour)))
        .zip(1u32..)
        .map(|((day, hour), id)| GameTime {
            time_id: TimeId(id),
            day: day.to_string(),
            hour,
        })
        .collect()
}

pub fn exists(tx: &Transaction<'_>, time_id: TimeId) -> bool {
    tx.get::<GameTime>(&time_id).is_some()
}

pub fn get(tx: &Transaction<'_>, time_id: TimeId) -> Result<GameTime, ShopError> {
    tx.get::<GameTime>(&time_id)
        .ok_or(ShopError::InvalidTimeReference(time_id))
}

/// Looks up the tick for `day` and `hour`.
pub fn find(tx: &Transaction<'_>, day: &str, hour: u8) -> Option<TimeId> {
    tx.scan::<GameTime>()
        .into_iter()
        .find(|tick| tick.day.eq_ignore_ascii_case(day) && tick.hour == hour)
        .map(|tick| tick.time_id)
}

/// Returns the first tick of the calendar.
///
/// # Errors
///
/// Returns [`ShopError::ConsistencyFailure`] if the calendar was never seeded.
pub fn earliest(tx: &Transaction<'_>) -> Result<TimeId, ShopError> {
    tx.scan::<GameTime>()
        .first()
        .map(|tick| tick.time_id)
        .ok_or_else(|| ShopError::ConsistencyFailure("game calendar is empty".to_string()))
}

/// Returns the most recently recorded current tick.
pub fn current(tx: &Transaction<'_>) -> Result<TimeId, ShopError> {
    tx.last::<ClockEntry>()
        .map(|entry| entry.time_id)
        .ok_or(ShopError::NoCurrentTime)
}

/// Records `time_id` as the current tick.
pub fn set_current(tx: &mut Transaction<'_>, time_id: TimeId) -> Result<(), ShopError> {
    get(tx, time_id)?;
    // Serializes writers so history order matches sequence order.
    tx.lock(LockKey::Clock)?;
    let seq = tx.next_id(Sequence::ClockEntry);
    tx.put(ClockEntry { seq, time_id });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use std::time::Duration;

    fn store() -> Store {
        let store = Store::new(Duration::from_millis(50));
        let mut tx = store.begin_exclusive();
        for tick in calendar() {
            tx.put(tick);
        }
        tx.commit();
        store
    }

    #[test]
    fn calendar_covers_every_day_and_hour() {
        let ticks = calendar();
        assert_eq!(ticks.len(), DAYS.len() * HOURS.len());
        assert_eq!(ticks[0].time_id, TimeId(1));
        assert_eq!(ticks[0].day, "Hearthday");
        assert_eq!(ticks[1].hour, 2);
        assert_eq!(ticks[12].day, "Crownday");
    }

    #[test]
    fn current_requires_a_recorded_tick() {
        let store = store();
        let tx = store.begin();
        assert_eq!(current(&tx), Err(ShopError::NoCurrentTime));
    }

    #[test]
    fn set_current_moves_the_clock() {
        let store = store();
        let mut tx = store.begin();
        let tick = find(&tx, "bloomday", 14).unwrap();
        let first = earliest(&tx).unwrap();
        set_current(&mut tx, first).unwrap();
        set_current(&mut tx, tick).unwrap();
        tx.commit();

        let tx = store.begin();
        assert_eq!(current(&tx), Ok(tick));
        assert_eq!(get(&tx, tick).unwrap().day, "Bloomday");
    }

    #[test]
    fn set_current_rejects_unknown_tick() {
        let store = store();
        let mut tx = store.begin();
        assert_eq!(
            set_current(&mut tx, TimeId(1_000)),
            Err(ShopError::InvalidTimeReference(TimeId(1_000)))
        );
    }

    #[test]
    fn find_rejects_odd_hours() {
        let store = store();
        let tx = store.begin();
        assert_eq!(find(&tx, "Hearthday", 3), None);
    }
}
