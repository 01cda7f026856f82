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

//! Core identifier and quantity types shared by every table.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Neg};

/// Identifier of a customer cart.
///
/// Allocated from a store sequence, so identifiers are unique but may have
/// gaps when a cart-creating transaction rolls back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct CartId(pub u64);

impl fmt::Display for CartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a recorded customer visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct VisitId(pub u64);

impl fmt::Display for VisitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a game-time tick in the calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct TimeId(pub u32);

impl fmt::Display for TimeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a ledger entry.
///
/// Entry IDs start at 1 after every reset and are contiguous in commit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct StrategyId(pub u32);

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable catalog identifier of a potion, e.g. `RED_POTION`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Sku(String);

impl Sku {
    pub fn new(sku: impl Into<String>) -> Self {
        Self(sku.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Sku {
    fn from(sku: &str) -> Self {
        Self::new(sku)
    }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Milliliters split by the four potion colors.
///
/// Used both for stored amounts (never negative) and for signed ledger deltas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct ColorMl {
    pub red: i64,
    pub green: i64,
    pub blue: i64,
    pub dark: i64,
}

impl ColorMl {
    pub const ZERO: ColorMl = ColorMl::new(0, 0, 0, 0);

    pub const fn new(red: i64, green: i64, blue: i64, dark: i64) -> Self {
        Self {
            red,
            green,
            blue,
            dark,
        }
    }

    /// Builds an amount from the `[red, green, blue, dark]` layout used by
    /// potion types and barrel descriptions.
    pub const fn from_array([red, green, blue, dark]: [i64; 4]) -> Self {
        Self::new(red, green, blue, dark)
    }

    pub const fn to_array(self) -> [i64; 4] {
        [self.red, self.green, self.blue, self.dark]
    }

    pub const fn total(&self) -> i64 {
        self.red + self.green + self.blue + self.dark
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Returns the first color whose amount is negative.
    pub fn first_negative(&self) -> Option<&'static str> {
        [
            ("red_ml", self.red),
            ("green_ml", self.green),
            ("blue_ml", self.blue),
            ("dark_ml", self.dark),
        ]
        .into_iter()
        .find(|(_, ml)| *ml < 0)
        .map(|(color, _)| color)
    }

    /// Multiplies every color by `factor`.
    pub const fn scaled(self, factor: i64) -> Self {
        Self::new(
            self.red * factor,
            self.green * factor,
            self.blue * factor,
            self.dark * factor,
        )
    }

    /// [`ColorMl::scaled`], or `None` if any color overflows.
    pub fn checked_scaled(self, factor: i64) -> Option<Self> {
        Some(Self::new(
            self.red.checked_mul(factor)?,
            self.green.checked_mul(factor)?,
            self.blue.checked_mul(factor)?,
            self.dark.checked_mul(factor)?,
        ))
    }

    /// Color-wise sum, or `None` on overflow.
    pub fn checked_add(self, rhs: ColorMl) -> Option<Self> {
        Some(Self::new(
            self.red.checked_add(rhs.red)?,
            self.green.checked_add(rhs.green)?,
            self.blue.checked_add(rhs.blue)?,
            self.dark.checked_add(rhs.dark)?,
        ))
    }

    pub fn checked_total(&self) -> Option<i64> {
        self.red
            .checked_add(self.green)?
            .checked_add(self.blue)?
            .checked_add(self.dark)
    }
}

impl Add for ColorMl {
    type Output = ColorMl;

    fn add(self, rhs: ColorMl) -> ColorMl {
        ColorMl::new(
            self.red + rhs.red,
            self.green + rhs.green,
            self.blue + rhs.blue,
            self.dark + rhs.dark,
        )
    }
}

impl AddAssign for ColorMl {
    fn add_assign(&mut self, rhs: ColorMl) {
        *self = *self + rhs;
    }
}

impl Neg for ColorMl {
    type Output = ColorMl;

    fn neg(self) -> ColorMl {
        self.scaled(-1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_ml_total_and_negation() {
        let ml = ColorMl::new(10, 20, 30, 40);
        assert_eq!(ml.total(), 100);
        assert_eq!((-ml).total(), -100);
        assert_eq!(ml + -ml, ColorMl::ZERO);
    }

    #[test]
    fn first_negative_reports_color() {
        assert_eq!(ColorMl::new(1, -1, 0, -5).first_negative(), Some("green_ml"));
        assert_eq!(ColorMl::new(1, 1, 0, 5).first_negative(), None);
    }

    #[test]
    fn array_layout_is_red_green_blue_dark() {
        let ml = ColorMl::from_array([1, 2, 3, 4]);
        assert_eq!(ml.red, 1);
        assert_eq!(ml.dark, 4);
        assert_eq!(ml.to_array(), [1, 2, 3, 4]);
    }

    #[test]
    fn checked_arithmetic_reports_overflow() {
        let ml = ColorMl::new(1, 0, 0, 0);
        assert_eq!(ml.checked_scaled(7), Some(ColorMl::new(7, 0, 0, 0)));
        assert_eq!(ColorMl::new(2, 0, 0, 0).checked_scaled(i64::MAX), None);
        assert_eq!(ColorMl::new(i64::MAX, 0, 0, 0).checked_add(ml), None);
        assert_eq!(ColorMl::new(i64::MAX, 1, 0, 0).checked_total(), None);
        assert_eq!(ColorMl::new(1, 2, 3, 4).checked_total(), Some(10));
    }

    #[test]
    fn sku_display_matches_input() {
        assert_eq!(Sku::from("RED_POTION").to_string(), "RED_POTION");
    }
}
