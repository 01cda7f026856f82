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

//! Error types for shop operations.
//!
//! Every failure maps to one [`ErrorCategory`], which is what callers (an HTTP
//! layer, the CLI) use to decide how to report it.

use crate::base::{CartId, Sku, TimeId, VisitId};
use std::fmt;
use thiserror::Error;

/// Which inventory limit a mutation ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityResource {
    Ml,
    Potions,
}

impl fmt::Display for CapacityResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ml => f.write_str("ml"),
            Self::Potions => f.write_str("potion"),
        }
    }
}

/// A proposed inventory total would exceed the purchased capacity.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{resource} capacity exceeded: proposed {proposed}, maximum {max}")]
pub struct CapacityExceeded {
    pub resource: CapacityResource,
    pub proposed: i64,
    pub max: i64,
}

/// Shop operation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShopError {
    #[error("cart {0} not found")]
    CartNotFound(CartId),

    #[error("unknown potion sku {0}")]
    UnknownSku(Sku),

    /// The referenced game-time tick is not in the calendar.
    #[error("time reference {0} does not exist")]
    InvalidTimeReference(TimeId),

    /// No current game time has been recorded since the last reset.
    #[error("no current game time is set")]
    NoCurrentTime,

    #[error("no game time for {day} hour {hour}")]
    UnknownGameTime { day: String, hour: u8 },

    #[error("visit {0} not found")]
    VisitNotFound(VisitId),

    #[error("no customer visit has been recorded")]
    NoVisitRecorded,

    #[error("strategy {0} not found")]
    StrategyNotFound(String),

    /// Carts are terminal once checked out.
    #[error("cart {0} is already checked out")]
    CartAlreadyCheckedOut(CartId),

    #[error("cart {0} has no items")]
    EmptyCart(CartId),

    #[error("invalid quantity (must be positive)")]
    InvalidQuantity,

    /// A snapshot total would go below zero.
    #[error("{0} balance would go negative")]
    NegativeBalance(&'static str),

    #[error("insufficient gold: need {needed}, have {available}")]
    InsufficientGold { needed: i64, available: i64 },

    #[error("insufficient stock for {sku}: requested {requested}, available {available}")]
    InsufficientStock {
        sku: Sku,
        requested: i64,
        available: i64,
    },

    #[error(transparent)]
    CapacityExceeded(#[from] CapacityExceeded),

    /// The stored state disagrees with what the ledger says it should be.
    #[error("consistency check failed: {0}")]
    ConsistencyFailure(String),

    /// A row lock could not be acquired in time; the transaction was rolled
    /// back and can be retried.
    #[error("timed out waiting for lock on {0}")]
    LockTimeout(String),
}

/// Stable failure categories exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    NotFound,
    InvalidState,
    InsufficientStock,
    CapacityExceeded,
    ConsistencyFailure,
    StorageFailure,
}

impl ErrorCategory {
    /// Only storage failures are worth retrying; everything else is a
    /// deterministic rejection or needs an operator.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageFailure)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::InvalidState => "invalid_state",
            Self::InsufficientStock => "insufficient_stock",
            Self::CapacityExceeded => "capacity_exceeded",
            Self::ConsistencyFailure => "consistency_failure",
            Self::StorageFailure => "storage_failure",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ShopError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::CartNotFound(_)
            | Self::UnknownSku(_)
            | Self::InvalidTimeReference(_)
            | Self::NoCurrentTime
            | Self::UnknownGameTime { .. }
            | Self::VisitNotFound(_)
            | Self::NoVisitRecorded
            | Self::StrategyNotFound(_) => ErrorCategory::NotFound,
            Self::CartAlreadyCheckedOut(_)
            | Self::EmptyCart(_)
            | Self::InvalidQuantity
            | Self::NegativeBalance(_)
            | Self::InsufficientGold { .. } => ErrorCategory::InvalidState,
            Self::InsufficientStock { .. } => ErrorCategory::InsufficientStock,
            Self::CapacityExceeded(_) => ErrorCategory::CapacityExceeded,
            Self::ConsistencyFailure(_) => ErrorCategory::ConsistencyFailure,
            Self::LockTimeout(_) => ErrorCategory::StorageFailure,
        }
    }
}
