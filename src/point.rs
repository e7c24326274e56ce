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

//! Ledger records.
//!
//! A [`UserPoint`] is the current balance of one user. A [`PointHistory`] is an
//! immutable audit entry appended once per successful charge or use.

use crate::base::{HistoryId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound of any balance.
pub const MAX_POINT: u64 = 10_000_000;

/// Kind of a ledger operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Charge,
    Use,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Charge => f.write_str("CHARGE"),
            Self::Use => f.write_str("USE"),
        }
    }
}

/// Current balance of a user.
///
/// Invariant: `0 <= point <= MAX_POINT` for every record produced by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPoint {
    pub id: UserId,
    pub point: u64,
    pub updated_at: DateTime<Utc>,
}

impl UserPoint {
    pub fn new(id: UserId, point: u64, updated_at: DateTime<Utc>) -> Self {
        Self {
            id,
            point,
            updated_at,
        }
    }

    /// The implicit zero balance of a user without a stored record.
    pub fn empty(id: UserId) -> Self {
        Self::new(id, 0, Utc::now())
    }
}

/// Append-only audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointHistory {
    pub id: HistoryId,
    pub user_id: UserId,
    pub amount: u64,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub timestamp: DateTime<Utc>,
}
