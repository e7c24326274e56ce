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

//! Ledger configuration.

use crate::point::MAX_POINT;

/// Tunables of a [`PointService`](crate::PointService).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Largest balance a charge may produce.
    pub max_point: u64,
}

impl LedgerConfig {
    pub fn with_max_point(max_point: u64) -> Self {
        Self { max_point }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_point: MAX_POINT,
        }
    }
}
