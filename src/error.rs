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

//! Error types for ledger operations.

use thiserror::Error;

/// Opaque failure raised by a balance or history store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("storage error: {message}")]
pub struct StorageError {
    message: String,
}

impl StorageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Ledger operation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PointError {
    /// Amount is zero
    #[error("invalid amount (must be positive)")]
    InvalidAmount,

    /// Charge would push the balance above the cap
    #[error("balance would exceed the maximum point")]
    ExceedMaxPoint,

    /// Use exceeds the current balance
    #[error("not enough points")]
    NotEnoughPoint,

    /// Use on an account with no balance record
    #[error("user not found")]
    UserNotFound,

    /// Collaborator failure, propagated unchanged
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl PointError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAmount => "INVALID_AMOUNT",
            Self::ExceedMaxPoint => "EXCEED_MAX_POINT",
            Self::NotEnoughPoint => "NOT_ENOUGH_POINT",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }
}
