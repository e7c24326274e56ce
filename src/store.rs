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

//! Storage collaborators consumed by the ledger.
//!
//! The ledger owns no storage of its own. Balances and histories live behind
//! these two narrow traits, so any key-value backend can be plugged in. The
//! in-memory implementations in [`memory`](crate::memory) back the CLI, the
//! demo server and the tests.

use crate::base::UserId;
use crate::error::StorageError;
use crate::point::{PointHistory, TransactionType, UserPoint};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Current balance per user.
#[async_trait]
pub trait BalanceStore: Send + Sync {
    /// Returns the stored record, or `None` if the user has never been written.
    async fn select_by_id(&self, user_id: UserId) -> Result<Option<UserPoint>, StorageError>;

    /// Upserts the balance and returns the persisted record.
    async fn insert_or_update(&self, user_id: UserId, point: u64)
    -> Result<UserPoint, StorageError>;
}

/// Append-only operation log.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Appends an entry and returns it with its assigned id.
    async fn insert(
        &self,
        user_id: UserId,
        amount: u64,
        kind: TransactionType,
        timestamp: DateTime<Utc>,
    ) -> Result<PointHistory, StorageError>;

    /// All entries of a user, in insertion order.
    async fn select_all_by_user_id(
        &self,
        user_id: UserId,
    ) -> Result<Vec<PointHistory>, StorageError>;
}

#[async_trait]
impl<T: BalanceStore + ?Sized> BalanceStore for Arc<T> {
    async fn select_by_id(&self, user_id: UserId) -> Result<Option<UserPoint>, StorageError> {
        (**self).select_by_id(user_id).await
    }

    async fn insert_or_update(
        &self,
        user_id: UserId,
        point: u64,
    ) -> Result<UserPoint, StorageError> {
        (**self).insert_or_update(user_id, point).await
    }
}

#[async_trait]
impl<T: HistoryStore + ?Sized> HistoryStore for Arc<T> {
    async fn insert(
        &self,
        user_id: UserId,
        amount: u64,
        kind: TransactionType,
        timestamp: DateTime<Utc>,
    ) -> Result<PointHistory, StorageError> {
        (**self).insert(user_id, amount, kind, timestamp).await
    }

    async fn select_all_by_user_id(
        &self,
        user_id: UserId,
    ) -> Result<Vec<PointHistory>, StorageError> {
        (**self).select_all_by_user_id(user_id).await
    }
}
