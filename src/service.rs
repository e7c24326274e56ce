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

//! Point ledger service.
//!
//! The [`PointService`] enforces balance invariants and appends audit history
//! while holding exclusive access to the user's key in its own
//! [`KeyedMutex`].
//!
//! # Operations
//!
//! - **Charge**: Credits points, materializing a zero balance for new users.
//!   Fails if the result would exceed the configured cap.
//! - **Use**: Debits points. Fails for unknown users or insufficient balance.
//! - **Queries**: Read the balance or history directly, without locking.
//!
//! # Write order
//!
//! A successful operation first persists the new balance, then appends the
//! history entry. The two writes are not atomic: if the history append fails
//! the new balance stays and the fault is returned to the caller. Validation
//! failures happen before either write.

use crate::base::UserId;
use crate::config::LedgerConfig;
use crate::error::PointError;
use crate::keyed_mutex::KeyedMutex;
use crate::point::{PointHistory, TransactionType, UserPoint};
use crate::store::{BalanceStore, HistoryStore};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-user point ledger.
///
/// Concurrent calls for the same user run one at a time in the order they
/// arrive. Calls for different users do not wait on each other.
///
/// # Invariants
///
/// - A balance is never negative and never exceeds `config.max_point`.
/// - Every successful charge or use appends exactly one history entry.
/// - A failed validation leaves both balance and history untouched.
pub struct PointService<B, H> {
    balances: Arc<B>,
    histories: Arc<H>,
    locks: KeyedMutex<UserId>,
    config: LedgerConfig,
}

impl<B, H> PointService<B, H>
where
    B: BalanceStore,
    H: HistoryStore,
{
    /// Creates a service with the default cap.
    pub fn new(balances: Arc<B>, histories: Arc<H>) -> Self {
        Self::with_config(balances, histories, LedgerConfig::default())
    }

    pub fn with_config(balances: Arc<B>, histories: Arc<H>, config: LedgerConfig) -> Self {
        PointService {
            balances,
            histories,
            locks: KeyedMutex::new(),
            config,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn balances(&self) -> &Arc<B> {
        &self.balances
    }

    pub fn histories(&self) -> &Arc<H> {
        &self.histories
    }

    /// Lock table guarding the critical sections.
    pub fn locks(&self) -> &KeyedMutex<UserId> {
        &self.locks
    }

    /// Returns the last committed balance; users without a record read as zero.
    pub async fn get_user_point(&self, user_id: UserId) -> Result<UserPoint, PointError> {
        let point = self.balances.select_by_id(user_id).await?;
        Ok(point.unwrap_or_else(|| UserPoint::empty(user_id)))
    }

    /// Returns the user's history in insertion order.
    pub async fn get_user_point_history(
        &self,
        user_id: UserId,
    ) -> Result<Vec<PointHistory>, PointError> {
        Ok(self.histories.select_all_by_user_id(user_id).await?)
    }

    /// Adds `amount` points to the user's balance.
    ///
    /// # Errors
    ///
    /// - [`PointError::InvalidAmount`] - `amount` is zero.
    /// - [`PointError::ExceedMaxPoint`] - The new balance would exceed the cap.
    /// - [`PointError::Storage`] - A store failed; the lock is still released.
    pub async fn charge(&self, user_id: UserId, amount: u64) -> Result<UserPoint, PointError> {
        if amount == 0 {
            return Err(PointError::InvalidAmount);
        }

        let _guard = self.locks.acquire(user_id).await;

        // New users start from an implicit zero that is never written on failure.
        let current = self
            .balances
            .select_by_id(user_id)
            .await?
            .unwrap_or_else(|| UserPoint::empty(user_id));

        let new_point = match current.point.checked_add(amount) {
            Some(point) if point <= self.config.max_point => point,
            _ => {
                warn!(%user_id, amount, balance = current.point, "charge rejected: exceeds max point");
                return Err(PointError::ExceedMaxPoint);
            }
        };

        let updated = self.commit(user_id, new_point, amount, TransactionType::Charge).await?;
        debug!(%user_id, amount, balance = updated.point, "charged");
        Ok(updated)
    }

    /// Deducts `amount` points from the user's balance.
    ///
    /// # Errors
    ///
    /// - [`PointError::InvalidAmount`] - `amount` is zero.
    /// - [`PointError::UserNotFound`] - The user has no balance record.
    /// - [`PointError::NotEnoughPoint`] - The balance is smaller than `amount`.
    /// - [`PointError::Storage`] - A store failed; the lock is still released.
    pub async fn use_point(&self, user_id: UserId, amount: u64) -> Result<UserPoint, PointError> {
        if amount == 0 {
            return Err(PointError::InvalidAmount);
        }

        let _guard = self.locks.acquire(user_id).await;

        let Some(current) = self.balances.select_by_id(user_id).await? else {
            warn!(%user_id, amount, "use rejected: user not found");
            return Err(PointError::UserNotFound);
        };

        let Some(new_point) = current.point.checked_sub(amount) else {
            warn!(%user_id, amount, balance = current.point, "use rejected: not enough points");
            return Err(PointError::NotEnoughPoint);
        };

        let updated = self.commit(user_id, new_point, amount, TransactionType::Use).await?;
        debug!(%user_id, amount, balance = updated.point, "used");
        Ok(updated)
    }

    /// Persists the balance, then records the history entry.
    ///
    /// Must be called while holding the user's lock.
    async fn commit(
        &self,
        user_id: UserId,
        new_point: u64,
        amount: u64,
        kind: TransactionType,
    ) -> Result<UserPoint, PointError> {
        let updated = self
            .balances
            .insert_or_update(user_id, new_point)
            .await
            .inspect_err(|e| warn!(%user_id, amount, %kind, error = %e, "balance write failed"))?;

        self.histories
            .insert(user_id, amount, kind, Utc::now())
            .await
            .inspect_err(|e| warn!(%user_id, amount, %kind, error = %e, "history append failed"))?;

        Ok(updated)
    }
}
