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

//! In-memory stores.
//!
//! [`InMemoryBalanceStore`] keeps one record per user in a [`DashMap`];
//! [`InMemoryHistoryStore`] appends to a single vector behind a
//! [`parking_lot::Mutex`], which preserves global insertion order.
//!
//! Both stores can be given an artificial latency. Every call then suspends
//! for that long before touching the data, so concurrent callers interleave
//! the way they would against a remote database.

use crate::base::{HistoryId, UserId};
use crate::error::StorageError;
use crate::point::{PointHistory, TransactionType, UserPoint};
use crate::store::{BalanceStore, HistoryStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::time::Duration;

async fn simulate_latency(latency: Option<Duration>) {
    if let Some(latency) = latency {
        tokio::time::sleep(latency).await;
    }
}

/// Balance table keyed by user.
#[derive(Debug, Default)]
pub struct InMemoryBalanceStore {
    points: DashMap<UserId, UserPoint>,
    latency: Option<Duration>,
}

impl InMemoryBalanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            points: DashMap::new(),
            latency: Some(latency),
        }
    }

    /// All stored records, ordered by user id.
    pub fn snapshot(&self) -> Vec<UserPoint> {
        let mut points: Vec<UserPoint> = self
            .points
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        points.sort_by_key(|point| point.id);
        points
    }
}

#[async_trait]
impl BalanceStore for InMemoryBalanceStore {
    async fn select_by_id(&self, user_id: UserId) -> Result<Option<UserPoint>, StorageError> {
        simulate_latency(self.latency).await;
        Ok(self.points.get(&user_id).map(|point| point.value().clone()))
    }

    async fn insert_or_update(
        &self,
        user_id: UserId,
        point: u64,
    ) -> Result<UserPoint, StorageError> {
        simulate_latency(self.latency).await;
        let record = UserPoint::new(user_id, point, Utc::now());
        self.points.insert(user_id, record.clone());
        Ok(record)
    }
}

#[derive(Debug)]
struct HistoryLog {
    next_id: u64,
    entries: Vec<PointHistory>,
}

/// Append-only history table.
#[derive(Debug)]
pub struct InMemoryHistoryStore {
    log: Mutex<HistoryLog>,
    latency: Option<Duration>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self {
            log: Mutex::new(HistoryLog {
                next_id: 1,
                entries: Vec::new(),
            }),
            latency: None,
        }
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::new()
        }
    }

    /// Every entry of every user, in insertion order.
    pub fn snapshot(&self) -> Vec<PointHistory> {
        self.log.lock().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.log.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn insert(
        &self,
        user_id: UserId,
        amount: u64,
        kind: TransactionType,
        timestamp: DateTime<Utc>,
    ) -> Result<PointHistory, StorageError> {
        simulate_latency(self.latency).await;
        let mut log = self.log.lock();
        let entry = PointHistory {
            id: HistoryId(log.next_id),
            user_id,
            amount,
            kind,
            timestamp,
        };
        log.next_id += 1;
        log.entries.push(entry.clone());
        Ok(entry)
    }

    async fn select_all_by_user_id(
        &self,
        user_id: UserId,
    ) -> Result<Vec<PointHistory>, StorageError> {
        simulate_latency(self.latency).await;
        Ok(self
            .log
            .lock()
            .entries
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .cloned()
            .collect())
    }
}
