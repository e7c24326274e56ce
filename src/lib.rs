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

//! # Point Ledger
//!
//! This library maintains a per-user point balance that many callers can charge
//! or use concurrently. Operations on the same user are applied one at a time in
//! arrival order; operations on different users proceed independently.
//!
//! ## Core Components
//!
//! - [`KeyedMutex`]: FIFO asynchronous mutex indexed by key
//! - [`PointService`]: Charge/use logic with balance cap and audit history
//! - [`BalanceStore`] / [`HistoryStore`]: Storage collaborators
//! - [`PointError`]: Error types for rejected or failed operations
//!
//! ## Example
//!
//! ```
//! use point_ledger_rs::{InMemoryBalanceStore, InMemoryHistoryStore, PointService, UserId};
//! use std::sync::Arc;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let service = PointService::new(
//!     Arc::new(InMemoryBalanceStore::new()),
//!     Arc::new(InMemoryHistoryStore::new()),
//! );
//!
//! service.charge(UserId(1), 100).await.unwrap();
//! let point = service.use_point(UserId(1), 30).await.unwrap();
//! assert_eq!(point.point, 70);
//!
//! let history = service.get_user_point_history(UserId(1)).await.unwrap();
//! assert_eq!(history.len(), 2);
//! # });
//! ```
//!
//! ## Concurrency
//!
//! Each [`PointService`] owns its own lock table. Waiting callers are suspended,
//! not blocked, and are woken directly by the previous holder.

mod base;
mod config;
pub mod error;
pub mod keyed_mutex;
pub mod memory;
mod point;
mod service;
pub mod store;

pub use base::{HistoryId, UserId};
pub use config::LedgerConfig;
pub use error::{PointError, StorageError};
pub use keyed_mutex::{KeyedMutex, KeyedMutexGuard};
pub use memory::{InMemoryBalanceStore, InMemoryHistoryStore};
pub use point::{MAX_POINT, PointHistory, TransactionType, UserPoint};
pub use service::PointService;
pub use store::{BalanceStore, HistoryStore};
