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

//! Keyed asynchronous mutual exclusion with FIFO hand-off.
//!
//! A [`KeyedMutex`] serializes critical sections that share a key while leaving
//! different keys fully independent. Waiters on a key are granted the lock
//! strictly in the order their [`acquire`](KeyedMutex::acquire) calls were
//! first polled, and the grant is delivered directly by the releasing holder;
//! nothing polls or sleeps.
//!
//! # Lock table
//!
//! ```text
//!  key ──► LockState { holder, waiters: [w1, w2, ...] }
//!
//!  acquire:  vacant   ─► insert { holder = me }            (granted)
//!            occupied ─► push_back(me), await signal       (queued)
//!
//!  release:  waiters non-empty ─► holder = pop_front(), signal it
//!            waiters empty     ─► remove entry              (key is free)
//! ```
//!
//! An entry exists exactly while its key is held, so the table shrinks back to
//! empty once the last holder of every key has released.
//!
//! # Example
//!
//! ```
//! use point_ledger_rs::KeyedMutex;
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let locks = KeyedMutex::new();
//! {
//!     let _guard = locks.acquire("alice").await;
//!     assert!(locks.is_locked(&"alice"));
//!     assert!(!locks.is_locked(&"bob"));
//! }
//! assert!(locks.is_empty());
//! # });
//! ```

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;
use tracing::trace;

/// Identity of one `acquire` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Token(u64);

#[derive(Debug)]
struct Waiter {
    token: Token,
    grant: oneshot::Sender<()>,
}

#[derive(Debug)]
struct LockState {
    holder: Token,
    waiters: VecDeque<Waiter>,
}

/// A table of FIFO mutexes indexed by key.
///
/// Each service instance owns its own table; there is no process-wide state.
#[derive(Debug)]
pub struct KeyedMutex<K>
where
    K: Eq + Hash,
{
    locks: DashMap<K, LockState>,
    next_token: AtomicU64,
}

impl<K> KeyedMutex<K>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
            next_token: AtomicU64::new(0),
        }
    }

    /// Waits until the caller is the exclusive holder of `key`.
    ///
    /// The caller's place in the queue is taken on the first poll. Dropping the
    /// returned future before it completes withdraws the request; if the lock
    /// had already been handed to it, the lock moves on to the next waiter.
    pub async fn acquire(&self, key: K) -> KeyedMutexGuard<'_, K> {
        let token = Token(self.next_token.fetch_add(1, Ordering::Relaxed));

        let pending = match self.locks.entry(key.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(LockState {
                    holder: token,
                    waiters: VecDeque::new(),
                });
                None
            }
            Entry::Occupied(mut entry) => {
                let (grant, granted) = oneshot::channel();
                let state = entry.get_mut();
                state.waiters.push_back(Waiter { token, grant });
                trace!(key = ?key, queued = state.waiters.len(), "lock contended");
                Some(granted)
            }
        };

        let guard = KeyedMutexGuard {
            mutex: self,
            key,
            token,
            released: false,
        };

        if let Some(granted) = pending {
            // The sender is only ever consumed by a grant.
            let _ = granted.await;
            trace!(key = ?guard.key, "lock granted");
        }

        guard
    }

    /// Runs `f` while holding the lock for `key`.
    ///
    /// The lock is released when `f`'s future completes, returns early or
    /// unwinds.
    pub async fn with_lock<F, Fut, T>(&self, key: K, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.acquire(key).await;
        f().await
    }

    pub fn is_locked(&self, key: &K) -> bool {
        self.locks.contains_key(key)
    }

    /// Number of callers queued behind the current holder of `key`.
    pub fn queue_len(&self, key: &K) -> usize {
        self.locks.get(key).map_or(0, |state| state.waiters.len())
    }

    /// Number of keys currently held.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Gives up `token`'s claim on `key`.
    ///
    /// Returns `true` only when `token` was the holder. A token that is still
    /// queued is withdrawn from the queue instead.
    fn release(&self, key: &K, token: Token) -> bool {
        let Entry::Occupied(mut entry) = self.locks.entry(key.clone()) else {
            return false;
        };

        let state = entry.get_mut();
        if state.holder != token {
            state.waiters.retain(|waiter| waiter.token != token);
            return false;
        }

        // Waiters whose future was dropped mid-race are skipped.
        while let Some(next) = state.waiters.pop_front() {
            state.holder = next.token;
            if next.grant.send(()).is_ok() {
                trace!(key = ?key, remaining = state.waiters.len(), "lock handed off");
                return true;
            }
        }

        entry.remove();
        true
    }
}

impl<K> Default for KeyedMutex<K>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Ownership of one key of a [`KeyedMutex`].
///
/// Releases on drop, so every exit path of a critical section gives the lock up.
#[derive(Debug)]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct KeyedMutexGuard<'a, K>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    mutex: &'a KeyedMutex<K>,
    key: K,
    token: Token,
    released: bool,
}

impl<K> KeyedMutexGuard<'_, K>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Releases the lock early.
    ///
    /// Only the first call has an effect; later calls, and the eventual drop,
    /// are no-ops and return `false`.
    pub fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;
        self.mutex.release(&self.key, self.token)
    }
}

impl<K> Drop for KeyedMutexGuard<'_, K>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    fn drop(&mut self) {
        self.release();
    }
}
