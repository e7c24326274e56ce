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

//! PointService public API integration tests.

use async_trait::async_trait;
use futures::future::join_all;
use chrono::{DateTime, Utc};
use point_ledger_rs::{
    BalanceStore, HistoryStore, InMemoryBalanceStore, InMemoryHistoryStore, MAX_POINT,
    PointError, PointHistory, PointService, StorageError, TransactionType, UserId, UserPoint,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

type MemoryService = PointService<InMemoryBalanceStore, InMemoryHistoryStore>;
type OperationFuture<'a> = Pin<Box<dyn Future<Output = Result<UserPoint, PointError>> + 'a>>;

fn service() -> MemoryService {
    PointService::new(
        Arc::new(InMemoryBalanceStore::new()),
        Arc::new(InMemoryHistoryStore::new()),
    )
}

/// Stores that suspend on every call, so concurrent callers really interleave.
fn slow_service() -> MemoryService {
    PointService::new(
        Arc::new(InMemoryBalanceStore::with_latency(Duration::from_millis(2))),
        Arc::new(InMemoryHistoryStore::with_latency(Duration::from_millis(2))),
    )
}

/// Takes one from `counter` if it is non-zero.
fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Balance store whose next `fail_reads` lookups and `fail_writes` upserts fail.
struct FlakyBalanceStore {
    inner: InMemoryBalanceStore,
    fail_reads: AtomicUsize,
    fail_writes: AtomicUsize,
}

impl FlakyBalanceStore {
    fn failing_once() -> Self {
        Self {
            inner: InMemoryBalanceStore::with_latency(Duration::from_millis(2)),
            fail_reads: AtomicUsize::new(0),
            fail_writes: AtomicUsize::new(1),
        }
    }

    fn failing_first_read() -> Self {
        Self {
            inner: InMemoryBalanceStore::with_latency(Duration::from_millis(2)),
            fail_reads: AtomicUsize::new(1),
            fail_writes: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl BalanceStore for FlakyBalanceStore {
    async fn select_by_id(&self, user_id: UserId) -> Result<Option<UserPoint>, StorageError> {
        if take_failure(&self.fail_reads) {
            return Err(StorageError::new("DB_READ_ERROR"));
        }
        self.inner.select_by_id(user_id).await
    }

    async fn insert_or_update(
        &self,
        user_id: UserId,
        point: u64,
    ) -> Result<UserPoint, StorageError> {
        if take_failure(&self.fail_writes) {
            return Err(StorageError::new("DB_ERROR"));
        }
        self.inner.insert_or_update(user_id, point).await
    }
}

/// History store whose next `fail_inserts` appends fail.
struct FlakyHistoryStore {
    inner: InMemoryHistoryStore,
    fail_inserts: AtomicUsize,
}

impl FlakyHistoryStore {
    fn failing_once() -> Self {
        Self {
            inner: InMemoryHistoryStore::with_latency(Duration::from_millis(2)),
            fail_inserts: AtomicUsize::new(1),
        }
    }
}

#[async_trait]
impl HistoryStore for FlakyHistoryStore {
    async fn insert(
        &self,
        user_id: UserId,
        amount: u64,
        kind: TransactionType,
        timestamp: DateTime<Utc>,
    ) -> Result<PointHistory, StorageError> {
        if take_failure(&self.fail_inserts) {
            return Err(StorageError::new("HISTORY_ERROR"));
        }
        self.inner.insert(user_id, amount, kind, timestamp).await
    }

    async fn select_all_by_user_id(
        &self,
        user_id: UserId,
    ) -> Result<Vec<PointHistory>, StorageError> {
        self.inner.select_all_by_user_id(user_id).await
    }
}

#[tokio::test]
async fn charge_then_use_updates_balance_and_history() {
    let service = service();
    let user = UserId(1);

    assert_eq!(service.charge(user, 100).await.unwrap().point, 100);
    assert_eq!(service.charge(user, 100).await.unwrap().point, 200);
    assert_eq!(service.use_point(user, 150).await.unwrap().point, 50);

    let history = service.get_user_point_history(user).await.unwrap();
    let entries: Vec<(TransactionType, u64)> =
        history.iter().map(|h| (h.kind, h.amount)).collect();
    assert_eq!(
        entries,
        vec![
            (TransactionType::Charge, 100),
            (TransactionType::Charge, 100),
            (TransactionType::Use, 150),
        ]
    );
    assert!(history.iter().all(|h| h.user_id == user));
    assert!(history.windows(2).all(|w| w[0].id < w[1].id));
}

#[tokio::test]
async fn unknown_user_reads_as_zero_balance() {
    let service = service();
    let point = service.get_user_point(UserId(9)).await.unwrap();
    assert_eq!(point.id, UserId(9));
    assert_eq!(point.point, 0);
    assert!(service.get_user_point_history(UserId(9)).await.unwrap().is_empty());
}

#[tokio::test]
async fn use_without_charge_returns_user_not_found() {
    let service = service();
    let user = UserId(1);

    assert_eq!(
        service.use_point(user, 100).await,
        Err(PointError::UserNotFound)
    );
    assert_eq!(service.balances().select_by_id(user).await.unwrap(), None);
    assert!(service.get_user_point_history(user).await.unwrap().is_empty());
}

#[tokio::test]
async fn use_more_than_balance_returns_not_enough_point() {
    let service = service();
    let user = UserId(1);
    service.charge(user, 100).await.unwrap();

    assert_eq!(
        service.use_point(user, 101).await,
        Err(PointError::NotEnoughPoint)
    );
    assert_eq!(service.get_user_point(user).await.unwrap().point, 100);
    assert_eq!(service.get_user_point_history(user).await.unwrap().len(), 1);

    // Using the whole balance is allowed.
    assert_eq!(service.use_point(user, 100).await.unwrap().point, 0);
}

#[tokio::test]
async fn charge_up_to_max_point_succeeds() {
    let service = service();
    let user = UserId(1);
    service.charge(user, MAX_POINT - 1).await.unwrap();
    assert_eq!(service.charge(user, 1).await.unwrap().point, MAX_POINT);
}

#[tokio::test]
async fn charge_beyond_max_point_returns_exceed_max_point() {
    let service = service();
    let user = UserId(1);
    service.charge(user, MAX_POINT - 10).await.unwrap();

    assert_eq!(
        service.charge(user, 11).await,
        Err(PointError::ExceedMaxPoint)
    );
    assert_eq!(service.get_user_point(user).await.unwrap().point, MAX_POINT - 10);
    assert_eq!(service.get_user_point_history(user).await.unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_charges_are_serialized() {
    let service = slow_service();
    let user = UserId(1);

    let results = join_all((0..5).map(|_| service.charge(user, 100))).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(service.get_user_point(user).await.unwrap().point, 500);
    let history = service.get_user_point_history(user).await.unwrap();
    assert_eq!(history.len(), 5);
    assert!(history.iter().all(|h| h.kind == TransactionType::Charge));
}

#[tokio::test]
async fn concurrent_charges_on_spawned_tasks_are_serialized() {
    let service = Arc::new(slow_service());
    let user = UserId(1);

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.charge(user, 10).await })
        })
        .collect();

    for handle in join_all(handles).await {
        handle.unwrap().unwrap();
    }

    assert_eq!(service.get_user_point(user).await.unwrap().point, 200);
    assert_eq!(service.histories().len(), 20);
    assert!(service.locks().is_empty());
}

#[tokio::test]
async fn concurrent_uses_stop_at_zero() {
    let service = slow_service();
    let user = UserId(1);
    service.charge(user, 400).await.unwrap();

    let results = join_all((0..5).map(|_| service.use_point(user, 100))).await;

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 4);
    assert_eq!(
        results.iter().filter(|r| **r == Err(PointError::NotEnoughPoint)).count(),
        1
    );
    assert_eq!(service.get_user_point(user).await.unwrap().point, 0);
    assert_eq!(service.get_user_point_history(user).await.unwrap().len(), 5);
}

#[tokio::test]
async fn failed_write_releases_the_lock() {
    let service = PointService::new(
        Arc::new(FlakyBalanceStore::failing_once()),
        Arc::new(InMemoryHistoryStore::with_latency(Duration::from_millis(2))),
    );
    let user = UserId(1);

    let results = join_all((0..5).map(|_| service.charge(user, 100))).await;

    let failures: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();
    assert_eq!(
        failures,
        vec![&PointError::Storage(StorageError::new("DB_ERROR"))]
    );
    assert_eq!(service.get_user_point(user).await.unwrap().point, 400);
    assert_eq!(service.get_user_point_history(user).await.unwrap().len(), 4);
    assert!(service.locks().is_empty());
}

#[tokio::test]
async fn failed_history_append_keeps_balance_and_releases_the_lock() {
    let service = PointService::new(
        Arc::new(InMemoryBalanceStore::with_latency(Duration::from_millis(2))),
        Arc::new(FlakyHistoryStore::failing_once()),
    );
    let user = UserId(1);

    let results = join_all((0..5).map(|_| service.charge(user, 100))).await;

    // The first charge persisted its balance before the append failed.
    assert_eq!(
        results[0],
        Err(PointError::Storage(StorageError::new("HISTORY_ERROR")))
    );
    let balances: Vec<u64> = results[1..]
        .iter()
        .map(|r| r.as_ref().unwrap().point)
        .collect();
    assert_eq!(balances, vec![200, 300, 400, 500]);

    assert_eq!(service.get_user_point(user).await.unwrap().point, 500);
    assert_eq!(service.get_user_point_history(user).await.unwrap().len(), 4);
    assert!(service.locks().is_empty());
}

#[tokio::test]
async fn failed_balance_read_writes_nothing_and_releases_the_lock() {
    let service = PointService::new(
        Arc::new(FlakyBalanceStore::failing_first_read()),
        Arc::new(InMemoryHistoryStore::new()),
    );
    let user = UserId(1);

    assert_eq!(
        service.charge(user, 100).await,
        Err(PointError::Storage(StorageError::new("DB_READ_ERROR")))
    );
    assert!(service.locks().is_empty());
    assert_eq!(service.balances().select_by_id(user).await.unwrap(), None);
    assert!(service.histories().is_empty());

    // The next operation on the same user is not blocked.
    assert_eq!(service.charge(user, 100).await.unwrap().point, 100);
    assert_eq!(service.get_user_point_history(user).await.unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_operations_keep_arrival_order() {
    let service = slow_service();
    let user = UserId(1);

    // Polled in this order; any reordering would reject at least one use.
    let mut operations: Vec<OperationFuture<'_>> = Vec::new();
    operations.push(Box::pin(service.charge(user, 100)));
    operations.push(Box::pin(service.use_point(user, 60)));
    operations.push(Box::pin(service.charge(user, 10)));
    operations.push(Box::pin(service.use_point(user, 50)));
    let results = join_all(operations).await;

    let balances: Vec<u64> = results.into_iter().map(|r| r.unwrap().point).collect();
    assert_eq!(balances, vec![100, 40, 50, 0]);

    let kinds: Vec<TransactionType> = service
        .get_user_point_history(user)
        .await
        .unwrap()
        .iter()
        .map(|h| h.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            TransactionType::Charge,
            TransactionType::Use,
            TransactionType::Charge,
            TransactionType::Use,
        ]
    );
}

#[tokio::test]
async fn different_users_do_not_wait_on_each_other() {
    let service = slow_service();
    let alice = UserId(1);
    let bob = UserId(2);

    // Hold alice's lock; bob must still go through.
    let guard = service.locks().acquire(alice).await;
    let bob_point = tokio::time::timeout(Duration::from_secs(1), service.charge(bob, 70))
        .await
        .expect("bob should not wait for alice")
        .unwrap();
    assert_eq!(bob_point.point, 70);

    let alice_charge = tokio::time::timeout(Duration::from_millis(50), service.charge(alice, 5)).await;
    assert!(alice_charge.is_err(), "alice's charge must wait for the lock");

    drop(guard);
    assert_eq!(service.charge(alice, 5).await.unwrap().point, 5);
}

#[tokio::test]
async fn many_users_concurrently() {
    let service = slow_service();

    let results = join_all((1..=10u64).flat_map(|user| {
        let service = &service;
        (0..3).map(move |_| service.charge(UserId(user), user))
    }))
    .await;
    assert!(results.iter().all(Result::is_ok));

    for user in 1..=10u64 {
        let point = service.get_user_point(UserId(user)).await.unwrap();
        assert_eq!(point.point, user * 3);
    }
    assert_eq!(service.histories().len(), 30);
}
