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

//! Benchmarks for the point ledger.
//!
//! Run with: cargo bench
//!
//! Benchmarks include:
//! - Uncontended keyed mutex acquire/release
//! - Sequential charges for a single user
//! - Concurrent charges piling up on one user
//! - Concurrent charges spread across many users

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use futures::future::join_all;
use point_ledger_rs::{
    InMemoryBalanceStore, InMemoryHistoryStore, KeyedMutex, PointService, UserId,
};
use std::sync::Arc;
use tokio::runtime::Runtime;

type MemoryService = PointService<InMemoryBalanceStore, InMemoryHistoryStore>;

fn service() -> MemoryService {
    PointService::new(
        Arc::new(InMemoryBalanceStore::new()),
        Arc::new(InMemoryHistoryStore::new()),
    )
}

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn bench_keyed_mutex(c: &mut Criterion) {
    let rt = runtime();
    let locks = KeyedMutex::new();

    c.bench_function("keyed_mutex_uncontended", |b| {
        b.iter(|| {
            rt.block_on(async {
                let guard = locks.acquire(black_box(1u64)).await;
                drop(guard);
            })
        })
    });
}

fn bench_sequential_charges(c: &mut Criterion) {
    let rt = runtime();

    let mut group = c.benchmark_group("sequential_charges");
    for count in [100u64, 1_000] {
        group.throughput(Throughput::Elements(count));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let service = service();
                rt.block_on(async {
                    for _ in 0..count {
                        service.charge(UserId(1), black_box(1)).await.unwrap();
                    }
                });
            })
        });
    }
    group.finish();
}

fn bench_concurrent_charges(c: &mut Criterion) {
    let rt = runtime();
    const OPS: u64 = 1_000;

    let mut group = c.benchmark_group("concurrent_charges");
    group.throughput(Throughput::Elements(OPS));
    for users in [1u64, 10, 100] {
        group.bench_with_input(BenchmarkId::new("users", users), &users, |b, &users| {
            b.iter(|| {
                let service = Arc::new(service());
                rt.block_on(async {
                    let handles: Vec<_> = (0..OPS)
                        .map(|i| {
                            let service = Arc::clone(&service);
                            tokio::spawn(async move { service.charge(UserId(i % users), 1).await })
                        })
                        .collect();
                    for result in join_all(handles).await {
                        result.unwrap().unwrap();
                    }
                });
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_keyed_mutex,
    bench_sequential_charges,
    bench_concurrent_charges
);
criterion_main!(benches);
