use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use garrison_auth::Principal;
use garrison_catalog::{Asset, AssetCategory, Base, InMemoryCatalog, UnitOfMeasure};
use garrison_core::{AssetId, BaseId, UserId};
use garrison_events::NullEventBus;
use garrison_inventory::{replay, BalanceKey, NewTransaction, Vendor};
use garrison_infra::store::{
    collect_all, CommitBatch, InMemoryInventoryStore, InventoryStore, SortOrder, TransactionFilter,
};
use garrison_infra::{EngineConfig, PurchaseRequest, TransactionEngine, TransferRequest};

type Engine = TransactionEngine<Arc<InMemoryInventoryStore>, Arc<InMemoryCatalog>, NullEventBus>;

fn setup() -> (Engine, AssetId, BaseId, BaseId, Principal) {
    let catalog = Arc::new(InMemoryCatalog::new());
    let asset = Asset::new("5.56mm round", AssetCategory::Ammunition, UnitOfMeasure::Box);
    let asset_id = asset.id;
    catalog.upsert_asset(asset).unwrap();
    let alpha = Base::new("ALPHA", "Base Alpha");
    let bravo = Base::new("BRAVO", "Base Bravo");
    let (a, b) = (alpha.id, bravo.id);
    catalog.upsert_base(alpha).unwrap();
    catalog.upsert_base(bravo).unwrap();

    let config = EngineConfig {
        retry_backoff: Duration::ZERO,
        ..EngineConfig::default()
    };
    let engine = TransactionEngine::with_config(
        Arc::new(InMemoryInventoryStore::new()),
        catalog,
        NullEventBus,
        config,
    );
    (engine, asset_id, a, b, Principal::admin(UserId::new()))
}

fn purchase(asset: AssetId, base: BaseId, quantity: i64) -> PurchaseRequest {
    PurchaseRequest {
        asset_id: asset,
        base_id: base,
        quantity,
        unit_price: 100,
        vendor: Vendor::new("Supplier"),
        purchase_order_number: None,
        invoice_number: None,
        description: None,
        remarks: None,
        transaction_date: None,
    }
}

fn bench_engine_commit_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_commit_latency");
    group.sample_size(500);

    group.bench_function("purchase", |b| {
        let (engine, asset, alpha, _, admin) = setup();
        b.iter(|| {
            black_box(engine.record_purchase(&admin, purchase(asset, alpha, 1)).unwrap());
        })
    });

    group.bench_function("transfer_pair", |b| {
        let (engine, asset, alpha, bravo, admin) = setup();
        engine.record_purchase(&admin, purchase(asset, alpha, 1_000_000)).unwrap();
        b.iter(|| {
            let request = TransferRequest {
                asset_id: asset,
                from_base_id: alpha,
                to_base_id: bravo,
                quantity: 1,
                description: None,
                remarks: None,
                transaction_date: None,
            };
            black_box(engine.record_transfer(&admin, request).unwrap());
        })
    });

    group.finish();
}

fn bench_store_batch_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_batch_throughput");

    for batch_size in [1usize, 10, 100].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::new("commit_purchases", batch_size),
            batch_size,
            |b, &size| {
                let store = InMemoryInventoryStore::new();
                let actor = UserId::new();
                let key = BalanceKey::new(AssetId::new(), BaseId::new());
                b.iter(|| {
                    let rows = (0..size)
                        .map(|_| NewTransaction::purchase(key, 1, 10, Vendor::new("Supplier"), actor, Utc::now()).unwrap())
                        .collect();
                    black_box(store.commit(CommitBatch::new(rows)).unwrap());
                })
            },
        );
    }

    group.finish();
}

fn bench_ledger_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger_replay");

    for row_count in [100usize, 1_000, 10_000].iter() {
        let store = InMemoryInventoryStore::new();
        let actor = UserId::new();
        let asset = AssetId::new();
        let bases: Vec<BaseId> = (0..8).map(|_| BaseId::new()).collect();
        for i in 0..*row_count {
            let key = BalanceKey::new(asset, bases[i % bases.len()]);
            let row = NewTransaction::purchase(key, 1, 10, Vendor::new("Supplier"), actor, Utc::now()).unwrap();
            store.commit(CommitBatch::new(vec![row])).unwrap();
        }
        let ledger = collect_all(&store, TransactionFilter::all(), SortOrder::SequenceAsc, 500).unwrap();

        group.throughput(Throughput::Elements(*row_count as u64));
        group.bench_with_input(BenchmarkId::new("replay", row_count), &ledger, |b, ledger| {
            b.iter(|| black_box(replay([], ledger).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_engine_commit_latency,
    bench_store_batch_throughput,
    bench_ledger_replay
);
criterion_main!(benches);
