use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;
use sinkwork_core::app::{WorkerConfig, WorkerGroup};
use sinkwork_core::domain::{
    ChangefeedId, RowChange, SingleTableTxn, TableSinkState, TableStateHandle,
    TxnCallbackableEvent, TxnEvent,
};
use sinkwork_core::impls::{BackendProbe, InMemoryBackend, MemoryBackendConfig};
use sinkwork_core::observability::SinkMetrics;
use tokio::time::{Duration, sleep};
use tracing_subscriber::EnvFilter;

const TXN_COUNT: usize = 200;

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();
}

/// 第 1 引数に JSON の設定ファイルがあれば読む
fn load_config() -> Result<WorkerConfig, Box<dyn std::error::Error>> {
    match std::env::args().nth(1) {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)?;
            let config: WorkerConfig = serde_json::from_str(&raw)?;
            Ok(config)
        }
        None => Ok(WorkerConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let config = load_config()?;
    config.validate()?;

    // (A) worker group を用意（backend は worker ごとに 1 つ）
    let changefeed = ChangefeedId::with_default_namespace("demo");
    let metrics = SinkMetrics::new(&changefeed);
    let mut probes: Vec<BackendProbe> = Vec::new();
    let group = WorkerGroup::spawn(changefeed, &config, &metrics, |_| {
        let backend = InMemoryBackend::new(MemoryBackendConfig {
            max_flush_interval: Duration::from_millis(20),
            urgent_after_rows: Some(64),
            ..Default::default()
        });
        probes.push(backend.probe());
        Box::new(backend)
    })?;

    // (B) テーブルを 2 つ用意。orders は途中で stopping にする
    let orders = TableStateHandle::new(TableSinkState::Sinking);
    let users = TableStateHandle::new(TableSinkState::Sinking);

    // (C) タスク投入（worker の割り当ては本来 conflict detector の仕事）
    let released = Arc::new(AtomicUsize::new(0));
    let handled = Arc::new(AtomicUsize::new(0));
    let mut rng = rand::thread_rng();
    for n in 0..TXN_COUNT {
        if n == TXN_COUNT / 2 {
            orders.set(TableSinkState::Stopping);
        }
        let (table, state) = if rng.gen_bool(0.5) {
            ("orders", &orders)
        } else {
            ("users", &users)
        };
        let rows = (0..rng.gen_range(1..8))
            .map(|i| RowChange::insert(serde_json::json!({ "txn": n, "row": i })))
            .collect();
        let handled = handled.clone();
        let event = TxnCallbackableEvent::new(
            SingleTableTxn::new(table, n as u64, rows),
            state.clone(),
            move || {
                handled.fetch_add(1, Ordering::Relaxed);
            },
        );

        // 依存解決の待ちを模擬してから worker に渡す
        let mut txn = TxnEvent::new(event);
        if rng.gen_bool(0.2) {
            sleep(Duration::from_millis(1)).await;
        }
        txn.mark_conflict_resolved();

        let worker = &group.workers()[rng.gen_range(0..group.len())];
        let released = released.clone();
        worker.add(txn, move || {
            released.fetch_add(1, Ordering::Relaxed);
        })?;
    }

    tracing::info!(
        changefeed = %group.changefeed(),
        txns = TXN_COUNT,
        workers = group.len(),
        "demo workload submitted"
    );

    // (D) 全 notifier が解放されるまでポーリング
    while released.load(Ordering::Relaxed) < TXN_COUNT {
        sleep(Duration::from_millis(10)).await;
    }

    let committed: usize = probes.iter().map(|p| p.committed().len()).sum();
    let rows: usize = probes.iter().map(BackendProbe::committed_rows).sum();
    let flushes: usize = probes.iter().map(BackendProbe::flush_calls).sum();
    println!(
        "released={} handled={} committed={} dropped={} rows={} flushes={}",
        released.load(Ordering::Relaxed),
        handled.load(Ordering::Relaxed),
        committed,
        TXN_COUNT - committed,
        rows,
        flushes
    );

    // (E) 停止
    group.shutdown_and_join().await?;
    Ok(())
}
