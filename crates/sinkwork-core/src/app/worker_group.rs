//! WorkerGroup - changefeed 1 本分の worker pool
//!
//! # フロー
//! 1. `spawn()` で worker を N 本起動（backend は worker ごとに factory から作る）
//! 2. detector は `worker(i)` のハンドルにタスクを割り当てる
//! 3. `shutdown_and_join()` で停止 → 全 loop の終了を待つ → intake queue を close
//!
//! 再起動ポリシーは持ちません（最初のエラーを上位に返すだけ）。

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::config::WorkerConfig;
use super::worker_loop::{TxnWorker, WorkerHandle};
use crate::domain::{ChangefeedId, SinkError};
use crate::observability::SinkMetrics;
use crate::ports::Backend;

/// Worker group handle.
/// - `shutdown_tx` を drop すると全 worker が止まる
/// - `shutdown_and_join()` で全 worker の終了を待てる
pub struct WorkerGroup {
    changefeed: ChangefeedId,
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<WorkerHandle>,
    joins: Vec<JoinHandle<Result<(), SinkError>>>,
}

impl WorkerGroup {
    /// Spawn `config.worker_count` workers.
    pub fn spawn<F>(
        changefeed: ChangefeedId,
        config: &WorkerConfig,
        metrics: &SinkMetrics,
        mut make_backend: F,
    ) -> Result<Self, SinkError>
    where
        F: FnMut(usize) -> Box<dyn Backend>,
    {
        config.validate()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut handles = Vec::with_capacity(config.worker_count);
        let mut joins = Vec::with_capacity(config.worker_count);
        for worker_id in 0..config.worker_count {
            let worker = TxnWorker::new(
                changefeed.clone(),
                worker_id,
                make_backend(worker_id),
                config,
                metrics.for_worker(worker_id),
            )?;
            handles.push(worker.handle());
            joins.push(tokio::spawn(worker.run_loop(shutdown_rx.clone())));
        }

        tracing::info!(
            changefeed = %changefeed,
            workers = config.worker_count,
            "transaction sink workers spawned"
        );
        Ok(Self {
            changefeed,
            shutdown_tx,
            handles,
            joins,
        })
    }

    pub fn changefeed(&self) -> &ChangefeedId {
        &self.changefeed
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn workers(&self) -> &[WorkerHandle] {
        &self.handles
    }

    pub fn worker(&self, worker_id: usize) -> Option<&WorkerHandle> {
        self.handles.get(worker_id)
    }

    /// 全 worker に停止を要求（未 flush 分は flush されない）
    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    /// 停止して全 worker を待ち、intake queue を close する
    ///
    /// 最初に見つかったエラーを返します（flush 失敗、panic）。
    pub async fn shutdown_and_join(self) -> Result<(), SinkError> {
        self.request_shutdown();

        let mut first_err = None;
        for (worker_id, join) in self.joins.into_iter().enumerate() {
            let result = match join.await {
                Ok(result) => result,
                Err(e) => Err(SinkError::WorkerPanicked(format!("worker {worker_id}: {e}"))),
            };
            if let Err(err) = result {
                tracing::warn!(
                    changefeed = %self.changefeed,
                    worker_id,
                    error = %err,
                    "transaction sink worker ended with error"
                );
                first_err.get_or_insert(err);
            }
        }

        // loop が止まった後に queue を閉じる
        let drained: usize = self.handles.iter().map(WorkerHandle::close).sum();
        tracing::info!(
            changefeed = %self.changefeed,
            drained,
            "transaction sink workers closed"
        );

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        RowChange, SingleTableTxn, TableStateHandle, TxnCallbackableEvent, TxnEvent,
    };
    use crate::impls::{BackendProbe, InMemoryBackend, MemoryBackendConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn txn(n: u64) -> TxnEvent {
        TxnEvent::new(TxnCallbackableEvent::new(
            SingleTableTxn::new("t", n, vec![RowChange::insert(serde_json::json!({ "id": n }))]),
            TableStateHandle::default(),
            || {},
        ))
    }

    fn spawn_group(
        workers: usize,
        backend_config: MemoryBackendConfig,
    ) -> (WorkerGroup, Arc<Mutex<Vec<BackendProbe>>>) {
        let probes = Arc::new(Mutex::new(Vec::new()));
        let config = WorkerConfig {
            worker_count: workers,
            ..Default::default()
        };
        let changefeed = ChangefeedId::new("test", "group");
        let metrics = SinkMetrics::new(&changefeed);
        let collected = probes.clone();
        let group = WorkerGroup::spawn(changefeed, &config, &metrics, move |_| {
            let backend = InMemoryBackend::new(backend_config.clone());
            collected.lock().unwrap().push(backend.probe());
            Box::new(backend)
        })
        .unwrap();
        (group, probes)
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_and_dispatch_to_each_worker() {
        let (group, probes) = spawn_group(3, MemoryBackendConfig::default());
        assert_eq!(group.len(), 3);
        assert_eq!(group.changefeed().to_string(), "test.group");

        let released = Arc::new(AtomicUsize::new(0));
        for (i, worker) in group.workers().iter().enumerate() {
            assert_eq!(worker.id(), i);
            let released = released.clone();
            worker
                .add(txn(i as u64), move || {
                    released.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(released.load(Ordering::SeqCst), 3);
        for probe in probes.lock().unwrap().iter() {
            assert_eq!(probe.committed().len(), 1);
        }

        group.shutdown_and_join().await.unwrap();
        for probe in probes.lock().unwrap().iter() {
            assert_eq!(probe.close_calls(), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_flush_error_is_surfaced() {
        let (group, _probes) = spawn_group(
            2,
            MemoryBackendConfig {
                urgent_after_rows: Some(1),
                fail_on_flush: Some(1),
                ..Default::default()
            },
        );
        group.worker(1).unwrap().add(txn(1), || {}).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        let err = group.shutdown_and_join().await.unwrap_err();
        assert!(matches!(err, SinkError::Flush { worker_id: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_queues_closed_after_join() {
        let (group, _probes) = spawn_group(1, MemoryBackendConfig::default());
        let handle = group.worker(0).unwrap().clone();
        group.shutdown_and_join().await.unwrap();
        assert!(matches!(handle.add(txn(1), || {}), Err(SinkError::QueueClosed)));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = WorkerConfig {
            worker_count: 0,
            ..Default::default()
        };
        let changefeed = ChangefeedId::new("test", "bad");
        let metrics = SinkMetrics::new(&changefeed);
        let result = WorkerGroup::spawn(changefeed, &config, &metrics, |_| {
            Box::new(InMemoryBackend::new(MemoryBackendConfig::default()))
        });
        assert!(matches!(result, Err(SinkError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_zero_flush_interval_backend_rejected() {
        let changefeed = ChangefeedId::new("test", "zero");
        let metrics = SinkMetrics::new(&changefeed);
        let result = WorkerGroup::spawn(changefeed, &WorkerConfig::default(), &metrics, |_| {
            Box::new(InMemoryBackend::new(MemoryBackendConfig {
                max_flush_interval: Duration::ZERO,
                ..Default::default()
            }))
        });
        assert!(matches!(result, Err(SinkError::InvalidConfig(_))));
    }
}
