//! InMemoryBackend - 開発用・テスト用の backend
//!
//! # 動作
//! - `on_txn_event()` はイベントをバッファに積む
//! - バッファの行数が `urgent_after_rows` に達したら urgent を返す
//! - `flush()` はバッファを committed log に移し、各イベントの callback を順に呼ぶ
//! - `fail_on_flush = Some(n)` なら n 回目（1 始まり）の flush が失敗する
//!
//! `BackendProbe` を clone しておくと、backend を worker に渡した後も中身を観察できます。

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{BackendError, SingleTableTxn, TxnCallbackableEvent};
use crate::ports::Backend;

#[derive(Debug, Clone)]
pub struct MemoryBackendConfig {
    pub max_flush_interval: Duration,
    /// None なら urgent を返さない（タイマー flush のみ）
    pub urgent_after_rows: Option<usize>,
    pub fail_on_flush: Option<usize>,
    /// flush 1 回にかかる時間
    pub flush_latency: Duration,
}

impl Default for MemoryBackendConfig {
    fn default() -> Self {
        Self {
            max_flush_interval: Duration::from_millis(100),
            urgent_after_rows: None,
            fail_on_flush: None,
            flush_latency: Duration::ZERO,
        }
    }
}

#[derive(Debug, Default)]
struct ProbeState {
    committed: Vec<SingleTableTxn>,
    flush_calls: usize,
    close_calls: usize,
}

/// BackendProbe は InMemoryBackend の観察用ハンドル
#[derive(Debug, Clone, Default)]
pub struct BackendProbe {
    state: Arc<Mutex<ProbeState>>,
}

impl BackendProbe {
    fn lock(&self) -> MutexGuard<'_, ProbeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// flush に成功したトランザクション（書き込み順）
    pub fn committed(&self) -> Vec<SingleTableTxn> {
        self.lock().committed.clone()
    }

    pub fn committed_rows(&self) -> usize {
        self.lock().committed.iter().map(SingleTableTxn::row_count).sum()
    }

    /// 失敗も含めた flush 呼び出し回数
    pub fn flush_calls(&self) -> usize {
        self.lock().flush_calls
    }

    pub fn close_calls(&self) -> usize {
        self.lock().close_calls
    }
}

pub struct InMemoryBackend {
    config: MemoryBackendConfig,
    buffered: Vec<TxnCallbackableEvent>,
    buffered_rows: usize,
    probe: BackendProbe,
    closed: bool,
}

impl InMemoryBackend {
    pub fn new(config: MemoryBackendConfig) -> Self {
        Self {
            config,
            buffered: Vec::new(),
            buffered_rows: 0,
            probe: BackendProbe::default(),
            closed: false,
        }
    }

    pub fn probe(&self) -> BackendProbe {
        self.probe.clone()
    }

    pub fn buffered_len(&self) -> usize {
        self.buffered.len()
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    fn max_flush_interval(&self) -> Duration {
        self.config.max_flush_interval
    }

    fn on_txn_event(&mut self, event: TxnCallbackableEvent) -> bool {
        self.buffered_rows += event.row_count();
        self.buffered.push(event);
        match self.config.urgent_after_rows {
            Some(threshold) => self.buffered_rows >= threshold,
            None => false,
        }
    }

    async fn flush(&mut self) -> Result<(), BackendError> {
        if self.closed {
            return Err(BackendError::Closed);
        }
        let call = {
            let mut state = self.probe.lock();
            state.flush_calls += 1;
            state.flush_calls
        };
        if !self.config.flush_latency.is_zero() {
            tokio::time::sleep(self.config.flush_latency).await;
        }
        if self.config.fail_on_flush == Some(call) {
            return Err(BackendError::Write(format!("injected failure on flush #{call}")));
        }

        self.buffered_rows = 0;
        let batch: Vec<SingleTableTxn> = self
            .buffered
            .drain(..)
            .map(TxnCallbackableEvent::finish)
            .collect();
        self.probe.lock().committed.extend(batch);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        self.closed = true;
        self.probe.lock().close_calls += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RowChange, TableStateHandle};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event(table: &str, rows: usize, calls: &Arc<AtomicUsize>) -> TxnCallbackableEvent {
        let calls = calls.clone();
        let rows = (0..rows)
            .map(|i| RowChange::insert(serde_json::json!({ "id": i })))
            .collect();
        TxnCallbackableEvent::new(
            SingleTableTxn::new(table, 1, rows),
            TableStateHandle::default(),
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
            },
        )
    }

    #[tokio::test]
    async fn test_flush_commits_and_invokes_callbacks() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut backend = InMemoryBackend::new(MemoryBackendConfig::default());
        let probe = backend.probe();

        assert!(!backend.on_txn_event(event("a", 2, &calls)));
        assert!(!backend.on_txn_event(event("b", 1, &calls)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        backend.flush().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let tables: Vec<String> = probe.committed().into_iter().map(|t| t.table).collect();
        assert_eq!(tables, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(probe.committed_rows(), 3);
        assert_eq!(backend.buffered_len(), 0);
    }

    #[tokio::test]
    async fn test_urgent_after_row_threshold() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut backend = InMemoryBackend::new(MemoryBackendConfig {
            urgent_after_rows: Some(3),
            ..Default::default()
        });
        assert!(!backend.on_txn_event(event("a", 2, &calls)));
        assert!(backend.on_txn_event(event("a", 1, &calls)));

        backend.flush().await.unwrap();
        assert!(!backend.on_txn_event(event("a", 1, &calls)));
    }

    #[tokio::test]
    async fn test_injected_failure_keeps_callbacks_pending() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut backend = InMemoryBackend::new(MemoryBackendConfig {
            fail_on_flush: Some(1),
            ..Default::default()
        });
        let probe = backend.probe();
        backend.on_txn_event(event("a", 1, &calls));

        let err = backend.flush().await.unwrap_err();
        assert!(matches!(err, BackendError::Write(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(probe.flush_calls(), 1);
        assert!(probe.committed().is_empty());
    }

    #[tokio::test]
    async fn test_flush_after_close_fails() {
        let mut backend = InMemoryBackend::new(MemoryBackendConfig::default());
        let probe = backend.probe();
        backend.close().await.unwrap();
        assert_eq!(probe.close_calls(), 1);
        assert!(matches!(backend.flush().await, Err(BackendError::Closed)));
    }
}
