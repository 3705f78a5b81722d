//! Task - worker に渡されるトランザクション
//!
//! # 構成
//! - `SingleTableTxn`: 1 テーブル分の行変更（payload）
//! - `TxnCallbackableEvent`: payload + テーブル状態 + データ完了 callback
//! - `TxnEvent`: 上記 + タイミング情報（enqueue 時刻、依存解決時刻）
//!
//! callback は `FnOnce` なので「ちょうど 1 回」は型で保証されます。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use super::state::{TableSinkState, TableStateHandle};

/// データ完了 callback（書き込み完了 または drop 時に 1 回呼ばれる）
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// conflict detector へ「このトランザクションの依存ノードを解放してよい」と通知する closure
pub type Notifier = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowChangeKind {
    Insert,
    Update,
    Delete,
}

/// 1 行分の変更
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowChange {
    pub kind: RowChangeKind,
    pub columns: serde_json::Value,
}

impl RowChange {
    pub fn new(kind: RowChangeKind, columns: serde_json::Value) -> Self {
        Self { kind, columns }
    }

    pub fn insert(columns: serde_json::Value) -> Self {
        Self::new(RowChangeKind::Insert, columns)
    }
}

/// 1 テーブルに対する 1 トランザクション分の変更
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleTableTxn {
    pub table: String,
    pub commit_ts: u64,
    pub rows: Vec<RowChange>,
}

impl SingleTableTxn {
    pub fn new(table: impl Into<String>, commit_ts: u64, rows: Vec<RowChange>) -> Self {
        Self {
            table: table.into(),
            commit_ts,
            rows,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// payload とデータ完了 callback のペア
///
/// backend に forward された場合、callback を呼ぶのは backend の責務です
/// （書き込みが durable になった後に `finish()`）。
pub struct TxnCallbackableEvent {
    event: SingleTableTxn,
    table_state: TableStateHandle,
    callback: Callback,
}

impl TxnCallbackableEvent {
    pub fn new<F>(event: SingleTableTxn, table_state: TableStateHandle, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            event,
            table_state,
            callback: Box::new(callback),
        }
    }

    /// 所属テーブルの現在の状態
    pub fn table_state(&self) -> TableSinkState {
        self.table_state.get()
    }

    pub fn row_count(&self) -> usize {
        self.event.row_count()
    }

    /// callback を呼んで payload を返す
    pub fn finish(self) -> SingleTableTxn {
        (self.callback)();
        self.event
    }
}

impl fmt::Debug for TxnCallbackableEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxnCallbackableEvent")
            .field("event", &self.event)
            .field("table_state", &self.table_state.get())
            .finish_non_exhaustive()
    }
}

/// worker の intake queue に流れるタスク
#[derive(Debug)]
pub struct TxnEvent {
    inner: TxnCallbackableEvent,
    start: Instant,
    conflict_resolved: Instant,
}

impl TxnEvent {
    /// 現在時刻を enqueue 時刻・依存解決時刻の両方に使う
    pub fn new(inner: TxnCallbackableEvent) -> Self {
        let now = Instant::now();
        Self::with_timing(inner, now, now)
    }

    pub fn with_timing(inner: TxnCallbackableEvent, start: Instant, conflict_resolved: Instant) -> Self {
        Self {
            inner,
            start,
            conflict_resolved,
        }
    }

    /// detector が依存を解決した時点で呼ぶ
    pub fn mark_conflict_resolved(&mut self) {
        self.conflict_resolved = Instant::now();
    }

    pub fn start(&self) -> Instant {
        self.start
    }

    pub fn conflict_resolved(&self) -> Instant {
        self.conflict_resolved
    }

    pub fn table_state(&self) -> TableSinkState {
        self.inner.table_state()
    }

    pub fn row_count(&self) -> usize {
        self.inner.row_count()
    }

    /// conflict detection にかかった時間
    pub fn conflict_detect_duration(&self) -> Duration {
        self.conflict_resolved.saturating_duration_since(self.start)
    }

    /// enqueue から `now` までの待ち時間
    pub fn queue_duration(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.start)
    }

    pub fn into_inner(self) -> TxnCallbackableEvent {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn txn(rows: usize) -> SingleTableTxn {
        let rows = (0..rows)
            .map(|i| RowChange::insert(serde_json::json!({ "id": i })))
            .collect();
        SingleTableTxn::new("t1", 42, rows)
    }

    #[test]
    fn test_finish_invokes_callback_and_returns_payload() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let ev = TxnCallbackableEvent::new(txn(3), TableStateHandle::default(), move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(ev.row_count(), 3);

        let payload = ev.finish();
        assert_eq!(payload.commit_ts, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_table_state_is_read_through_handle() {
        let table = TableStateHandle::default();
        let ev = TxnEvent::new(TxnCallbackableEvent::new(txn(1), table.clone(), || {}));
        assert_eq!(ev.table_state(), TableSinkState::Sinking);
        table.set(TableSinkState::Stopping);
        assert_eq!(ev.table_state(), TableSinkState::Stopping);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timing_durations() {
        let start = Instant::now();
        tokio::time::advance(Duration::from_millis(30)).await;
        let resolved = Instant::now();
        tokio::time::advance(Duration::from_millis(20)).await;

        let ev = TxnEvent::with_timing(
            TxnCallbackableEvent::new(txn(0), TableStateHandle::default(), || {}),
            start,
            resolved,
        );
        assert_eq!(ev.conflict_detect_duration(), Duration::from_millis(30));
        assert_eq!(ev.queue_duration(Instant::now()), Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_conflict_resolved_measures_detector_wait() {
        let mut ev = TxnEvent::new(TxnCallbackableEvent::new(txn(1), TableStateHandle::default(), || {}));
        assert_eq!(ev.conflict_detect_duration(), Duration::ZERO);

        tokio::time::advance(Duration::from_millis(15)).await;
        ev.mark_conflict_resolved();
        assert_eq!(ev.conflict_detect_duration(), Duration::from_millis(15));
        assert_eq!(ev.conflict_resolved() - ev.start(), Duration::from_millis(15));
    }

    #[test]
    fn test_row_change_kind_serializes_snake_case() {
        let row = RowChange::new(RowChangeKind::Delete, serde_json::json!({ "id": 1 }));
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["kind"], "delete");
    }
}
