//! Observability - worker の metrics ハンドル
//!
//! `metrics` facade のハンドルを changefeed ごとに明示的に作り、worker に渡します。
//! exporter（Prometheus など）の install は埋め込み側のプロセスが行います。
//! recorder が install されていなければハンドルは何もしません。

use std::time::Duration;

use metrics::{Counter, Gauge, Histogram};

use crate::domain::ChangefeedId;

pub const CONFLICT_DETECT_DURATION: &str = "sinkwork_txn_conflict_detect_duration_seconds";
pub const QUEUE_DURATION: &str = "sinkwork_txn_queue_duration_seconds";
pub const WORKER_FLUSH_DURATION: &str = "sinkwork_txn_worker_flush_duration_seconds";
pub const WORKER_BUSY_RATIO: &str = "sinkwork_txn_worker_busy_ratio";
pub const WORKER_HANDLED_ROWS: &str = "sinkwork_txn_worker_handled_rows";

/// SinkMetrics は 1 つの changefeed に属する全 worker で共有するハンドル
#[derive(Clone)]
pub struct SinkMetrics {
    changefeed: ChangefeedId,
    conflict_detect_duration: Histogram,
    queue_duration: Histogram,
    flush_duration: Histogram,
    // 浮動小数の単調増加値なので gauge の increment で表現する
    busy_ratio: Gauge,
}

impl SinkMetrics {
    pub fn new(changefeed: &ChangefeedId) -> Self {
        let namespace = changefeed.namespace().to_string();
        let id = changefeed.id().to_string();
        Self {
            changefeed: changefeed.clone(),
            conflict_detect_duration: metrics::histogram!(
                CONFLICT_DETECT_DURATION,
                "namespace" => namespace.clone(),
                "changefeed" => id.clone()
            ),
            queue_duration: metrics::histogram!(
                QUEUE_DURATION,
                "namespace" => namespace.clone(),
                "changefeed" => id.clone()
            ),
            flush_duration: metrics::histogram!(
                WORKER_FLUSH_DURATION,
                "namespace" => namespace.clone(),
                "changefeed" => id.clone()
            ),
            busy_ratio: metrics::gauge!(WORKER_BUSY_RATIO, "namespace" => namespace, "changefeed" => id),
        }
    }

    /// worker ごとのハンドルを作る（handled rows だけ worker label を持つ）
    pub fn for_worker(&self, worker_id: usize) -> WorkerMetrics {
        let handled_rows = metrics::counter!(
            WORKER_HANDLED_ROWS,
            "namespace" => self.changefeed.namespace().to_string(),
            "changefeed" => self.changefeed.id().to_string(),
            "worker" => worker_id.to_string()
        );
        WorkerMetrics {
            conflict_detect_duration: self.conflict_detect_duration.clone(),
            queue_duration: self.queue_duration.clone(),
            flush_duration: self.flush_duration.clone(),
            busy_ratio: self.busy_ratio.clone(),
            handled_rows,
        }
    }
}

/// WorkerMetrics は worker 1 本が書き込むハンドル
#[derive(Clone)]
pub struct WorkerMetrics {
    conflict_detect_duration: Histogram,
    queue_duration: Histogram,
    flush_duration: Histogram,
    busy_ratio: Gauge,
    handled_rows: Counter,
}

impl WorkerMetrics {
    /// recorder に接続しないハンドル（テスト用）
    pub fn noop() -> Self {
        Self {
            conflict_detect_duration: Histogram::noop(),
            queue_duration: Histogram::noop(),
            flush_duration: Histogram::noop(),
            busy_ratio: Gauge::noop(),
            handled_rows: Counter::noop(),
        }
    }

    pub fn observe_admitted(&self, conflict_detect: Duration, queued: Duration, rows: usize) {
        self.conflict_detect_duration.record(conflict_detect.as_secs_f64());
        self.queue_duration.record(queued.as_secs_f64());
        self.handled_rows.increment(rows as u64);
    }

    pub fn observe_flush(&self, elapsed: Duration) {
        self.flush_duration.record(elapsed.as_secs_f64());
    }

    pub fn add_busy_ratio(&self, value: f64) {
        self.busy_ratio.increment(value);
    }
}
