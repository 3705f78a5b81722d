//! WorkerLoop - トランザクション実行ループ
//!
//! # フロー
//! 1. `WorkerHandle::add()` で (txn, notifier) を intake queue に積む
//! 2. loop が取り出して admission（forward / drop）
//! 3. backend の urgent、または flush タイマーで flush
//! 4. flush 成功後、ledger の notifier を enqueue 順にまとめて解放
//!
//! # 待ち合わせ
//! `select!` で 4 つのイベント源を待ちます。
//! - shutdown: flush せずに終了（Ok）
//! - intake queue: admission
//! - flush タイマー（周期 = `Backend::max_flush_interval()`）: flush 要求
//! - overseer タイマー: duty cycle のサンプリング
//!
//! loop の状態（pending フラグ、ledger、backend）は loop のタスクだけが触ります。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use super::admission::Admission;
use super::config::WorkerConfig;
use super::duty_cycle::DutyCycle;
use super::ledger::NotifierLedger;
use crate::domain::{ChangefeedId, Notifier, SinkError, TxnEvent};
use crate::impls::IntakeQueue;
use crate::observability::WorkerMetrics;
use crate::ports::Backend;

struct TxnWithNotifier {
    txn: TxnEvent,
    post_txn_executed: Notifier,
}

/// WorkerHandle は detector 側から worker にタスクを渡すためのハンドル
///
/// clone して複数のタスク/スレッドから同時に `add()` できます。
#[derive(Clone)]
pub struct WorkerHandle {
    id: usize,
    queue: Arc<IntakeQueue<TxnWithNotifier>>,
}

impl WorkerHandle {
    pub fn id(&self) -> usize {
        self.id
    }

    /// txn を worker に追加（ブロックしない）
    ///
    /// `post_txn_executed` は txn を含む flush が成功した後に 1 回だけ呼ばれます。
    /// conflict detector はこれを受けて依存グラフから txn のノードを外し、
    /// この txn に依存していた txn を解決します。
    ///
    /// close 後に呼ぶと `SinkError::QueueClosed`（txn と notifier は呼ばれずに破棄）。
    pub fn add<F>(&self, txn: TxnEvent, post_txn_executed: F) -> Result<(), SinkError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.queue.push(TxnWithNotifier {
            txn,
            post_txn_executed: Box::new(post_txn_executed),
        })
    }

    /// intake queue を close し、残っている txn を破棄する。破棄した件数を返す
    ///
    /// ledger に積まれた notifier には影響しません。
    /// backend を close するのは loop なので、先に shutdown で loop を止めてください。
    pub fn close(&self) -> usize {
        self.queue.close_and_drain()
    }

    /// intake queue に残っている件数
    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}

/// TxnWorker は 1 パーティション分の backend を所有して loop を回す
pub struct TxnWorker {
    id: usize,
    changefeed: ChangefeedId,
    worker_count: usize,

    queue: Arc<IntakeQueue<TxnWithNotifier>>,
    backend: Box<dyn Backend>,
    metrics: WorkerMetrics,

    // loop 専用
    flush_interval: Duration,
    overseer_interval: Duration,
    has_pending: bool,
    ledger: NotifierLedger,
}

impl TxnWorker {
    pub fn new(
        changefeed: ChangefeedId,
        id: usize,
        backend: Box<dyn Backend>,
        config: &WorkerConfig,
        metrics: WorkerMetrics,
    ) -> Result<Self, SinkError> {
        config.validate()?;
        // interval は周期 0 を受け付けない
        let flush_interval = backend.max_flush_interval();
        if flush_interval.is_zero() {
            return Err(SinkError::InvalidConfig(
                "backend max_flush_interval must be > 0".to_string(),
            ));
        }
        Ok(Self {
            id,
            changefeed,
            worker_count: config.worker_count,
            queue: Arc::new(IntakeQueue::new()),
            backend,
            metrics,
            flush_interval,
            overseer_interval: config.overseer_interval(),
            has_pending: false,
            ledger: NotifierLedger::new(config.ledger_capacity),
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn handle(&self) -> WorkerHandle {
        WorkerHandle {
            id: self.id,
            queue: Arc::clone(&self.queue),
        }
    }

    /// loop を実行し、終了後に backend を close する
    ///
    /// - shutdown / intake queue の close: `Ok(())`（未 flush 分は flush しない）
    /// - flush 失敗: `Err(SinkError::Flush)`
    pub async fn run_loop(mut self, mut shutdown_rx: watch::Receiver<bool>) -> Result<(), SinkError> {
        let result = self.event_loop(&mut shutdown_rx).await;
        if let Err(err) = self.backend.close().await {
            // teardown 中なので致命的ではない
            tracing::info!(
                changefeed = %self.changefeed,
                worker_id = self.id,
                error = %err,
                "transaction sink backend close failed"
            );
        }
        result
    }

    async fn event_loop(&mut self, shutdown_rx: &mut watch::Receiver<bool>) -> Result<(), SinkError> {
        tracing::info!(
            changefeed = %self.changefeed,
            worker_id = self.id,
            "transaction sink worker starts"
        );

        let queue = Arc::clone(&self.queue);
        let now = Instant::now();
        let mut flush_ticker = interval_at(now + self.flush_interval, self.flush_interval);
        flush_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut overseer_ticker = interval_at(now + self.overseer_interval, self.overseer_interval);
        overseer_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut duty = DutyCycle::new(now, self.worker_count);

        loop {
            let mut need_flush = false;
            tokio::select! {
                _ = wait_for_shutdown(shutdown_rx) => {
                    tracing::info!(
                        changefeed = %self.changefeed,
                        worker_id = self.id,
                        "transaction sink worker exits as canceled"
                    );
                    return Ok(());
                }
                txn = queue.pop() => match txn {
                    Some(txn) => need_flush = self.on_event(txn),
                    None => {
                        tracing::info!(
                            changefeed = %self.changefeed,
                            worker_id = self.id,
                            "transaction sink worker exits as intake queue closed"
                        );
                        return Ok(());
                    }
                },
                _ = flush_ticker.tick() => need_flush = true,
                now = overseer_ticker.tick() => {
                    let sample = duty.sample(now);
                    self.metrics.add_busy_ratio(sample.published);
                }
            }

            if need_flush && let Err(err) = self.do_flush(&mut duty).await {
                tracing::error!(
                    changefeed = %self.changefeed,
                    worker_id = self.id,
                    error = %err,
                    "transaction sink worker exits unexpectedly"
                );
                return Err(err);
            }
        }
    }

    /// admission。すぐに flush すべきなら true
    fn on_event(&mut self, item: TxnWithNotifier) -> bool {
        // drop する場合も flush 境界で notifier を解放する必要がある
        self.has_pending = true;
        let TxnWithNotifier {
            txn,
            post_txn_executed,
        } = item;

        match Admission::decide(txn.table_state()) {
            Admission::Drop => {
                // テーブルが停止中なので書き込まずに完了扱い
                txn.into_inner().finish();
                self.ledger.push(post_txn_executed);
                false
            }
            Admission::Forward => {
                self.metrics.observe_admitted(
                    txn.conflict_detect_duration(),
                    txn.queue_duration(Instant::now()),
                    txn.row_count(),
                );
                self.ledger.push(post_txn_executed);
                self.backend.on_txn_event(txn.into_inner())
            }
        }
    }

    async fn do_flush(&mut self, duty: &mut DutyCycle) -> Result<(), SinkError> {
        if !self.has_pending {
            return Ok(());
        }

        let start = Instant::now();
        let result = self.backend.flush().await;
        let elapsed = start.elapsed();
        duty.record_busy(elapsed);
        self.metrics.observe_flush(elapsed);

        if let Err(source) = result {
            tracing::warn!(
                changefeed = %self.changefeed,
                worker_id = self.id,
                error = %source,
                "transaction sink backend flush failed"
            );
            return Err(SinkError::Flush {
                worker_id: self.id,
                source,
            });
        }

        // flush 成功。conflict detector に通知する
        let released = self.ledger.release_all();
        self.has_pending = false;
        tracing::debug!(
            changefeed = %self.changefeed,
            worker_id = self.id,
            released,
            elapsed_ms = elapsed.as_millis() as u64,
            "transaction sink worker flushed"
        );
        Ok(())
    }
}

/// shutdown が true になるまで待つ。sender が drop された場合も停止とみなす
async fn wait_for_shutdown(shutdown_rx: &mut watch::Receiver<bool>) {
    let _ = shutdown_rx.wait_for(|stop| *stop).await;
}
