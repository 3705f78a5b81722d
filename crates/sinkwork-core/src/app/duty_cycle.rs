//! DutyCycle - flush に費やした時間の割合
//!
//! overseer タイマーが発火するたびに `sample()` を呼びます。
//! 発行値は per-mille を pool の worker 数で割ったもので、
//! pool 全体で合計すると worker 数に依存しない占有率の近似になります。

use std::time::Duration;
use tokio::time::Instant;

/// 1 ウィンドウ分のサンプル
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DutySample {
    /// ウィンドウの長さ
    pub elapsed: Duration,
    /// ウィンドウ内の flush 時間の合計
    pub busy: Duration,
    /// busy / elapsed（最大 1.0）
    pub ratio: f64,
    /// metrics に加算する値（per-mille / worker 数）
    pub published: f64,
}

/// DutyCycle は flush 時間を累積し、ウィンドウごとにリセットする
#[derive(Debug)]
pub struct DutyCycle {
    window_start: Instant,
    busy: Duration,
    worker_count: usize,
}

impl DutyCycle {
    pub fn new(now: Instant, worker_count: usize) -> Self {
        Self {
            window_start: now,
            busy: Duration::ZERO,
            worker_count: worker_count.max(1),
        }
    }

    /// flush 1 回分の所要時間を加算
    pub fn record_busy(&mut self, elapsed: Duration) {
        self.busy += elapsed;
    }

    /// 現在のウィンドウを閉じてサンプルを返す（累積はリセット）
    pub fn sample(&mut self, now: Instant) -> DutySample {
        let elapsed = now.saturating_duration_since(self.window_start);
        let busy = self.busy;

        let ratio = if elapsed.is_zero() {
            0.0
        } else {
            (busy.as_secs_f64() / elapsed.as_secs_f64()).min(1.0)
        };
        let per_mille = (ratio * 1000.0).trunc();

        self.window_start = now;
        self.busy = Duration::ZERO;

        DutySample {
            elapsed,
            busy,
            ratio,
            published: per_mille / self.worker_count as f64,
        }
    }
}
