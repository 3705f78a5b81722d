//! Errors - エラー型
//!
//! - `BackendError`: backend 実装が返すエラー
//! - `SinkError`: worker / pool が上位（supervisor）へ返すエラー

use thiserror::Error;

/// BackendError は backend の write / flush / close の失敗
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("write failed: {0}")]
    Write(String),

    #[error("backend is closed")]
    Closed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// SinkError は worker 層のエラー
#[derive(Debug, Error)]
pub enum SinkError {
    /// flush 失敗は worker にとって致命的（リトライしない）
    #[error("worker {worker_id} flush failed: {source}")]
    Flush {
        worker_id: usize,
        #[source]
        source: BackendError,
    },

    #[error("intake queue is closed")]
    QueueClosed,

    #[error("worker loop panicked: {0}")]
    WorkerPanicked(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
