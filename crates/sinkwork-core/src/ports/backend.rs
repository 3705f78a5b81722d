//! Backend port - ストレージ書き込みの抽象化
//!
//! worker はこの trait にだけ依存します。
//! SQL の組み立てや下流との接続は実装側の責務です。

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{BackendError, TxnCallbackableEvent};

/// Backend は worker 1 本が排他的に所有する書き込み先
///
/// # 呼び出し規約
/// - `on_txn_event()` で受け取ったイベントは、次に成功した `flush()` で durable にする
/// - durable になったイベントの callback は backend が呼ぶ（`TxnCallbackableEvent::finish`）
/// - `close()` は loop 終了後に 1 回だけ呼ばれる
/// - flush のタイムアウトは backend 側で扱う
#[async_trait]
pub trait Backend: Send {
    /// 許容できる最大の flush 遅延（worker の flush タイマー周期になる）
    fn max_flush_interval(&self) -> Duration;

    /// イベントを 1 件受け取る
    ///
    /// 内部バッファが十分大きい/古いため、すぐに flush すべきなら true。
    fn on_txn_event(&mut self, event: TxnCallbackableEvent) -> bool;

    /// 前回の flush 成功以降に受け取った全イベントを書き込む（block してよい）
    async fn flush(&mut self) -> Result<(), BackendError>;

    /// リソースを解放
    async fn close(&mut self) -> Result<(), BackendError>;
}
