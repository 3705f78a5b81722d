//! App - アプリケーション層
//!
//! domain と ports を組み合わせて worker を実装します。
//!
//! # 主要コンポーネント
//! - **WorkerLoop**: トランザクション実行ループ（admission → flush → notifier 解放）
//! - **WorkerGroup**: changefeed 1 本分の worker pool
//! - **NotifierLedger**: flush 境界で解放される notifier
//! - **DutyCycle**: flush 占有率のサンプリング

pub mod admission;
pub mod config;
pub mod duty_cycle;
pub mod ledger;
pub mod worker_group;
pub mod worker_loop;

// 主要な型を再エクスポート
pub use self::admission::Admission;
pub use self::config::WorkerConfig;
pub use self::duty_cycle::{DutyCycle, DutySample};
pub use self::ledger::NotifierLedger;
pub use self::worker_group::WorkerGroup;
pub use self::worker_loop::{TxnWorker, WorkerHandle};
