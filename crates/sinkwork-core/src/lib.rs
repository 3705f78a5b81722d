//! sinkwork-core
//!
//! CDC sink のパーティション単位のトランザクション実行 worker。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, table state, txn event, errors）
//! - **ports**: 抽象化レイヤー（Backend）
//! - **app**: worker loop, worker group, ledger, duty cycle, config
//! - **impls**: 実装（IntakeQueue, InMemoryBackend）
//! - **observability**: metrics ハンドル

pub mod domain;
pub mod ports;
pub mod app;
pub mod impls;
pub mod observability;
