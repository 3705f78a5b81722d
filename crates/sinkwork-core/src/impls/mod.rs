//! Impls - 実装
//!
//! # 含まれる実装
//! - **IntakeQueue**: worker の unbounded MPSC キュー
//! - **InMemoryBackend**: 開発用・テスト用の backend
//!
//! 本番用の backend（MySQL など）は別クレートに配置します。

pub mod intake_queue;
pub mod memory_backend;

pub use self::intake_queue::IntakeQueue;
pub use self::memory_backend::{BackendProbe, InMemoryBackend, MemoryBackendConfig};
