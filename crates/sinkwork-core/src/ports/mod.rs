//! Ports - 抽象化レイヤー
//!
//! worker が依存する外部システム（下流のストレージ）へのインターフェース。

pub mod backend;

pub use self::backend::Backend;
