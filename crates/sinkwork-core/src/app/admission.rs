//! Admission - backend へ forward するか drop するかの判定
//!
//! どちらの場合も notifier は ledger に積まれ、次の flush 境界で解放されます。
//! drop は notifier の解放順序を変えません。

use crate::domain::TableSinkState;

/// Admission は 1 件のタスクに対する判定結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// backend に書き込む
    Forward,
    /// テーブルが停止中/停止済みなので書き込まずに callback だけ呼ぶ
    Drop,
}

impl Admission {
    /// admission 時点のテーブル状態から判定
    pub fn decide(state: TableSinkState) -> Self {
        if state.is_active() {
            Admission::Forward
        } else {
            Admission::Drop
        }
    }
}
