//! State - テーブル sink のライフサイクル状態
//!
//! worker は admission 時に 1 回だけ状態を読みます。
//! その後に状態が変わっても再チェックはしません（flush 時にも見ない）。

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// TableSinkState はテーブル sink の状態を表現
///
/// # 状態遷移
/// - sinking: 書き込み受付中（active）
/// - stopping: 停止処理中（到着したイベントは drop）
/// - stopped: 停止済み（到着したイベントは drop）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableSinkState {
    Sinking,
    Stopping,
    Stopped,
}

impl TableSinkState {
    /// 書き込みを受け付ける状態か
    pub fn is_active(self) -> bool {
        matches!(self, TableSinkState::Sinking)
    }

    fn as_u8(self) -> u8 {
        match self {
            TableSinkState::Sinking => 0,
            TableSinkState::Stopping => 1,
            TableSinkState::Stopped => 2,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => TableSinkState::Sinking,
            1 => TableSinkState::Stopping,
            _ => TableSinkState::Stopped,
        }
    }
}

impl fmt::Display for TableSinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableSinkState::Sinking => write!(f, "sinking"),
            TableSinkState::Stopping => write!(f, "stopping"),
            TableSinkState::Stopped => write!(f, "stopped"),
        }
    }
}

/// TableStateHandle はテーブル sink と、そのテーブル宛ての全イベントで共有される状態
///
/// clone は同じ状態を指します。テーブル側が `set()` で遷移させ、
/// worker 側は `get()` で読むだけです。
#[derive(Debug, Clone)]
pub struct TableStateHandle {
    inner: Arc<AtomicU8>,
}

impl TableStateHandle {
    pub fn new(state: TableSinkState) -> Self {
        Self {
            inner: Arc::new(AtomicU8::new(state.as_u8())),
        }
    }

    pub fn get(&self) -> TableSinkState {
        TableSinkState::from_u8(self.inner.load(Ordering::Acquire))
    }

    pub fn set(&self, state: TableSinkState) {
        self.inner.store(state.as_u8(), Ordering::Release);
    }
}

impl Default for TableStateHandle {
    fn default() -> Self {
        Self::new(TableSinkState::Sinking)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(TableSinkState::Sinking, true)]
    #[case(TableSinkState::Stopping, false)]
    #[case(TableSinkState::Stopped, false)]
    fn test_is_active(#[case] state: TableSinkState, #[case] expected: bool) {
        assert_eq!(state.is_active(), expected);
    }

    #[test]
    fn test_handle_clones_share_state() {
        let table = TableStateHandle::default();
        let seen_by_event = table.clone();
        assert_eq!(seen_by_event.get(), TableSinkState::Sinking);

        table.set(TableSinkState::Stopping);
        assert_eq!(seen_by_event.get(), TableSinkState::Stopping);

        table.set(TableSinkState::Stopped);
        assert_eq!(seen_by_event.get(), TableSinkState::Stopped);
    }
}
