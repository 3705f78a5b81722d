//! NotifierLedger - flush 境界で解放される notifier の順序付きバッファ

use crate::domain::Notifier;

/// NotifierLedger は前回の flush 成功以降に admission された notifier を enqueue 順に保持
///
/// - `release_all()` は flush 成功直後にだけ呼ぶ
/// - バースト後に伸びた容量は `release_all()` で基準容量に戻す
pub struct NotifierLedger {
    pending: Vec<Notifier>,
    baseline_capacity: usize,
}

impl NotifierLedger {
    pub fn new(baseline_capacity: usize) -> Self {
        Self {
            pending: Vec::with_capacity(baseline_capacity),
            baseline_capacity,
        }
    }

    pub fn push(&mut self, notifier: Notifier) {
        self.pending.push(notifier);
    }

    /// 全 notifier を enqueue 順に呼び、呼んだ件数を返す
    pub fn release_all(&mut self) -> usize {
        let released = self.pending.len();
        for notifier in self.pending.drain(..) {
            notifier();
        }
        if self.pending.capacity() > self.baseline_capacity {
            self.pending = Vec::with_capacity(self.baseline_capacity);
        }
        released
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.pending.capacity()
    }
}

impl std::fmt::Debug for NotifierLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifierLedger")
            .field("pending", &self.pending.len())
            .field("baseline_capacity", &self.baseline_capacity)
            .finish()
    }
}
