//! IntakeQueue - worker 用の unbounded MPSC キュー
//!
//! # 学習ポイント
//! - Mutex + Notify による async pop（Condvar の async 版）
//! - `notify_one()` は待機者がいなければ permit を 1 つ保存するので、起床は失われない
//! - close 後は「閉じていて空」を `None` で区別できる
//!
//! push は同期関数でブロックしません。consumer は 1 つだけを想定しています。

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::Notify;

use crate::domain::SinkError;

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// IntakeQueue は容量制限なしの many-producer / single-consumer キュー
pub struct IntakeQueue<T> {
    state: Mutex<QueueState<T>>,
    notify: Notify,
}

impl<T> IntakeQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// item を末尾に追加（close 済みなら `SinkError::QueueClosed`）
    pub fn push(&self, item: T) -> Result<(), SinkError> {
        {
            let mut state = self.lock();
            if state.closed {
                return Err(SinkError::QueueClosed);
            }
            state.items.push_back(item);
        }
        // lock を外してから通知
        self.notify.notify_one();
        Ok(())
    }

    /// 先頭の item を取り出す。空なら push されるまで待つ
    ///
    /// close 済みで空なら `None`。
    /// item を取り出すのと返すのは同じ poll の中なので、`select!` で drop されても item は失われない。
    pub async fn pop(&self) -> Option<T> {
        loop {
            {
                let mut state = self.lock();
                if let Some(item) = state.items.pop_front() {
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// close して、キューに残っている item を破棄する。破棄した件数を返す
    pub fn close_and_drain(&self) -> usize {
        let drained = {
            let mut state = self.lock();
            state.closed = true;
            state.items.drain(..).count()
        };
        // 待っている consumer を起こして None を返させる
        self.notify.notify_one();
        drained
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }
}

impl<T> Default for IntakeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
