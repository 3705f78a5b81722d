//! Domain model (ids, table state, txn events, errors).

pub mod errors;
pub mod ids;
pub mod state;
pub mod task;

pub use self::errors::{BackendError, SinkError};
pub use self::ids::ChangefeedId;
pub use self::state::{TableSinkState, TableStateHandle};
pub use self::task::{
    Callback, Notifier, RowChange, RowChangeKind, SingleTableTxn, TxnCallbackableEvent, TxnEvent,
};
