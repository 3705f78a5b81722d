//! WorkerConfig - worker / pool の設定
//!
//! JSON などから deserialize できます。省略したフィールドは既定値になります。

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::SinkError;

/// ledger の既定容量（これを超えて伸びたら flush 後に作り直す）
pub const DEFAULT_LEDGER_CAPACITY: usize = 1024;

pub const DEFAULT_WORKER_COUNT: usize = 4;

pub const DEFAULT_OVERSEER_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// pool の worker 数（duty cycle の正規化にも使う）
    pub worker_count: usize,

    /// notifier ledger の基準容量
    pub ledger_capacity: usize,

    /// duty cycle のサンプリング周期（ミリ秒）
    pub overseer_interval_ms: u64,
}

impl WorkerConfig {
    pub fn overseer_interval(&self) -> Duration {
        Duration::from_millis(self.overseer_interval_ms)
    }

    /// 起動前の検証（Fail-fast）
    pub fn validate(&self) -> Result<(), SinkError> {
        if self.worker_count == 0 {
            return Err(SinkError::InvalidConfig("worker_count must be > 0".to_string()));
        }
        if self.ledger_capacity == 0 {
            return Err(SinkError::InvalidConfig("ledger_capacity must be > 0".to_string()));
        }
        if self.overseer_interval_ms == 0 {
            return Err(SinkError::InvalidConfig(
                "overseer_interval_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            ledger_capacity: DEFAULT_LEDGER_CAPACITY,
            overseer_interval_ms: DEFAULT_OVERSEER_INTERVAL_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.ledger_capacity, 1024);
        assert_eq!(config.overseer_interval(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: WorkerConfig = serde_json::from_str(r#"{ "worker_count": 16 }"#).unwrap();
        assert_eq!(config.worker_count, 16);
        assert_eq!(config.ledger_capacity, DEFAULT_LEDGER_CAPACITY);
        assert_eq!(config.overseer_interval_ms, DEFAULT_OVERSEER_INTERVAL_MS);
    }

    #[rstest]
    #[case(r#"{ "worker_count": 0 }"#, "worker_count")]
    #[case(r#"{ "ledger_capacity": 0 }"#, "ledger_capacity")]
    #[case(r#"{ "overseer_interval_ms": 0 }"#, "overseer_interval_ms")]
    fn test_validate_rejects_zero(#[case] json: &str, #[case] field: &str) {
        let config: WorkerConfig = serde_json::from_str(json).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, SinkError::InvalidConfig(ref msg) if msg.contains(field)));
    }
}
