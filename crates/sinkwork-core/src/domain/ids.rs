//! Domain identifiers.
//!
//! changefeed は `namespace` と `id` の組で識別します。
//! metrics の label と log の field はどちらもこの型から作ります。

use serde::{Deserialize, Serialize};
use std::fmt;

/// ChangefeedId は 1 本のレプリケーションパイプラインの識別子
///
/// Display は `namespace.id` 形式（log field 用）。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangefeedId {
    namespace: String,
    id: String,
}

impl ChangefeedId {
    pub fn new(namespace: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            id: id.into(),
        }
    }

    /// `default` namespace の changefeed を作成
    pub fn with_default_namespace(id: impl Into<String>) -> Self {
        Self::new("default", id)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for ChangefeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.id)
    }
}
