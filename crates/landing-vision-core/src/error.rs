use serde::{Deserialize, Serialize};

/// How a failure inside a detection cycle should be handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Short-lived resource failure; the operation may succeed if retried.
    Transient,
    /// Not recoverable within the current cycle.
    Fatal,
    /// Input geometry cannot produce a result; drop the offending item.
    Degenerate,
}
