//! Request bodies posted by the training process.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A model checkpoint was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoraSavedRequest {
    pub path: String,
}

/// Training progress counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainStatus {
    pub epoch: u64,
    pub step: u64,
    pub total_step: u64,
    pub total_epoch: u64,
    pub loss: f64,
    /// Fields newer trainer versions add, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainProgressRequest {
    pub status: TrainStatus,
}
