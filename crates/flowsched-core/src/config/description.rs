//! Structured (JSON) pool description.
//!
//! This is the only shape the marshaling layer exchanges; it is converted
//! into a typed [`ThreadPoolSpec`](super::ThreadPoolSpec) at the boundary and
//! mode names never travel further as strings.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Structured pool description with all-optional keys.
///
/// ```json
/// {
///     "numThreads" : 2,
///     "priority" : 0.5,
///     "affinityMode" : "CPU",
///     "affinity" : [0, 2, 4, 6],
///     "yieldMode" : "SPIN"
/// }
/// ```
///
/// Unknown keys are ignored. Affinity entries are signed so that a negative
/// entry is reported as an invalid spec rather than a parse error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadPoolDescription {
    /// Number of threads (0 = thread-per-block)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_threads: Option<u64>,
    /// Normalized priority in [-1.0, 1.0]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<f64>,
    /// `ALL`, `CPU` or `NUMA`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity_mode: Option<String>,
    /// CPU indices or NUMA node ids
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Vec<i64>>,
    /// `CONDITION`, `HYBRID` or `SPIN`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yield_mode: Option<String>,
}

impl ThreadPoolDescription {
    /// Parses a description from a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidThreadPoolSpec`] on malformed JSON or a type
    /// mismatch in a known key.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::InvalidThreadPoolSpec(format!("malformed description: {e}")))
    }

    /// Serializes the description as a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidThreadPoolSpec`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::InvalidThreadPoolSpec(format!("cannot serialize description: {e}")))
    }
}
