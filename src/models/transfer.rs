//! Transfer results and the per-sync reconciliation plan.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

fn as_seconds<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Result of one upload, download, or compression operation.
///
/// Exactly one direction carries a non-zero duration; a transfer skipped
/// because the other side already had the file carries zero in both.
#[derive(Debug, Clone, Serialize)]
pub struct TransferRecord {
    pub file_name: String,
    pub size: u64,
    #[serde(rename = "upload_seconds", serialize_with = "as_seconds")]
    pub upload_duration: Duration,
    #[serde(rename = "download_seconds", serialize_with = "as_seconds")]
    pub download_duration: Duration,
    pub accessed_at: DateTime<Utc>,
}

impl TransferRecord {
    pub fn uploaded(file_name: impl Into<String>, size: u64, elapsed: Duration) -> Self {
        Self {
            file_name: file_name.into(),
            size,
            upload_duration: elapsed,
            download_duration: Duration::ZERO,
            accessed_at: Utc::now(),
        }
    }

    pub fn downloaded(file_name: impl Into<String>, size: u64, elapsed: Duration) -> Self {
        Self {
            file_name: file_name.into(),
            size,
            upload_duration: Duration::ZERO,
            download_duration: elapsed,
            accessed_at: Utc::now(),
        }
    }

    /// Record for a file the reconciliation considered but did not move.
    pub fn skipped(file_name: impl Into<String>, size: u64) -> Self {
        Self {
            file_name: file_name.into(),
            size,
            upload_duration: Duration::ZERO,
            download_duration: Duration::ZERO,
            accessed_at: Utc::now(),
        }
    }
}

/// Set differences computed once per sync invocation from the current
/// local and remote inventories. Transient.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconciliationPlan {
    /// Present locally, absent remotely.
    pub missing_on_remote: Vec<String>,
    /// Present remotely, absent locally.
    pub missing_on_local: Vec<String>,
}

impl ReconciliationPlan {
    /// Order-independent set difference in both directions.
    pub fn compute(local: &[String], remote: &[String]) -> Self {
        Self {
            missing_on_remote: difference(local, remote),
            missing_on_local: difference(remote, local),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.missing_on_remote.is_empty() && self.missing_on_local.is_empty()
    }
}

/// Elements of `a` that are not in `b`, preserving `a`'s order.
fn difference(a: &[String], b: &[String]) -> Vec<String> {
    let known: std::collections::HashSet<&str> = b.iter().map(String::as_str).collect();
    a.iter()
        .filter(|name| !known.contains(name.as_str()))
        .cloned()
        .collect()
}
