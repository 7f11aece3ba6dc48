//! Progress reporting for streaming actions

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Lifecycle status attached to a progress update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A single progress update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Percent complete (0-100); `None` when the producer has no estimate
    pub percentage: Option<f64>,
    pub message: String,
    pub status: ProgressStatus,
}

impl Progress {
    pub fn new(percentage: Option<f64>, message: impl Into<String>, status: ProgressStatus) -> Self {
        Self {
            percentage,
            message: message.into(),
            status,
        }
    }

    pub fn running(percentage: Option<f64>, message: impl Into<String>) -> Self {
        Self::new(percentage, message, ProgressStatus::Running)
    }
}

/// Receives progress updates for one streaming call
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, progress: &Progress);
}

impl<F> ProgressObserver for F
where
    F: Fn(&Progress) + Send + Sync,
{
    fn on_progress(&self, progress: &Progress) {
        self(progress)
    }
}

pub type SharedObserver = Arc<dyn ProgressObserver>;

/// `(index + 1) / total * 100`, clamped to 100
pub fn percent_complete(index: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    ((index.saturating_add(1) as f64 / total as f64) * 100.0).min(100.0)
}
