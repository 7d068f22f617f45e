//! Performances (shows) that inventory units are sold for.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a performance
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PerformanceId(i64);

impl PerformanceId {
    /// Create a `PerformanceId` from its storage key
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the raw storage key
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for PerformanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A show with a start time
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Performance {
    /// Performance identity
    pub id: PerformanceId,
    /// Title
    pub title: String,
    /// Description
    pub description: String,
    /// When the performance starts
    pub start_at: DateTime<Utc>,
}

/// Request to create a performance; the store assigns the id
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPerformance {
    /// Title
    pub title: String,
    /// Description
    pub description: String,
    /// When the performance starts
    pub start_at: DateTime<Utc>,
}
