use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::entities::usage_sample;

/// One host utilization reading as exposed over the API and stored in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub cpu_percent: f64,
    pub ram_percent: f64,
}

impl From<usage_sample::Model> for Sample {
    fn from(model: usage_sample::Model) -> Self {
        Self {
            id: model.id,
            created_at: model.created_at,
            cpu_percent: model.cpu_percent,
            ram_percent: model.ram_percent,
        }
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: CPU: {} - RAM: {}",
            self.created_at, self.cpu_percent, self.ram_percent
        )
    }
}

/// The serialized wire form of a [`Sample`].
///
/// The cache holds exactly this string, so a cache hit can be served without
/// decoding it again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleJson(String);

impl SampleJson {
    pub fn encode(sample: &Sample) -> Result<Self, serde_json::Error> {
        serde_json::to_string(sample).map(Self)
    }

    /// Wraps a value previously produced by [`SampleJson::encode`], e.g. read back from the cache.
    pub fn from_cached(raw: String) -> Self {
        Self(raw)
    }

    pub fn decode(&self) -> Result<Sample, serde_json::Error> {
        serde_json::from_str(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}
