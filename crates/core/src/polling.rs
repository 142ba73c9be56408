//! Polling advisory for backends without native change notification.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollingGuidance {
    /// Entity category, e.g. `resourcePools`.
    pub category: String,
    #[serde(with = "secs")]
    pub interval: Duration,
    /// Native fields to diff between polls.
    pub diff_fields: Vec<String>,
    pub tips: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollingRecommendation {
    pub backend: String,
    pub guidance: Vec<PollingGuidance>,
    /// Backend-wide tips (conditional requests, caching, backoff).
    pub tips: Vec<String>,
}

impl PollingRecommendation {
    pub fn for_category(&self, category: &str) -> Option<&PollingGuidance> {
        self.guidance.iter().find(|g| g.category == category)
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> { s.serialize_u64(d.as_secs()) }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
