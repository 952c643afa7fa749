//! Particulate-matter measurement type
//!
//! Mirrors the upstream provider's JSON object. Concentration fields use the
//! provider's wire names (`pm1dot0`, `pm2dot5`, `pm10`).

use crate::ids::SourceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single reading taken by one deployed sensor
///
/// Immutable once decoded. `recorded` is the instant the reading was taken at
/// the sensor, not the time it was ingested. Timestamps carrying any UTC
/// offset are normalised to UTC on decode, so comparisons are by absolute
/// instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Device model/type
    pub sensor: String,
    /// Deployed sensor instance (cache key)
    pub source: SourceId,
    #[serde(rename = "pm1dot0")]
    pub pm1_0: f64,
    #[serde(rename = "pm2dot5")]
    pub pm2_5: f64,
    pub pm10: f64,
    pub latitude: f64,
    pub longitude: f64,
    /// When the reading was taken at the source
    pub recorded: DateTime<Utc>,
}

impl Measurement {
    /// Whether this reading was taken strictly after `other`
    ///
    /// Equal instants are not newer.
    pub fn is_newer_than(&self, other: &Measurement) -> bool {
        self.recorded > other.recorded
    }

    /// Decode a provider batch (a JSON array of measurements)
    pub fn decode_batch(body: &[u8]) -> Result<Vec<Measurement>, serde_json::Error> {
        serde_json::from_slice(body)
    }
}
