use serde::Serialize;

use super::Key;

/// One parsed request record. Missing tags are empty strings; an unknown status code is 0.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub measurement: String,
    pub host: String,
    pub server_name: String,
    pub path: String,
    pub status_code: u16,
    /// Seconds.
    pub response_time: f64,
    pub response_size: Option<u64>,
    /// Point timestamp as sent (nanoseconds by line-protocol convention).
    pub timestamp: Option<i64>,
}

impl Observation {
    /// The aggregation bucket this observation belongs to.
    pub fn key(&self) -> Key {
        Key::new(
            self.measurement.clone(),
            self.host.clone(),
            self.server_name.clone(),
            self.path.clone(),
        )
    }
}
