//! Timeline document served by the document endpoint.
//!
//! Shape: `{ "value": [[id, entry], ...] }`, oldest entry first.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineDocument {
    #[serde(default)]
    pub value: Vec<TimelineItem>,
}

impl TimelineDocument {
    /// Entries newest first, the order the timeline shows them.
    pub fn newest_first(&self) -> impl Iterator<Item = &TimelineItem> {
        self.value.iter().rev()
    }
}

/// One `[id, entry]` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineItem(pub EntryId, pub TimelineEntry);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryId {
    Number(i64),
    Text(String),
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryId::Number(n) => write!(f, "{}", n),
            EntryId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    #[serde(rename = "ID", default)]
    pub id: Option<EntryId>,
    #[serde(rename = "Location")]
    pub location: Location,
    #[serde(rename = "City", default)]
    pub city: Option<City>,
    #[serde(rename = "WeatherData", default)]
    pub weather: Option<WeatherData>,
    #[serde(rename = "SMS", default)]
    pub sms: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    /// Milliseconds since the epoch, as reported by the device
    pub timestamp: f64,
    pub coords: Coords,
}

impl Location {
    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp as i64)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Coords {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct City {
    pub title: String,
    #[serde(default)]
    pub distance: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherData {
    #[serde(default)]
    pub weather_state_abbr: Option<String>,
    #[serde(default)]
    pub weather_state_name: Option<String>,
    #[serde(default)]
    pub the_temp: Option<f64>,
}
