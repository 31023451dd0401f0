//! # Wire
//!
//! Helpers for serializing chunk envelopes via serde_json
//!
//! ```json
//! {"source":"host1","measure_time":1000,"counters":[{"name":"a","value":1}],"gauges":[]}
//! ```

use super::measurement::Measurement;
use bytes::Bytes;
use serde::Serialize;
use serde_json::{Map, Value};

/// A measurement as it appears inside the `counters` or `gauges` array
///
/// `name` is always written first, followed by the measurement's own fields
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    pub name: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl From<&Measurement> for Entry {
    fn from(measurement: &Measurement) -> Self {
        Self {
            name: measurement.name().to_owned(),
            fields: measurement.fields(),
        }
    }
}

/// One HTTP body, every chunk of a cycle shares `source` and `measure_time`
#[derive(Serialize)]
pub struct Envelope<'a> {
    pub source: &'a str,
    pub measure_time: u64,
    pub counters: &'a [Entry],
    pub gauges: &'a [Entry],
}

/// Serialize an envelope into a request body
///
/// Stateless, the same input always produces the same bytes
pub fn to_body(envelope: &Envelope<'_>) -> serde_json::Result<Bytes> {
    serde_json::to_vec(envelope).map(Bytes::from)
}
