//! # Batch
//!
//! Insertion ordered buffer of measurements for one delivery cycle

use super::error::ConfigError;
use super::measurement::Measurement;

/// Measurements accumulated during a run, handed to [Poster::post](crate::Poster::post) once
///
/// Entries are never deduplicated, two measurements with the same name are both submitted.
/// A batch is single writer; wrap it in a lock if several threads append to it.
///
/// # Example
/// ```
/// let mut batch = metrics_librato::Batch::new();
/// batch.add_counter("requests", 12).unwrap().add_gauge("load", 0.75).unwrap();
/// assert_eq!(batch.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    measurements: Vec<Measurement>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            measurements: Vec::with_capacity(capacity),
        }
    }

    pub fn add(&mut self, measurement: Measurement) -> &mut Self {
        self.measurements.push(measurement);
        self
    }

    pub fn add_counter(&mut self, name: impl Into<String>, value: u64) -> Result<&mut Self, ConfigError> {
        Ok(self.add(Measurement::counter(name, value)?))
    }

    pub fn add_gauge(&mut self, name: impl Into<String>, value: impl Into<f64>) -> Result<&mut Self, ConfigError> {
        Ok(self.add(Measurement::gauge(name, value)?))
    }

    pub fn add_aggregated(
        &mut self,
        name: impl Into<String>,
        count: u64,
        sum: f64,
        min: f64,
        max: f64,
    ) -> Result<&mut Self, ConfigError> {
        Ok(self.add(Measurement::aggregated(name, count, sum, min, max, None)?))
    }

    /// Buffered measurements in insertion order, the buffer is left untouched
    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }
}

impl Extend<Measurement> for Batch {
    fn extend<T: IntoIterator<Item = Measurement>>(&mut self, iter: T) {
        self.measurements.extend(iter);
    }
}

impl FromIterator<Measurement> for Batch {
    fn from_iter<T: IntoIterator<Item = Measurement>>(iter: T) -> Self {
        Self {
            measurements: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Batch {
    type Item = Measurement;
    type IntoIter = std::vec::IntoIter<Measurement>;

    fn into_iter(self) -> Self::IntoIter {
        self.measurements.into_iter()
    }
}

impl<'a> IntoIterator for &'a Batch {
    type Item = &'a Measurement;
    type IntoIter = std::slice::Iter<'a, Measurement>;

    fn into_iter(self) -> Self::IntoIter {
        self.measurements.iter()
    }
}
