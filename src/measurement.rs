//! # Measurement
//!
//! A named numeric fact, either a counter or a gauge

use super::error::ConfigError;
use serde_json::{Map, Value};

/// Discriminates which array of the envelope a measurement lands in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Counter,
    Gauge,
}

/// Value carried by a gauge
#[derive(Debug, Clone, PartialEq)]
pub enum GaugeValue {
    /// A single point-in-time sample
    Single(f64),
    /// Several samples summarized client side
    Aggregated {
        count: u64,
        sum: f64,
        min: f64,
        max: f64,
        sum_squares: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Reading {
    Counter(u64),
    Gauge(GaugeValue),
}

/// One named observation. Name and kind are fixed at construction.
///
/// # Example
/// ```
/// use metrics_librato::{Kind, Measurement};
///
/// let requests = Measurement::counter("requests", 42).unwrap();
/// assert_eq!(requests.kind(), Kind::Counter);
/// assert_eq!(requests.fields()["value"], 42);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    name: String,
    reading: Reading,
}

fn checked_name(name: impl Into<String>) -> Result<String, ConfigError> {
    let name = name.into();
    if name.trim().is_empty() {
        return Err(ConfigError::EmptyName);
    }
    Ok(name)
}

fn checked_finite(name: &str, values: &[f64]) -> Result<(), ConfigError> {
    if values.iter().all(|value| value.is_finite()) {
        Ok(())
    } else {
        Err(ConfigError::NonFinite(name.to_owned()))
    }
}

impl Measurement {
    pub fn counter(name: impl Into<String>, value: u64) -> Result<Self, ConfigError> {
        Ok(Self {
            name: checked_name(name)?,
            reading: Reading::Counter(value),
        })
    }

    /// NaN and infinite values are rejected, JSON has no encoding for them
    pub fn gauge(name: impl Into<String>, value: impl Into<f64>) -> Result<Self, ConfigError> {
        let name = checked_name(name)?;
        let value = value.into();
        checked_finite(&name, &[value])?;
        Ok(Self {
            name,
            reading: Reading::Gauge(GaugeValue::Single(value)),
        })
    }

    /// Multi-sample gauge, `count` must be non-zero and every statistic finite
    pub fn aggregated(
        name: impl Into<String>,
        count: u64,
        sum: f64,
        min: f64,
        max: f64,
        sum_squares: Option<f64>,
    ) -> Result<Self, ConfigError> {
        let name = checked_name(name)?;
        if count == 0 {
            return Err(ConfigError::EmptyAggregate(name));
        }
        checked_finite(&name, &[sum, min, max, sum_squares.unwrap_or_default()])?;
        Ok(Self {
            name,
            reading: Reading::Gauge(GaugeValue::Aggregated {
                count,
                sum,
                min,
                max,
                sum_squares,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> Kind {
        match self.reading {
            Reading::Counter(_) => Kind::Counter,
            Reading::Gauge(_) => Kind::Gauge,
        }
    }

    pub fn counter_value(&self) -> Option<u64> {
        match self.reading {
            Reading::Counter(value) => Some(value),
            Reading::Gauge(_) => None,
        }
    }

    pub fn gauge_value(&self) -> Option<&GaugeValue> {
        match &self.reading {
            Reading::Counter(_) => None,
            Reading::Gauge(value) => Some(value),
        }
    }

    /// Serializable fields of this measurement, not including `name`
    pub fn fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        match &self.reading {
            Reading::Counter(value) => {
                fields.insert("value".into(), (*value).into());
            }
            Reading::Gauge(GaugeValue::Single(value)) => {
                fields.insert("value".into(), (*value).into());
            }
            Reading::Gauge(GaugeValue::Aggregated {
                count,
                sum,
                min,
                max,
                sum_squares,
            }) => {
                fields.insert("count".into(), (*count).into());
                fields.insert("max".into(), (*max).into());
                fields.insert("min".into(), (*min).into());
                fields.insert("sum".into(), (*sum).into());
                if let Some(sum_squares) = sum_squares {
                    fields.insert("sum_squares".into(), (*sum_squares).into());
                }
            }
        }
        fields
    }
}
