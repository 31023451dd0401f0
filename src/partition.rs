//! # Partition
//!
//! Slices a measurement sequence into size bounded chunks, segregated by kind

use super::measurement::{Kind, Measurement};
use super::wire::Entry;
use std::iter::Peekable;
use std::num::NonZeroUsize;

/// Default number of measurements per HTTP request
pub const DEFAULT_BATCH_SIZE: NonZeroUsize = match NonZeroUsize::new(500) {
    Some(size) => size,
    None => unreachable!(),
};

/// Measurements destined for a single submission
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Chunk {
    pub counters: Vec<Entry>,
    pub gauges: Vec<Entry>,
}

impl Chunk {
    /// Total number of measurements, counters and gauges combined
    pub fn len(&self) -> usize {
        self.counters.len() + self.gauges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty() && self.gauges.is_empty()
    }
}

/// Iterator returned by [partition]
pub struct Partition<I: Iterator> {
    measurements: Peekable<I>,
    batch_size: NonZeroUsize,
    seen: usize,
}

/// Walk `measurements` once and yield a chunk every `batch_size` measurements, plus a
/// final short chunk for whatever remains
///
/// # Example
/// ```
/// use metrics_librato::{partition, Batch};
/// use std::num::NonZeroUsize;
///
/// let mut batch = Batch::new();
/// batch.add_counter("a", 1).unwrap().add_counter("b", 2).unwrap().add_gauge("c", 3.0).unwrap();
///
/// let sizes: Vec<usize> = partition(&batch, NonZeroUsize::new(2).unwrap()).map(|chunk| chunk.len()).collect();
/// assert_eq!(sizes, [2, 1]);
/// ```
pub fn partition<'a, T>(measurements: T, batch_size: NonZeroUsize) -> Partition<T::IntoIter>
where
    T: IntoIterator<Item = &'a Measurement>,
{
    Partition {
        measurements: measurements.into_iter().peekable(),
        batch_size,
        seen: 0,
    }
}

impl<'a, I: Iterator<Item = &'a Measurement>> Iterator for Partition<I> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let mut chunk = Chunk::default();

        while let Some(measurement) = self.measurements.next() {
            let entry = Entry::from(measurement);
            match measurement.kind() {
                Kind::Counter => chunk.counters.push(entry),
                Kind::Gauge => chunk.gauges.push(entry),
            }
            self.seen += 1;

            // A single combined check, so an exact multiple never flushes twice
            if self.seen % self.batch_size.get() == 0 || self.measurements.peek().is_none() {
                return Some(chunk);
            }
        }

        None
    }
}
