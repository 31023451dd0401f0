//! Batches counter and gauge measurements into size bounded JSON payloads and posts them
//! to a Librato-style ingestion endpoint, one HTTP request per chunk.
//!
//! Delivery is best effort, a failed chunk is logged and reported but never aborts the cycle.

pub type Error = Box<dyn std::error::Error + Send + Sync + 'static>;

pub use {
    batch::Batch,
    builder::Builder,
    collector::Collector,
    error::{BoxError, ConfigError, DeliveryError},
    measurement::{GaugeValue, Kind, Measurement},
    partition::{partition, Chunk, Partition, DEFAULT_BATCH_SIZE},
    poster::{ChunkReport, PostReport, Poster},
    submit::{ChunkOutcome, RequestTemplate, DEFAULT_TIMEOUT},
    wire::{Entry, Envelope},
};

#[cfg(feature = "reqwest")]
pub use transport::ReqwestTransport;

mod batch;
mod builder;
mod collector;
mod error;
mod measurement;
mod partition;
mod poster;
mod submit;
#[cfg(test)]
mod test;
#[cfg(feature = "reqwest")]
mod transport;
pub mod wire;
