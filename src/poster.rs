//! # Poster
//!
//! Delivery orchestrator returned from metrics_librato::Builder

use super::batch::Batch;
use super::error::BoxError;
use super::partition::{partition, Chunk};
use super::submit::{ChunkOutcome, Submitter};
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use http::{Request, Response};
use std::num::NonZeroUsize;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Outcome of one chunk along with how many measurements it carried
#[derive(Debug)]
pub struct ChunkReport {
    pub measurements: usize,
    pub outcome: ChunkOutcome,
}

/// Per chunk outcomes of one delivery cycle, in chunk order
#[derive(Debug, Default)]
pub struct PostReport {
    pub chunks: Vec<ChunkReport>,
}

impl PostReport {
    fn push(&mut self, measurements: usize, outcome: ChunkOutcome) {
        self.chunks.push(ChunkReport { measurements, outcome });
    }

    /// Measurements that were handed to the transport, whatever the outcome
    pub fn measurements_posted(&self) -> usize {
        self.chunks
            .iter()
            .filter(|chunk| !matches!(chunk.outcome, ChunkOutcome::Skipped))
            .map(|chunk| chunk.measurements)
            .sum()
    }

    /// Measurements acknowledged with a 2xx
    pub fn measurements_delivered(&self) -> usize {
        self.delivered().map(|chunk| chunk.measurements).sum()
    }

    pub fn delivered(&self) -> impl Iterator<Item = &ChunkReport> {
        self.chunks.iter().filter(|chunk| chunk.outcome.is_delivered())
    }

    /// Chunks that were rejected, failed or skipped
    pub fn failed(&self) -> impl Iterator<Item = &ChunkReport> {
        self.chunks.iter().filter(|chunk| !chunk.outcome.is_delivered())
    }

    /// True when every chunk was delivered, including the trivial empty cycle
    pub fn is_complete(&self) -> bool {
        self.failed().next().is_none()
    }
}

/// Batches measurements and posts them, one request per chunk
///
/// Use [Builder](super::Builder) to construct. Delivery is best effort: a chunk that is
/// rejected or fails is logged and recorded in the [PostReport], the remaining chunks are
/// still attempted, and nothing is retried.
///
/// # Example
/// ```no_run
/// # use bytes::Bytes;
/// # use http::{Request, Response};
/// # async fn run() -> Result<(), metrics_librato::Error> {
/// # let transport = tower::service_fn(|_: Request<Bytes>| async {
/// #     Ok::<_, std::convert::Infallible>(Response::new(Bytes::new()))
/// # });
/// let mut poster = metrics_librato::Builder::new()
///     .endpoint("https://metrics-api.librato.com/v1/metrics")
///     .with_basic_auth("ops@example.com", "token")
///     .build(transport)?;
///
/// let mut batch = metrics_librato::Batch::new();
/// batch.add_counter("requests", 12)?.add_gauge("load", 0.75)?;
///
/// let report = poster.post(batch, "web-1", 1687394207).await;
/// assert!(report.is_complete());
/// # Ok(())
/// # }
/// ```
pub struct Poster<S> {
    service: S,
    submitter: Submitter,
    batch_size: NonZeroUsize,
}

impl<S> Poster<S> {
    pub(crate) fn new(service: S, submitter: Submitter, batch_size: NonZeroUsize) -> Self {
        Self {
            service,
            submitter,
            batch_size,
        }
    }

    pub fn batch_size(&self) -> NonZeroUsize {
        self.batch_size
    }

    pub fn timeout(&self) -> std::time::Duration {
        self.submitter.timeout
    }

    pub fn get_ref(&self) -> &S {
        &self.service
    }
}

impl<S> Poster<S>
where
    S: tower::Service<Request<Bytes>, Response = Response<Bytes>>,
    S::Error: Into<BoxError>,
{
    /// Post every chunk of `batch`, one after another in buffer order
    pub async fn post(&mut self, batch: Batch, source: &str, measure_time: u64) -> PostReport {
        self.run(batch, source, measure_time, None).await
    }

    /// Like [post](Self::post), but no new chunk is started once `deadline` has passed
    pub async fn post_until(&mut self, batch: Batch, source: &str, measure_time: u64, deadline: Instant) -> PostReport {
        self.run(batch, source, measure_time, Some(deadline)).await
    }

    async fn run(&mut self, batch: Batch, source: &str, measure_time: u64, deadline: Option<Instant>) -> PostReport {
        let mut report = PostReport::default();

        for chunk in partition(&batch, self.batch_size) {
            let outcome = if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                warn!(measurements = chunk.len(), "Deadline passed, skipping chunk");
                ChunkOutcome::Skipped
            } else {
                self.submitter
                    .submit(&mut self.service, &chunk, source, measure_time)
                    .await
            };
            report.push(chunk.len(), outcome);
        }

        debug!(
            measurements = report.measurements_posted(),
            chunks = report.chunks.len(),
            "Posted measurements"
        );
        report
    }
}

impl<S> Poster<S>
where
    S: tower::Service<Request<Bytes>, Response = Response<Bytes>> + Clone,
    S::Error: Into<BoxError>,
{
    /// Post with up to `limit` chunks in flight, each on its own clone of the service
    ///
    /// Every chunk is sent exactly once and the report keeps chunk order.
    pub async fn post_concurrent(&self, batch: Batch, source: &str, measure_time: u64, limit: NonZeroUsize) -> PostReport {
        let chunks: Vec<Chunk> = partition(&batch, self.batch_size).collect();

        let reports: Vec<ChunkReport> = stream::iter(&chunks)
            .map(|chunk| {
                let mut service = self.service.clone();
                async move {
                    let outcome = self.submitter.submit(&mut service, chunk, source, measure_time).await;
                    ChunkReport {
                        measurements: chunk.len(),
                        outcome,
                    }
                }
            })
            .buffered(limit.get())
            .collect()
            .await;

        let report = PostReport { chunks: reports };
        debug!(
            measurements = report.measurements_posted(),
            chunks = report.chunks.len(),
            "Posted measurements"
        );
        report
    }
}
