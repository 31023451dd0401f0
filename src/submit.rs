//! # Submit
//!
//! Sends one chunk to the ingestion endpoint and classifies the result

use super::error::{BoxError, DeliveryError};
use super::partition::Chunk;
use super::wire::{self, Envelope};
use bytes::Bytes;
use http::{HeaderMap, Method, Request, Response, StatusCode, Uri};
use std::time::Duration;
use tower::{Service, ServiceExt};
use tracing::error;

/// Default bound on the wait for a single chunk's response
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Method, endpoint and headers shared by every request of a [Poster](crate::Poster)
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
}

impl RequestTemplate {
    pub fn new(uri: Uri, headers: HeaderMap) -> Self {
        Self {
            method: Method::POST,
            uri,
            headers,
        }
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Stamp out a request carrying `body`
    pub fn request(&self, body: Bytes) -> Result<Request<Bytes>, http::Error> {
        let mut builder = Request::builder().method(self.method.clone()).uri(self.uri.clone());
        if let Some(headers) = builder.headers_mut() {
            headers.extend(self.headers.clone());
        }
        builder.body(body)
    }
}

/// What happened to one chunk
#[derive(Debug)]
pub enum ChunkOutcome {
    /// The endpoint answered with a 2xx status
    Delivered { status: StatusCode },
    /// The endpoint answered with any other status
    Rejected { status: StatusCode, body: String },
    /// No usable response, see [DeliveryError]
    Failed(DeliveryError),
    /// Never attempted because the cycle's deadline had passed
    Skipped,
}

impl ChunkOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, ChunkOutcome::Delivered { .. })
    }
}

/// Per chunk submission with a bounded wait
#[derive(Debug, Clone)]
pub(crate) struct Submitter {
    pub template: RequestTemplate,
    pub timeout: Duration,
}

impl Submitter {
    /// One attempt, never retried. Failures are logged here and returned as an outcome.
    pub async fn submit<S>(&self, service: &mut S, chunk: &Chunk, source: &str, measure_time: u64) -> ChunkOutcome
    where
        S: Service<Request<Bytes>, Response = Response<Bytes>>,
        S::Error: Into<BoxError>,
    {
        let outcome = match self.send(service, chunk, source, measure_time).await {
            Ok(response) if response.status().is_success() => ChunkOutcome::Delivered {
                status: response.status(),
            },
            Ok(response) => ChunkOutcome::Rejected {
                status: response.status(),
                body: String::from_utf8_lossy(response.body()).into_owned(),
            },
            Err(e) => ChunkOutcome::Failed(e),
        };

        match &outcome {
            ChunkOutcome::Rejected { status, body } => {
                error!(status = status.as_u16(), %body, measurements = chunk.len(), "Received an error from the metrics API");
            }
            ChunkOutcome::Failed(e) => {
                error!(error = %e, measurements = chunk.len(), "Unable to post to the metrics API");
            }
            _ => {}
        }

        outcome
    }

    async fn send<S>(
        &self,
        service: &mut S,
        chunk: &Chunk,
        source: &str,
        measure_time: u64,
    ) -> Result<Response<Bytes>, DeliveryError>
    where
        S: Service<Request<Bytes>, Response = Response<Bytes>>,
        S::Error: Into<BoxError>,
    {
        let body = wire::to_body(&Envelope {
            source,
            measure_time,
            counters: &chunk.counters,
            gauges: &chunk.gauges,
        })?;
        let request = self.template.request(body)?;

        // Readiness counts against the same bound as the call itself
        let call = async move { service.ready().await?.call(request).await };
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(|e| DeliveryError::Transport(e.into())),
            Err(_) => Err(DeliveryError::Timeout(self.timeout)),
        }
    }
}
