use super::collector::{self, Collector};
use super::error::ConfigError;
use super::partition::DEFAULT_BATCH_SIZE;
use super::poster::Poster;
use super::submit::{RequestTemplate, Submitter, DEFAULT_TIMEOUT};
use super::{BoxError, Error};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use http::{HeaderMap, Request, Response, Uri};
use metrics::SharedString;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

/// Builder for the [Poster] and its [Collector]
///
/// # Example
/// ```
/// use bytes::Bytes;
/// use http::{Request, Response};
///
/// let transport = tower::service_fn(|_: Request<Bytes>| async {
///     Ok::<_, std::convert::Infallible>(Response::new(Bytes::new()))
/// });
///
/// let poster = metrics_librato::Builder::new()
///     .endpoint("https://metrics-api.librato.com/v1/metrics")
///     .with_basic_auth("ops@example.com", "token")
///     .batch_size(300)
///     .timeout(std::time::Duration::from_secs(5))
///     .build(transport)
///     .unwrap();
/// assert_eq!(poster.batch_size().get(), 300);
/// ```
pub struct Builder {
    endpoint: Option<String>,
    batch_size: usize,
    timeout: Duration,
    basic_auth: Option<(String, String)>,
    user_agent: Option<String>,
    headers: Vec<(String, String)>,
    prefix: Option<SharedString>,
    timestamp: Option<u64>,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    pub fn new() -> Self {
        Builder {
            endpoint: None,
            batch_size: DEFAULT_BATCH_SIZE.get(),
            timeout: DEFAULT_TIMEOUT,
            basic_auth: None,
            user_agent: None,
            headers: Vec::new(),
            prefix: None,
            timestamp: None,
        }
    }

    /// Sets the URI every chunk is posted to
    /// * Must be set or build() will return [ConfigError::MissingEndpoint]
    pub fn endpoint(self, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            ..self
        }
    }

    /// Maximum number of measurements per request, defaults to 500
    /// * Zero is rejected by build()
    pub fn batch_size(self, batch_size: usize) -> Self {
        Self { batch_size, ..self }
    }

    /// Bound on the wait for each chunk's response, defaults to 10 seconds
    pub fn timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    /// Authenticates every request with the account email and API token
    pub fn with_basic_auth(mut self, email: impl Into<String>, token: impl Into<String>) -> Self {
        self.basic_auth = Some((email.into(), token.into()));
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Adds a static header sent with every request
    /// * This method can be called multiple times
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Prefixes every metric name reported by the [Collector], joined with `.`
    pub fn with_prefix(mut self, prefix: impl Into<SharedString>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Fixes the measure time stamped by [Collector::post], mostly useful in tests
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    fn headers(&self) -> Result<HeaderMap, ConfigError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let user_agent = match &self.user_agent {
            Some(user_agent) => HeaderValue::from_str(user_agent)
                .map_err(|_| ConfigError::InvalidHeader(USER_AGENT.to_string()))?,
            None => HeaderValue::from_static(concat!("metrics_librato/", env!("CARGO_PKG_VERSION"))),
        };
        headers.insert(USER_AGENT, user_agent);

        if let Some((email, token)) = &self.basic_auth {
            let credentials = STANDARD.encode(format!("{email}:{token}"));
            let mut value = HeaderValue::from_str(&format!("Basic {credentials}"))
                .map_err(|_| ConfigError::InvalidHeader(AUTHORIZATION.to_string()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        for (name, value) in &self.headers {
            let invalid = || ConfigError::InvalidHeader(name.clone());
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
            let value = HeaderValue::from_str(value).map_err(|_| invalid())?;
            headers.append(name, value);
        }

        Ok(headers)
    }

    /// Private helper for consuming the builder into poster and collector configuration
    fn config(self) -> Result<(Submitter, NonZeroUsize, collector::Config), ConfigError> {
        let endpoint = self.endpoint.as_deref().ok_or(ConfigError::MissingEndpoint)?;
        let uri: Uri = endpoint
            .parse()
            .map_err(|_| ConfigError::InvalidEndpoint(endpoint.to_owned()))?;
        let batch_size = NonZeroUsize::new(self.batch_size).ok_or(ConfigError::InvalidBatchSize)?;
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout);
        }

        let submitter = Submitter {
            template: RequestTemplate::new(uri, self.headers()?),
            timeout: self.timeout,
        };
        let collector = collector::Config {
            prefix: self.prefix,
            timestamp: self.timestamp,
        };
        Ok((submitter, batch_size, collector))
    }

    /// Build a [Poster] around any HTTP service
    pub fn build<S>(self, service: S) -> Result<Poster<S>, Error>
    where
        S: tower::Service<Request<Bytes>, Response = Response<Bytes>>,
        S::Error: Into<BoxError>,
    {
        let (submitter, batch_size, _) = self.config()?;
        Ok(Poster::new(service, submitter, batch_size))
    }

    /// Build a [Poster] backed by a fresh [reqwest::Client]
    #[cfg(feature = "reqwest")]
    pub fn build_reqwest(self) -> Result<Poster<super::ReqwestTransport>, Error> {
        let transport = super::ReqwestTransport::new()?;
        self.build(transport)
    }

    /// Build a [Poster] plus a [Collector] that is not installed as the global recorder
    pub fn build_with_collector<S>(self, service: S) -> Result<(Collector, Poster<S>), Error>
    where
        S: tower::Service<Request<Bytes>, Response = Response<Bytes>>,
        S::Error: Into<BoxError>,
    {
        let (submitter, batch_size, config) = self.config()?;
        Ok((Collector::new(config), Poster::new(service, submitter, batch_size)))
    }

    /// Intialize the metrics collector including the call to metrics::set_global_recorder
    pub fn init<S>(self, service: S) -> Result<(&'static Collector, Poster<S>), Error>
    where
        S: tower::Service<Request<Bytes>, Response = Response<Bytes>>,
        S::Error: Into<BoxError>,
    {
        let (collector, poster) = self.build_with_collector(service)?;
        let collector = Arc::new(collector);
        metrics::set_global_recorder(collector::Recorder::from(collector.clone()))
            .map_err(|_| "a global metrics recorder is already installed")?;

        // Installed recorders live for the rest of the process
        let collector: &'static Collector = Box::leak(Box::new(collector));
        Ok((collector, poster))
    }
}
