use super::*;

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{Request, Response, StatusCode};
    use std::convert::Infallible;
    use std::sync::{Arc, Mutex};

    /// In-memory log sink shared between the subscriber and the test
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn lines(&self) -> Vec<String> {
            String::from_utf8(self.0.lock().unwrap().clone())
                .unwrap()
                .lines()
                .filter(|line| line.contains("metrics_librato"))
                .map(str::to_owned)
                .collect()
        }
    }

    fn capture_logs() -> (Captured, tracing::subscriber::DefaultGuard) {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .without_time()
            .with_writer(move || writer.clone())
            .finish();
        (captured, tracing::subscriber::set_default(subscriber))
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    /// Fake ingestion endpoint that keeps every body and answers 503 to the call at `fail_at`
    fn endpoint(
        fail_at: Option<usize>,
    ) -> (
        Arc<Mutex<Vec<String>>>,
        impl tower::Service<Request<Bytes>, Response = Response<Bytes>, Error = Infallible>,
    ) {
        let bodies = Arc::new(Mutex::new(Vec::new()));
        let seen = bodies.clone();
        let service = tower::service_fn(move |request: Request<Bytes>| {
            let mut seen = seen.lock().unwrap();
            seen.push(String::from_utf8(request.body().to_vec()).unwrap());

            let mut response = Response::new(Bytes::from_static(b"{\"errors\":\"unavailable\"}"));
            if fail_at == Some(seen.len() - 1) {
                *response.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
            }
            async move { Ok::<_, Infallible>(response) }
        });
        (bodies, service)
    }

    #[tokio::test]
    async fn simple_test() {
        init_tracing();
        let (bodies, service) = endpoint(None);
        let mut poster = Builder::new()
            .endpoint("http://metrics.test/v1/metrics")
            .batch_size(2)
            .build(service)
            .unwrap();

        let mut batch = Batch::new();
        batch
            .add_counter("a", 1)
            .unwrap()
            .add_counter("b", 2)
            .unwrap()
            .add_counter("c", 3)
            .unwrap()
            .add_gauge("d", 4.5)
            .unwrap()
            .add_gauge("e", 5.5)
            .unwrap();

        let report = poster.post(batch, "host1", 1000).await;
        assert!(report.is_complete());
        assert_eq!(report.measurements_posted(), 5);

        assert_eq!(
            *bodies.lock().unwrap(),
            vec![
                r#"{"source":"host1","measure_time":1000,"counters":[{"name":"a","value":1},{"name":"b","value":2}],"gauges":[]}"#,
                r#"{"source":"host1","measure_time":1000,"counters":[{"name":"c","value":3}],"gauges":[{"name":"d","value":4.5}]}"#,
                r#"{"source":"host1","measure_time":1000,"counters":[],"gauges":[{"name":"e","value":5.5}]}"#,
            ]
        );
    }

    #[tokio::test]
    async fn one_rejected_chunk_among_three() {
        let (logs, _guard) = capture_logs();
        let (bodies, service) = endpoint(Some(1));
        let mut poster = Builder::new()
            .endpoint("http://metrics.test/v1/metrics")
            .batch_size(2)
            .build(service)
            .unwrap();

        let batch: Batch = (0..6).map(|i| Measurement::counter(format!("c{i}"), i).unwrap()).collect();
        let report = poster.post(batch, "host1", 1000).await;

        assert_eq!(bodies.lock().unwrap().len(), 3);
        let failed: Vec<&ChunkReport> = report.failed().collect();
        assert_eq!(failed.len(), 1);
        match &failed[0].outcome {
            ChunkOutcome::Rejected { status, body } => {
                assert_eq!(*status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body, r#"{"errors":"unavailable"}"#);
            }
            other => panic!("unexpected outcome {other:?}"),
        }

        let lines = logs.lines();
        let errors: Vec<&String> = lines.iter().filter(|line| line.contains("ERROR")).collect();
        assert_eq!(errors.len(), 1, "{lines:#?}");
        assert!(errors[0].contains("status=503"));
        assert_eq!(
            lines
                .iter()
                .filter(|line| line.contains("DEBUG") && line.contains("measurements=6"))
                .count(),
            1,
            "{lines:#?}"
        );
    }

    #[tokio::test]
    async fn successful_cycle_logs_no_errors() {
        let (logs, _guard) = capture_logs();
        let (_, service) = endpoint(None);
        let mut poster = Builder::new()
            .endpoint("http://metrics.test/v1/metrics")
            .build(service)
            .unwrap();

        let batch: Batch = (0..3).map(|i| Measurement::counter(format!("c{i}"), i).unwrap()).collect();
        assert!(poster.post(batch, "host1", 1000).await.is_complete());

        let lines = logs.lines();
        assert!(lines.iter().all(|line| !line.contains("ERROR")), "{lines:#?}");
        assert!(lines.iter().any(|line| line.contains("DEBUG") && line.contains("measurements=3")));
    }

    // The only test in this crate that touches the global recorder
    #[tokio::test]
    async fn init_installs_global_recorder() {
        let (bodies, service) = endpoint(None);
        let (collector, mut poster) = Builder::new()
            .endpoint("http://metrics.test/v1/metrics")
            .with_timestamp(1687657545)
            .init(service)
            .unwrap();

        metrics::counter!("installed", "api" => "a_function").increment(3);
        let batch = collector.snapshot();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.measurements()[0].name(), "installed.api:a_function");
        assert_eq!(batch.measurements()[0].counter_value(), Some(3));

        let report = collector.post(&mut poster, "host1").await;
        assert!(report.is_complete());
        assert_eq!(
            *bodies.lock().unwrap(),
            vec![
                r#"{"source":"host1","measure_time":1687657545,"counters":[{"name":"installed.api:a_function","value":3}],"gauges":[]}"#
            ]
        );

        let (_, service) = endpoint(None);
        let second = Builder::new().endpoint("http://metrics.test/v1/metrics").init(service);
        assert!(second.is_err());

        // The first collector keeps receiving global metrics
        metrics::counter!("installed", "api" => "a_function").increment(1);
        assert_eq!(collector.snapshot().measurements()[0].counter_value(), Some(4));
    }

    #[tokio::test]
    async fn collector_cycle() {
        init_tracing();
        let (bodies, service) = endpoint(None);
        let (collector, mut poster) = Builder::new()
            .endpoint("http://metrics.test/v1/metrics")
            .with_prefix("svc")
            .with_timestamp(1687657545)
            .build_with_collector(service)
            .unwrap();

        metrics::with_local_recorder(&collector, || {
            metrics::counter!("success", "api" => "a_function").increment(2);
            metrics::gauge!("thing").set(3.25);
            metrics::histogram!("runtime").record(4.0);
            metrics::histogram!("runtime").record(6.0);
        });

        let report = collector.post(&mut poster, "host1").await;
        assert!(report.is_complete());
        assert_eq!(
            *bodies.lock().unwrap(),
            vec![
                r#"{"source":"host1","measure_time":1687657545,"counters":[{"name":"svc.success.api:a_function","value":2}],"gauges":[{"name":"svc.runtime","count":2,"max":6.0,"min":4.0,"sum":10.0,"sum_squares":52.0},{"name":"svc.thing","value":3.25}]}"#,
            ]
        );
    }

    #[tokio::test]
    async fn empty_collector_posts_nothing() {
        let (bodies, service) = endpoint(None);
        let (collector, mut poster) = Builder::new()
            .endpoint("http://metrics.test/v1/metrics")
            .build_with_collector(service)
            .unwrap();

        let report = collector.post(&mut poster, "host1").await;
        assert!(report.chunks.is_empty());
        assert!(bodies.lock().unwrap().is_empty());
    }
}
