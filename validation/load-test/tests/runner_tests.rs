//! Tests for the dispatcher against an in-memory convolution service.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use clap::Parser;
use conv_common::{
    ConvError, ConvResult, ConvolutionRequest, ConvolutionResponse, ErrorKind, Matrix,
};
use conv_load_test::{
    Args, ClientConfig, ConvolutionService, DispatchSettings, Dispatcher, LifecycleStatus,
    ManualInput, ValueMode,
};
use tracing::subscriber::DefaultGuard;

// ============================================================================
// Mock service
// ============================================================================

/// What the mock does with the n-th call (0-based).
type Behavior = Box<dyn Fn(usize) -> (Duration, bool) + Send + Sync>;

struct MockService {
    calls: AtomicUsize,
    next_id: AtomicU64,
    received: Mutex<Vec<ConvolutionRequest>>,
    behavior: Behavior,
}

impl MockService {
    fn new(behavior: impl Fn(usize) -> (Duration, bool) + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            next_id: AtomicU64::new(100),
            received: Mutex::new(Vec::new()),
            behavior: Box::new(behavior),
        })
    }

    fn instant() -> Arc<Self> {
        Self::new(|_| (Duration::ZERO, true))
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConvolutionService for MockService {
    async fn convolutional_layer(
        &self,
        request: ConvolutionRequest,
    ) -> ConvResult<ConvolutionResponse> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let (delay, ok) = (self.behavior)(call);
        let results = request.kernel.len();
        self.received.lock().unwrap().push(request);

        tokio::time::sleep(delay).await;
        if !ok {
            return Err(ConvError::Remote {
                message: "worker unavailable".to_string(),
                details: vec![format!("call {}", call)],
            });
        }
        Ok(ConvolutionResponse {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            result: vec![Matrix::filled(1, 1, 0.5); results],
        })
    }
}

fn config(request_count: usize) -> ClientConfig {
    ClientConfig {
        address: "127.0.0.1".to_string(),
        port: 55555,
        request_count,
        verbose: false,
        target_size: 4,
        kernel_num: 2,
        kernel_size: 3,
        avg_pool_size: 2,
        use_sigmoid: false,
        value_mode: ValueMode::Fill,
        fill_value: 1.0,
        seed: None,
        dispatch: DispatchSettings {
            launch_delay: Duration::ZERO,
            request_timeout: Duration::from_secs(5),
            ..DispatchSettings::default()
        },
    }
}

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

/// Capture log output of the current thread until the guard drops.
///
/// Tests using this run on the current-thread runtime, so lifecycle tasks log
/// on the same thread.
fn capture_logs() -> (LogBuffer, DefaultGuard) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (buffer, guard)
}

fn dispatcher(config: ClientConfig, service: &Arc<MockService>) -> Dispatcher {
    Dispatcher::new(Arc::new(config), service.clone())
}

// ============================================================================
// Identifier tests
// ============================================================================

#[tokio::test]
async fn test_ids_are_contiguous_and_unique() {
    // Later calls answer sooner, so completion order differs from launch order
    let service = MockService::new(|call| (Duration::from_millis(60 - 5 * call as u64), true));
    let results = dispatcher(config(12), &service).run().await;

    let mut ids: Vec<u64> = results.outcomes.iter().map(|o| o.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, (1..=12).collect::<Vec<u64>>());
    assert_eq!(service.calls(), 12);
}

#[tokio::test]
async fn test_zero_requests() {
    let service = MockService::instant();
    let results = dispatcher(config(0), &service).run().await;

    assert!(results.outcomes.is_empty());
    assert_eq!(results.summary.total_requests, 0);
    assert_eq!(service.calls(), 0);
}

// ============================================================================
// Request construction tests
// ============================================================================

#[tokio::test]
async fn test_small_request_without_kernels_is_sent() {
    let mut cfg = config(1);
    cfg.kernel_size = 0;
    cfg.kernel_num = 0;
    let service = MockService::instant();
    let results = dispatcher(cfg, &service).run().await;

    assert_eq!(service.calls(), 1);
    let received = service.received.lock().unwrap();
    let request = &received[0];
    assert_eq!(request.target, Matrix::filled(4, 4, 1.0));
    assert!(request.kernel.is_empty());
    assert!(!request.use_kernels);
    assert_eq!(request.avg_pool_size, 2);

    assert_eq!(
        results.outcomes[0].status,
        LifecycleStatus::Completed {
            response_id: 100,
            results: 0
        }
    );
}

#[tokio::test]
async fn test_each_lifecycle_builds_its_own_request() {
    let mut cfg = config(3);
    cfg.value_mode = ValueMode::Random;
    let service = MockService::instant();
    dispatcher(cfg, &service).run().await;

    let received = service.received.lock().unwrap();
    assert_eq!(received.len(), 3);
    assert_ne!(received[0].target, received[1].target);
    assert_ne!(received[1].target, received[2].target);
    assert!(received.iter().all(|r| r.kernel.len() == 2 && r.use_kernels));
}

#[tokio::test]
async fn test_too_large_request_never_reaches_service() {
    let mut cfg = config(3);
    cfg.target_size = 2000;
    cfg.kernel_size = 3;
    cfg.kernel_num = 180;
    cfg.avg_pool_size = 500;
    let service = MockService::instant();
    let results = dispatcher(cfg, &service).run().await;

    assert_eq!(service.calls(), 0);
    assert_eq!(results.outcomes.len(), 3);
    for outcome in &results.outcomes {
        assert!(outcome.latency.is_none());
        assert!(matches!(
            outcome.status,
            LifecycleStatus::Failed {
                kind: ErrorKind::RequestTooLarge,
                ..
            }
        ));
    }
    assert_eq!(results.summary.rejected_too_large, 3);
}

#[tokio::test]
async fn test_zero_pool_size_fails_locally() {
    let mut cfg = config(2);
    cfg.avg_pool_size = 0;
    let service = MockService::instant();
    let results = dispatcher(cfg, &service).run().await;

    assert_eq!(service.calls(), 0);
    assert_eq!(results.summary.invalid_input, 2);
}

// ============================================================================
// Failure isolation tests
// ============================================================================

#[tokio::test]
async fn test_remote_errors_are_isolated() {
    let service = MockService::new(|call| (Duration::from_millis(5), call % 2 == 0));
    let results = dispatcher(config(6), &service).run().await;

    assert_eq!(results.outcomes.len(), 6);
    assert_eq!(results.summary.successful_requests, 3);
    assert_eq!(results.summary.transport_failures, 3);
    for outcome in results.outcomes.iter().filter(|o| !o.is_success()) {
        match &outcome.status {
            LifecycleStatus::Failed { kind, message } => {
                assert_eq!(*kind, ErrorKind::TransportFailure);
                assert!(message.contains("worker unavailable"));
            }
            other => panic!("unexpected status: {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_timeout_only_affects_its_lifecycle() {
    let mut cfg = config(3);
    cfg.dispatch.request_timeout = Duration::from_millis(100);
    let service = MockService::new(|call| {
        if call == 0 {
            (Duration::from_secs(5), true)
        } else {
            (Duration::from_millis(5), true)
        }
    });
    let started = Instant::now();
    let results = dispatcher(cfg, &service).run().await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(results.summary.successful_requests, 2);
    assert_eq!(results.summary.transport_failures, 1);

    let timed_out = results
        .outcomes
        .iter()
        .find(|o| !o.is_success())
        .unwrap();
    assert!(timed_out.latency.unwrap() >= Duration::from_millis(100));
    match &timed_out.status {
        LifecycleStatus::Failed { message, .. } => assert!(message.contains("timed out")),
        other => panic!("unexpected status: {other:?}"),
    }
}

#[tokio::test]
async fn test_run_waits_for_every_lifecycle() {
    let service = MockService::new(|_| (Duration::from_millis(50), true));
    let results = dispatcher(config(5), &service).run().await;

    assert_eq!(results.outcomes.len(), 5);
    assert!(results.outcomes.iter().all(|o| o.is_success()));
    assert_eq!(results.summary.results_total, 10);
}

// ============================================================================
// Pacing and reporting tests
// ============================================================================

#[tokio::test]
async fn test_launches_are_staggered() {
    let mut cfg = config(4);
    cfg.dispatch.launch_delay = Duration::from_millis(25);
    let service = MockService::instant();
    let started = Instant::now();
    dispatcher(cfg, &service).run().await;

    assert!(started.elapsed() >= Duration::from_millis(100));
    assert_eq!(service.calls(), 4);
}

#[tokio::test]
async fn test_verbose_run_dumps_matrices() {
    let mut cfg = config(2);
    cfg.verbose = true;
    let service = MockService::instant();

    let (logs, _guard) = capture_logs();
    let results = dispatcher(cfg, &service).run().await;
    let logs = logs.contents();

    assert_eq!(results.summary.successful_requests, 2);
    assert!(logs.contains("Target (4 x 4)"), "{}", logs);
    assert!(logs.contains("Kernel 0 (3 x 3)"));
    assert!(logs.contains("Kernel 1 (3 x 3)"));
    assert!(logs.contains("Result 0 (1 x 1)"));
    assert!(logs.contains("Result 1 (1 x 1)"));
    assert!(logs.contains("Expected results: 2"));
}

#[tokio::test]
async fn test_quiet_run_skips_matrix_dump() {
    let service = MockService::instant();

    let (logs, _guard) = capture_logs();
    dispatcher(config(1), &service).run().await;
    let logs = logs.contents();

    assert!(logs.contains("Request #1"), "{}", logs);
    assert!(!logs.contains("Target (4 x 4)"));
}

// ============================================================================
// Configuration tests
// ============================================================================

#[tokio::test]
async fn test_non_integer_request_count_runs_one_request() {
    let args = Args::parse_from([
        "conv-load-test",
        "--front-addr",
        "127.0.0.1",
        "--request-count",
        "abc",
        "--target-size",
        "4",
        "--kernel-size",
        "0",
        "--kernel-num",
        "0",
        "--avg-pool-size",
        "2",
    ]);

    let (logs, _guard) = capture_logs();
    let mut cfg = ClientConfig::from_args(&args).unwrap();
    cfg.dispatch.launch_delay = Duration::ZERO;
    let service = MockService::instant();
    let results = dispatcher(cfg, &service).run().await;
    let logs = logs.contents();

    assert_eq!(results.outcomes.len(), 1);
    assert_eq!(results.outcomes[0].id, 1);
    assert!(results.outcomes[0].is_success());
    assert_eq!(service.calls(), 1);
    assert!(logs.contains("reverting to default value: 1"), "{}", logs);
}

// ============================================================================
// Abnormal termination tests
// ============================================================================

struct PanickingReader;

impl std::io::Read for PanickingReader {
    fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
        panic!("input source crashed");
    }
}

#[tokio::test]
async fn test_panicking_lifecycle_is_counted_as_lost() {
    let mut cfg = config(1);
    cfg.value_mode = ValueMode::Manual;
    let service = MockService::instant();
    let input = ManualInput::new(std::io::BufReader::new(PanickingReader));

    let results = dispatcher(cfg, &service)
        .with_manual_input(Arc::new(input))
        .run()
        .await;

    assert!(results.outcomes.is_empty());
    assert_eq!(results.summary.lost, 1);
    assert_eq!(results.summary.invalid_input, 0);
    assert_eq!(service.calls(), 0);
}

#[tokio::test]
async fn test_latency_is_recorded() {
    let service = MockService::new(|_| (Duration::from_millis(30), true));
    let results = dispatcher(config(2), &service).run().await;

    for outcome in &results.outcomes {
        assert!(outcome.latency.unwrap() >= Duration::from_millis(30));
    }
    assert!(results.summary.latency_min >= 29.0);
}
