//! Concurrent request lifecycles and their fork/join driver.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use conv_common::{ConvError, ConvResult, ConvolutionResponse, ErrorKind};
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};
use tracing::{error, info};

use crate::config::ClientConfig;
use crate::generator::RequestBuilder;
use crate::manual::ManualInput;
use crate::metrics::{MetricsCollector, RunSummary};
use crate::report;
use crate::transport::ConvolutionService;

/// Terminal state of one lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleStatus {
    Completed { response_id: u64, results: usize },
    Failed { kind: ErrorKind, message: String },
}

/// Outcome of one request lifecycle.
#[derive(Debug, Clone)]
pub struct LifecycleOutcome {
    /// Sequential identifier in `1..=N`.
    pub id: u64,
    /// Round-trip time, `None` if the service was never contacted.
    pub latency: Option<Duration>,
    pub status: LifecycleStatus,
}

impl LifecycleOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, LifecycleStatus::Completed { .. })
    }
}

/// Everything a finished run produced.
#[derive(Debug)]
pub struct RunResults {
    /// Outcomes in completion order.
    pub outcomes: Vec<LifecycleOutcome>,
    pub summary: RunSummary,
}

/// Launches request lifecycles against a convolution service and waits for
/// all of them.
pub struct Dispatcher {
    config: Arc<ClientConfig>,
    service: Arc<dyn ConvolutionService>,
    builder: RequestBuilder,
    counter: Arc<AtomicU64>,
}

impl Dispatcher {
    pub fn new(config: Arc<ClientConfig>, service: Arc<dyn ConvolutionService>) -> Self {
        let builder = RequestBuilder::new(config.clone());
        Self {
            config,
            service,
            builder,
            counter: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_manual_input(mut self, input: Arc<ManualInput>) -> Self {
        self.builder = self.builder.with_manual_input(input);
        self
    }

    /// Run `request_count` lifecycles and block until every one finished.
    ///
    /// Lifecycles are launched one `launch_delay` apart but run concurrently
    /// and may finish in any order. A failing lifecycle never affects its
    /// siblings.
    pub async fn run(&self) -> RunResults {
        let count = self.config.request_count;
        let started = Instant::now();
        let mut tasks = JoinSet::new();

        for _ in 0..count {
            sleep(self.config.dispatch.launch_delay).await;
            let lifecycle = Lifecycle {
                config: self.config.clone(),
                service: self.service.clone(),
                builder: self.builder.clone(),
                counter: self.counter.clone(),
            };
            tasks.spawn(lifecycle.run());
        }

        info!(requests = count, "All requests sent. Waiting for responses...");

        let mut metrics = MetricsCollector::new();
        let mut outcomes = Vec::with_capacity(count);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    match &outcome.status {
                        LifecycleStatus::Completed { results, .. } => {
                            metrics.record_success(outcome.latency.unwrap_or_default(), *results)
                        }
                        LifecycleStatus::Failed { kind, .. } => metrics.record_failure(*kind),
                    }
                    outcomes.push(outcome);
                }
                Err(e) => {
                    error!(error = %e, "Request task ended abnormally");
                    metrics.record_lost();
                }
            }
        }

        let front_url = self
            .config
            .base_url()
            .map_or_else(|_| self.config.address.clone(), |url| url.to_string());
        let summary = metrics.summary(front_url, started.elapsed());
        info!(
            succeeded = summary.successful_requests,
            failed = summary.failed_requests,
            "All requests completed"
        );

        RunResults { outcomes, summary }
    }
}

/// State owned by one lifecycle task.
struct Lifecycle {
    config: Arc<ClientConfig>,
    service: Arc<dyn ConvolutionService>,
    builder: RequestBuilder,
    counter: Arc<AtomicU64>,
}

impl Lifecycle {
    async fn run(self) -> LifecycleOutcome {
        let id = self.counter.fetch_add(1, Ordering::SeqCst) + 1;

        let plan = self.config.plan();
        info!(
            request_id = id,
            target_size = plan.target_size,
            kernel_size = plan.kernel_size,
            kernel_num = plan.kernel_num,
            avg_pool_size = plan.avg_pool_size,
            use_kernels = plan.use_kernels(),
            use_sigmoid = plan.use_sigmoid,
            "Request #{} started",
            id
        );

        let mut latency = None;
        let result = self.execute(id, &mut latency).await;

        let status = match result {
            Ok(response) => LifecycleStatus::Completed {
                response_id: response.id,
                results: response.result.len(),
            },
            Err(e) => {
                report::log_failure(id, &e);
                LifecycleStatus::Failed {
                    kind: e.kind(),
                    message: e.to_string(),
                }
            }
        };

        LifecycleOutcome {
            id,
            latency,
            status,
        }
    }

    async fn execute(
        &self,
        id: u64,
        latency: &mut Option<Duration>,
    ) -> ConvResult<ConvolutionResponse> {
        let plan = self.config.plan();
        if let Ok(expected) = plan.expected_size() {
            info!(
                request_id = id,
                expected_size = expected,
                expected_results = plan.expected_results(),
                "Request #{} -> Expected size: {}, Expected results: {}",
                id,
                expected,
                plan.expected_results()
            );
        }

        let builder = self.builder.clone();
        let built = match tokio::task::spawn_blocking(move || builder.build(id)).await {
            Ok(built) => built?,
            // Re-raise so the join loop counts this lifecycle as lost.
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                return Err(ConvError::ConfigurationInvalid {
                    field: "request".to_string(),
                    message: format!("request construction cancelled: {}", e),
                })
            }
        };

        let request = built.request;
        let dump = self.config.verbose.then(|| request.clone());
        let deadline = self.config.dispatch.request_timeout;

        let started = Instant::now();
        let response = timeout(deadline, self.service.convolutional_layer(request))
            .await
            .map_err(|_| ConvError::Timeout(deadline));
        let elapsed = started.elapsed();
        *latency = Some(elapsed);
        let response = response??;

        report::log_completion(id, &response, elapsed);
        if let Some(request) = dump {
            report::log_round_trip(id, &request, &response);
        }

        Ok(response)
    }
}
