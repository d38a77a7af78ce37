//! Command line configuration.
//!
//! [`Args`] is what clap parses from flags and the environment. It is resolved
//! once into an immutable [`ClientConfig`] that is shared by every lifecycle.

use std::time::Duration;

use clap::{Parser, ValueEnum};
use conv_common::{ConvError, ConvResult, RequestPlan, MAX_MESSAGE_SIZE};
use reqwest::Url;
use tracing::warn;

/// Delay before each lifecycle is launched.
pub const DEFAULT_LAUNCH_DELAY: Duration = Duration::from_millis(100);

/// Overall deadline for one request round-trip.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Deadline for establishing the TCP connection to the front service.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Raw command line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "conv-load-test")]
#[command(about = "Fires parallel convolution requests at a front service and times them")]
pub struct Args {
    /// Address of the front service (mandatory)
    #[arg(long, env = "FRONT_ADDR")]
    pub front_addr: Option<String>,

    /// Port of the front service
    #[arg(long, env = "FRONT_PORT", default_value_t = 55555)]
    pub front_port: u16,

    /// Number of requests to send in parallel
    #[arg(long, env = "REQUEST_COUNT", default_value = "1")]
    pub request_count: String,

    /// Print target, kernel and result matrices
    #[arg(long, env = "VERBOSE")]
    pub verbose: bool,

    /// Side length of the square target matrix
    #[arg(long, env = "TARGET_SIZE", default_value_t = 500)]
    pub target_size: u32,

    /// Number of kernels per request
    #[arg(long, env = "KERNEL_NUM", default_value_t = 180)]
    pub kernel_num: u32,

    /// Side length of each square kernel (0 disables kernels)
    #[arg(long, env = "KERNEL_SIZE", default_value_t = 3)]
    pub kernel_size: u32,

    /// Average pooling window size
    #[arg(long, env = "AVG_POOL_SIZE", default_value_t = 500)]
    pub avg_pool_size: u32,

    /// Ask the service to apply the sigmoid activation
    #[arg(long, env = "USE_SIGMOID")]
    pub use_sigmoid: bool,

    /// Fill matrices with random values
    #[arg(long, env = "RANDOM_VALUES")]
    pub random_values: bool,

    /// Read matrix values from stdin
    #[arg(long, env = "MANUAL_VALUES")]
    pub manual_values: bool,

    /// Cell value used when neither random nor manual values are requested
    #[arg(long, env = "FILL_VALUE", default_value_t = 1.0)]
    pub fill_value: f32,

    /// RNG seed for reproducible random matrices
    #[arg(long, env = "SEED")]
    pub seed: Option<u64>,

    /// Summary format printed after all requests complete
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    /// Logs only
    #[value(name = "none")]
    Quiet,
}

/// Where matrix cell values come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueMode {
    /// Every cell equals the configured fill value.
    Fill,
    Random,
    /// Values typed by the user.
    Manual,
}

/// Transport limits and pacing of the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    pub launch_delay: Duration,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub max_message_size: u64,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            launch_delay: DEFAULT_LAUNCH_DELAY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

/// Resolved client configuration, immutable after startup.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub address: String,
    pub port: u16,
    pub request_count: usize,
    pub verbose: bool,
    pub target_size: u32,
    pub kernel_num: u32,
    pub kernel_size: u32,
    pub avg_pool_size: u32,
    pub use_sigmoid: bool,
    pub value_mode: ValueMode,
    pub fill_value: f32,
    pub seed: Option<u64>,
    pub dispatch: DispatchSettings,
}

impl ClientConfig {
    /// Resolve raw arguments.
    ///
    /// Fails only when the front address is missing. An unusable request
    /// count is replaced by its default with a warning.
    pub fn from_args(args: &Args) -> ConvResult<Self> {
        let address = args
            .front_addr
            .as_deref()
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .ok_or_else(|| ConvError::ConfigurationMissing("FrontAddr".to_string()))?
            .to_string();

        let request_count = match parse_request_count(&args.request_count) {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "RequestCount given is not a valid integer, reverting to default value: 1");
                1
            }
        };

        // Manual entry takes precedence over random generation
        let value_mode = if args.manual_values {
            ValueMode::Manual
        } else if args.random_values {
            ValueMode::Random
        } else {
            ValueMode::Fill
        };

        Ok(Self {
            address,
            port: args.front_port,
            request_count,
            verbose: args.verbose,
            target_size: args.target_size,
            kernel_num: args.kernel_num,
            kernel_size: args.kernel_size,
            avg_pool_size: args.avg_pool_size,
            use_sigmoid: args.use_sigmoid,
            value_mode,
            fill_value: args.fill_value,
            seed: args.seed,
            dispatch: DispatchSettings::default(),
        })
    }

    /// Scalar request parameters shared by every lifecycle.
    pub fn plan(&self) -> RequestPlan {
        RequestPlan {
            target_size: self.target_size,
            kernel_size: self.kernel_size,
            kernel_num: self.kernel_num,
            avg_pool_size: self.avg_pool_size,
            use_sigmoid: self.use_sigmoid,
        }
    }

    /// Base URL of the front service.
    ///
    /// The address may carry a scheme, a port and a path prefix. A bare host
    /// gets `http://`, and the configured port applies only when the address
    /// names none. The path always ends with `/` so endpoints join beneath it.
    pub fn base_url(&self) -> ConvResult<Url> {
        let invalid = |message: String| ConvError::ConfigurationInvalid {
            field: "front_addr".to_string(),
            message,
        };

        let raw = if self.address.contains("://") {
            self.address.clone()
        } else {
            format!("http://{}", self.address)
        };
        let mut url = Url::parse(&raw).map_err(|e| invalid(format!("{}: {}", raw, e)))?;
        if url.cannot_be_a_base() || url.host_str().map_or(true, str::is_empty) {
            return Err(invalid(format!("{} has no host", raw)));
        }

        if url.port().is_none() {
            url.set_port(Some(self.port))
                .map_err(|_| invalid(format!("{} cannot take a port", raw)))?;
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }
}

/// Parse the request count. Negative counts mean no requests.
fn parse_request_count(raw: &str) -> ConvResult<usize> {
    let count: i64 = raw
        .trim()
        .parse()
        .map_err(|e: std::num::ParseIntError| ConvError::ConfigurationInvalid {
            field: "RequestCount".to_string(),
            message: format!("'{}': {}", raw, e),
        })?;
    Ok(usize::try_from(count).unwrap_or(0))
}
