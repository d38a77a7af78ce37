//! Convolution request construction.

use std::sync::Arc;

use conv_common::{generate_with_rng, ConvResult, ConvolutionRequest, Matrix};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::{ClientConfig, ValueMode};
use crate::manual::ManualInput;

/// A request ready to send together with its predicted response size.
#[derive(Debug, Clone)]
pub struct BuiltRequest {
    pub request: ConvolutionRequest,
    pub expected_size: u64,
}

/// Builds one fresh request per lifecycle from the client configuration.
#[derive(Clone)]
pub struct RequestBuilder {
    config: Arc<ClientConfig>,
    manual: Option<Arc<ManualInput>>,
}

impl RequestBuilder {
    pub fn new(config: Arc<ClientConfig>) -> Self {
        Self {
            config,
            manual: None,
        }
    }

    /// Source of values when the configuration asks for manual entry.
    pub fn with_manual_input(mut self, input: Arc<ManualInput>) -> Self {
        self.manual = Some(input);
        self
    }

    /// Build the request for lifecycle `request_id`.
    ///
    /// The predicted response size is checked before any matrix is created,
    /// so an oversized request costs nothing but the check.
    pub fn build(&self, request_id: u64) -> ConvResult<BuiltRequest> {
        let plan = self.config.plan();
        let expected_size = plan.check_size(self.config.dispatch.max_message_size)?;

        let mut source = self.value_source(request_id);
        let target_size = plan.target_size as usize;
        let kernel_size = plan.kernel_size as usize;

        let target = source.matrix("target", target_size)?;
        let kernel = (0..plan.kernel_num)
            .map(|i| source.matrix(&format!("kernel {}", i), kernel_size))
            .collect::<ConvResult<Vec<_>>>()?;

        Ok(BuiltRequest {
            request: ConvolutionRequest {
                target,
                kernel,
                avg_pool_size: plan.avg_pool_size,
                use_kernels: plan.use_kernels(),
                use_sigmoid: plan.use_sigmoid,
            },
            expected_size,
        })
    }

    fn value_source(&self, request_id: u64) -> ValueSource<'_> {
        match (self.config.value_mode, &self.manual) {
            (ValueMode::Manual, Some(input)) => ValueSource::Manual { input, request_id },
            (mode, _) => {
                // Each lifecycle owns its RNG so no random data is shared
                let rng = match self.config.seed {
                    Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(request_id)),
                    None => StdRng::from_entropy(),
                };
                ValueSource::Generated {
                    random: mode == ValueMode::Random,
                    fill_value: self.config.fill_value,
                    rng,
                }
            }
        }
    }
}

enum ValueSource<'a> {
    Generated {
        random: bool,
        fill_value: f32,
        rng: StdRng,
    },
    Manual {
        input: &'a ManualInput,
        request_id: u64,
    },
}

impl ValueSource<'_> {
    fn matrix(&mut self, name: &str, size: usize) -> ConvResult<Matrix> {
        match self {
            ValueSource::Generated {
                random,
                fill_value,
                rng,
            } => Ok(generate_with_rng(size, size, *random, *fill_value, rng)),
            ValueSource::Manual { input, request_id } => {
                input.read_matrix(*request_id, name, size, size)
            }
        }
    }
}
