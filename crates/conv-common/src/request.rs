//! Convolution request/response types and request size prediction.

use serde::{Deserialize, Serialize};

use crate::error::{ConvError, ConvResult};
use crate::matrix::Matrix;

/// Ceiling for a serialized response (4 MiB).
pub const MAX_MESSAGE_SIZE: u64 = 4 * 1024 * 1024;

/// Body sent to the convolution front service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvolutionRequest {
    pub target: Matrix,
    #[serde(default)]
    pub kernel: Vec<Matrix>,
    pub avg_pool_size: u32,
    pub use_kernels: bool,
    pub use_sigmoid: bool,
}

/// Body returned by the front service on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvolutionResponse {
    /// Server side identifier of the request.
    pub id: u64,
    #[serde(default)]
    pub result: Vec<Matrix>,
}

/// Structured error body returned by the front service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteStatus {
    pub message: String,
    #[serde(default)]
    pub details: Vec<String>,
}

impl From<RemoteStatus> for ConvError {
    fn from(status: RemoteStatus) -> Self {
        ConvError::Remote {
            message: status.message,
            details: status.details,
        }
    }
}

/// Worst-case size in bytes of the response to a request.
///
/// `max(t²·4 + k²·n·4, t²·n·4 / p²)` with `t` the target size, `k` the kernel
/// size, `n` the kernel count and `p` the pooling window. Integer division,
/// saturating on overflow. `pool_size` must be positive.
pub fn expected_response_size(
    target_size: u32,
    kernel_size: u32,
    kernel_num: u32,
    pool_size: u32,
) -> ConvResult<u64> {
    if pool_size == 0 {
        return Err(ConvError::ConfigurationInvalid {
            field: "AvgPoolSize".to_string(),
            message: "must be greater than 0".to_string(),
        });
    }

    let t = target_size as u64;
    let k = kernel_size as u64;
    let n = kernel_num as u64;
    let p = pool_size as u64;

    let unpooled = t
        .saturating_mul(t)
        .saturating_mul(4)
        .saturating_add(k.saturating_mul(k).saturating_mul(n).saturating_mul(4));
    let pooled = t.saturating_mul(t).saturating_mul(n).saturating_mul(4) / (p * p);

    Ok(unpooled.max(pooled))
}

/// Scalar parameters of one convolution request, before any matrix exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestPlan {
    pub target_size: u32,
    pub kernel_size: u32,
    pub kernel_num: u32,
    pub avg_pool_size: u32,
    pub use_sigmoid: bool,
}

impl RequestPlan {
    /// Kernels are only applied when they have a size.
    pub fn use_kernels(&self) -> bool {
        self.kernel_size > 0
    }

    pub fn expected_size(&self) -> ConvResult<u64> {
        expected_response_size(
            self.target_size,
            self.kernel_size,
            self.kernel_num,
            self.avg_pool_size,
        )
    }

    /// Number of result matrices the service should return.
    pub fn expected_results(&self) -> u32 {
        self.kernel_num
    }

    /// Predicted size, or `RequestTooLarge` if it exceeds `limit`.
    pub fn check_size(&self, limit: u64) -> ConvResult<u64> {
        let expected = self.expected_size()?;
        if expected > limit {
            return Err(ConvError::RequestTooLarge { expected, limit });
        }
        Ok(expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pooled_term_wins_for_many_kernels() {
        // 100²·50·4 / 1 = 2_000_000 > 100²·4 + 9·50·4 = 41_800
        assert_eq!(expected_response_size(100, 3, 50, 1).unwrap(), 2_000_000);
    }

    #[test]
    fn test_zero_pool_size_is_rejected() {
        let err = expected_response_size(4, 3, 1, 0).unwrap_err();
        assert!(matches!(err, ConvError::ConfigurationInvalid { .. }));
    }

    #[test]
    fn test_overflow_saturates() {
        let size = expected_response_size(u32::MAX, u32::MAX, u32::MAX, 1).unwrap();
        assert_eq!(size, u64::MAX);
    }
}
