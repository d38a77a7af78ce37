//! Common types shared by the convolution load client.

pub mod error;
pub mod matrix;
pub mod request;

pub use error::{ConvError, ConvResult, ErrorKind};
pub use matrix::{format_matrix, generate, generate_with_rng, Matrix};
pub use request::{
    expected_response_size, ConvolutionRequest, ConvolutionResponse, RemoteStatus, RequestPlan,
    MAX_MESSAGE_SIZE,
};
