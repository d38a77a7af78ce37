//! Client side of the convolution front service.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use conv_common::{ConvError, ConvResult, ConvolutionRequest, ConvolutionResponse, RemoteStatus};
use reqwest::{Client, Url};
use tracing::debug;

use crate::config::DispatchSettings;

/// Path of the convolution endpoint relative to the service base URL.
pub const CONVOLUTIONAL_LAYER_PATH: &str = "convolutional-layer";

/// The remote convolution service.
///
/// Implementations must be safe to call from many lifecycles at once.
#[async_trait]
pub trait ConvolutionService: Send + Sync {
    async fn convolutional_layer(
        &self,
        request: ConvolutionRequest,
    ) -> ConvResult<ConvolutionResponse>;
}

/// JSON over HTTP implementation backed by one pooled `reqwest` client.
pub struct HttpFrontClient {
    client: Client,
    endpoint: Url,
    timeout: Duration,
    max_message_size: u64,
}

impl HttpFrontClient {
    /// Create the client shared by every lifecycle.
    pub fn new(base_url: &Url, settings: &DispatchSettings) -> Result<Self> {
        let endpoint = base_url
            .join(CONVOLUTIONAL_LAYER_PATH)
            .with_context(|| format!("Invalid front service address: {}", base_url))?;

        let client = Client::builder()
            .timeout(settings.request_timeout)
            .connect_timeout(settings.connect_timeout)
            .tcp_nodelay(true)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            timeout: settings.request_timeout,
            max_message_size: settings.max_message_size,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn check_size(&self, size: u64) -> ConvResult<()> {
        if size > self.max_message_size {
            return Err(ConvError::ResponseTooLarge {
                size,
                limit: self.max_message_size,
            });
        }
        Ok(())
    }

    fn map_error(&self, err: reqwest::Error) -> ConvError {
        // A connect timeout also reports is_timeout; it is still a connection failure.
        if err.is_connect() {
            ConvError::Connection(err.to_string())
        } else if err.is_timeout() {
            ConvError::Timeout(self.timeout)
        } else {
            ConvError::Connection(err.to_string())
        }
    }
}

#[async_trait]
impl ConvolutionService for HttpFrontClient {
    async fn convolutional_layer(
        &self,
        request: ConvolutionRequest,
    ) -> ConvResult<ConvolutionResponse> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status();
        if let Some(length) = response.content_length() {
            self.check_size(length)?;
        }

        let body = response.bytes().await.map_err(|e| self.map_error(e))?;
        self.check_size(body.len() as u64)?;
        debug!(status = status.as_u16(), bytes = body.len(), "Received response");

        if !status.is_success() {
            return Err(match serde_json::from_slice::<RemoteStatus>(&body) {
                Ok(remote) => remote.into(),
                Err(_) => ConvError::Remote {
                    message: status.to_string(),
                    details: Vec::new(),
                },
            });
        }

        Ok(serde_json::from_slice(&body)?)
    }
}
