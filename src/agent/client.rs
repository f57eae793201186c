//! HTTP sender for the completion endpoint

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::transport::{HttpResponse, RequestSender, TransportError};
use crate::types::CompletionRequest;

/// Posts completion requests to the backend as JSON
pub struct HttpSender {
    client: Client,
    endpoint: String,
}

impl HttpSender {
    pub fn new(endpoint: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, endpoint: endpoint.into() })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RequestSender for HttpSender {
    async fn send(&self, request: &CompletionRequest) -> Result<HttpResponse, TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Body(e.to_string()))?;

        Ok(HttpResponse { status, body })
    }
}
