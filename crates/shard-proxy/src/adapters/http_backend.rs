//! HTTP backend client for observer nodes.
//!
//! One `reqwest::Client` (connection pool) shared by every request. The
//! per-attempt timeout is set on the client; the dispatcher still wraps each
//! attempt in its own timer so mocks and real clients behave alike.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::trace;

use crate::domain::{DispatchConfig, HttpMethod, ObserverNode};
use crate::ports::{BackendClient, BackendRequest, BackendResponse, TransportError};

const USER_AGENT: &str = concat!("shard-proxy/", env!("CARGO_PKG_VERSION"));

/// reqwest-backed [`BackendClient`].
#[derive(Clone)]
pub struct HttpBackendClient {
    client: Client,
}

impl HttpBackendClient {
    /// Build a client with the given attempt and connect timeouts.
    pub fn new(attempt_timeout: Duration, connect_timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(attempt_timeout)
            .connect_timeout(connect_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        Ok(Self { client })
    }

    /// Build a client from the dispatch section of the config.
    pub fn from_config(config: &DispatchConfig) -> Result<Self, TransportError> {
        Self::new(config.attempt_timeout, config.connect_timeout)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

fn map_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else if err.is_body() || err.is_decode() {
        TransportError::Body(err.to_string())
    } else {
        TransportError::Request(err.to_string())
    }
}

#[async_trait]
impl BackendClient for HttpBackendClient {
    async fn execute(
        &self,
        node: &ObserverNode,
        request: &BackendRequest,
    ) -> Result<BackendResponse, TransportError> {
        let url = join_url(&node.url, &request.path);
        trace!(method = %request.method, url = %url, "Calling observer");

        let builder = match request.method {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Post => self.client.post(&url),
        };
        let builder = builder.header(reqwest::header::ACCEPT, "application/json");
        let builder = match &request.body {
            Some(body) => builder.json(body),
            None => builder,
        };

        let response = builder.send().await.map_err(map_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_error)?;

        Ok(BackendResponse { status, body })
    }
}
