//! HTTP transport to the backend query endpoint

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::BackendConfig;
use crate::error::{Error, Result};

/// Posts a JSON body and returns the decoded JSON response.
///
/// Any failure aborts the calling operation. Retries, if wanted, belong in
/// an implementation of this trait.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, url: &str, body: &Value) -> Result<Value>;
}

/// [`Transport`] over reqwest
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, url: &str, body: &Value) -> Result<Value> {
        let response = self.client.post(url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Backend {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        debug!(url, bytes = text.len(), "Backend response received");
        Ok(serde_json::from_str(&text)?)
    }
}
