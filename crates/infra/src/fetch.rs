//! Retrieval of a service's API description document.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, instrument};

use permsync_events::InstanceEvent;

/// Document retrieval failure. Fatal for the synchronization run.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("fetching api docs of {service} timed out after {timeout:?}")]
    Timeout { service: String, timeout: Duration },

    #[error("fetch swagger error, status code {status} is not 2xx, service: {service}")]
    Status { service: String, status: u16 },

    #[error("fetching api docs of {service} failed: {source}")]
    Transport {
        service: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Source of API description documents.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    /// Fetch the raw document body published by the announced instance.
    async fn fetch(&self, event: &InstanceEvent) -> Result<String, FetchError>;
}

/// `reqwest`-backed fetcher hitting a fixed, well-known path on the instance.
#[derive(Debug, Clone)]
pub struct HttpDocumentFetcher {
    client: reqwest::Client,
    docs_path: String,
    timeout: Duration,
}

impl HttpDocumentFetcher {
    /// `docs_path` is joined to the instance address; a missing leading `/`
    /// is added.
    pub fn new(docs_path: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let docs_path = docs_path.into();
        let docs_path = match docs_path.trim() {
            path if path.starts_with('/') => path.to_string(),
            path => format!("/{path}"),
        };
        Ok(Self {
            client,
            docs_path,
            timeout,
        })
    }

    /// Document URL for an instance address (`host:port`, scheme optional).
    pub fn docs_url(&self, instance_address: &str) -> String {
        let base = instance_address.trim_end_matches('/');
        if base.starts_with("http://") || base.starts_with("https://") {
            format!("{base}{}", self.docs_path)
        } else {
            format!("http://{base}{}", self.docs_path)
        }
    }
}

#[async_trait]
impl DocumentFetcher for HttpDocumentFetcher {
    #[instrument(skip(self, event), fields(service = %event.service_name, address = %event.instance_address), err)]
    async fn fetch(&self, event: &InstanceEvent) -> Result<String, FetchError> {
        let url = self.docs_url(&event.instance_address);
        debug!(url = %url, "fetching api docs");

        let map_err = |source: reqwest::Error| {
            if source.is_timeout() {
                FetchError::Timeout {
                    service: event.service_name.clone(),
                    timeout: self.timeout,
                }
            } else {
                FetchError::Transport {
                    service: event.service_name.clone(),
                    source,
                }
            }
        };

        let response = self.client.get(&url).send().await.map_err(map_err)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                service: event.service_name.clone(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(map_err)
    }
}
