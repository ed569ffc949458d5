//! HTTP transport for remote status documents

use anyhow::{anyhow, Context, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::debug;

use super::RemoteStatus;
use crate::session::SessionKind;

/// Destination for remote status documents
pub trait RemoteStatusSink: Send + Sync {
    /// Create or replace the status document for the status's owner and kind
    fn put<'a>(&'a self, status: &'a RemoteStatus) -> BoxFuture<'a, Result<()>>;

    /// Remove the status document, succeeding if it is already gone
    fn delete<'a>(&'a self, owner_id: &'a str, kind: SessionKind) -> BoxFuture<'a, Result<()>>;
}

/// Writes status documents to `{endpoint}/status/{owner}/{kind}`
#[derive(Clone)]
pub struct HttpStatusSink {
    client: Client,
    endpoint: Url,
}

impl HttpStatusSink {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .with_context(|| format!("Invalid sync endpoint: {}", endpoint))?;
        if endpoint.cannot_be_a_base() {
            return Err(anyhow!("Sync endpoint cannot be used as a base URL: {}", endpoint));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, endpoint })
    }

    fn status_url(&self, owner_id: &str, kind: SessionKind) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("Sync endpoint cannot be used as a base URL"))?
            .pop_if_empty()
            .extend(["status", owner_id, kind.as_str()]);
        Ok(url)
    }
}

impl RemoteStatusSink for HttpStatusSink {
    fn put<'a>(&'a self, status: &'a RemoteStatus) -> BoxFuture<'a, Result<()>> {
        async move {
            let url = self.status_url(&status.owner_id, status.kind)?;
            debug!("PUT {}", url);

            self.client
                .put(url)
                .json(status)
                .send()
                .await
                .context("Failed to send status update")?
                .error_for_status()
                .context("Status update rejected")?;

            Ok(())
        }
        .boxed()
    }

    fn delete<'a>(&'a self, owner_id: &'a str, kind: SessionKind) -> BoxFuture<'a, Result<()>> {
        async move {
            let url = self.status_url(owner_id, kind)?;
            debug!("DELETE {}", url);

            let response = self
                .client
                .delete(url)
                .send()
                .await
                .context("Failed to send status retraction")?;

            if response.status() == reqwest::StatusCode::NOT_FOUND {
                return Ok(());
            }
            response
                .error_for_status()
                .context("Status retraction rejected")?;

            Ok(())
        }
        .boxed()
    }
}
