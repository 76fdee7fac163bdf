use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::DealId,
    error::ApiError,
    protocol::{Deal, DealUpdate, MAX_PAGE_LIMIT},
};
use tracing::debug;
use url::Url;

use crate::error::ServiceError;

/// Remote source of truth for deals.
#[async_trait]
pub trait DealService: Send + Sync {
    async fn list_deals(&self) -> Result<Vec<Deal>, ServiceError>;
    async fn update_deal(&self, deal_id: DealId, update: &DealUpdate)
        -> Result<Deal, ServiceError>;
}

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub server_url: String,
    /// `None` waits for the server indefinitely.
    pub request_timeout: Option<Duration>,
    /// Deals requested per `list_deals` page.
    pub page_size: u32,
}

impl ClientSettings {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            request_timeout: None,
            page_size: MAX_PAGE_LIMIT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_LIMIT);
        self
    }
}

/// `DealService` over the CRM REST API (`/api/deals/`).
pub struct HttpDealService {
    http: Client,
    base_url: Url,
    page_size: u32,
}

impl HttpDealService {
    pub fn new(server_url: &str) -> Result<Self, ServiceError> {
        Self::with_settings(&ClientSettings::new(server_url))
    }

    pub fn with_settings(settings: &ClientSettings) -> Result<Self, ServiceError> {
        let mut base_url = Url::parse(settings.server_url.trim()).map_err(|e| {
            ServiceError::Transport(format!("invalid server url '{}': {e}", settings.server_url))
        })?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut builder = Client::builder();
        if let Some(timeout) = settings.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| ServiceError::Transport(format!("failed to build http client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            page_size: settings.page_size.clamp(1, MAX_PAGE_LIMIT),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ServiceError> {
        self.base_url
            .join(path)
            .map_err(|e| ServiceError::Transport(format!("invalid endpoint '{path}': {e}")))
    }
}

#[async_trait]
impl DealService for HttpDealService {
    /// Walks `skip`/`limit` pages until the server returns a short one.
    async fn list_deals(&self) -> Result<Vec<Deal>, ServiceError> {
        let mut deals: Vec<Deal> = Vec::new();
        loop {
            let mut url = self.endpoint("api/deals/")?;
            url.query_pairs_mut()
                .append_pair("skip", &deals.len().to_string())
                .append_pair("limit", &self.page_size.to_string());
            debug!(%url, "listing deals");
            let response = self.http.get(url).send().await.map_err(transport)?;
            let page: Vec<Deal> = decode(response).await?;
            if let Some(first) = page.first() {
                if deals.iter().any(|deal| deal.id == first.id) {
                    return Err(ServiceError::Malformed(format!(
                        "page at offset {} repeats deal {}",
                        deals.len(),
                        first.id
                    )));
                }
            }
            let last = page.len() < self.page_size as usize;
            deals.extend(page);
            if last {
                break;
            }
        }
        Ok(deals)
    }

    async fn update_deal(
        &self,
        deal_id: DealId,
        update: &DealUpdate,
    ) -> Result<Deal, ServiceError> {
        let url = self.endpoint(&format!("api/deals/{}", deal_id.0))?;
        debug!(%url, ?update, "updating deal");
        let response = self
            .http
            .put(url)
            .json(update)
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }
}

fn transport(err: reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        ServiceError::Transport(format!("request timed out: {err}"))
    } else {
        ServiceError::Transport(err.to_string())
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ServiceError> {
    let status = response.status();
    let body = response.bytes().await.map_err(transport)?;

    if !status.is_success() {
        let api_error = serde_json::from_slice::<ApiError>(&body).ok();
        return Err(ServiceError::Rejected {
            status: status.as_u16(),
            code: api_error.as_ref().map(|e| e.code),
            message: match api_error {
                Some(e) => e.message,
                None => String::from_utf8_lossy(&body).trim().to_string(),
            },
        });
    }

    serde_json::from_slice(&body).map_err(|e| ServiceError::Malformed(e.to_string()))
}

#[cfg(test)]
#[path = "tests/service_tests.rs"]
mod tests;
