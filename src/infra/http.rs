//! `reqwest`-backed page fetchers for the events API.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use eventfeed_api_types::{Page, PageParams, PageResponse};
use reqwest::{Client, Url};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::debug;

use crate::config::ApiSettings;
use crate::error::FetchError;
use crate::feed::{FeedSources, PageFetcher};

use super::error::InfraError;

const EVENTS_PATH: &str = "events";
const CREATED_EVENTS_PATH: &str = "users/me/events/created";
const RSVPED_EVENTS_PATH: &str = "users/me/events/rsvped";
const ORGANIZED_EVENTS_PATH: &str = "users/me/events/organized";
const MODERATED_EVENTS_PATH: &str = "users/me/events/moderated";
const NEARBY_EVENTS_PATH: &str = "events/nearby";
const ADMIN_USERS_PATH: &str = "admin/users";
const ADMIN_EVENTS_PATH: &str = "admin/events";

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Transport(err.to_string())
    }
}

/// Shared HTTP client plus the API root every feed path is joined to.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(settings: &ApiSettings) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(settings.timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
            token: settings.token.clone(),
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("eventfeed/", env!("CARGO_PKG_VERSION"))
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn fetcher<T, F>(&self, path: &str) -> Result<HttpPageFetcher<T, F>, InfraError> {
        let url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|err| InfraError::configuration(format!("invalid feed path `{path}`: {err}")))?;
        Ok(HttpPageFetcher {
            client: self.client.clone(),
            url,
            token: self.token.clone(),
            _marker: PhantomData,
        })
    }

    /// One fetcher per feed, pointed at the standard API paths.
    pub fn feed_sources(&self) -> Result<FeedSources, InfraError> {
        Ok(FeedSources {
            events: Arc::new(self.fetcher(EVENTS_PATH)?),
            created: Arc::new(self.fetcher(CREATED_EVENTS_PATH)?),
            rsvped: Arc::new(self.fetcher(RSVPED_EVENTS_PATH)?),
            organized: Arc::new(self.fetcher(ORGANIZED_EVENTS_PATH)?),
            moderated: Arc::new(self.fetcher(MODERATED_EVENTS_PATH)?),
            nearby: Arc::new(self.fetcher(NEARBY_EVENTS_PATH)?),
            admin_users: Arc::new(self.fetcher(ADMIN_USERS_PATH)?),
            admin_events: Arc::new(self.fetcher(ADMIN_EVENTS_PATH)?),
        })
    }
}

/// GETs one list endpoint and normalizes whatever list shape comes back.
pub struct HttpPageFetcher<T, F> {
    client: Client,
    url: Url,
    token: Option<String>,
    _marker: PhantomData<fn(F) -> T>,
}

impl<T, F: Serialize> HttpPageFetcher<T, F> {
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Cursor, page size, direction, then each present filter field.
    fn request_url(&self, params: &PageParams<F>) -> Result<Url, FetchError> {
        let filters = serde_json::to_value(&params.filters)
            .map_err(|err| FetchError::other(format!("failed to encode filters: {err}")))?;

        let mut url = self.url.clone();
        {
            let mut query = url.query_pairs_mut();
            if let Some(cursor) = params.cursor.as_deref() {
                query.append_pair("cursor", cursor);
            }
            if let Some(page_size) = params.page_size {
                query.append_pair("page_size", &page_size.to_string());
            }
            query.append_pair("direction", params.direction.as_str());

            if let Value::Object(fields) = filters {
                for (key, value) in fields {
                    match value {
                        Value::Null => {}
                        Value::String(text) => {
                            query.append_pair(&key, &text);
                        }
                        other => {
                            query.append_pair(&key, &other.to_string());
                        }
                    }
                }
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl<T, F> PageFetcher<T, F> for HttpPageFetcher<T, F>
where
    T: DeserializeOwned + Send + 'static,
    F: Serialize + Send + Sync + 'static,
{
    async fn fetch(&self, params: PageParams<F>) -> Result<Page<T>, FetchError> {
        let url = self.request_url(&params)?;
        debug!(url = %url, "Fetching page");

        let mut request = self.client.get(url);
        if let Some(token) = self.token.as_deref() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                message: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        let body: PageResponse<T> = serde_json::from_slice(&bytes)
            .map_err(|err| FetchError::decode(format!("failed to parse body: {err}")))?;
        if !body.is_paginated() {
            debug!(url = %self.url, "Normalizing unpaginated list response");
        }
        Ok(body.into_page(params.page_size.unwrap_or(0)))
    }
}
