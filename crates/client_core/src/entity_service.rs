use std::{marker::PhantomData, time::Duration};

use async_trait::async_trait;
use reqwest::{header::LINK, Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    domain::Entity,
    error::{ErrorCode, Problem},
    protocol::{PageRequest, SearchRequest},
};
use tracing::{debug, info};
use url::Url;

use crate::{error::ServiceError, notification_bus::NotificationBus};

/// One batch of records plus the raw pagination `Link` header, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityPage<T> {
    pub items: Vec<T>,
    pub link_header: Option<String>,
}

impl<T> EntityPage<T> {
    pub fn new(items: Vec<T>, link_header: Option<String>) -> Self {
        Self { items, link_header }
    }
}

#[async_trait]
pub trait EntityService: Send + Sync {
    type Item: Clone + Send + Sync + 'static;

    async fn query(
        &self,
        request: &PageRequest,
    ) -> Result<EntityPage<Self::Item>, ServiceError>;

    async fn search(
        &self,
        request: &SearchRequest,
    ) -> Result<EntityPage<Self::Item>, ServiceError>;
}

/// HTTP client for one entity collection of the catalog REST api.
pub struct RestEntityService<E: Entity> {
    http: Client,
    api_base: Url,
    notifications: Option<NotificationBus>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> RestEntityService<E> {
    pub fn new(server_url: &str) -> Result<Self, ServiceError> {
        Self::with_client(Client::new(), server_url)
    }

    pub fn with_timeout(server_url: &str, timeout: Duration) -> Result<Self, ServiceError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| ServiceError::Transport {
                url: server_url.to_string(),
                source,
            })?;
        Self::with_client(http, server_url)
    }

    pub fn with_client(http: Client, server_url: &str) -> Result<Self, ServiceError> {
        let trimmed = server_url.trim().trim_end_matches('/');
        let api_base = Url::parse(&format!("{trimmed}/api/"))?;
        Ok(Self {
            http,
            api_base,
            notifications: None,
            _entity: PhantomData,
        })
    }

    /// Publishes the collection topic on `bus` after every successful mutation.
    pub fn with_notifications(mut self, bus: NotificationBus) -> Self {
        self.notifications = Some(bus);
        self
    }

    fn collection_url(&self) -> Result<Url, ServiceError> {
        Ok(self.api_base.join(E::KIND.resource_path())?)
    }

    fn search_url(&self) -> Result<Url, ServiceError> {
        Ok(self
            .api_base
            .join(&format!("_search/{}", E::KIND.resource_path()))?)
    }

    fn record_url(&self, id: i64) -> Result<Url, ServiceError> {
        Ok(self
            .api_base
            .join(&format!("{}/{id}", E::KIND.resource_path()))?)
    }

    pub async fn find(&self, id: i64) -> Result<Option<E>, ServiceError> {
        let url = self.record_url(id)?;
        let response = send(self.http.get(url.clone()), &url).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response).await?;
        decode(response, &url).await.map(Some)
    }

    pub async fn count(&self) -> Result<u64, ServiceError> {
        let url = self
            .api_base
            .join(&format!("{}/count", E::KIND.resource_path()))?;
        let response = check_status(send(self.http.get(url.clone()), &url).await?).await?;
        decode(response, &url).await
    }

    pub async fn create(&self, entity: &E) -> Result<E, ServiceError> {
        if entity.id().is_some() {
            return Err(ServiceError::Validation(format!(
                "a new {} cannot already have an id",
                E::KIND.resource_path()
            )));
        }
        let url = self.collection_url()?;
        let response =
            check_status(send(self.http.post(url.clone()).json(entity), &url).await?).await?;
        let created: E = decode(response, &url).await?;
        info!(
            resource = E::KIND.resource_path(),
            id = created.id(),
            "http: created record"
        );
        self.notify_modified();
        Ok(created)
    }

    pub async fn update(&self, entity: &E) -> Result<E, ServiceError> {
        let Some(id) = entity.id() else {
            return Err(ServiceError::Validation(format!(
                "cannot update {} without an id",
                E::KIND.resource_path()
            )));
        };
        let url = self.collection_url()?;
        let response =
            check_status(send(self.http.put(url.clone()).json(entity), &url).await?).await?;
        let updated: E = decode(response, &url).await?;
        info!(resource = E::KIND.resource_path(), id, "http: updated record");
        self.notify_modified();
        Ok(updated)
    }

    pub async fn delete(&self, id: i64) -> Result<(), ServiceError> {
        let url = self.record_url(id)?;
        check_status(send(self.http.delete(url.clone()), &url).await?).await?;
        info!(resource = E::KIND.resource_path(), id, "http: deleted record");
        self.notify_modified();
        Ok(())
    }

    fn notify_modified(&self) {
        if let Some(bus) = &self.notifications {
            bus.publish(E::KIND.list_modification_topic());
        }
    }

    async fn fetch_page(
        &self,
        url: Url,
        pairs: Vec<(&'static str, String)>,
    ) -> Result<EntityPage<E>, ServiceError> {
        debug!(url = %url, query = ?pairs, "http: fetching page");
        let response =
            check_status(send(self.http.get(url.clone()).query(&pairs), &url).await?).await?;
        let link_header = response
            .headers()
            .get(LINK)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let items: Vec<E> = decode(response, &url).await?;
        Ok(EntityPage::new(items, link_header))
    }
}

#[async_trait]
impl<E: Entity> EntityService for RestEntityService<E> {
    type Item = E;

    async fn query(&self, request: &PageRequest) -> Result<EntityPage<E>, ServiceError> {
        self.fetch_page(self.collection_url()?, request.query_pairs())
            .await
    }

    async fn search(&self, request: &SearchRequest) -> Result<EntityPage<E>, ServiceError> {
        self.fetch_page(self.search_url()?, request.query_pairs()).await
    }
}

async fn send(request: RequestBuilder, url: &Url) -> Result<Response, ServiceError> {
    request
        .send()
        .await
        .map_err(|source| ServiceError::from_send(url.as_str(), source))
}

async fn check_status(response: Response) -> Result<Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    // Error bodies are best effort; a missing or non-json body still yields the status.
    let problem = response.json::<Problem>().await.ok();
    Err(ServiceError::Status {
        code: ErrorCode::from_status(status.as_u16()),
        status: status.as_u16(),
        problem,
    })
}

async fn decode<T: DeserializeOwned>(response: Response, url: &Url) -> Result<T, ServiceError> {
    response.json::<T>().await.map_err(|source| {
        if source.is_timeout() {
            ServiceError::Timeout {
                url: url.to_string(),
            }
        } else {
            ServiceError::Decode {
                url: url.to_string(),
                source,
            }
        }
    })
}

#[cfg(test)]
#[path = "tests/entity_service_tests.rs"]
mod tests;
