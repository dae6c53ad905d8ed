use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ScheduleServiceConfig;
use crate::error::Error;
use crate::models::WebChannelSchedules;

/// Performs a round trip of the live-status fetch.
#[async_trait]
pub trait LiveStatusFetcher {
    async fn fetch(&self, device_id: Option<String>) -> Result<Vec<WebChannelSchedules>, Error>;
}

#[async_trait]
impl<T> LiveStatusFetcher for Arc<T>
where
    T: LiveStatusFetcher + Send + Sync + ?Sized,
{
    async fn fetch(&self, device_id: Option<String>) -> Result<Vec<WebChannelSchedules>, Error> {
        (**self).fetch(device_id).await
    }
}

/// Fetches channels with schedules for the current week from the schedule
/// service.
pub struct HttpFetcher {
    client: reqwest::Client,
    config: Arc<ScheduleServiceConfig>,
}

impl HttpFetcher {
    pub fn new(config: Arc<ScheduleServiceConfig>) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(config.fetch_timeout)
            .build()?;
        Ok(HttpFetcher { client, config })
    }
}

#[async_trait]
impl LiveStatusFetcher for HttpFetcher {
    async fn fetch(&self, device_id: Option<String>) -> Result<Vec<WebChannelSchedules>, Error> {
        let url = self.config.live_status_url(device_id.as_deref());
        tracing::trace!(%url, "GET");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::UnexpectedStatus(status));
        }
        Ok(response.json::<Vec<WebChannelSchedules>>().await?)
    }
}

// </coverage:exclude>
