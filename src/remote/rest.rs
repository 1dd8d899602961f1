//! REST client for the remote calendar store.

use super::{CalendarStore, EventPatch, EventPayload, RemoteError, RemoteEvent};
use async_trait::async_trait;
use chrono::NaiveDate;
use log::debug;
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::sync::Arc;
use url::Url;

pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/calendar/v3/";

/// Calendar store client speaking the Google-Calendar-shaped REST API.
/// Token acquisition is someone else's problem; this client only reports
/// auth failures so the session can force a re-auth.
#[derive(Clone)]
pub struct RestCalendarStore {
    client: Client,
    base_url: Url,
    token: Arc<SecretString>,
}

#[derive(Debug, Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<RemoteEvent>,
}

impl RestCalendarStore {
    pub fn new(base_url: &str, token: SecretString) -> Result<Self, RemoteError> {
        Ok(Self { client: Client::new(), base_url: Url::parse(base_url)?, token: Arc::new(token) })
    }

    fn events_url(&self, calendar_id: &str) -> Result<Url, RemoteError> {
        Ok(self.base_url.join(&format!("calendars/{}/events", calendar_id))?)
    }

    fn event_url(&self, calendar_id: &str, event_id: &str) -> Result<Url, RemoteError> {
        Ok(self.base_url.join(&format!("calendars/{}/events/{}", calendar_id, event_id))?)
    }

    async fn check(response: Response) -> Result<Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(RemoteError::from_status(status.as_u16(), message))
    }
}

#[async_trait]
impl CalendarStore for RestCalendarStore {
    async fn list(
        &self,
        calendar_id: &str,
        time_min: Option<NaiveDate>,
        time_max: Option<NaiveDate>,
    ) -> Result<Vec<RemoteEvent>, RemoteError> {
        let mut url = self.events_url(calendar_id)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("singleEvents", "true");
            query.append_pair("orderBy", "startTime");
            if let Some(min) = time_min {
                query.append_pair("timeMin", &format!("{}T00:00:00Z", min));
            }
            if let Some(max) = time_max {
                query.append_pair("timeMax", &format!("{}T23:59:59Z", max));
            }
        }
        debug!("listing events in {}", calendar_id);
        let response = self
            .client
            .get(url)
            .bearer_auth(self.token.expose_secret())
            .send()
            .await?;
        let list: EventList = Self::check(response).await?.json().await?;
        let mut items = list.items;
        for event in &mut items {
            event.calendar_id = calendar_id.to_string();
        }
        Ok(items)
    }

    async fn insert(
        &self,
        calendar_id: &str,
        payload: &EventPayload,
    ) -> Result<RemoteEvent, RemoteError> {
        debug!("inserting event {:?} into {}", payload.summary, calendar_id);
        let response = self
            .client
            .post(self.events_url(calendar_id)?)
            .bearer_auth(self.token.expose_secret())
            .json(payload)
            .send()
            .await?;
        let mut event: RemoteEvent = Self::check(response).await?.json().await?;
        event.calendar_id = calendar_id.to_string();
        Ok(event)
    }

    async fn patch(
        &self,
        calendar_id: &str,
        event_id: &str,
        patch: &EventPatch,
    ) -> Result<RemoteEvent, RemoteError> {
        debug!("patching event {} in {}", event_id, calendar_id);
        let response = self
            .client
            .patch(self.event_url(calendar_id, event_id)?)
            .bearer_auth(self.token.expose_secret())
            .json(patch)
            .send()
            .await?;
        let mut event: RemoteEvent = Self::check(response).await?.json().await?;
        event.calendar_id = calendar_id.to_string();
        Ok(event)
    }

    async fn delete(&self, calendar_id: &str, event_id: &str) -> Result<(), RemoteError> {
        debug!("deleting event {} from {}", event_id, calendar_id);
        let response = self
            .client
            .delete(self.event_url(calendar_id, event_id)?)
            .bearer_auth(self.token.expose_secret())
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
