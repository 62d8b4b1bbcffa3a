use std::sync::Arc;

use edusis_core::{CalendarEvent, EventCategory};
use serde::Deserialize;
use serde_json::Value;

use super::range_query;
use super::wire::Normalize;
use crate::endpoints::Endpoint;
use crate::error::ProviderResult;
use crate::http::ApiClient;
use crate::source::{BoxFuture, EventSource, FetchRequest, SourceKind};

const SOURCE_NAME: &str = "personal";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PersonalData {
    personal_events: Vec<Value>,
}

/// The signed-in user's personal events and notifications.
///
/// Records without targeting are addressed to the requesting user, so the
/// notification rule keeps them visible to their owner.
#[derive(Debug, Clone)]
pub struct PersonalSource {
    api: Arc<ApiClient>,
}

impl PersonalSource {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    async fn fetch_inner(&self, request: FetchRequest) -> ProviderResult<Vec<CalendarEvent>> {
        let payload: PersonalData = self
            .api
            .get(
                Endpoint::PersonalEvents,
                &request.profile.auth_token,
                &range_query(&request.range),
            )
            .await?;

        let normalize = Normalize {
            default_category: EventCategory::Notification,
            id_prefix: Some(SOURCE_NAME),
            source_id: SOURCE_NAME,
        };

        let events = normalize
            .records(payload.personal_events)
            .into_iter()
            .filter(|event| event.overlaps(&request.range))
            .map(|mut event| {
                if event.audience.is_untargeted() && !event.audience.is_public {
                    event.audience.recipient_ids.push(request.profile.id.clone());
                }
                event
            })
            .collect();

        Ok(events)
    }
}

impl EventSource for PersonalSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Personal
    }

    fn fetch(&self, request: FetchRequest) -> BoxFuture<'_, ProviderResult<Vec<CalendarEvent>>> {
        Box::pin(self.fetch_inner(request))
    }
}
