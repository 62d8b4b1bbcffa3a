use std::collections::BTreeMap;
use std::sync::Arc;

use edusis_core::{CalendarEvent, EventCategory};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::range_query;
use super::wire::Normalize;
use crate::endpoints::Endpoint;
use crate::error::ProviderResult;
use crate::http::ApiClient;
use crate::source::{BoxFuture, EventSource, FetchRequest, SourceKind};

const SOURCE_NAME: &str = "academic";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CalendarData {
    data: BTreeMap<String, BranchBuckets>,
}

/// The three event buckets the backend returns for each branch.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BranchBuckets {
    academic_calendar_events: Vec<Value>,
    local_global_events: Vec<Value>,
    google_calendar_events: Vec<Value>,
}

/// Academic calendar, school-wide events and backend-relayed Google events.
#[derive(Debug, Clone)]
pub struct AcademicSource {
    api: Arc<ApiClient>,
}

impl AcademicSource {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    async fn fetch_inner(&self, request: FetchRequest) -> ProviderResult<Vec<CalendarEvent>> {
        let mut query = range_query(&request.range);
        if let Some(ref branch_id) = request.profile.branch_id {
            query.push(("branch_id", branch_id.clone()));
        }

        let payload: CalendarData = self
            .api
            .get(Endpoint::CalendarData, &request.profile.auth_token, &query)
            .await?;

        let mut events = Vec::new();
        for (branch_id, buckets) in payload.data {
            let before = events.len();
            let buckets = [
                (EventCategory::Academic, buckets.academic_calendar_events),
                (EventCategory::SchoolEvent, buckets.local_global_events),
                (EventCategory::GoogleWorkspace, buckets.google_calendar_events),
            ];
            for (default_category, records) in buckets {
                let normalize = Normalize {
                    default_category,
                    id_prefix: None,
                    source_id: SOURCE_NAME,
                };
                events.extend(normalize.records(records));
            }
            debug!(branch = %branch_id, count = events.len() - before, "Normalized branch events");
        }

        events.retain(|event| event.overlaps(&request.range));
        Ok(events)
    }
}

impl EventSource for AcademicSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn kind(&self) -> SourceKind {
        SourceKind::SchoolCalendar
    }

    fn fetch(&self, request: FetchRequest) -> BoxFuture<'_, ProviderResult<Vec<CalendarEvent>>> {
        Box::pin(self.fetch_inner(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorCode;
    use crate::http::ApiConfig;
    use chrono::{TimeZone, Utc};
    use edusis_core::{DateRange, Role, SchoolConfig, UserProfile};
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(server: &MockServer) -> AcademicSource {
        AcademicSource::new(Arc::new(ApiClient::new(&ApiConfig::new(server.uri())).unwrap()))
    }

    fn request() -> FetchRequest {
        let profile = UserProfile::new("s-1", Role::Student)
            .with_branch("main")
            .with_auth_token("tok-s1");
        FetchRequest::new(
            Arc::new(profile),
            Arc::new(SchoolConfig::new("paragon", "school.edu")),
            DateRange::month(2025, 9).unwrap(),
        )
    }

    #[tokio::test]
    async fn normalizes_all_buckets() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendar/data"))
            .and(header("authorization", "Bearer tok-s1"))
            .and(query_param("start_date", "2025-09-01"))
            .and(query_param("end_date", "2025-09-30"))
            .and(query_param("branch_id", "main"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {
                    "main": {
                        "academic_calendar_events": [
                            { "id": 45, "title": "Term starts", "start_date": "2025-09-01" }
                        ],
                        "local_global_events": [
                            { "id": 7, "title": "Open day", "start_date": "2025-09-13T09:00:00Z",
                              "end_date": "2025-09-13T12:00:00Z", "created_by": 3 },
                            { "id": 46, "title": "Essay", "category": "homework",
                              "start_date": "2025-09-05T08:00:00Z", "target_grades": [7] }
                        ],
                        "google_calendar_events": [
                            { "id": "g1", "title": "Staff sync", "start_date": "2025-09-02T14:00:00Z" }
                        ]
                    }
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let events = source(&server).fetch(request()).await.unwrap();
        let ids: Vec<&str> = events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["academic_45", "school_event_7", "homework_46", "google_g1"]);

        assert_eq!(events[0].category, EventCategory::Academic);
        assert!(events[0].is_all_day);
        assert_eq!(events[1].created_by.as_deref(), Some("3"));
        assert_eq!(events[2].audience.grades, vec!["7"]);
        assert_eq!(events[3].category, EventCategory::GoogleWorkspace);
        assert!(events.iter().all(|e| e.source_id == "academic"));
    }

    #[tokio::test]
    async fn drops_events_outside_range() {
        let server = MockServer::start().await;
        Mock::given(path("/calendar/data"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {
                    "main": {
                        "academic_calendar_events": [
                            { "id": 1, "title": "August", "start_date": "2025-08-20" },
                            { "id": 2, "title": "September", "start_date": "2025-09-20" },
                            { "id": 3, "title": "October", "start_date": "2025-10-01T00:00:00Z" }
                        ]
                    }
                }
            })))
            .mount(&server)
            .await;

        let events = source(&server).fetch(request()).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "September");
        assert_eq!(
            events[0].start,
            Utc.with_ymd_and_hms(2025, 9, 20, 0, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn missing_data_is_empty() {
        let server = MockServer::start().await;
        Mock::given(path("/calendar/data"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
            .mount(&server)
            .await;

        let events = source(&server).fetch(request()).await.unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn server_failure_is_contained() {
        let server = MockServer::start().await;
        Mock::given(path("/calendar/data"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let outcome = source(&server).fetch_events(request()).await.unwrap();
        assert!(outcome.events.is_empty());
        assert_eq!(
            outcome.error.map(|e| e.code()),
            Some(ProviderErrorCode::ServerError)
        );
    }
}
