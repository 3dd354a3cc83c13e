//! REST client for the meeting store.
//!
//! Uses reqwest with JSON bodies. Routes are resolved against the configured
//! API root, e.g. `http://localhost:3000/api/meetingsPending/all`. A bearer
//! token is attached only when the session carries one.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde_json::Value;
use url::Url;

use super::normalize::{normalize_list, normalize_record};
use super::{Collection, MeetingStore};
use crate::error::StoreError;
use crate::filter::MeetingQuery;
use crate::session::SessionContext;
use crate::types::{Meeting, MeetingDraft, MeetingPatch, Statistics};

pub struct RestMeetingStore {
    client: reqwest::Client,
    base_url: Url,
    session: SessionContext,
}

impl RestMeetingStore {
    pub fn new(api_url: &str, session: SessionContext) -> Result<Self, StoreError> {
        Self::with_timeout(api_url, None, session)
    }

    /// `timeout = None` leaves requests unbounded.
    pub fn with_timeout(
        api_url: &str,
        timeout: Option<Duration>,
        session: SessionContext,
    ) -> Result<Self, StoreError> {
        let base_url = parse_base_url(api_url)?;

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| StoreError::Transport {
            url: base_url.to_string(),
            source: e,
        })?;

        Ok(Self {
            client,
            base_url,
            session,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.client
    }

    /// Joins path segments onto the API root.
    pub(crate) fn url(&self, segments: &[&str]) -> Url {
        join_segments(&self.base_url, segments)
    }

    fn request(&self, method: Method, url: &Url) -> RequestBuilder {
        let mut rb = self
            .client
            .request(method, url.clone())
            .header("Content-Type", "application/json");
        if let Some(token) = self.session.token() {
            rb = rb.bearer_auth(token);
        }
        rb
    }

    async fn fetch_json(&self, rb: RequestBuilder, url: &Url) -> Result<Value, StoreError> {
        let resp = send(rb, url).await?;
        resp.json::<Value>()
            .await
            .map_err(|e| StoreError::Decode(format!("{} from {}", e, url)))
    }
}

#[async_trait]
impl MeetingStore for RestMeetingStore {
    async fn list(&self, collection: Collection) -> Result<Vec<Meeting>, StoreError> {
        let url = self.url(&[collection.resource(), "all"]);
        let body = self.fetch_json(self.request(Method::GET, &url), &url).await?;
        Ok(normalize_list(body))
    }

    async fn insert(
        &self,
        collection: Collection,
        draft: &MeetingDraft,
    ) -> Result<Meeting, StoreError> {
        let url = self.url(&[collection.resource()]);
        let rb = self.request(Method::POST, &url).json(draft);
        let body = self.fetch_json(rb, &url).await?;
        normalize_record(body)
    }

    async fn delete(&self, collection: Collection, id: i64) -> Result<(), StoreError> {
        let id = id.to_string();
        let url = self.url(&[collection.resource(), &id]);
        send(self.request(Method::DELETE, &url), &url).await?;
        Ok(())
    }

    async fn update(
        &self,
        collection: Collection,
        id: i64,
        patch: &MeetingPatch,
    ) -> Result<Meeting, StoreError> {
        let id = id.to_string();
        let url = self.url(&[collection.resource(), &id]);
        let rb = self.request(Method::PUT, &url).json(patch);
        let body = self.fetch_json(rb, &url).await?;
        normalize_record(body)
    }

    async fn query(&self, query: &MeetingQuery) -> Result<Vec<Meeting>, StoreError> {
        let segments = query.segments();
        let refs: Vec<&str> = segments.iter().map(String::as_str).collect();
        let mut url = self.url(&refs);
        let params = query.params();
        if !params.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
        }
        let body = self.fetch_json(self.request(Method::GET, &url), &url).await?;
        Ok(normalize_list(body))
    }

    async fn statistics(&self) -> Result<Statistics, StoreError> {
        let url = self.url(&["meetingsTotal", "statistics"]);
        let body = self.fetch_json(self.request(Method::GET, &url), &url).await?;
        serde_json::from_value(body).map_err(|e| StoreError::Decode(e.to_string()))
    }
}

pub(crate) fn parse_base_url(api_url: &str) -> Result<Url, StoreError> {
    let url = Url::parse(api_url.trim()).map_err(|_| StoreError::InvalidBaseUrl(api_url.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(StoreError::InvalidBaseUrl(api_url.to_string()));
    }
    Ok(url)
}

pub(crate) fn join_segments(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

/// Sends a request and turns transport failures and non-2xx answers into
/// `StoreError`s carrying the backend's `message` when present.
pub(crate) async fn send(rb: RequestBuilder, url: &Url) -> Result<Response, StoreError> {
    let resp = rb.send().await.map_err(|e| StoreError::Transport {
        url: url.to_string(),
        source: e,
    })?;

    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let text = resp.text().await.unwrap_or_default();
    Err(StoreError::Http {
        status: status.as_u16(),
        url: url.to_string(),
        message: error_message(&text)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string()),
    })
}

/// Pulls `message` (or `error`) out of a JSON error body; falls back to the
/// raw text when it is short enough to show.
pub(crate) fn error_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        for key in ["message", "error"] {
            if let Some(msg) = json.get(key).and_then(Value::as_str) {
                return Some(msg.to_string());
            }
        }
        return None;
    }
    if body.len() <= 200 {
        Some(body.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Role, Session};
    use chrono::NaiveDate;
    use mockito::Matcher;
    use serde_json::json;

    fn row(id: i64) -> Value {
        json!({
            "id": id,
            "title": "Budget Review",
            "meeting_date": "2025-06-10",
            "start_time": "09:00",
            "end_time": "10:00",
            "location": "Sala de Reunião",
            "participants_count": 5,
            "responsible": "Ana",
            "responsible_department": "Finance"
        })
    }

    fn store(server: &mockito::ServerGuard) -> RestMeetingStore {
        RestMeetingStore::new(&format!("{}/api", server.url()), SessionContext::new()).unwrap()
    }

    #[test]
    fn test_url_joining() {
        let base = parse_base_url("http://localhost:3000/api/").unwrap();
        assert_eq!(
            join_segments(&base, &["meetingsPending", "all"]).as_str(),
            "http://localhost:3000/api/meetingsPending/all"
        );
        let base = parse_base_url("http://localhost:3000/api").unwrap();
        assert_eq!(
            join_segments(&base, &["meetingsConfirmed", "12"]).as_str(),
            "http://localhost:3000/api/meetingsConfirmed/12"
        );
        assert!(parse_base_url("not a url").is_err());
        assert!(parse_base_url("mailto:someone@example.com").is_err());
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(error_message(r#"{"message":"Reunião não encontrada"}"#).as_deref(), Some("Reunião não encontrada"));
        assert_eq!(error_message(r#"{"error":"bad"}"#).as_deref(), Some("bad"));
        assert_eq!(error_message(r#"{"status":500}"#), None);
        assert_eq!(error_message("Internal Server Error").as_deref(), Some("Internal Server Error"));
        assert_eq!(error_message(""), None);
    }

    #[tokio::test]
    async fn test_list_normalizes_wrapped_response() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/meetingsConfirmed/all")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "data": [row(1), row(2)] }).to_string())
            .create_async()
            .await;

        let meetings = store(&server).list(Collection::Confirmed).await.unwrap();
        assert_eq!(meetings.len(), 2);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_insert_posts_draft_and_returns_new_record() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/meetingsConfirmed")
            .match_body(Matcher::PartialJson(json!({
                "title": "Budget Review",
                "meeting_date": "2025-06-10",
                "responsible_department": "Finance"
            })))
            .with_status(201)
            .with_body(row(99).to_string())
            .create_async()
            .await;

        let draft = serde_json::from_value::<Meeting>(row(1)).unwrap().to_draft();
        let inserted = store(&server)
            .insert(Collection::Confirmed, &draft)
            .await
            .unwrap();
        assert_eq!(inserted.id, 99);
        assert_eq!(inserted.meeting_date, NaiveDate::from_ymd_opt(2025, 6, 10).unwrap());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_delete_surfaces_backend_message() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("DELETE", "/api/meetingsPending/7")
            .with_status(404)
            .with_body(r#"{"message":"Meeting not found"}"#)
            .create_async()
            .await;

        let err = store(&server)
            .delete(Collection::Pending, 7)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.user_message(), "Meeting not found");
    }

    #[tokio::test]
    async fn test_update_uses_put() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/api/meetingsConfirmed/3")
            .match_body(Matcher::Json(json!({ "location": "Auditório" })))
            .with_status(200)
            .with_body(json!({ "meeting": row(3) }).to_string())
            .create_async()
            .await;

        let patch = MeetingPatch {
            location: Some("Auditório".into()),
            ..Default::default()
        };
        let updated = store(&server)
            .update(Collection::Confirmed, 3, &patch)
            .await
            .unwrap();
        assert_eq!(updated.id, 3);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_range_query_encodes_params() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/meetingsTotal/range/dates")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("start".into(), "2025-01-01".into()),
                Matcher::UrlEncoded("end".into(), "2025-01-31".into()),
            ]))
            .with_status(200)
            .with_body(json!([row(4)]).to_string())
            .create_async()
            .await;

        let query = MeetingQuery::Range {
            start: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
        };
        let meetings = store(&server).query(&query).await.unwrap();
        assert_eq!(meetings.len(), 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_bearer_token_attached_when_present() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/meetingsTotal/statistics")
            .match_header("authorization", "Bearer tok-1")
            .with_status(200)
            .with_body(r#"{"total":"3","confirmed":1,"pending":1,"denied":1,"upcoming":0,"past":2}"#)
            .create_async()
            .await;

        let session = SessionContext::new();
        session.login(Session {
            username: "admin".into(),
            role: Role::Admin,
            token: Some("tok-1".into()),
            user: None,
        });
        let store = RestMeetingStore::new(&format!("{}/api", server.url()), session).unwrap();
        let stats = store.statistics().await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.past, 2);
        mock.assert_async().await;
    }
}
