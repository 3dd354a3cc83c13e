//! In-process meeting store.
//!
//! Behaves like the REST backend (fresh ids on every insert, one collection
//! per status, aggregate queries over all of them) and lets callers inject
//! failures per operation and collection. Every call is recorded in order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::{Collection, MeetingStore};
use crate::error::StoreError;
use crate::filter::MeetingQuery;
use crate::stats::compute_statistics;
use crate::types::{Meeting, MeetingDraft, MeetingPatch, Statistics};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    List,
    Insert,
    Delete,
    Update,
    Query,
    Statistics,
}

#[derive(Default)]
struct Inner {
    rows: HashMap<Collection, Vec<Meeting>>,
    next_id: i64,
    failing: HashSet<(StoreOp, Option<Collection>)>,
    calls: Vec<String>,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
    today: NaiveDate,
    insert_gate: Mutex<Option<Arc<Notify>>>,
}

impl MemoryStore {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 1,
                ..Default::default()
            }),
            today,
            insert_gate: Mutex::new(None),
        }
    }

    /// Seeds a row directly, bypassing failure injection and the call log.
    pub fn seed(&self, collection: Collection, draft: &MeetingDraft) -> Meeting {
        let mut inner = self.inner.lock();
        let meeting = materialize(&mut inner, collection, draft);
        inner.rows.entry(collection).or_default().push(meeting.clone());
        meeting
    }

    /// Makes every `op` on `collection` fail (`None` = any collection).
    pub fn fail(&self, op: StoreOp, collection: Option<Collection>) {
        self.inner.lock().failing.insert((op, collection));
    }

    pub fn heal(&self) {
        self.inner.lock().failing.clear();
    }

    /// Inserts wait on this gate until it is notified.
    pub fn gate_inserts(&self, gate: Arc<Notify>) {
        *self.insert_gate.lock() = Some(gate);
    }

    pub fn rows(&self, collection: Collection) -> Vec<Meeting> {
        self.inner
            .lock()
            .rows
            .get(&collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().calls.clone()
    }

    fn check(&self, inner: &mut Inner, op: StoreOp, collection: Option<Collection>, call: String) -> Result<(), StoreError> {
        inner.calls.push(call.clone());
        let failing = inner.failing.contains(&(op, None))
            || (collection.is_some() && inner.failing.contains(&(op, collection)));
        if failing {
            return Err(StoreError::Http {
                status: 503,
                url: format!("memory://{}", call),
                message: "Service unavailable".to_string(),
            });
        }
        Ok(())
    }

    fn all_rows(inner: &Inner) -> Vec<Meeting> {
        Collection::ALL
            .iter()
            .flat_map(|c| {
                inner
                    .rows
                    .get(c)
                    .into_iter()
                    .flatten()
                    .cloned()
                    .map(move |m| m.with_status(c.status()))
            })
            .collect()
    }
}

fn materialize(inner: &mut Inner, collection: Collection, draft: &MeetingDraft) -> Meeting {
    let id = inner.next_id;
    inner.next_id += 1;
    Meeting {
        id,
        title: draft.title.clone(),
        meeting_date: draft.meeting_date,
        start_time: draft.start_time.clone(),
        end_time: draft.end_time.clone(),
        location: draft.location.clone(),
        participants_count: draft.participants_count,
        description: draft.description.clone(),
        responsible: draft.responsible.clone(),
        responsible_department: draft.responsible_department.clone(),
        status: Some(collection.status()),
        created_at: None,
        updated_at: None,
    }
}

fn not_found(call: &str) -> StoreError {
    StoreError::Http {
        status: 404,
        url: format!("memory://{}", call),
        message: "Meeting not found".to_string(),
    }
}

#[async_trait]
impl MeetingStore for MemoryStore {
    async fn list(&self, collection: Collection) -> Result<Vec<Meeting>, StoreError> {
        let mut inner = self.inner.lock();
        self.check(&mut inner, StoreOp::List, Some(collection), format!("list {}", collection))?;
        Ok(inner.rows.get(&collection).cloned().unwrap_or_default())
    }

    async fn insert(
        &self,
        collection: Collection,
        draft: &MeetingDraft,
    ) -> Result<Meeting, StoreError> {
        let gate = self.insert_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut inner = self.inner.lock();
        self.check(&mut inner, StoreOp::Insert, Some(collection), format!("insert {}", collection))?;
        let meeting = materialize(&mut inner, collection, draft);
        inner.rows.entry(collection).or_default().push(meeting.clone());
        Ok(meeting)
    }

    async fn delete(&self, collection: Collection, id: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let call = format!("delete {}/{}", collection, id);
        self.check(&mut inner, StoreOp::Delete, Some(collection), call.clone())?;
        let rows = inner.rows.entry(collection).or_default();
        let before = rows.len();
        rows.retain(|m| m.id != id);
        if rows.len() == before {
            return Err(not_found(&call));
        }
        Ok(())
    }

    async fn update(
        &self,
        collection: Collection,
        id: i64,
        patch: &MeetingPatch,
    ) -> Result<Meeting, StoreError> {
        let mut inner = self.inner.lock();
        let call = format!("update {}/{}", collection, id);
        self.check(&mut inner, StoreOp::Update, Some(collection), call.clone())?;
        let row = inner
            .rows
            .entry(collection)
            .or_default()
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| not_found(&call))?;
        row.apply(patch);
        Ok(row.clone())
    }

    async fn query(&self, query: &MeetingQuery) -> Result<Vec<Meeting>, StoreError> {
        let mut inner = self.inner.lock();
        self.check(&mut inner, StoreOp::Query, None, format!("query {}", query.route()))?;
        Ok(Self::all_rows(&inner)
            .into_iter()
            .filter(|m| query.matches(m, self.today))
            .collect())
    }

    async fn statistics(&self) -> Result<Statistics, StoreError> {
        let mut inner = self.inner.lock();
        self.check(&mut inner, StoreOp::Statistics, None, "statistics".to_string())?;
        Ok(compute_statistics(&Self::all_rows(&inner), self.today))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(title: &str, date: NaiveDate) -> MeetingDraft {
        MeetingDraft {
            title: title.to_string(),
            meeting_date: date,
            start_time: "09:00".into(),
            end_time: Some("10:00".into()),
            location: "Sala 03".into(),
            participants_count: 3,
            description: None,
            responsible: "Ana".into(),
            responsible_department: "Finance".into(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 10).unwrap()
    }

    #[tokio::test]
    async fn test_insert_issues_fresh_ids_across_collections() {
        let store = MemoryStore::new(today());
        let a = store.insert(Collection::Pending, &draft("a", today())).await.unwrap();
        let b = store.insert(Collection::Confirmed, &a.to_draft()).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(store.rows(Collection::Confirmed).len(), 1);
    }

    #[tokio::test]
    async fn test_injected_failure_scoped_to_collection() {
        let store = MemoryStore::new(today());
        store.fail(StoreOp::List, Some(Collection::Denied));
        assert!(store.list(Collection::Denied).await.is_err());
        assert!(store.list(Collection::Pending).await.is_ok());
        store.heal();
        assert!(store.list(Collection::Denied).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_missing_row_is_not_found() {
        let store = MemoryStore::new(today());
        let err = store.delete(Collection::Pending, 42).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_status_query_spans_collections() {
        let store = MemoryStore::new(today());
        store.seed(Collection::Pending, &draft("p", today()));
        store.seed(Collection::Confirmed, &draft("c", today()));
        let rows = store
            .query(&MeetingQuery::Status(crate::types::MeetingStatus::Confirmed))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "c");
        assert_eq!(store.calls(), vec!["query meetingsTotal/status/confirmed"]);
    }
}
