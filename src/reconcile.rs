//! Snapshot loading and reconciliation.
//!
//! - `load_snapshot` fetches every collection concurrently; a failing
//!   collection degrades to an empty list instead of failing the view
//! - `reconcile` finishes source deletes left behind by partial transitions,
//!   reloads, and reports meetings that still appear in more than one
//!   status collection

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::filter::FilterSpec;
use crate::lifecycle::{LifecycleController, StaleRow};
use crate::stats::compute_statistics;
use crate::store::{Collection, MeetingStore};
use crate::types::{Meeting, MeetingStatus, Statistics};

/// Everything the dashboard shows, loaded in one go.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingSnapshot {
    pub pending: Vec<Meeting>,
    pub confirmed: Vec<Meeting>,
    pub denied: Vec<Meeting>,
    /// Result of the filtered aggregate query.
    pub total: Vec<Meeting>,
    pub total_count: usize,
    pub statistics: Statistics,
    /// Collections (or `meetingsTotal`) that failed and were replaced by an empty list.
    pub degraded: Vec<String>,
}

impl MeetingSnapshot {
    pub fn collection(&self, collection: Collection) -> &[Meeting] {
        match collection {
            Collection::Pending => &self.pending,
            Collection::Confirmed => &self.confirmed,
            Collection::Denied => &self.denied,
        }
    }

    pub fn all_by_status(&self) -> Vec<Meeting> {
        self.pending
            .iter()
            .chain(&self.confirmed)
            .chain(&self.denied)
            .cloned()
            .collect()
    }
}

async fn load_collection(
    store: &dyn MeetingStore,
    collection: Collection,
) -> Result<Vec<Meeting>, String> {
    match store.list(collection).await {
        Ok(rows) => Ok(rows
            .into_iter()
            .map(|m| m.with_status(collection.status()))
            .collect()),
        Err(e) => {
            log::warn!("Snapshot: failed to load {}: {}", collection, e);
            Err(collection.resource().to_string())
        }
    }
}

/// Loads all collections, the filtered total view and statistics concurrently.
///
/// If the statistics route fails, statistics are computed from the three
/// status lists as of `today`.
pub async fn load_snapshot(
    store: &dyn MeetingStore,
    filter: &FilterSpec,
    today: NaiveDate,
) -> MeetingSnapshot {
    let query = filter.resolve();
    let (pending, confirmed, denied, total, statistics) = tokio::join!(
        load_collection(store, Collection::Pending),
        load_collection(store, Collection::Confirmed),
        load_collection(store, Collection::Denied),
        store.query(&query),
        store.statistics(),
    );

    let mut degraded = Vec::new();
    let mut unwrap_or_empty = |r: Result<Vec<Meeting>, String>| match r {
        Ok(rows) => rows,
        Err(name) => {
            degraded.push(name);
            Vec::new()
        }
    };
    let pending = unwrap_or_empty(pending);
    let confirmed = unwrap_or_empty(confirmed);
    let denied = unwrap_or_empty(denied);

    let total = match total {
        Ok(rows) => rows,
        Err(e) => {
            log::warn!("Snapshot: failed to load {}: {}", query.route(), e);
            degraded.push("meetingsTotal".to_string());
            Vec::new()
        }
    };

    let mut snapshot = MeetingSnapshot {
        total_count: total.len(),
        pending,
        confirmed,
        denied,
        total,
        statistics: Statistics::default(),
        degraded,
    };

    snapshot.statistics = match statistics {
        Ok(stats) => stats,
        Err(e) => {
            log::warn!("Snapshot: statistics unavailable, computing locally: {}", e);
            compute_statistics(&snapshot.all_by_status(), today)
        }
    };
    snapshot
}

/// Content hash identifying the same logical meeting across collections,
/// where ids are not preserved.
pub fn fingerprint(meeting: &Meeting) -> String {
    let mut hasher = Sha256::new();
    for part in [
        meeting.title.trim(),
        &meeting.meeting_date.format("%Y-%m-%d").to_string(),
        meeting.start_time.trim(),
        meeting.location.trim(),
        meeting.responsible.trim(),
    ] {
        hasher.update(part.to_lowercase().as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(&hasher.finalize()[..8])
}

/// One logical meeting present in more than one status collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateGroup {
    pub fingerprint: String,
    pub title: String,
    /// `(status, id)` for every copy.
    pub copies: Vec<(MeetingStatus, i64)>,
}

pub fn find_duplicates(snapshot: &MeetingSnapshot) -> Vec<DuplicateGroup> {
    let mut groups: Vec<DuplicateGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for collection in Collection::ALL {
        for m in snapshot.collection(collection) {
            let fp = fingerprint(m);
            let copy = (collection.status(), m.id);
            match index.get(&fp) {
                Some(&i) => groups[i].copies.push(copy),
                None => {
                    index.insert(fp.clone(), groups.len());
                    groups.push(DuplicateGroup {
                        fingerprint: fp,
                        title: m.title.clone(),
                        copies: vec![copy],
                    });
                }
            }
        }
    }

    groups
        .into_iter()
        .filter(|g| {
            let mut statuses: Vec<MeetingStatus> = g.copies.iter().map(|(s, _)| *s).collect();
            statuses.dedup();
            statuses.len() > 1
        })
        .collect()
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub cleaned: Vec<StaleRow>,
    pub still_stale: Vec<StaleRow>,
    pub duplicates: Vec<DuplicateGroup>,
    pub snapshot: MeetingSnapshot,
}

/// Retries journaled source deletes, then reloads and looks for duplicates.
///
/// Only journaled rows are deleted: for an unjournaled duplicate there is no
/// way to tell which copy is stale, so it is reported and left alone.
pub async fn reconcile(
    controller: &LifecycleController,
    filter: &FilterSpec,
    today: NaiveDate,
) -> ReconcileReport {
    let store = controller.store().as_ref();
    let mut cleaned = Vec::new();
    let mut still_stale = Vec::new();

    for row in controller.take_stale_rows() {
        match store.delete(row.collection, row.id).await {
            Ok(()) => {
                log::info!(
                    "Reconcile: removed stale {} row {} ('{}')",
                    row.collection,
                    row.id,
                    row.title
                );
                cleaned.push(row);
            }
            Err(e) if e.is_not_found() => {
                log::info!("Reconcile: stale {} row {} already gone", row.collection, row.id);
                cleaned.push(row);
            }
            Err(e) => {
                log::warn!(
                    "Reconcile: stale {} row {} still not removable: {}",
                    row.collection,
                    row.id,
                    e
                );
                still_stale.push(row);
            }
        }
    }
    controller.requeue_stale_rows(still_stale.clone());

    let snapshot = load_snapshot(store, filter, today).await;
    let duplicates = find_duplicates(&snapshot);
    for dup in &duplicates {
        log::warn!(
            "Reconcile: '{}' appears in several collections: {:?}",
            dup.title,
            dup.copies
        );
    }

    ReconcileReport {
        cleaned,
        still_stale,
        duplicates,
        snapshot,
    }
}
