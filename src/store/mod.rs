//! Remote meeting store contract.
//!
//! The store keeps one collection per lifecycle state plus an aggregate
//! "total" view with canned filters. `RestMeetingStore` talks to the real
//! backend; `MemoryStore` is an in-process stand-in with failure injection,
//! built for tests only.

pub mod client;
#[cfg(test)]
pub mod memory;
pub mod normalize;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::filter::MeetingQuery;
use crate::types::{Meeting, MeetingDraft, MeetingPatch, MeetingStatus, Statistics};

pub use client::RestMeetingStore;
#[cfg(test)]
pub use memory::MemoryStore;

/// One of the three status-backed collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Collection {
    #[serde(rename = "meetingsPending")]
    Pending,
    #[serde(rename = "meetingsConfirmed")]
    Confirmed,
    #[serde(rename = "meetingsDenied")]
    Denied,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Collection::Pending, Collection::Confirmed, Collection::Denied];

    /// Route segment on the REST API.
    pub fn resource(&self) -> &'static str {
        match self {
            Collection::Pending => "meetingsPending",
            Collection::Confirmed => "meetingsConfirmed",
            Collection::Denied => "meetingsDenied",
        }
    }

    pub fn status(&self) -> MeetingStatus {
        match self {
            Collection::Pending => MeetingStatus::Pending,
            Collection::Confirmed => MeetingStatus::Confirmed,
            Collection::Denied => MeetingStatus::Denied,
        }
    }
}

impl From<MeetingStatus> for Collection {
    fn from(status: MeetingStatus) -> Self {
        match status {
            MeetingStatus::Pending => Collection::Pending,
            MeetingStatus::Confirmed => Collection::Confirmed,
            MeetingStatus::Denied => Collection::Denied,
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.resource())
    }
}

#[async_trait]
pub trait MeetingStore: Send + Sync {
    /// Every row of a status collection.
    async fn list(&self, collection: Collection) -> Result<Vec<Meeting>, StoreError>;

    /// Inserts a row. The store issues the id; the returned record is authoritative.
    async fn insert(&self, collection: Collection, draft: &MeetingDraft)
        -> Result<Meeting, StoreError>;

    async fn delete(&self, collection: Collection, id: i64) -> Result<(), StoreError>;

    async fn update(
        &self,
        collection: Collection,
        id: i64,
        patch: &MeetingPatch,
    ) -> Result<Meeting, StoreError>;

    /// Reads from the aggregate view.
    async fn query(&self, query: &MeetingQuery) -> Result<Vec<Meeting>, StoreError>;

    async fn statistics(&self) -> Result<Statistics, StoreError>;
}
