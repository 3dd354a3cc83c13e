//! Meeting lifecycle controller.
//!
//! Moves meetings between the pending, confirmed and denied collections.
//! Every move is insert-into-destination, then delete-from-source, so a
//! failure can duplicate a meeting but never lose it. Source rows left
//! behind by a failed delete are journaled for [`crate::reconcile`].
//!
//! ```text
//!            approve
//!   Pending ─────────▶ Confirmed ──edit──▶ Confirmed
//!     │  ▲                 │
//!  deny  restore       delete (confirmed)
//!     ▼  │                 ▼
//!   Denied ───permanently_delete───▶ ⊥
//! ```

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{LifecycleError, StoreError, Transition};
use crate::session::SessionContext;
use crate::store::{Collection, MeetingStore};
use crate::types::{Meeting, MeetingDraft, MeetingPatch, MeetingStatus};

impl Transition {
    pub fn source(&self) -> Collection {
        match self {
            Transition::Approve | Transition::Deny => Collection::Pending,
            Transition::Restore => Collection::Denied,
        }
    }

    pub fn destination(&self) -> Collection {
        match self {
            Transition::Approve => Collection::Confirmed,
            Transition::Deny => Collection::Denied,
            Transition::Restore => Collection::Pending,
        }
    }

    fn failed(&self, err: StoreError) -> LifecycleError {
        match self {
            Transition::Approve => LifecycleError::ApprovalFailed(err),
            Transition::Deny => LifecycleError::DenialFailed(err),
            Transition::Restore => LifecycleError::RestoreFailed(err),
        }
    }
}

/// Proof that the user explicitly confirmed an irreversible delete.
///
/// The view layer builds one only after asking the user.
#[derive(Debug, Clone, Copy)]
pub struct Confirmation {
    meeting_id: i64,
}

impl Confirmation {
    pub fn for_meeting(meeting_id: i64) -> Self {
        Self { meeting_id }
    }
}

/// A source row a partial transition could not remove.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaleRow {
    pub transition: Transition,
    pub collection: Collection,
    pub id: i64,
    pub replacement_id: i64,
    pub title: String,
}

/// Releases the in-flight slot on drop.
struct InFlightGuard<'a> {
    table: &'a DashMap<(Collection, i64), ()>,
    key: (Collection, i64),
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.table.remove(&self.key);
    }
}

pub struct LifecycleController {
    store: Arc<dyn MeetingStore>,
    session: SessionContext,
    in_flight: DashMap<(Collection, i64), ()>,
    journal: Mutex<Vec<StaleRow>>,
}

impl LifecycleController {
    pub fn new(store: Arc<dyn MeetingStore>, session: SessionContext) -> Self {
        Self {
            store,
            session,
            in_flight: DashMap::new(),
            journal: Mutex::new(Vec::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn MeetingStore> {
        &self.store
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Source rows still waiting for cleanup.
    pub fn stale_rows(&self) -> Vec<StaleRow> {
        self.journal.lock().clone()
    }

    pub(crate) fn take_stale_rows(&self) -> Vec<StaleRow> {
        std::mem::take(&mut *self.journal.lock())
    }

    pub(crate) fn requeue_stale_rows(&self, rows: Vec<StaleRow>) {
        self.journal.lock().extend(rows);
    }

    fn acquire(&self, collection: Collection, id: i64) -> Result<InFlightGuard<'_>, LifecycleError> {
        match self.in_flight.entry((collection, id)) {
            Entry::Occupied(_) => Err(LifecycleError::InFlight { id }),
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(InFlightGuard {
                    table: &self.in_flight,
                    key: (collection, id),
                })
            }
        }
    }

    fn expect_status(meeting: &Meeting, expected: MeetingStatus) -> Result<(), LifecycleError> {
        match meeting.status {
            Some(found) if found != expected => Err(LifecycleError::InvalidState {
                id: meeting.id,
                expected,
                found,
            }),
            _ => Ok(()),
        }
    }

    /// Submits a new meeting for approval.
    pub async fn create(&self, draft: &MeetingDraft) -> Result<Meeting, LifecycleError> {
        draft.validate()?;
        let meeting = self
            .store
            .insert(Collection::Pending, draft)
            .await
            .map_err(|e| {
                log::warn!("Lifecycle: create '{}' failed: {}", draft.title, e);
                LifecycleError::CreateFailed(e)
            })?;
        log::info!(
            "Lifecycle: {} submitted meeting {} '{}'",
            self.session.actor(),
            meeting.id,
            meeting.title
        );
        Ok(meeting.with_status(MeetingStatus::Pending))
    }

    pub async fn approve(&self, meeting: &Meeting) -> Result<Meeting, LifecycleError> {
        self.transition(Transition::Approve, meeting).await
    }

    pub async fn deny(&self, meeting: &Meeting) -> Result<Meeting, LifecycleError> {
        self.transition(Transition::Deny, meeting).await
    }

    pub async fn restore(&self, meeting: &Meeting) -> Result<Meeting, LifecycleError> {
        self.transition(Transition::Restore, meeting).await
    }

    /// Insert into the destination, then delete from the source.
    ///
    /// Returns the destination row, whose id may differ from the source's.
    async fn transition(
        &self,
        transition: Transition,
        meeting: &Meeting,
    ) -> Result<Meeting, LifecycleError> {
        let source = transition.source();
        let destination = transition.destination();
        Self::expect_status(meeting, source.status())?;
        let _guard = self.acquire(source, meeting.id)?;

        let inserted = self
            .store
            .insert(destination, &meeting.to_draft())
            .await
            .map_err(|e| {
                log::warn!(
                    "Lifecycle: {} of meeting {} failed at insert, source untouched: {}",
                    transition,
                    meeting.id,
                    e
                );
                transition.failed(e)
            })?
            .with_status(destination.status());

        if let Err(e) = self.store.delete(source, meeting.id).await {
            log::error!(
                "Lifecycle: {} of meeting {} inserted as {} in {} but delete from {} failed: {}",
                transition,
                meeting.id,
                inserted.id,
                destination,
                source,
                e
            );
            self.journal.lock().push(StaleRow {
                transition,
                collection: source,
                id: meeting.id,
                replacement_id: inserted.id,
                title: meeting.title.clone(),
            });
            return Err(LifecycleError::PartialTransition {
                transition,
                inserted: Box::new(inserted),
                source_id: meeting.id,
                source: e,
            });
        }

        log::info!(
            "Lifecycle: {} {} meeting {} -> {} {}",
            self.session.actor(),
            transition,
            meeting.id,
            destination,
            inserted.id
        );
        Ok(inserted)
    }

    /// Irreversibly removes a denied meeting.
    pub async fn permanently_delete(
        &self,
        meeting: &Meeting,
        confirmation: Option<Confirmation>,
    ) -> Result<(), LifecycleError> {
        self.delete_from(Collection::Denied, meeting, confirmation).await
    }

    /// Irreversibly removes a confirmed meeting.
    pub async fn delete_confirmed(
        &self,
        meeting: &Meeting,
        confirmation: Option<Confirmation>,
    ) -> Result<(), LifecycleError> {
        self.delete_from(Collection::Confirmed, meeting, confirmation).await
    }

    async fn delete_from(
        &self,
        collection: Collection,
        meeting: &Meeting,
        confirmation: Option<Confirmation>,
    ) -> Result<(), LifecycleError> {
        match confirmation {
            Some(c) if c.meeting_id == meeting.id => {}
            _ => return Err(LifecycleError::ConfirmationRequired { id: meeting.id }),
        }
        Self::expect_status(meeting, collection.status())?;
        let _guard = self.acquire(collection, meeting.id)?;

        self.store
            .delete(collection, meeting.id)
            .await
            .map_err(|e| {
                log::warn!("Lifecycle: delete of meeting {} failed: {}", meeting.id, e);
                LifecycleError::DeleteFailed(e)
            })?;
        log::info!(
            "Lifecycle: {} deleted meeting {} from {}",
            self.session.actor(),
            meeting.id,
            collection
        );
        Ok(())
    }

    /// Edits a confirmed meeting in place.
    pub async fn edit(
        &self,
        meeting: &Meeting,
        patch: &MeetingPatch,
    ) -> Result<Meeting, LifecycleError> {
        patch.validate()?;
        Self::expect_status(meeting, MeetingStatus::Confirmed)?;
        let _guard = self.acquire(Collection::Confirmed, meeting.id)?;

        let updated = self
            .store
            .update(Collection::Confirmed, meeting.id, patch)
            .await
            .map_err(|e| {
                log::warn!("Lifecycle: update of meeting {} failed: {}", meeting.id, e);
                LifecycleError::UpdateFailed(e)
            })?;
        log::info!("Lifecycle: {} edited meeting {}", self.session.actor(), meeting.id);
        Ok(updated.with_status(MeetingStatus::Confirmed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::store::memory::{MemoryStore, StoreOp};
    use chrono::NaiveDate;
    use tokio::sync::Notify;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    fn budget_review() -> MeetingDraft {
        MeetingDraft {
            title: "Budget Review".into(),
            meeting_date: NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(),
            start_time: "09:00".into(),
            end_time: Some("10:00".into()),
            location: "Sala de Reunião".into(),
            participants_count: 5,
            description: None,
            responsible: "Ana".into(),
            responsible_department: "Finance".into(),
        }
    }

    fn setup() -> (Arc<MemoryStore>, LifecycleController) {
        let store = Arc::new(MemoryStore::new(today()));
        let controller = LifecycleController::new(store.clone(), SessionContext::new());
        (store, controller)
    }

    fn presence(store: &MemoryStore, title: &str) -> Vec<Collection> {
        Collection::ALL
            .into_iter()
            .filter(|c| store.rows(*c).iter().any(|m| m.title == title))
            .collect()
    }

    #[tokio::test]
    async fn test_create_then_approve_scenario() {
        let (store, controller) = setup();
        let pending = controller.create(&budget_review()).await.unwrap();
        assert_eq!(pending.status, Some(MeetingStatus::Pending));

        let confirmed = controller.approve(&pending).await.unwrap();

        assert!(store.rows(Collection::Pending).is_empty());
        let rows = store.rows(Collection::Confirmed);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].to_draft(), budget_review());
        assert_ne!(confirmed.id, pending.id);
        assert_eq!(confirmed.status, Some(MeetingStatus::Confirmed));
    }

    #[tokio::test]
    async fn test_insert_happens_before_delete() {
        let (store, controller) = setup();
        let pending = controller.create(&budget_review()).await.unwrap();
        controller.deny(&pending).await.unwrap();

        let calls = store.calls();
        assert_eq!(
            calls,
            vec![
                "insert meetingsPending".to_string(),
                "insert meetingsDenied".to_string(),
                format!("delete meetingsPending/{}", pending.id),
            ]
        );
        assert_eq!(presence(&store, "Budget Review"), vec![Collection::Denied]);
    }

    #[tokio::test]
    async fn test_failed_insert_leaves_source_untouched() {
        let (store, controller) = setup();
        let pending = controller.create(&budget_review()).await.unwrap();
        store.fail(StoreOp::Insert, Some(Collection::Confirmed));

        let err = controller.approve(&pending).await.unwrap_err();
        assert!(matches!(err, LifecycleError::ApprovalFailed(_)));
        assert_eq!(store.rows(Collection::Pending), vec![pending.clone()]);
        assert!(store.rows(Collection::Confirmed).is_empty());
        assert!(controller.stale_rows().is_empty());
    }

    #[tokio::test]
    async fn test_failed_delete_duplicates_instead_of_losing() {
        let (store, controller) = setup();
        let pending = controller.create(&budget_review()).await.unwrap();
        store.fail(StoreOp::Delete, Some(Collection::Pending));

        let err = controller.approve(&pending).await.unwrap_err();
        assert!(err.needs_reconcile());
        match err {
            LifecycleError::PartialTransition { transition, inserted, source_id, .. } => {
                assert_eq!(transition, Transition::Approve);
                assert_eq!(source_id, pending.id);
                assert_eq!(inserted.title, "Budget Review");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            presence(&store, "Budget Review"),
            vec![Collection::Pending, Collection::Confirmed]
        );
        let stale = controller.stale_rows();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].collection, Collection::Pending);
        assert_eq!(stale[0].id, pending.id);
    }

    #[tokio::test]
    async fn test_failed_deny_insert_leaves_pending_untouched() {
        let (store, controller) = setup();
        let pending = controller.create(&budget_review()).await.unwrap();
        store.fail(StoreOp::Insert, Some(Collection::Denied));

        let err = controller.deny(&pending).await.unwrap_err();
        assert!(matches!(err, LifecycleError::DenialFailed(_)));
        assert!(!err.needs_reconcile());
        assert_eq!(store.rows(Collection::Pending), vec![pending.clone()]);
        assert!(store.rows(Collection::Denied).is_empty());
        assert!(controller.stale_rows().is_empty());
    }

    #[tokio::test]
    async fn test_partial_deny_keeps_both_copies() {
        let (store, controller) = setup();
        let pending = controller.create(&budget_review()).await.unwrap();
        store.fail(StoreOp::Delete, Some(Collection::Pending));

        let err = controller.deny(&pending).await.unwrap_err();
        let denied_id = match err {
            LifecycleError::PartialTransition { transition, inserted, source_id, .. } => {
                assert_eq!(transition, Transition::Deny);
                assert_eq!(source_id, pending.id);
                assert_eq!(inserted.status, Some(MeetingStatus::Denied));
                inserted.id
            }
            other => panic!("unexpected error: {other:?}"),
        };
        assert_eq!(
            presence(&store, "Budget Review"),
            vec![Collection::Pending, Collection::Denied]
        );
        let stale = controller.stale_rows();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].transition, Transition::Deny);
        assert_eq!(stale[0].collection, Collection::Pending);
        assert_eq!(stale[0].id, pending.id);
        assert_eq!(stale[0].replacement_id, denied_id);
    }

    #[tokio::test]
    async fn test_partial_restore_keeps_both_copies() {
        let (store, controller) = setup();
        let denied = store.seed(Collection::Denied, &budget_review());
        store.fail(StoreOp::Delete, Some(Collection::Denied));

        let err = controller.restore(&denied).await.unwrap_err();
        assert!(err.needs_reconcile());
        let pending_id = match err {
            LifecycleError::PartialTransition { transition, inserted, source_id, .. } => {
                assert_eq!(transition, Transition::Restore);
                assert_eq!(source_id, denied.id);
                assert_eq!(inserted.status, Some(MeetingStatus::Pending));
                inserted.id
            }
            other => panic!("unexpected error: {other:?}"),
        };
        assert_eq!(
            presence(&store, "Budget Review"),
            vec![Collection::Pending, Collection::Denied]
        );
        let stale = controller.stale_rows();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].transition, Transition::Restore);
        assert_eq!(stale[0].collection, Collection::Denied);
        assert_eq!(stale[0].id, denied.id);
        assert_eq!(stale[0].replacement_id, pending_id);
    }

    #[tokio::test]
    async fn test_restore_moves_denied_back_to_pending() {
        let (store, controller) = setup();
        let denied = store.seed(Collection::Denied, &budget_review());
        let restored = controller.restore(&denied).await.unwrap();
        assert_eq!(restored.status, Some(MeetingStatus::Pending));
        assert_eq!(presence(&store, "Budget Review"), vec![Collection::Pending]);
    }

    #[tokio::test]
    async fn test_restore_failure_is_typed() {
        let (store, controller) = setup();
        let denied = store.seed(Collection::Denied, &budget_review());
        store.fail(StoreOp::Insert, None);
        assert!(matches!(
            controller.restore(&denied).await,
            Err(LifecycleError::RestoreFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_wrong_source_state_rejected_without_calls() {
        let (store, controller) = setup();
        let confirmed = store.seed(Collection::Confirmed, &budget_review());
        let err = controller.approve(&confirmed).await.unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InvalidState { expected: MeetingStatus::Pending, found: MeetingStatus::Confirmed, .. }
        ));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_approve_on_same_meeting_is_rejected() {
        let (store, controller) = setup();
        let pending = store.seed(Collection::Pending, &budget_review());
        let gate = Arc::new(Notify::new());
        store.gate_inserts(gate.clone());

        let first = controller.approve(&pending);
        let second = async {
            let result = controller.approve(&pending).await;
            gate.notify_one();
            result
        };
        let (first, second) = tokio::join!(first, second);

        assert!(first.is_ok());
        assert!(matches!(second, Err(LifecycleError::InFlight { .. })));
        assert_eq!(store.rows(Collection::Confirmed).len(), 1);
    }

    #[tokio::test]
    async fn test_lock_released_after_failure() {
        let (store, controller) = setup();
        let pending = store.seed(Collection::Pending, &budget_review());
        store.fail(StoreOp::Insert, None);
        assert!(controller.approve(&pending).await.is_err());
        store.heal();
        assert!(controller.approve(&pending).await.is_ok());
    }

    #[tokio::test]
    async fn test_permanent_delete_requires_confirmation() {
        let (store, controller) = setup();
        let denied = store.seed(Collection::Denied, &budget_review());

        let err = controller.permanently_delete(&denied, None).await.unwrap_err();
        assert!(matches!(err, LifecycleError::ConfirmationRequired { .. }));
        let wrong = Confirmation::for_meeting(denied.id + 1);
        assert!(controller.permanently_delete(&denied, Some(wrong)).await.is_err());
        assert!(store.calls().is_empty());

        controller
            .permanently_delete(&denied, Some(Confirmation::for_meeting(denied.id)))
            .await
            .unwrap();
        assert!(store.rows(Collection::Denied).is_empty());
    }

    #[tokio::test]
    async fn test_delete_failure_is_typed() {
        let (store, controller) = setup();
        let confirmed = store.seed(Collection::Confirmed, &budget_review());
        store.fail(StoreOp::Delete, None);
        let err = controller
            .delete_confirmed(&confirmed, Some(Confirmation::for_meeting(confirmed.id)))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::DeleteFailed(_)));
        assert_eq!(store.rows(Collection::Confirmed).len(), 1);
    }

    #[tokio::test]
    async fn test_edit_confirmed_in_place() {
        let (store, controller) = setup();
        let confirmed = store.seed(Collection::Confirmed, &budget_review());
        let patch = MeetingPatch {
            location: Some("Auditório".into()),
            ..Default::default()
        };
        let updated = controller.edit(&confirmed, &patch).await.unwrap();
        assert_eq!(updated.id, confirmed.id);
        assert_eq!(updated.location, "Auditório");
        assert_eq!(store.rows(Collection::Confirmed)[0].location, "Auditório");
    }

    #[tokio::test]
    async fn test_edit_rejects_pending_and_empty_patch() {
        let (store, controller) = setup();
        let pending = store.seed(Collection::Pending, &budget_review());
        let patch = MeetingPatch {
            title: Some("New".into()),
            ..Default::default()
        };
        assert!(matches!(
            controller.edit(&pending, &patch).await,
            Err(LifecycleError::InvalidState { .. })
        ));
        assert!(matches!(
            controller.edit(&pending, &MeetingPatch::default()).await,
            Err(LifecycleError::Validation(ValidationError::EmptyPatch))
        ));
    }

    #[tokio::test]
    async fn test_update_failure_is_typed() {
        let (store, controller) = setup();
        let confirmed = store.seed(Collection::Confirmed, &budget_review());
        store.fail(StoreOp::Update, None);
        let patch = MeetingPatch {
            participants_count: Some(9),
            ..Default::default()
        };
        assert!(matches!(
            controller.edit(&confirmed, &patch).await,
            Err(LifecycleError::UpdateFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_draft_never_reaches_store() {
        let (store, controller) = setup();
        let mut draft = budget_review();
        draft.responsible = String::new();
        let err = controller.create(&draft).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Validation(_)));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_failure_is_typed() {
        let (store, controller) = setup();
        store.fail(StoreOp::Insert, Some(Collection::Pending));
        assert!(matches!(
            controller.create(&budget_review()).await,
            Err(LifecycleError::CreateFailed(_))
        ));
    }
}
