use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::decision::Decision;

/// Lifecycle state of a decision record. These three values are the whole
/// state machine; no other value is valid in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DraftStatus {
    Pending,
    DraftCreated,
    Failed,
}

impl DraftStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DraftStatus::Pending => "PENDING",
            DraftStatus::DraftCreated => "DRAFT_CREATED",
            DraftStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for DraftStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown draft status: {0}")]
pub struct ParseStatusError(String);

impl std::str::FromStr for DraftStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(DraftStatus::Pending),
            "DRAFT_CREATED" => Ok(DraftStatus::DraftCreated),
            "FAILED" => Ok(DraftStatus::Failed),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// Durable wrapper around a decision. Created at PENDING, mutated only
/// through `DraftStore::transition`, never deleted by normal operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DecisionRecord {
    pub id: Uuid,
    pub entity_id: String,
    pub entity_name: String,
    pub lead_email: String,
    pub decision: Decision,
    pub status: DraftStatus,
    pub created_at: DateTime<Utc>,
}

/// Input to `DraftStore::create`: everything but the id, status, and clock.
#[derive(Debug, Clone)]
pub struct NewDecisionRecord {
    pub entity_id: String,
    pub entity_name: String,
    pub lead_email: String,
    pub decision: Decision,
}

/// Outcome of a conditional status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// This caller won the compare-and-set; the record now carries the
    /// target status.
    Applied,
    /// The record was not in the expected source status (or the id is
    /// unknown). Not an error: another pass already moved the record.
    NoOp,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("decision record {0} already exists")]
    DuplicateId(Uuid),
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Durable table of decision records. The store is the single source of
/// truth for status; callers request transitions, they never write status
/// directly.
#[async_trait]
pub trait DraftStore: Send + Sync {
    /// Persist a new decision as PENDING under a fresh time-sortable id.
    async fn create(&self, new: NewDecisionRecord) -> Result<DecisionRecord, StoreError> {
        self.create_with_id(Uuid::now_v7(), new).await
    }

    /// Persist under a caller-supplied id. A collision is surfaced as
    /// `DuplicateId`; the caller resolves it by regenerating the id.
    async fn create_with_id(
        &self,
        id: Uuid,
        new: NewDecisionRecord,
    ) -> Result<DecisionRecord, StoreError>;

    /// Snapshot of PENDING records in creation order. Takes no row locks;
    /// concurrent dispatchers resolve races through `transition`.
    async fn list_pending(&self) -> Result<Vec<DecisionRecord>, StoreError>;

    /// Atomic compare-and-set on one record's status. Succeeds only when the
    /// current status equals `from`; otherwise reports `NoOp`.
    async fn transition(
        &self,
        id: Uuid,
        from: DraftStatus,
        to: DraftStatus,
    ) -> Result<Transition, StoreError>;
}

/// In-memory store for unit tests and local experiments. Matches the
/// Postgres implementation's semantics, including the CAS transition and
/// creation-ordered pending listing.
#[derive(Debug, Default)]
pub struct MemoryDraftStore {
    records: Mutex<Vec<DecisionRecord>>,
}

impl MemoryDraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<DecisionRecord>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fetch a record by id, mostly for test assertions.
    pub fn get(&self, id: Uuid) -> Option<DecisionRecord> {
        self.lock().iter().find(|r| r.id == id).cloned()
    }
}

#[async_trait]
impl DraftStore for MemoryDraftStore {
    async fn create_with_id(
        &self,
        id: Uuid,
        new: NewDecisionRecord,
    ) -> Result<DecisionRecord, StoreError> {
        let mut records = self.lock();
        if records.iter().any(|r| r.id == id) {
            return Err(StoreError::DuplicateId(id));
        }
        let record = DecisionRecord {
            id,
            entity_id: new.entity_id,
            entity_name: new.entity_name,
            lead_email: new.lead_email,
            decision: new.decision,
            status: DraftStatus::Pending,
            created_at: Utc::now(),
        };
        records.push(record.clone());
        Ok(record)
    }

    async fn list_pending(&self) -> Result<Vec<DecisionRecord>, StoreError> {
        Ok(self
            .lock()
            .iter()
            .filter(|r| r.status == DraftStatus::Pending)
            .cloned()
            .collect())
    }

    async fn transition(
        &self,
        id: Uuid,
        from: DraftStatus,
        to: DraftStatus,
    ) -> Result<Transition, StoreError> {
        let mut records = self.lock();
        match records.iter_mut().find(|r| r.id == id) {
            Some(record) if record.status == from => {
                record.status = to;
                Ok(Transition::Applied)
            }
            _ => Ok(Transition::NoOp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        DraftStatus, DraftStore, MemoryDraftStore, NewDecisionRecord, StoreError, Transition,
    };
    use crate::classify::Category;
    use crate::decision::Decision;
    use std::sync::Arc;
    use uuid::Uuid;

    fn sample_new(entity: &str) -> NewDecisionRecord {
        NewDecisionRecord {
            entity_id: entity.to_string(),
            entity_name: format!("{entity} Corp"),
            lead_email: format!("lead@{entity}.test"),
            decision: Decision {
                category: Category::Growth,
                propensity_score: 0.6,
                email_subject: "Scaling with us".into(),
                email_body: "Saw you reading the API docs.".into(),
                reasoning: "growth intent, no errors".into(),
            },
        }
    }

    #[tokio::test]
    async fn create_then_list_pending_round_trips_the_decision() {
        let store = MemoryDraftStore::new();
        let created = store.create(sample_new("acme")).await.unwrap();

        let pending = store.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, created.id);
        assert_eq!(pending[0].status, DraftStatus::Pending);
        assert_eq!(pending[0].decision, created.decision);
        assert_eq!(pending[0].lead_email, "lead@acme.test");
    }

    #[tokio::test]
    async fn colliding_id_is_a_duplicate_error() {
        let store = MemoryDraftStore::new();
        let id = Uuid::now_v7();
        store.create_with_id(id, sample_new("acme")).await.unwrap();

        let err = store
            .create_with_id(id, sample_new("other"))
            .await
            .expect_err("second create with the same id must fail");
        assert!(matches!(err, StoreError::DuplicateId(dup) if dup == id));
    }

    #[tokio::test]
    async fn transition_applies_once_then_noops() {
        let store = MemoryDraftStore::new();
        let record = store.create(sample_new("acme")).await.unwrap();

        let first = store
            .transition(record.id, DraftStatus::Pending, DraftStatus::DraftCreated)
            .await
            .unwrap();
        assert_eq!(first, Transition::Applied);

        let second = store
            .transition(record.id, DraftStatus::Pending, DraftStatus::DraftCreated)
            .await
            .unwrap();
        assert_eq!(second, Transition::NoOp);

        assert_eq!(
            store.get(record.id).unwrap().status,
            DraftStatus::DraftCreated
        );
    }

    #[tokio::test]
    async fn transition_on_unknown_id_is_a_noop() {
        let store = MemoryDraftStore::new();
        let result = store
            .transition(Uuid::now_v7(), DraftStatus::Pending, DraftStatus::Failed)
            .await
            .unwrap();
        assert_eq!(result, Transition::NoOp);
    }

    #[tokio::test]
    async fn concurrent_duplicate_transitions_yield_exactly_one_applied() {
        let store = Arc::new(MemoryDraftStore::new());
        let record = store.create(sample_new("acme")).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let id = record.id;
            handles.push(tokio::spawn(async move {
                store
                    .transition(id, DraftStatus::Pending, DraftStatus::DraftCreated)
                    .await
                    .unwrap()
            }));
        }

        let mut applied = 0;
        for handle in handles {
            if handle.await.unwrap() == Transition::Applied {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);
        assert_eq!(
            store.get(record.id).unwrap().status,
            DraftStatus::DraftCreated
        );
    }

    #[test]
    fn status_round_trips_through_its_string_form() {
        for status in [
            DraftStatus::Pending,
            DraftStatus::DraftCreated,
            DraftStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<DraftStatus>().unwrap(), status);
        }
    }
}
