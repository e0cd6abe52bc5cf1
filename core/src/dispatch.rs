use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::store::{DraftStatus, DraftStore, StoreError, Transition};

/// Short-lived bearer credential for the external mail system.
#[derive(Clone)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never echo the secret into logs
        f.write_str("AccessToken(..)")
    }
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("token exchange response lacked an access token")]
    MissingAccessToken,
    #[error("mail transport error: {0}")]
    Transport(String),
    #[error("mail api rejected the draft: {status}: {body}")]
    Api { status: u16, body: String },
}

/// External mail-draft boundary: one credential per run, one draft per
/// record. The real implementation exchanges a refresh token with the
/// provider and posts RFC 822 payloads; tests count calls.
#[async_trait]
pub trait MailDrafter: Send + Sync {
    async fn acquire_token(&self) -> Result<AccessToken, MailError>;

    async fn create_draft(
        &self,
        token: &AccessToken,
        lead_email: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), MailError>;
}

/// Per-run outcome counts, reported to the caller and the batch surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct DispatchReport {
    /// Records whose external draft was created this run.
    pub created: u64,
    /// Records that moved to FAILED this run.
    pub failed: u64,
    /// Records another run claimed first (stale listing).
    pub skipped: u64,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Credential acquisition failed; the run aborted before touching any
    /// record.
    #[error("credential acquisition failed: {0}")]
    Credential(#[source] MailError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One dispatcher pass: list pending records, acquire the delivery
/// credential once, then claim and draft each record independently.
///
/// The claim (`PENDING → DRAFT_CREATED`) happens *before* the external call:
/// whichever run wins the compare-and-set owns the record, and the loser
/// observes `NoOp` and skips without sending. That makes overlapping runs
/// safe and keeps the external action at-most-once per record; a crash
/// between claim and send loses that one action rather than duplicating it.
/// A per-record failure moves that record to FAILED and the pass continues.
pub async fn run_dispatch<S, M>(store: &S, mailer: &M) -> Result<DispatchReport, DispatchError>
where
    S: DraftStore + ?Sized,
    M: MailDrafter + ?Sized,
{
    let pending = store.list_pending().await?;
    if pending.is_empty() {
        info!("no pending decision records");
        return Ok(DispatchReport::default());
    }

    let token = mailer
        .acquire_token()
        .await
        .map_err(DispatchError::Credential)?;
    info!(pending = pending.len(), "dispatching pending decision records");

    let mut report = DispatchReport::default();
    for record in pending {
        let claim = store
            .transition(record.id, DraftStatus::Pending, DraftStatus::DraftCreated)
            .await?;
        if claim == Transition::NoOp {
            report.skipped += 1;
            continue;
        }

        match mailer
            .create_draft(
                &token,
                &record.lead_email,
                &record.decision.email_subject,
                &record.decision.email_body,
            )
            .await
        {
            Ok(()) => {
                info!(id = %record.id, lead_email = %record.lead_email, "draft created");
                report.created += 1;
            }
            Err(err) => {
                warn!(
                    id = %record.id,
                    lead_email = %record.lead_email,
                    error = %err,
                    "draft creation failed"
                );
                store
                    .transition(record.id, DraftStatus::DraftCreated, DraftStatus::Failed)
                    .await?;
                report.failed += 1;
            }
        }
    }

    info!(
        created = report.created,
        failed = report.failed,
        skipped = report.skipped,
        "dispatch run complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::{AccessToken, DispatchError, MailDrafter, MailError, run_dispatch};
    use crate::classify::Category;
    use crate::decision::Decision;
    use crate::store::{DraftStatus, DraftStore, MemoryDraftStore, NewDecisionRecord};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Mailer stub that records every draft call and can be told to fail
    /// specific recipients or the token exchange itself.
    #[derive(Default)]
    struct RecordingMailer {
        fail_token: bool,
        fail_recipients: HashSet<String>,
        token_calls: AtomicUsize,
        drafts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MailDrafter for RecordingMailer {
        async fn acquire_token(&self) -> Result<AccessToken, MailError> {
            self.token_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_token {
                return Err(MailError::MissingAccessToken);
            }
            Ok(AccessToken::new("test-token"))
        }

        async fn create_draft(
            &self,
            _token: &AccessToken,
            lead_email: &str,
            _subject: &str,
            _body: &str,
        ) -> Result<(), MailError> {
            self.drafts
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .push(lead_email.to_string());
            if self.fail_recipients.contains(lead_email) {
                return Err(MailError::Api {
                    status: 500,
                    body: "draft rejected".into(),
                });
            }
            Ok(())
        }
    }

    impl RecordingMailer {
        fn drafts(&self) -> Vec<String> {
            self.drafts.lock().unwrap_or_else(|p| p.into_inner()).clone()
        }
    }

    fn new_record(n: usize) -> NewDecisionRecord {
        NewDecisionRecord {
            entity_id: format!("entity-{n}"),
            entity_name: format!("Entity {n}"),
            lead_email: format!("lead{n}@example.test"),
            decision: Decision {
                category: Category::Growth,
                propensity_score: 0.6,
                email_subject: format!("subject {n}"),
                email_body: format!("body {n}"),
                reasoning: "growth intent".into(),
            },
        }
    }

    #[tokio::test]
    async fn empty_store_reports_zero_without_acquiring_a_token() {
        let store = MemoryDraftStore::new();
        let mailer = RecordingMailer::default();

        let report = run_dispatch(&store, &mailer).await.unwrap();
        assert_eq!((report.created, report.failed, report.skipped), (0, 0, 0));
        assert_eq!(mailer.token_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn credential_failure_aborts_before_any_record() {
        let store = MemoryDraftStore::new();
        let record = store.create(new_record(1)).await.unwrap();
        let mailer = RecordingMailer {
            fail_token: true,
            ..Default::default()
        };

        let err = run_dispatch(&store, &mailer).await.expect_err("must abort");
        assert!(matches!(err, DispatchError::Credential(_)));
        assert!(mailer.drafts().is_empty());
        assert_eq!(store.get(record.id).unwrap().status, DraftStatus::Pending);
    }

    #[tokio::test]
    async fn one_failing_record_does_not_abort_the_rest() {
        let store = MemoryDraftStore::new();
        let mut ids = Vec::new();
        for n in 1..=3 {
            ids.push(store.create(new_record(n)).await.unwrap().id);
        }
        let mailer = RecordingMailer {
            fail_recipients: HashSet::from(["lead2@example.test".to_string()]),
            ..Default::default()
        };

        let report = run_dispatch(&store, &mailer).await.unwrap();
        assert_eq!((report.created, report.failed, report.skipped), (2, 1, 0));
        assert_eq!(mailer.drafts().len(), 3);

        assert_eq!(store.get(ids[0]).unwrap().status, DraftStatus::DraftCreated);
        assert_eq!(store.get(ids[1]).unwrap().status, DraftStatus::Failed);
        assert_eq!(store.get(ids[2]).unwrap().status, DraftStatus::DraftCreated);
    }

    #[tokio::test]
    async fn failed_records_keep_their_decision_fields() {
        let store = MemoryDraftStore::new();
        let record = store.create(new_record(1)).await.unwrap();
        let mailer = RecordingMailer {
            fail_recipients: HashSet::from(["lead1@example.test".to_string()]),
            ..Default::default()
        };

        run_dispatch(&store, &mailer).await.unwrap();

        let stored = store.get(record.id).unwrap();
        assert_eq!(stored.status, DraftStatus::Failed);
        assert_eq!(stored.decision, record.decision);
    }

    #[tokio::test]
    async fn already_moved_records_are_skipped_without_a_call() {
        let store = MemoryDraftStore::new();
        let record = store.create(new_record(1)).await.unwrap();
        store
            .transition(record.id, DraftStatus::Pending, DraftStatus::DraftCreated)
            .await
            .unwrap();

        // Hand the dispatcher a stale listing that still shows the record.
        struct StaleStore {
            inner: MemoryDraftStore,
            stale: Vec<crate::store::DecisionRecord>,
        }

        #[async_trait]
        impl DraftStore for StaleStore {
            async fn create_with_id(
                &self,
                id: uuid::Uuid,
                new: NewDecisionRecord,
            ) -> Result<crate::store::DecisionRecord, crate::store::StoreError> {
                self.inner.create_with_id(id, new).await
            }

            async fn list_pending(
                &self,
            ) -> Result<Vec<crate::store::DecisionRecord>, crate::store::StoreError> {
                Ok(self.stale.clone())
            }

            async fn transition(
                &self,
                id: uuid::Uuid,
                from: DraftStatus,
                to: DraftStatus,
            ) -> Result<crate::store::Transition, crate::store::StoreError> {
                self.inner.transition(id, from, to).await
            }
        }

        let stale = vec![crate::store::DecisionRecord {
            status: DraftStatus::Pending,
            ..record.clone()
        }];
        let store = StaleStore {
            inner: store,
            stale,
        };
        let mailer = RecordingMailer::default();

        let report = run_dispatch(&store, &mailer).await.unwrap();
        assert_eq!((report.created, report.failed, report.skipped), (0, 0, 1));
        assert!(mailer.drafts().is_empty());
    }

    #[tokio::test]
    async fn overlapping_runs_draft_each_record_exactly_once() {
        let store = Arc::new(MemoryDraftStore::new());
        for n in 1..=4 {
            store.create(new_record(n)).await.unwrap();
        }
        let mailer = Arc::new(RecordingMailer::default());

        let (first, second) = tokio::join!(
            run_dispatch(store.as_ref(), mailer.as_ref()),
            run_dispatch(store.as_ref(), mailer.as_ref()),
        );
        let first = first.unwrap();
        let second = second.unwrap();

        assert_eq!(first.created + second.created, 4);
        assert_eq!(first.failed + second.failed, 0);

        let drafts = mailer.drafts();
        assert_eq!(drafts.len(), 4, "each record drafted exactly once");
        let unique: HashSet<_> = drafts.iter().collect();
        assert_eq!(unique.len(), 4);
    }
}
