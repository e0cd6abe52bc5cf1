use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use signaldesk_core::decision::Decision;
use signaldesk_core::store::{
    DecisionRecord, DraftStatus, DraftStore, NewDecisionRecord, StoreError, Transition,
};

/// Postgres-backed draft lifecycle store.
///
/// Every status write is a single conditional UPDATE keyed on the expected
/// source status, so overlapping dispatch runs race safely. Identifiers and
/// statuses are always bound parameters, never interpolated into SQL.
#[derive(Clone)]
pub struct PgDraftStore {
    pool: PgPool,
}

impl PgDraftStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Read API listing: optional status filter, newest first.
    pub async fn list(
        &self,
        status: Option<DraftStatus>,
        limit: i64,
    ) -> Result<Vec<DecisionRecord>, StoreError> {
        let rows = sqlx::query_as::<_, DecisionDraftRow>(
            r#"
            SELECT id, entity_id, entity_name, lead_email,
                   category, propensity_score, email_subject, email_body, reasoning,
                   status, created_at
            FROM decision_drafts
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(status.map(DraftStatus::as_str))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(DecisionDraftRow::into_record).collect()
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<DecisionRecord>, StoreError> {
        let row = sqlx::query_as::<_, DecisionDraftRow>(
            r#"
            SELECT id, entity_id, entity_name, lead_email,
                   category, propensity_score, email_subject, email_body, reasoning,
                   status, created_at
            FROM decision_drafts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(DecisionDraftRow::into_record).transpose()
    }
}

#[async_trait]
impl DraftStore for PgDraftStore {
    async fn create_with_id(
        &self,
        id: Uuid,
        new: NewDecisionRecord,
    ) -> Result<DecisionRecord, StoreError> {
        let row = sqlx::query_as::<_, DecisionDraftRow>(
            r#"
            INSERT INTO decision_drafts (
                id, entity_id, entity_name, lead_email,
                category, propensity_score, email_subject, email_body, reasoning,
                status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id, entity_id, entity_name, lead_email,
                      category, propensity_score, email_subject, email_body, reasoning,
                      status, created_at
            "#,
        )
        .bind(id)
        .bind(&new.entity_id)
        .bind(&new.entity_name)
        .bind(&new.lead_email)
        .bind(new.decision.category.as_str())
        .bind(new.decision.propensity_score)
        .bind(&new.decision.email_subject)
        .bind(&new.decision.email_body)
        .bind(&new.decision.reasoning)
        .bind(DraftStatus::Pending.as_str())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.code().as_deref() == Some("23505") {
                    return StoreError::DuplicateId(id);
                }
            }
            backend(e)
        })?;

        row.into_record()
    }

    async fn list_pending(&self) -> Result<Vec<DecisionRecord>, StoreError> {
        let rows = sqlx::query_as::<_, DecisionDraftRow>(
            r#"
            SELECT id, entity_id, entity_name, lead_email,
                   category, propensity_score, email_subject, email_body, reasoning,
                   status, created_at
            FROM decision_drafts
            WHERE status = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(DraftStatus::Pending.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(DecisionDraftRow::into_record).collect()
    }

    async fn transition(
        &self,
        id: Uuid,
        from: DraftStatus,
        to: DraftStatus,
    ) -> Result<Transition, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE decision_drafts
            SET status = $1, updated_at = NOW()
            WHERE id = $2
              AND status = $3
            "#,
        )
        .bind(to.as_str())
        .bind(id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 1 {
            Ok(Transition::Applied)
        } else {
            Ok(Transition::NoOp)
        }
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

/// Internal row type for sqlx mapping
#[derive(sqlx::FromRow)]
struct DecisionDraftRow {
    id: Uuid,
    entity_id: String,
    entity_name: String,
    lead_email: String,
    category: String,
    propensity_score: f64,
    email_subject: String,
    email_body: String,
    reasoning: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl DecisionDraftRow {
    fn into_record(self) -> Result<DecisionRecord, StoreError> {
        let category = self
            .category
            .parse()
            .map_err(|e: signaldesk_core::classify::ParseCategoryError| {
                StoreError::Backend(e.to_string())
            })?;
        let status = self
            .status
            .parse()
            .map_err(|e: signaldesk_core::store::ParseStatusError| {
                StoreError::Backend(e.to_string())
            })?;

        Ok(DecisionRecord {
            id: self.id,
            entity_id: self.entity_id,
            entity_name: self.entity_name,
            lead_email: self.lead_email,
            decision: Decision {
                category,
                propensity_score: self.propensity_score,
                email_subject: self.email_subject,
                email_body: self.email_body,
                reasoning: self.reasoning,
            },
            status,
            created_at: self.created_at,
        })
    }
}
