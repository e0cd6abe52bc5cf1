use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::classify::Category;

/// The structured output contract of the decision engine.
///
/// `category` and `propensity_score` are deterministic functions of the
/// extracted tag set; the text fields come from the injected generation
/// capability. A `Decision` only exists after the composer has validated it
/// against this schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Decision {
    /// Exactly one segment, never several.
    pub category: Category,
    /// Bounded conversion/retention estimate, 0.0 ..= 1.0.
    pub propensity_score: f64,
    pub email_subject: String,
    pub email_body: String,
    /// Why this category was chosen. Preserved verbatim on the stored record,
    /// including for FAILED dispatches.
    pub reasoning: String,
}

/// Request to derive and persist a decision for one entity.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct CreateDecisionRequest {
    pub entity_id: String,
    pub entity_name: String,
    pub lead_email: String,
    /// Inline raw log lines. When omitted, the entity's stored log rows are
    /// used instead.
    #[serde(default)]
    pub log_lines: Option<Vec<String>>,
}
