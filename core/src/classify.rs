use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::signals::SignalTag;

/// Mutually-exclusive outreach segment for one entity.
///
/// `SupportRisk` is accepted on stored records (manual triage can assign it)
/// but the classifier itself never emits it; the error-driven segments are
/// `ChurnRisk` and `HighValueSupportRisk`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Enterprise,
    Growth,
    SupportRisk,
    HighValueSupportRisk,
    ChurnRisk,
    Neutral,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Enterprise => "enterprise",
            Category::Growth => "growth",
            Category::SupportRisk => "support_risk",
            Category::HighValueSupportRisk => "high_value_support_risk",
            Category::ChurnRisk => "churn_risk",
            Category::Neutral => "neutral",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown category: {0}")]
pub struct ParseCategoryError(String);

impl std::str::FromStr for Category {
    type Err = ParseCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enterprise" => Ok(Category::Enterprise),
            "growth" => Ok(Category::Growth),
            "support_risk" => Ok(Category::SupportRisk),
            "high_value_support_risk" => Ok(Category::HighValueSupportRisk),
            "churn_risk" => Ok(Category::ChurnRisk),
            "neutral" => Ok(Category::Neutral),
            other => Err(ParseCategoryError(other.to_string())),
        }
    }
}

/// Classifier output: the winning category plus the bounded propensity score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub category: Category,
    pub propensity_score: f64,
}

type TagSet = BTreeSet<SignalTag>;

struct Rule {
    category: Category,
    applies: fn(&TagSet) -> bool,
}

/// Ordered conflict-resolution table. First matching rule wins, so each
/// predicate only states what earlier rules have not already consumed.
/// The order is the contract; keep this a flat list, never nested branches.
const RULES: &[Rule] = &[
    // Enterprise keywords plus errors: valuable but frustrated.
    Rule {
        category: Category::HighValueSupportRisk,
        applies: |tags| has_high_value(tags) && has_error(tags),
    },
    // Errors without enterprise weight.
    Rule {
        category: Category::ChurnRisk,
        applies: has_error,
    },
    // Expansion interest with a clean run.
    Rule {
        category: Category::Growth,
        applies: |tags| tags.iter().any(|t| t.is_growth()),
    },
    // Enterprise keywords alone, no friction observed.
    Rule {
        category: Category::Enterprise,
        applies: has_high_value,
    },
];

fn has_high_value(tags: &TagSet) -> bool {
    tags.iter().any(|t| t.is_high_value())
}

fn has_error(tags: &TagSet) -> bool {
    tags.contains(&SignalTag::ErrorEvent)
}

const BASE_SCORE: f64 = 0.2;
const ERROR_PENALTY: f64 = 0.3;
/// Penalty used instead of `ERROR_PENALTY` when a high-value tag is present:
/// an enterprise lead mid-incident must not score like a churning free user.
const DAMPENED_ERROR_PENALTY: f64 = 0.1;

fn value_weight(tag: SignalTag) -> f64 {
    match tag {
        SignalTag::SecurityIntent => 0.45,
        SignalTag::PricingIntent => 0.25,
        SignalTag::BillingIntent => 0.2,
        SignalTag::DocsIntent => 0.15,
        SignalTag::ContentIntent => 0.05,
        SignalTag::ErrorEvent => 0.0,
    }
}

/// Bounded propensity estimate for a tag set.
///
/// Value weights only add and the error penalty only subtracts, so the score
/// is monotone in both directions: more intent never lowers it, an error
/// never raises it. Clamped to [0.0, 1.0].
pub fn propensity_score(tags: &TagSet) -> f64 {
    let value: f64 = tags.iter().map(|&t| value_weight(t)).sum();
    let penalty = if !has_error(tags) {
        0.0
    } else if has_high_value(tags) {
        DAMPENED_ERROR_PENALTY
    } else {
        ERROR_PENALTY
    };
    (BASE_SCORE + value - penalty).clamp(0.0, 1.0)
}

/// Resolve one tag set to exactly one category and score.
///
/// Deterministic and total: the same tag set always classifies identically,
/// and a set matching no rule lands in the `Neutral` bucket.
pub fn classify(tags: &TagSet) -> Classification {
    let category = RULES
        .iter()
        .find(|rule| (rule.applies)(tags))
        .map(|rule| rule.category)
        .unwrap_or(Category::Neutral);

    Classification {
        category,
        propensity_score: propensity_score(tags),
    }
}
