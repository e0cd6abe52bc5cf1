use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A normalized behavioral signal extracted from raw log text.
///
/// Tags are presence/absence indicators: intent is carried by *which* paths
/// an entity touched, not how often or in what order, so extraction collapses
/// the whole log into a set.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum SignalTag {
    PricingIntent,
    SecurityIntent,
    DocsIntent,
    ErrorEvent,
    BillingIntent,
    ContentIntent,
}

impl SignalTag {
    /// Enterprise-keyword tags (SSO/SAML and friends).
    pub fn is_high_value(self) -> bool {
        matches!(self, SignalTag::SecurityIntent)
    }

    /// Expansion-interest tags without enterprise weight.
    pub fn is_growth(self) -> bool {
        matches!(
            self,
            SignalTag::PricingIntent | SignalTag::DocsIntent | SignalTag::BillingIntent
        )
    }
}

/// Fixed substring → tag lookup table. Matching is case-insensitive.
const SIGNAL_PATTERNS: &[(&str, SignalTag)] = &[
    ("sso", SignalTag::SecurityIntent),
    ("saml", SignalTag::SecurityIntent),
    ("security", SignalTag::SecurityIntent),
    ("error", SignalTag::ErrorEvent),
    ("timeout", SignalTag::ErrorEvent),
    ("pricing", SignalTag::PricingIntent),
    ("billing", SignalTag::BillingIntent),
    ("invoice", SignalTag::BillingIntent),
    ("docs", SignalTag::DocsIntent),
    ("api", SignalTag::DocsIntent),
    ("blog", SignalTag::ContentIntent),
];

/// Extract the signal tag set from an ordered sequence of raw log lines.
///
/// Total over arbitrary text: unmatched lines are ignored, duplicates
/// collapse, and empty input yields the empty set. Input order never affects
/// the result.
pub fn extract_signals<I, S>(lines: I) -> BTreeSet<SignalTag>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut tags = BTreeSet::new();
    for line in lines {
        let line = line.as_ref().to_lowercase();
        for (needle, tag) in SIGNAL_PATTERNS {
            if line.contains(needle) {
                tags.insert(*tag);
            }
        }
        if has_server_error_status(&line) {
            tags.insert(SignalTag::ErrorEvent);
        }
    }
    tags
}

/// A standalone 5xx status token (e.g. "GET /deploy 503") counts as an error
/// event even when the line never spells out "error".
fn has_server_error_status(line: &str) -> bool {
    line.split(|c: char| !c.is_ascii_digit())
        .any(|token| token.len() == 3 && token.starts_with('5'))
}

#[cfg(test)]
mod tests {
    use super::{SignalTag, extract_signals};

    #[test]
    fn empty_input_yields_empty_set() {
        let tags = extract_signals(Vec::<String>::new());
        assert!(tags.is_empty());
    }

    #[test]
    fn unmatched_lines_are_ignored() {
        let tags = extract_signals(["/about-us", "/careers", "hello world"]);
        assert!(tags.is_empty());
    }

    #[test]
    fn substring_table_maps_paths_to_tags() {
        let tags = extract_signals([
            "/security/sso-implementation",
            "/pricing/enterprise",
            "/docs/api-v2/rate-limits",
            "/billing/invoice-history",
            "/blog/nextjs-middleware",
            "/error/500-build-timeout",
        ]);
        assert!(tags.contains(&SignalTag::SecurityIntent));
        assert!(tags.contains(&SignalTag::PricingIntent));
        assert!(tags.contains(&SignalTag::DocsIntent));
        assert!(tags.contains(&SignalTag::BillingIntent));
        assert!(tags.contains(&SignalTag::ContentIntent));
        assert!(tags.contains(&SignalTag::ErrorEvent));
    }

    #[test]
    fn duplicates_collapse_into_one_tag() {
        let tags = extract_signals(["/pricing", "/pricing", "/pricing/teams"]);
        assert_eq!(tags.len(), 1);
        assert!(tags.contains(&SignalTag::PricingIntent));
    }

    #[test]
    fn standalone_5xx_status_counts_as_error_event() {
        let tags = extract_signals(["GET /deploy 503"]);
        assert!(tags.contains(&SignalTag::ErrorEvent));

        // 5xx digits embedded in longer numbers are not status codes.
        let tags = extract_signals(["session 15031 opened"]);
        assert!(!tags.contains(&SignalTag::ErrorEvent));
    }

    #[test]
    fn input_order_does_not_change_the_set() {
        let forward = extract_signals(["/pricing", "/error/timeout", "/docs/api"]);
        let reverse = extract_signals(["/docs/api", "/error/timeout", "/pricing"]);
        assert_eq!(forward, reverse);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let tags = extract_signals(["/Security/SSO", "/PRICING"]);
        assert!(tags.contains(&SignalTag::SecurityIntent));
        assert!(tags.contains(&SignalTag::PricingIntent));
    }
}
