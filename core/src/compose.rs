use std::collections::BTreeSet;

use async_trait::async_trait;
use thiserror::Error;

use crate::classify::{self, Category};
use crate::decision::Decision;
use crate::signals::SignalTag;

/// Copy produced by the text-generation capability.
#[derive(Debug, Clone)]
pub struct GeneratedCopy {
    pub subject: String,
    pub body: String,
    pub reasoning: String,
}

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("generator transport error: {0}")]
    Transport(String),
    #[error("generator returned an unusable response: {0}")]
    Response(String),
}

/// Injected text-generation capability.
///
/// The production implementation calls a generative model pinned to
/// temperature 0.0 so repeated runs over the same tag set produce stable
/// copy; tests use a deterministic stub. The category is decided *before*
/// this is called; the generator writes copy, it never classifies.
#[async_trait]
pub trait CopyGenerator: Send + Sync {
    async fn generate(
        &self,
        entity_name: &str,
        category: Category,
        tags: &BTreeSet<SignalTag>,
    ) -> Result<GeneratedCopy, GeneratorError>;
}

#[derive(Debug, Error)]
pub enum CompositionError {
    #[error("propensity score {0} is outside 0.0..=1.0")]
    ScoreOutOfRange(f64),
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error(transparent)]
    Generator(#[from] GeneratorError),
}

/// Classify the tag set, generate copy for the winning category, and
/// assemble a validated decision.
///
/// Nothing partially valid escapes: any schema violation surfaces as a
/// `CompositionError` and the caller persists nothing.
pub async fn compose_decision<G>(
    generator: &G,
    entity_name: &str,
    tags: &BTreeSet<SignalTag>,
) -> Result<Decision, CompositionError>
where
    G: CopyGenerator + ?Sized,
{
    let classification = classify::classify(tags);
    let copy = generator
        .generate(entity_name, classification.category, tags)
        .await?;

    let decision = Decision {
        category: classification.category,
        propensity_score: classification.propensity_score,
        email_subject: copy.subject,
        email_body: copy.body,
        reasoning: copy.reasoning,
    };
    validate(&decision)?;
    Ok(decision)
}

/// Schema check for an assembled decision: bounded score, non-empty text
/// fields. The category is valid by construction of the enum.
pub fn validate(decision: &Decision) -> Result<(), CompositionError> {
    if !(0.0..=1.0).contains(&decision.propensity_score) {
        return Err(CompositionError::ScoreOutOfRange(decision.propensity_score));
    }
    for (field, value) in [
        ("email_subject", &decision.email_subject),
        ("email_body", &decision.email_body),
        ("reasoning", &decision.reasoning),
    ] {
        if value.trim().is_empty() {
            return Err(CompositionError::EmptyField(field));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{
        CompositionError, CopyGenerator, GeneratedCopy, GeneratorError, compose_decision,
    };
    use crate::classify::Category;
    use crate::signals::SignalTag;
    use async_trait::async_trait;
    use std::collections::BTreeSet;

    /// Stub generator returning fixed copy, with switches for the failure
    /// paths the composer must reject.
    struct StubGenerator {
        subject: &'static str,
        fail: bool,
    }

    impl StubGenerator {
        fn ok() -> Self {
            Self {
                subject: "Following up on your SSO setup",
                fail: false,
            }
        }
    }

    #[async_trait]
    impl CopyGenerator for StubGenerator {
        async fn generate(
            &self,
            entity_name: &str,
            category: Category,
            _tags: &BTreeSet<SignalTag>,
        ) -> Result<GeneratedCopy, GeneratorError> {
            if self.fail {
                return Err(GeneratorError::Transport("connection refused".into()));
            }
            Ok(GeneratedCopy {
                subject: self.subject.to_string(),
                body: format!("Hi {entity_name}, we noticed activity in the {category} segment."),
                reasoning: format!("classified as {category}"),
            })
        }
    }

    fn tags(input: &[SignalTag]) -> BTreeSet<SignalTag> {
        input.iter().copied().collect()
    }

    #[tokio::test]
    async fn composes_a_validated_decision() {
        let decision = compose_decision(
            &StubGenerator::ok(),
            "Hayles Data Corp",
            &tags(&[SignalTag::SecurityIntent, SignalTag::ErrorEvent]),
        )
        .await
        .unwrap();

        assert_eq!(decision.category, Category::HighValueSupportRisk);
        assert!(decision.propensity_score > 0.5);
        assert!(!decision.email_subject.is_empty());
        assert!(decision.email_body.contains("Hayles Data Corp"));
    }

    #[tokio::test]
    async fn same_tags_compose_to_the_same_category_and_score() {
        let tag_set = tags(&[SignalTag::PricingIntent, SignalTag::DocsIntent]);
        let first = compose_decision(&StubGenerator::ok(), "Acme", &tag_set)
            .await
            .unwrap();
        let second = compose_decision(&StubGenerator::ok(), "Acme", &tag_set)
            .await
            .unwrap();
        assert_eq!(first.category, second.category);
        assert_eq!(first.propensity_score, second.propensity_score);
    }

    #[tokio::test]
    async fn blank_subject_is_a_composition_error() {
        let generator = StubGenerator {
            subject: "   ",
            fail: false,
        };
        let err = compose_decision(&generator, "Acme", &tags(&[SignalTag::PricingIntent]))
            .await
            .expect_err("blank subject must fail validation");
        match err {
            CompositionError::EmptyField(field) => assert_eq!(field, "email_subject"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn generator_failures_propagate_as_composition_errors() {
        let generator = StubGenerator {
            subject: "ignored",
            fail: true,
        };
        let err = compose_decision(&generator, "Acme", &BTreeSet::new())
            .await
            .expect_err("generator failure must propagate");
        assert!(matches!(err, CompositionError::Generator(_)));
    }

    #[test]
    fn out_of_range_score_is_rejected() {
        let decision = crate::decision::Decision {
            category: Category::Growth,
            propensity_score: 1.2,
            email_subject: "s".into(),
            email_body: "b".into(),
            reasoning: "r".into(),
        };
        assert!(matches!(
            super::validate(&decision),
            Err(CompositionError::ScoreOutOfRange(_))
        ));
    }
}
