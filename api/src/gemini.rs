use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use signaldesk_core::classify::Category;
use signaldesk_core::compose::{CopyGenerator, GeneratedCopy, GeneratorError};
use signaldesk_core::signals::SignalTag;

const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.5-pro";
/// Pinned to zero: repeated runs over the same tag set must produce the same
/// copy, or the automation cannot be trusted.
const TEMPERATURE: f32 = 0.0;

/// Gemini-backed copy generator.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl GeminiConfig {
    pub fn from_env() -> Result<Self, String> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| "GEMINI_API_KEY must be set".to_string())?;
        Ok(Self {
            api_key,
            model: std::env::var("SIGNALDESK_GEMINI_MODEL")
                .unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            endpoint: std::env::var("SIGNALDESK_GEMINI_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string()),
            timeout_secs: 30,
        })
    }
}

pub struct GeminiGenerator {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiGenerator {
    pub fn new(config: GeminiConfig) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| format!("failed to build http client: {e}"))?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self, String> {
        Self::new(GeminiConfig::from_env()?)
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.config.endpoint, self.config.model, self.config.api_key
        )
    }
}

/// Prompt for the copy model. The category is already decided by the
/// deterministic classifier; the model only writes copy that acknowledges
/// the observed signals, it never re-classifies.
fn build_prompt(entity_name: &str, category: Category, tags: &BTreeSet<SignalTag>) -> String {
    let signal_list = if tags.is_empty() {
        "none observed".to_string()
    } else {
        tags.iter()
            .map(|tag| format!("{tag:?}"))
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        "You are a senior growth analyst drafting outreach for the company '{entity_name}'.\n\
         The account has been classified as '{category}' based on these behavioral signals: {signal_list}.\n\
         \n\
         Draft an email that acknowledges the specific context. For example, if the signals show \
         SSO setup alongside timeouts, say so directly.\n\
         Also explain briefly why this classification fits the observed signals.\n\
         \n\
         Return ONLY one JSON object with exactly these keys:\n\
         {{\"email_subject\": \"...\", \"email_body\": \"...\", \"reasoning\": \"...\"}}\n\
         No markdown fences, no commentary outside the JSON."
    )
}

// Gemini API request/response structures

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContentResponse,
}

#[derive(Debug, Deserialize)]
struct GeminiContentResponse {
    parts: Vec<GeminiPartResponse>,
}

#[derive(Debug, Deserialize)]
struct GeminiPartResponse {
    text: String,
}

/// The JSON shape the model is instructed to return.
#[derive(Debug, Deserialize)]
struct CopyPayload {
    email_subject: String,
    email_body: String,
    reasoning: String,
}

#[async_trait]
impl CopyGenerator for GeminiGenerator {
    async fn generate(
        &self,
        entity_name: &str,
        category: Category,
        tags: &BTreeSet<SignalTag>,
    ) -> Result<GeneratedCopy, GeneratorError> {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart {
                    text: build_prompt(entity_name, category, tags),
                }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: TEMPERATURE,
            },
        };

        let response = self
            .client
            .post(self.url())
            .json(&request)
            .send()
            .await
            .map_err(|e| GeneratorError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GeneratorError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(GeneratorError::Response(format!("HTTP {status}: {text}")));
        }

        let parsed: GeminiResponse = serde_json::from_str(&text)
            .map_err(|e| GeneratorError::Response(format!("invalid response envelope: {e}")))?;
        let output = parsed
            .candidates
            .and_then(|candidates| candidates.into_iter().next())
            .map(|candidate| {
                candidate
                    .content
                    .parts
                    .into_iter()
                    .map(|part| part.text)
                    .collect::<String>()
            })
            .ok_or_else(|| GeneratorError::Response("no candidates in response".to_string()))?;

        let json = extract_json(&output)
            .ok_or_else(|| GeneratorError::Response("output contained no JSON object".to_string()))?;
        let payload: CopyPayload = serde_json::from_str(&json)
            .map_err(|e| GeneratorError::Response(format!("invalid copy payload: {e}")))?;

        Ok(GeneratedCopy {
            subject: payload.email_subject,
            body: payload.email_body,
            reasoning: payload.reasoning,
        })
    }
}

/// Pull the first {...} span out of model output that may carry stray prose
/// or markdown fences around it.
fn extract_json(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(text[start..=end].to_string())
}
