//! Chat-completion client that turns a travel preference into raw itinerary text.
//!
//! The client speaks the OpenAI-compatible `/chat/completions` protocol, which
//! DashScope, OpenAI and most self-hosted gateways accept. It never parses the
//! itinerary itself; that is the normalizer's job.

use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::PlannerError;
use crate::models::TravelPreference;

const ENDPOINT: &str = "llm";

pub const SYSTEM_PROMPT: &str = "You are a professional travel planning assistant. \
Given a destination, travel dates, a budget and personal interests, produce a detailed, realistic \
and practical itinerary: daily schedules covering transport, accommodation, attractions and \
restaurants, using real place names and careful cost estimates tailored to the interests.\n\n\
Output rules:\n\
1. Respond with pure JSON only. No explanations, no markdown, no code fences.\n\
2. The JSON must be syntactically valid: double-quoted keys and strings, no trailing commas.\n\
3. duration, cost, totalCost, totalBudget, spentBudget and rating must be numbers. duration is in minutes.\n\
4. type must be exactly one of: transport, accommodation, attraction, restaurant.\n\
5. date must use the YYYY-MM-DD format.\n\n\
Use exactly this structure:\n\
{\"title\":\"<destination> <date range> travel plan\",\"dailyItineraries\":[{\"date\":\"YYYY-MM-DD\",\
\"activities\":[{\"type\":\"transport\",\"name\":\"activity name\",\"address\":\"full address\",\
\"duration\":60,\"cost\":100,\"description\":\"details\",\"openingHours\":\"opening hours\",\
\"rating\":4.5,\"coordinates\":[116.397,39.916]}],\"totalCost\":500}],\"totalBudget\":2000,\"spentBudget\":1500}";

/// Anything that can produce raw itinerary text for a preference.
#[async_trait]
pub trait ItineraryGenerator: Send + Sync {
    async fn generate(&self, preference: &TravelPreference) -> Result<String, PlannerError>;

    /// Last raw upstream envelope, for debugging. Overwritten by every call.
    fn last_response(&self) -> Option<serde_json::Value> {
        None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn new(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

pub fn user_prompt(preference: &TravelPreference) -> String {
    let interests = if preference.preferences.is_empty() {
        "no particular preferences".to_string()
    } else {
        preference.preferences.join(", ")
    };

    format!(
        "Please plan a trip to {} from {} to {} with a total budget of {} for {} {}.\n\n\
My travel interests are: {}.\n\n\
Provide a detailed day-by-day schedule with transport, accommodation, attractions and \
restaurants. Make sure every place is real and the cost estimates are reasonable.",
        preference.destination,
        preference.start_date,
        preference.end_date,
        preference.budget,
        preference.people_count,
        if preference.people_count == 1 { "person" } else { "people" },
        interests,
    )
}

pub struct ChatCompletionClient {
    http: reqwest::Client,
    config: LlmConfig,
    last_response: Mutex<Option<serde_json::Value>>,
}

impl ChatCompletionClient {
    pub fn new(config: LlmConfig) -> Result<Self, PlannerError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PlannerError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            config,
            last_response: Mutex::new(None),
        })
    }

    pub fn build_request(&self, preference: &TravelPreference) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage::new("system", SYSTEM_PROMPT.to_string()),
                ChatMessage::new("user", user_prompt(preference)),
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.as_str().trim_end_matches('/')
        )
    }

    fn remember(&self, envelope: &serde_json::Value) {
        let mut slot = self
            .last_response
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(envelope.clone());
    }
}

#[async_trait]
impl ItineraryGenerator for ChatCompletionClient {
    async fn generate(&self, preference: &TravelPreference) -> Result<String, PlannerError> {
        let api_key = self.config.api_key.as_deref().ok_or(PlannerError::Auth {
            endpoint: ENDPOINT,
            detail: "no API key configured".to_string(),
        })?;

        log::info!(
            "Requesting itinerary for {} from model {}",
            preference.destination,
            self.config.model
        );

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&self.build_request(preference))
            .send()
            .await
            .map_err(|e| PlannerError::Network {
                endpoint: ENDPOINT,
                detail: e.to_string(),
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(PlannerError::Auth {
                endpoint: ENDPOINT,
                detail: format!("API key rejected with {}", status),
            });
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(PlannerError::Upstream {
                endpoint: ENDPOINT,
                status: status.to_string(),
                detail: body,
            });
        }

        let envelope: serde_json::Value =
            response.json().await.map_err(|e| PlannerError::Upstream {
                endpoint: ENDPOINT,
                status: status.to_string(),
                detail: format!("response body is not JSON: {}", e),
            })?;
        log::debug!("LLM response envelope: {}", envelope);
        self.remember(&envelope);

        extract_content(envelope)
    }

    fn last_response(&self) -> Option<serde_json::Value> {
        self.last_response
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// Pulls the first choice's message content out of a completion envelope.
pub fn extract_content(envelope: serde_json::Value) -> Result<String, PlannerError> {
    let parsed: ChatCompletionResponse =
        serde_json::from_value(envelope).map_err(|e| PlannerError::Upstream {
            endpoint: ENDPOINT,
            status: "200 OK".to_string(),
            detail: format!("unexpected completion envelope: {}", e),
        })?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| PlannerError::MalformedResponse {
            reason: "the model returned no content".to_string(),
            excerpt: String::new(),
        })
}
