use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::srs::Category;

/// Default chat-completions endpoint, overridable via CLASSIFIER_API_URL.
const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";

const SYSTEM_PROMPT: &str = "You are a note classifier for a flashcard tool. \
Given a piece of text, classify it as exactly one of: \"code\" (programming \
snippets, commands, APIs), \"language\" (vocabulary, grammar, phrases in a \
foreign language), or \"note\" (anything else worth remembering). Then extract \
one or more flashcards, each with a short question-like front and a concise \
answer back. Respond with strict JSON only, no prose: \
{\"category\": \"code|language|note\", \"cards\": [{\"front\": \"...\", \"back\": \"...\"}]}";

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("CLASSIFIER_API_KEY is not set")]
    MissingApiKey,
    #[error("classification request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("classification service returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("malformed classification response: {0}")]
    MalformedResponse(String),
}

/// One extracted front/back pair, prior to persistence.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardDraft {
    pub front: String,
    pub back: String,
}

#[derive(Debug)]
pub struct Classification {
    pub category: Category,
    pub cards: Vec<CardDraft>,
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// Client for the hosted classification model. One instance is shared
/// across handlers; reqwest pools connections internally.
#[derive(Clone)]
pub struct Classifier {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl Classifier {
    pub fn from_env() -> Result<Self, ClassifyError> {
        let api_key = std::env::var("CLASSIFIER_API_KEY").map_err(|_| ClassifyError::MissingApiKey)?;
        let api_url =
            std::env::var("CLASSIFIER_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.into());
        let model =
            std::env::var("CLASSIFIER_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
        Ok(Self {
            client: reqwest::Client::new(),
            api_url,
            api_key,
            model,
        })
    }

    /// Classify pasted text and extract its flashcards.
    pub async fn classify(&self, text: &str) -> Result<Classification, ClassifyError> {
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": text },
            ],
        });

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifyError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatCompletion = response.json().await?;
        let content = completion
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| ClassifyError::MalformedResponse("no choices in reply".into()))?;

        parse_classification(content)
    }
}

/// Parse the model's reply. Models occasionally wrap the JSON in a
/// markdown fence despite the prompt, so strip one if present. An
/// unknown category tag falls back to `note`; cards with an empty side
/// are dropped.
pub fn parse_classification(raw: &str) -> Result<Classification, ClassifyError> {
    let body = strip_code_fence(raw.trim());

    #[derive(Deserialize)]
    struct RawClassification {
        category: String,
        #[serde(default)]
        cards: Vec<CardDraft>,
    }

    let parsed: RawClassification = serde_json::from_str(body)
        .map_err(|e| ClassifyError::MalformedResponse(e.to_string()))?;

    let category = match Category::parse(&parsed.category) {
        Some(c) => c,
        None => {
            log::warn!(
                "classifier returned unknown category {:?}, falling back to note",
                parsed.category
            );
            Category::Note
        }
    };

    let cards: Vec<CardDraft> = parsed
        .cards
        .into_iter()
        .filter(|c| !c.front.trim().is_empty() && !c.back.trim().is_empty())
        .collect();

    Ok(Classification { category, cards })
}

fn strip_code_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    // Opening fence may carry a language tag ("```json").
    let rest = rest.splitn(2, '\n').nth(1).unwrap_or(rest);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
