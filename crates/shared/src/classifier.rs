use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::extractor::truncate_chars;
use crate::models::Classification;

/// Article text sent to the model is capped at this many characters.
pub const PROMPT_TEXT_CHARS: usize = 5_000;

const SYSTEM_PROMPT: &str = "You are a technical content analyst specializing in AI and technology topics. Always respond with valid JSON.";

#[async_trait]
pub trait StoryClassifier: Send + Sync {
    async fn classify(&self, title: &str, url: Option<&str>, text: &str) -> Result<Classification>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Shape the model is asked to return. Every key is optional so a partial
/// answer still parses; only non-JSON output is an error.
#[derive(Deserialize)]
struct RawClassification {
    #[serde(default, alias = "is_relevant")]
    is_related: bool,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    subcategory: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    tags: Option<RawTags>,
    #[serde(default)]
    relevance: Option<f64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTags {
    List(Vec<String>),
    Joined(String),
}

impl RawTags {
    fn into_vec(self) -> Vec<String> {
        let tags: Vec<String> = match self {
            RawTags::List(tags) => tags,
            RawTags::Joined(joined) => joined.split(',').map(str::to_string).collect(),
        };
        tags.into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

pub struct OpenAiClassifier {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiClassifier {
    pub fn new(api_key: String, model: String, base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        let endpoint = format!("{}/chat/completions", base_url.trim_end_matches('/'));

        Ok(Self {
            client,
            api_key,
            model,
            endpoint,
        })
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Message {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.0,
            max_tokens: 512,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to completion API")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("unknown error"));
            anyhow::bail!("Completion API error {}: {}", status, error_text);
        }

        let chat_response = response
            .json::<ChatResponse>()
            .await
            .context("Failed to parse completion API response")?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .context("Completion API returned no content")
    }
}

#[async_trait]
impl StoryClassifier for OpenAiClassifier {
    async fn classify(&self, title: &str, url: Option<&str>, text: &str) -> Result<Classification> {
        let prompt = build_prompt(title, url, text);
        let content = self.complete(&prompt).await?;
        debug!(model = %self.model, chars = content.len(), "Completion received");
        parse_classification(&content)
    }
}

pub fn build_prompt(title: &str, url: Option<&str>, text: &str) -> String {
    let mut context = format!("Title: {}\n", title);
    if let Some(url) = url {
        context.push_str(&format!("URL: {}\n", url));
    }
    if !text.trim().is_empty() {
        context.push_str(&format!(
            "Content: {}\n",
            truncate_chars(text, PROMPT_TEXT_CHARS)
        ));
    }

    format!(
        r#"Analyze the following Hacker News story and determine if it's related to AI, machine learning, or related technologies.

{}
Provide your analysis in strict JSON format with these exact keys:
- is_related: boolean (true if related to AI/ML/tech, false otherwise)
- category: string or null (e.g., "Machine Learning", "Artificial Intelligence", "Software Development", "Hardware")
- subcategory: string or null (e.g., "LLM", "Computer Vision", "DevOps", "Cloud")
- summary: string (2-3 sentence summary)
- tags: array of strings (relevant tags like ["gpt", "neural-networks", "python"])
- relevance: float between 0 and 1 (how relevant this is to AI/ML)

Return ONLY valid JSON, no additional text."#,
        context
    )
}

/// Pull the JSON object out of a model reply, tolerating code fences and
/// surrounding prose.
pub fn parse_classification(content: &str) -> Result<Classification> {
    let json = match (content.find('{'), content.rfind('}')) {
        (Some(start), Some(end)) if start < end => &content[start..=end],
        _ => anyhow::bail!("Model reply contains no JSON object: {:?}", preview(content)),
    };

    let raw: RawClassification = serde_json::from_str(json)
        .with_context(|| format!("Model reply is not valid JSON: {:?}", preview(content)))?;

    Ok(Classification {
        is_relevant: raw.is_related,
        category: raw.category.map(|c| c.trim().to_string()).unwrap_or_default(),
        subcategory: raw
            .subcategory
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        tags: raw.tags.map(RawTags::into_vec).unwrap_or_default(),
        summary: raw.summary.map(|s| s.trim().to_string()).unwrap_or_default(),
        relevance: raw
            .relevance
            .filter(|r| r.is_finite())
            .map(|r| r.clamp(0.0, 1.0))
            .unwrap_or(0.0),
    })
}

fn preview(content: &str) -> String {
    truncate_chars(content, 200)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_clean_reply() {
        let reply = r#"{
            "is_related": true,
            "category": "Machine Learning",
            "subcategory": "LLM",
            "summary": "A new open model. It is small.",
            "tags": ["llm", "open-source"],
            "relevance": 0.92
        }"#;

        let c = parse_classification(reply).unwrap();
        assert!(c.is_relevant);
        assert_eq!(c.category, "Machine Learning");
        assert_eq!(c.subcategory.as_deref(), Some("LLM"));
        assert_eq!(c.tags, vec!["llm", "open-source"]);
        assert_eq!(c.summary, "A new open model. It is small.");
        assert!((c.relevance - 0.92).abs() < f64::EPSILON);
    }

    #[test]
    fn strips_code_fences_and_prose() {
        let reply = "Sure! Here you go:\n```json\n{\"is_related\": false, \"category\": null, \"summary\": \"Cooking.\", \"tags\": []}\n```";
        let c = parse_classification(reply).unwrap();
        assert!(!c.is_relevant);
        assert_eq!(c.category, "");
        assert!(c.tags.is_empty());
    }

    #[test]
    fn accepts_comma_separated_tags_and_alternate_key() {
        let reply = r#"{"is_relevant": true, "tags": "gpu, cuda ,, inference"}"#;
        let c = parse_classification(reply).unwrap();
        assert!(c.is_relevant);
        assert_eq!(c.tags, vec!["gpu", "cuda", "inference"]);
    }

    #[test]
    fn relevance_is_clamped() {
        let c = parse_classification(r#"{"is_related": true, "relevance": 7.5}"#).unwrap();
        assert_eq!(c.relevance, 1.0);
        let c = parse_classification(r#"{"is_related": true, "relevance": -1}"#).unwrap();
        assert_eq!(c.relevance, 0.0);
    }

    #[test]
    fn non_json_reply_is_an_error() {
        assert!(parse_classification("I cannot help with that.").is_err());
        assert!(parse_classification("{ not json }").is_err());
        assert!(parse_classification("} backwards {").is_err());
    }

    #[test]
    fn prompt_includes_url_and_truncated_text() {
        let text = "y".repeat(PROMPT_TEXT_CHARS + 100);
        let prompt = build_prompt("A title", Some("https://example.test/a"), &text);
        assert!(prompt.contains("Title: A title"));
        assert!(prompt.contains("URL: https://example.test/a"));
        assert!(prompt.contains(&"y".repeat(PROMPT_TEXT_CHARS)));
        assert!(!prompt.contains(&"y".repeat(PROMPT_TEXT_CHARS + 1)));
    }

    #[test]
    fn prompt_omits_empty_content() {
        let prompt = build_prompt("Ask HN: anything", None, "   ");
        assert!(!prompt.contains("Content:"));
        assert!(!prompt.contains("URL:"));
    }

    #[test]
    fn endpoint_is_built_from_base_url() {
        let classifier =
            OpenAiClassifier::new("k".into(), "m".into(), "https://api.example.test/v1/").unwrap();
        assert_eq!(classifier.endpoint, "https://api.example.test/v1/chat/completions");
    }
}
