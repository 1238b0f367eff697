use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw item as returned by the Hacker News `item/{id}.json` endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HnItem {
    pub id: i64,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub score: Option<i64>,
    #[serde(default)]
    pub by: Option<String>,
    #[serde(default)]
    pub time: Option<i64>,
    /// HTML body of self posts (Ask HN and friends)
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub dead: bool,
    #[serde(default)]
    pub deleted: bool,
}

impl HnItem {
    /// Live items of type `story`; jobs, polls, dead and deleted items are not candidates.
    pub fn is_live_story(&self) -> bool {
        self.kind.as_deref() == Some("story") && !self.dead && !self.deleted
    }

    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or("")
    }

    pub fn score(&self) -> i64 {
        self.score.unwrap_or(0)
    }

    /// Empty URLs are treated as absent.
    pub fn link(&self) -> Option<&str> {
        self.url.as_deref().filter(|u| !u.trim().is_empty())
    }
}

/// Structured verdict returned by the classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub is_relevant: bool,
    pub category: String,
    pub subcategory: Option<String>,
    pub tags: Vec<String>,
    pub summary: String,
    pub relevance: f64,
}

/// A row about to be written by the pipeline
#[derive(Debug, Clone)]
pub struct NewStory {
    pub source_id: i64,
    pub title: String,
    pub url: Option<String>,
    pub score: i64,
    pub author: Option<String>,
    pub posted_at: Option<i64>,
    pub extracted_text: String,
    pub classification: Classification,
}

/// A persisted story, as served by the read API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub id: i64,
    pub source_id: i64,
    pub title: String,
    pub url: Option<String>,
    pub score: i64,
    pub author: Option<String>,
    pub posted_at: Option<i64>,
    pub extracted_text: String,
    pub is_relevant: bool,
    pub category: String,
    pub subcategory: Option<String>,
    pub tags: Vec<String>,
    pub summary: String,
    pub relevance: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Tally of one pipeline run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Story ids returned by the listing call
    pub candidates: usize,
    /// Missing items, non-stories, or metadata fetch failures
    pub skipped: usize,
    /// Rejected by the keyword/score pre-filter
    pub filtered: usize,
    pub classified: usize,
    pub irrelevant: usize,
    pub saved: usize,
    /// Classification or persistence failures
    pub failed: usize,
}
