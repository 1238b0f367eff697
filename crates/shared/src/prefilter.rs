//! Cheap local gate applied before any network call for a story.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    LowScore { score: i64, min: i64 },
    NoKeywordMatch,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::LowScore { score, min } => {
                write!(f, "score {} below threshold {}", score, min)
            }
            Rejection::NoKeywordMatch => write!(f, "no keyword in title or body"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PreFilter {
    keywords: Vec<String>,
    min_score: i64,
}

impl PreFilter {
    pub fn new<I, S>(keywords: I, min_score: i64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();

        Self {
            keywords,
            min_score,
        }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn min_score(&self) -> i64 {
        self.min_score
    }

    /// Score gate first, then case-insensitive substring match against
    /// title and body. An empty keyword set lets every story through the
    /// keyword gate.
    pub fn check(&self, title: &str, score: i64, body: Option<&str>) -> Result<(), Rejection> {
        if score < self.min_score {
            return Err(Rejection::LowScore {
                score,
                min: self.min_score,
            });
        }

        if self.keywords.is_empty() {
            return Ok(());
        }

        let title = title.to_lowercase();
        let body = body.map(str::to_lowercase).unwrap_or_default();

        let matched = self
            .keywords
            .iter()
            .any(|k| title.contains(k.as_str()) || body.contains(k.as_str()));

        if matched {
            Ok(())
        } else {
            Err(Rejection::NoKeywordMatch)
        }
    }

    pub fn passes(&self, title: &str, score: i64, body: Option<&str>) -> bool {
        self.check(title, score, body).is_ok()
    }
}
