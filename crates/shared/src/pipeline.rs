//! One pass over the current top stories: list, pre-filter, fetch, classify, persist.
//!
//! Stories are handled strictly one after another. Only a failed listing
//! call aborts the run; any per-story failure is logged and the loop moves on.

use anyhow::Result;
use tracing::{debug, error, info, instrument, warn};

use crate::classifier::StoryClassifier;
use crate::extractor::{html_fragment_to_text, truncate_chars, ArticleFetcher, MAX_STORED_TEXT_CHARS};
use crate::hn::StorySource;
use crate::models::{HnItem, NewStory, RunReport};
use crate::prefilter::PreFilter;
use crate::store::StoryStore;

pub struct Pipeline<'a> {
    source: &'a dyn StorySource,
    fetcher: &'a dyn ArticleFetcher,
    classifier: &'a dyn StoryClassifier,
    store: &'a StoryStore,
    filter: &'a PreFilter,
}

enum Outcome {
    Skipped,
    Filtered,
    Irrelevant,
    Saved,
    Failed,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        source: &'a dyn StorySource,
        fetcher: &'a dyn ArticleFetcher,
        classifier: &'a dyn StoryClassifier,
        store: &'a StoryStore,
        filter: &'a PreFilter,
    ) -> Self {
        Self {
            source,
            fetcher,
            classifier,
            store,
            filter,
        }
    }

    /// Attempt every listed story once. Fails only when the listing itself
    /// is unavailable (`hn::SourceUnavailable`).
    #[instrument(level = "info", skip(self))]
    pub async fn run_once(&self, limit: usize) -> Result<RunReport> {
        info!(
            limit,
            min_score = self.filter.min_score(),
            keywords = self.filter.keywords().len(),
            "Starting scrape run"
        );

        let ids = self.source.top_story_ids(limit).await?;
        info!(count = ids.len(), "Fetched top story ids");

        let mut report = RunReport {
            candidates: ids.len(),
            ..RunReport::default()
        };

        for (idx, id) in ids.iter().enumerate() {
            debug!(position = idx + 1, total = ids.len(), story_id = id, "Processing story");

            let outcome = self.process(*id, &mut report).await;
            match outcome {
                Outcome::Skipped => report.skipped += 1,
                Outcome::Filtered => report.filtered += 1,
                Outcome::Irrelevant => report.irrelevant += 1,
                Outcome::Saved => report.saved += 1,
                Outcome::Failed => report.failed += 1,
            }
        }

        info!(
            candidates = report.candidates,
            skipped = report.skipped,
            filtered = report.filtered,
            classified = report.classified,
            irrelevant = report.irrelevant,
            saved = report.saved,
            failed = report.failed,
            "Scrape run completed"
        );

        Ok(report)
    }

    async fn process(&self, id: i64, report: &mut RunReport) -> Outcome {
        let item = match self.source.item(id).await {
            Ok(Some(item)) => item,
            Ok(None) => {
                warn!(story_id = id, "Item not found");
                return Outcome::Skipped;
            }
            Err(e) => {
                warn!(story_id = id, error = %e, "Failed to fetch item metadata");
                return Outcome::Skipped;
            }
        };

        if !item.is_live_story() {
            debug!(story_id = id, kind = ?item.kind, "Not a live story");
            return Outcome::Skipped;
        }

        let body = item.text.as_deref().map(html_fragment_to_text);
        if let Err(rejection) = self.filter.check(item.title(), item.score(), body.as_deref()) {
            debug!(story_id = id, %rejection, "Rejected by pre-filter");
            return Outcome::Filtered;
        }

        let text = self.article_text(&item, body).await;

        let classification = match self
            .classifier
            .classify(item.title(), item.link(), &text)
            .await
        {
            Ok(c) => c,
            Err(e) => {
                warn!(story_id = id, error = %e, "Classification failed");
                return Outcome::Failed;
            }
        };
        report.classified += 1;

        if !classification.is_relevant {
            info!(story_id = id, title = item.title(), "Not relevant");
            return Outcome::Irrelevant;
        }

        let relevance = classification.relevance;
        let story = NewStory {
            source_id: item.id,
            title: item.title().to_string(),
            url: item.link().map(str::to_string),
            score: item.score(),
            author: item.by.clone(),
            posted_at: item.time,
            extracted_text: text,
            classification,
        };

        match self.store.upsert(&story) {
            Ok(()) => {
                info!(story_id = id, title = %story.title, relevance, "Saved story");
                Outcome::Saved
            }
            Err(e) => {
                error!(story_id = id, error = %e, "Failed to save story");
                Outcome::Failed
            }
        }
    }

    /// Linked article text, or the post body for self posts.
    async fn article_text(&self, item: &HnItem, body: Option<String>) -> String {
        let text = match item.link() {
            Some(url) => {
                let text = self.fetcher.fetch_text(url).await;
                if text.is_empty() {
                    warn!(story_id = item.id, %url, "No article text; classifying on title alone");
                }
                text
            }
            None => body.unwrap_or_default(),
        };

        truncate_chars(&text, MAX_STORED_TEXT_CHARS)
    }
}
