use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::models::{NewStory, Story};

const CREATE_STORIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS stories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id INTEGER NOT NULL,
    title TEXT NOT NULL,
    url TEXT NULL,
    score INTEGER NOT NULL,
    author TEXT NULL,
    posted_at INTEGER NULL,
    extracted_text TEXT NOT NULL DEFAULT '',
    is_relevant BOOLEAN NOT NULL,
    category TEXT NOT NULL DEFAULT '',
    subcategory TEXT NULL,
    tags TEXT NOT NULL DEFAULT '[]',
    summary TEXT NOT NULL DEFAULT '',
    relevance REAL NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

const CREATE_SOURCE_ID_INDEX: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_stories_source_id ON stories (source_id)";

// created_at is only written on first insert
const UPSERT_STORY: &str = r#"
INSERT INTO stories (
    source_id, title, url, score, author, posted_at, extracted_text,
    is_relevant, category, subcategory, tags, summary, relevance,
    created_at, updated_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)
ON CONFLICT(source_id) DO UPDATE SET
    title = excluded.title,
    url = excluded.url,
    score = excluded.score,
    author = excluded.author,
    posted_at = excluded.posted_at,
    extracted_text = excluded.extracted_text,
    is_relevant = excluded.is_relevant,
    category = excluded.category,
    subcategory = excluded.subcategory,
    tags = excluded.tags,
    summary = excluded.summary,
    relevance = excluded.relevance,
    updated_at = excluded.updated_at
"#;

const STORY_COLUMNS: &str = "id, source_id, title, url, score, author, posted_at, extracted_text, \
    is_relevant, category, subcategory, tags, summary, relevance, created_at, updated_at";

/// SQLite-backed story table. Clones share one connection; every operation
/// takes the connection for its own duration only.
#[derive(Clone)]
pub struct StoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl StoryStore {
    /// Open (or create) the database named by a `sqlite://` URL or plain path.
    pub fn open(database_url: &str) -> Result<Self> {
        let path = database_path(database_url);
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {database_url}"))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        // The scraper and the API server may share the file.
        conn.busy_timeout(Duration::from_secs(5))
            .context("Failed to set busy timeout")?;
        // Built-in LIKE only folds ASCII case.
        conn.create_scalar_function(
            "unicode_lower",
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                let value: Option<String> = ctx.get(0)?;
                Ok(value.map(|v| v.to_lowercase()))
            },
        )
        .context("Failed to register unicode_lower")?;
        conn.execute(CREATE_STORIES_TABLE, [])
            .context("Failed to create stories table")?;
        conn.execute(CREATE_SOURCE_ID_INDEX, [])
            .context("Failed to create source_id index")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("Database connection lock poisoned"))?;
        f(&conn)
    }

    /// Insert the story, or overwrite every mutable field of the existing
    /// row with the same `source_id`.
    pub fn upsert(&self, story: &NewStory) -> Result<()> {
        let tags = serde_json::to_string(&story.classification.tags)
            .context("Failed to serialize tags")?;
        let now = Utc::now();

        self.with_conn(|conn| {
            conn.execute(
                UPSERT_STORY,
                params![
                    story.source_id,
                    story.title,
                    story.url,
                    story.score,
                    story.author,
                    story.posted_at,
                    story.extracted_text,
                    story.classification.is_relevant,
                    story.classification.category,
                    story.classification.subcategory,
                    tags,
                    story.classification.summary,
                    story.classification.relevance,
                    now,
                ],
            )
            .with_context(|| format!("Failed to upsert story {}", story.source_id))?;
            Ok(())
        })
    }

    /// Newest first. `query` is a case-insensitive substring matched
    /// against title, summary and each individual tag.
    pub fn list(&self, query: Option<&str>, limit: usize) -> Result<Vec<Story>> {
        let pattern = query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| format!("%{}%", escape_like(&q.to_lowercase())));
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {STORY_COLUMNS} FROM stories \
                 WHERE ?1 IS NULL \
                    OR unicode_lower(title) LIKE ?1 ESCAPE '\\' \
                    OR unicode_lower(summary) LIKE ?1 ESCAPE '\\' \
                    OR EXISTS (SELECT 1 FROM json_each(stories.tags) \
                               WHERE unicode_lower(json_each.value) LIKE ?1 ESCAPE '\\') \
                 ORDER BY id DESC LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql).context("Failed to prepare story query")?;
            let rows = stmt
                .query_map(params![pattern, limit], story_from_row)
                .context("Failed to query stories")?;

            rows.collect::<rusqlite::Result<Vec<_>>>()
                .context("Failed to read story rows")
        })
    }

    pub fn get(&self, source_id: i64) -> Result<Option<Story>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {STORY_COLUMNS} FROM stories WHERE source_id = ?1");
            let mut stmt = conn.prepare(&sql).context("Failed to prepare story lookup")?;
            let mut rows = stmt
                .query_map([source_id], story_from_row)
                .with_context(|| format!("Failed to look up story {source_id}"))?;

            let story = rows
                .next()
                .transpose()
                .with_context(|| format!("Failed to read story {source_id}"))?;
            Ok(story)
        })
    }

    pub fn count(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let n: i64 = conn
                .query_row("SELECT COUNT(*) FROM stories", [], |row| row.get(0))
                .context("Failed to count stories")?;
            Ok(usize::try_from(n).unwrap_or_default())
        })
    }
}

fn story_from_row(row: &Row<'_>) -> rusqlite::Result<Story> {
    let tags_json: String = row.get(11)?;
    let tags: Vec<String> = serde_json::from_str(&tags_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(11, Type::Text, Box::new(e)))?;

    Ok(Story {
        id: row.get(0)?,
        source_id: row.get(1)?,
        title: row.get(2)?,
        url: row.get(3)?,
        score: row.get(4)?,
        author: row.get(5)?,
        posted_at: row.get(6)?,
        extracted_text: row.get(7)?,
        is_relevant: row.get(8)?,
        category: row.get(9)?,
        subcategory: row.get(10)?,
        tags,
        summary: row.get(12)?,
        relevance: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

/// Accepts `sqlite://path`, `sqlite:path` or a bare path.
fn database_path(database_url: &str) -> &str {
    database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url)
}

fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Classification;

    fn new_story(source_id: i64, title: &str, summary: &str, tags: &[&str]) -> NewStory {
        NewStory {
            source_id,
            title: title.to_string(),
            url: Some(format!("https://example.test/{source_id}")),
            score: 42,
            author: Some("pg".to_string()),
            posted_at: Some(1_700_000_000),
            extracted_text: "body".to_string(),
            classification: Classification {
                is_relevant: true,
                category: "Machine Learning".to_string(),
                subcategory: Some("LLM".to_string()),
                tags: tags.iter().map(|t| t.to_string()).collect(),
                summary: summary.to_string(),
                relevance: 0.8,
            },
        }
    }

    #[test]
    fn upsert_twice_keeps_one_row_with_latest_fields() {
        let store = StoryStore::open_in_memory().unwrap();

        store
            .upsert(&new_story(1, "First title", "First summary", &["a"]))
            .unwrap();
        let first = store.get(1).unwrap().unwrap();

        let mut updated = new_story(1, "Second title", "Second summary", &["b", "c"]);
        updated.classification.category = "Hardware".to_string();
        updated.classification.subcategory = None;
        updated.score = 99;
        store.upsert(&updated).unwrap();

        assert_eq!(store.count().unwrap(), 1);
        let second = store.get(1).unwrap().unwrap();
        assert_eq!(second.title, "Second title");
        assert_eq!(second.summary, "Second summary");
        assert_eq!(second.tags, vec!["b", "c"]);
        assert_eq!(second.category, "Hardware");
        assert_eq!(second.subcategory, None);
        assert_eq!(second.score, 99);
        assert_eq!(second.id, first.id);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
    }

    #[test]
    fn get_missing_story_is_none() {
        let store = StoryStore::open_in_memory().unwrap();
        assert!(store.get(12345).unwrap().is_none());
    }

    #[test]
    fn list_returns_most_recently_inserted_first() {
        let store = StoryStore::open_in_memory().unwrap();
        for id in [10, 30, 20] {
            store.upsert(&new_story(id, "t", "s", &[])).unwrap();
        }
        // Re-upserting does not move a story to the front.
        store.upsert(&new_story(10, "t2", "s", &[])).unwrap();

        let ids: Vec<i64> = store
            .list(None, 50)
            .unwrap()
            .iter()
            .map(|s| s.source_id)
            .collect();
        assert_eq!(ids, vec![20, 30, 10]);
    }

    #[test]
    fn list_respects_limit() {
        let store = StoryStore::open_in_memory().unwrap();
        for id in 1..=5 {
            store.upsert(&new_story(id, "t", "s", &[])).unwrap();
        }
        assert_eq!(store.list(None, 2).unwrap().len(), 2);
        assert_eq!(store.list(Some("   "), 10).unwrap().len(), 5);
    }

    #[test]
    fn search_matches_title_summary_and_tags_case_insensitively() {
        let store = StoryStore::open_in_memory().unwrap();
        store
            .upsert(&new_story(1, "Transformers explained", "none", &[]))
            .unwrap();
        store
            .upsert(&new_story(2, "Other", "A TRANSFORMER deep dive", &[]))
            .unwrap();
        store
            .upsert(&new_story(3, "Other", "none", &["transformer-models"]))
            .unwrap();
        store.upsert(&new_story(4, "Gardening", "none", &["soil"])).unwrap();

        let mut ids: Vec<i64> = store
            .list(Some("transformer"), 50)
            .unwrap()
            .iter()
            .map(|s| s.source_id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn search_treats_wildcards_literally() {
        let store = StoryStore::open_in_memory().unwrap();
        store.upsert(&new_story(1, "100% uptime", "s", &[])).unwrap();
        store.upsert(&new_story(2, "1000 servers", "s", &[])).unwrap();

        let hits = store.list(Some("100%"), 50).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source_id, 1);

        assert!(store.list(Some("_"), 50).unwrap().is_empty());
    }

    #[test]
    fn tag_search_matches_values_not_the_json_encoding() {
        let store = StoryStore::open_in_memory().unwrap();
        store.upsert(&new_story(1, "t", "s", &[])).unwrap();
        store.upsert(&new_story(2, "t", "s", &["x", "y"])).unwrap();

        for q in ["[", "]", "\",\"", "x\",\"y", "\""] {
            assert!(store.list(Some(q), 50).unwrap().is_empty(), "q={q:?}");
        }

        let hits = store.list(Some("y"), 50).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source_id, 2);
    }

    #[test]
    fn search_folds_non_ascii_case() {
        let store = StoryStore::open_in_memory().unwrap();
        store.upsert(&new_story(1, "ÉCOLE NORMALE", "s", &[])).unwrap();
        store.upsert(&new_story(2, "t", "Über alles", &[])).unwrap();
        store.upsert(&new_story(3, "t", "s", &["ΣΟΦΙΑ"])).unwrap();

        assert_eq!(store.list(Some("école"), 50).unwrap()[0].source_id, 1);
        assert_eq!(store.list(Some("ÜBER"), 50).unwrap()[0].source_id, 2);
        assert_eq!(store.list(Some("σοφια"), 50).unwrap()[0].source_id, 3);
    }

    #[test]
    fn database_url_prefixes_are_stripped() {
        assert_eq!(database_path("sqlite://hn.db"), "hn.db");
        assert_eq!(database_path("sqlite:///var/lib/hn.db"), "/var/lib/hn.db");
        assert_eq!(database_path("sqlite:hn.db"), "hn.db");
        assert_eq!(database_path("hn.db"), "hn.db");
        assert_eq!(database_path("sqlite::memory:"), ":memory:");
    }

    #[test]
    fn file_database_persists_across_handles() {
        let path = std::env::temp_dir().join(format!(
            "hn-store-test-{}-{}.db",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let url = format!("sqlite://{}", path.display());

        {
            let store = StoryStore::open(&url).unwrap();
            store.upsert(&new_story(7, "Kept", "s", &[])).unwrap();
        }

        let reopened = StoryStore::open(&url).unwrap();
        assert_eq!(reopened.get(7).unwrap().unwrap().title, "Kept");

        let _ = std::fs::remove_file(&path);
    }
}
