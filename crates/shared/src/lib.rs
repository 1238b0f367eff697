// Public modules
pub mod api;
pub mod classifier;
pub mod config;
pub mod extractor;
pub mod hn;
pub mod models;
pub mod pipeline;
pub mod prefilter;
pub mod store;

// Re-export commonly used types
pub use classifier::{OpenAiClassifier, StoryClassifier};
pub use config::Config;
pub use extractor::{ArticleFetcher, ContentExtractor, ExtractionStrategy};
pub use hn::{HackerNewsClient, SourceUnavailable, StorySource};
pub use models::{Classification, HnItem, NewStory, RunReport, Story};
pub use pipeline::Pipeline;
pub use prefilter::{PreFilter, Rejection};
pub use store::StoryStore;
