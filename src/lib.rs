pub mod config;
pub mod dedup;
pub mod dispatcher;
pub mod extractor;
pub mod filters;
pub mod models;
pub mod plugins;
pub mod scheduler;
pub mod scraper;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use dedup::{DedupStore, FileDedupStore};
pub use dispatcher::Dispatcher;
pub use extractor::{Clock, FixedClock, OfferExtractor, SystemClock};
pub use filters::{FilterEngine, MatchReason, RuleMatch, RuleMatcher};
pub use models::{FilterRule, Offer};
pub use scheduler::{CycleReport, ScanLoop, ScanState};
pub use scraper::{ChromePageFetcher, PageFetcher, PageRequest, RenderedPage};
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
