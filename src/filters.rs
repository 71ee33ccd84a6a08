use std::fmt;
use std::path::Path;

use crate::models::{FilterRule, Offer};
use crate::utils::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchReason {
    Matched,
    KeywordNotInTitle,
    BelowMinimumPrice,
}

impl fmt::Display for MatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            MatchReason::Matched => "matched",
            MatchReason::KeywordNotInTitle => "keyword not in title",
            MatchReason::BelowMinimumPrice => "below minimum price",
        };
        f.write_str(text)
    }
}

/// Outcome of one enabled rule against one offer.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch {
    pub rule: FilterRule,
    pub should_send: bool,
    pub reason: MatchReason,
}

/// Evaluates an offer against every enabled rule. All matching rules fire.
pub trait RuleMatcher: Send + Sync {
    fn evaluate(&self, offer: &Offer) -> Vec<RuleMatch>;
}

#[derive(Debug, Clone, Default)]
pub struct FilterEngine {
    rules: Vec<FilterRule>,
}

impl FilterEngine {
    pub fn new(rules: Vec<FilterRule>) -> Self {
        for rule in rules.iter().filter(|r| !r.is_enabled()) {
            tracing::warn!(
                model = %rule.model_keyword,
                channel_id = rule.destination_id,
                "Skipping filter without model or channel id"
            );
        }
        Self { rules }
    }

    /// Reads the JSON filter file. A missing, unreadable or empty file leaves
    /// the engine with zero rules; it never fails startup.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::read_rules(path) {
            Ok(rules) if rules.is_empty() => {
                tracing::warn!(path = %path.display(), "No filters loaded");
                Self::default()
            }
            Ok(rules) => {
                for rule in rules.iter().filter(|r| r.is_enabled()) {
                    tracing::info!(
                        model = %rule.model_keyword,
                        channel_id = rule.destination_id,
                        min_price = rule.min_price,
                        "Loaded filter"
                    );
                }
                let engine = Self::new(rules);
                if engine.enabled_count() == 0 {
                    tracing::warn!("All filters were rejected (missing model or channel id)");
                }
                engine
            }
            Err(e) => {
                tracing::error!("{}", e);
                Self::default()
            }
        }
    }

    fn read_rules(path: &Path) -> Result<Vec<FilterRule>> {
        let filters_error = |message: String| AppError::Filters {
            path: path.display().to_string(),
            message,
        };

        if !path.exists() {
            return Err(filters_error("file not found".to_string()));
        }

        let json = std::fs::read_to_string(path)?;
        let records: Vec<serde_json::Value> =
            serde_json::from_str(&json).map_err(|e| filters_error(format!("invalid JSON: {}", e)))?;

        let mut rules = Vec::with_capacity(records.len());
        for (index, record) in records.into_iter().enumerate() {
            match serde_json::from_value::<FilterRule>(record) {
                Ok(rule) => rules.push(rule),
                Err(e) => tracing::warn!(index, "Ignoring malformed filter record: {}", e),
            }
        }
        Ok(rules)
    }

    pub fn rules(&self) -> &[FilterRule] {
        &self.rules
    }

    pub fn enabled_count(&self) -> usize {
        self.rules.iter().filter(|r| r.is_enabled()).count()
    }
}

impl RuleMatcher for FilterEngine {
    fn evaluate(&self, offer: &Offer) -> Vec<RuleMatch> {
        let mut matches = Vec::with_capacity(self.rules.len());

        for rule in &self.rules {
            if !rule.is_enabled() {
                tracing::debug!(model = %rule.model_keyword, "Skipping disabled filter");
                continue;
            }

            let reason = if !rule.matches_title(&offer.title) {
                MatchReason::KeywordNotInTitle
            } else if !rule.accepts_price(offer.numeric_price) {
                tracing::info!(
                    title = %offer.title,
                    price = %offer.numeric_price,
                    min_price = rule.min_price,
                    "Offer below minimum price"
                );
                MatchReason::BelowMinimumPrice
            } else {
                MatchReason::Matched
            };

            matches.push(RuleMatch {
                rule: rule.clone(),
                should_send: reason == MatchReason::Matched,
                reason,
            });
        }

        matches
    }
}
