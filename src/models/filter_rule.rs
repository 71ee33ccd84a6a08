use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A user rule from the filter file: `{"model": "...", "channelId": 0, "minPrice": 0}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FilterRule {
    #[serde(rename = "model", default)]
    pub model_keyword: String,
    #[serde(rename = "channelId", default)]
    pub destination_id: u64,
    #[serde(default)]
    pub min_price: i64,
}

impl FilterRule {
    pub fn new(model_keyword: impl Into<String>, destination_id: u64, min_price: i64) -> Self {
        Self {
            model_keyword: model_keyword.into(),
            destination_id,
            min_price,
        }
    }

    /// Rules without a keyword or destination are loaded but never evaluated.
    pub fn is_enabled(&self) -> bool {
        !self.model_keyword.trim().is_empty() && self.destination_id != 0
    }

    pub fn matches_title(&self, title: &str) -> bool {
        title
            .to_lowercase()
            .contains(&self.model_keyword.to_lowercase())
    }

    pub fn accepts_price(&self, price: Decimal) -> bool {
        price >= Decimal::from(self.min_price)
    }
}
