use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::error::Result;

/// Message delivered for one matched offer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OfferMessage {
    pub title: String,
    pub url: String,
    pub price_text: String,
    pub recency_text: String,
    pub footer: String,
    pub timestamp: DateTime<Utc>,
}

/// A resolved delivery target, e.g. a chat channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Destination {
    pub id: u64,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub message_id: Option<String>,
}

/// Chat platform client as seen by the dispatcher.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    /// Logs in. A failure here is fatal for the process.
    async fn connect(&self) -> Result<()>;

    /// `Ok(None)` when the destination does not exist or is not reachable.
    async fn resolve_destination(&self, id: u64) -> Result<Option<Destination>>;

    async fn deliver(&self, destination: &Destination, message: &OfferMessage) -> Result<DeliveryReceipt>;

    async fn shutdown(&self) -> Result<()>;
}
