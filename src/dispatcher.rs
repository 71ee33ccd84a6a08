use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::DiscordConfig;
use crate::models::Offer;
use crate::plugins::traits::{DeliveryReceipt, Notifier, OfferMessage};
use crate::utils::error::{AppError, Result};

/// Truncates to at most `max_len` characters, never splitting a character.
pub fn truncate_chars(text: &str, max_len: usize) -> String {
    match text.char_indices().nth(max_len) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}

/// Sends matched offers to their destinations, spacing consecutive sends by
/// a fixed delay.
pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
    footer: String,
    title_max_len: usize,
    send_delay: Duration,
    last_send: Option<Instant>,
}

impl Dispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, config: &DiscordConfig) -> Self {
        Self {
            notifier,
            footer: config.footer.clone(),
            title_max_len: config.title_max_len,
            send_delay: config.send_delay(),
            last_send: None,
        }
    }

    pub fn build_message(&self, offer: &Offer) -> OfferMessage {
        OfferMessage {
            title: truncate_chars(&offer.title, self.title_max_len),
            url: offer.link.clone(),
            price_text: offer.display_price.clone(),
            recency_text: offer.posted_at_text.clone(),
            footer: self.footer.clone(),
            timestamp: Utc::now(),
        }
    }

    /// Forgets the previous send so the first send of a cycle is not delayed.
    pub fn begin_cycle(&mut self) {
        self.last_send = None;
    }

    async fn throttle(&self) {
        if let Some(last) = self.last_send {
            let elapsed = last.elapsed();
            if elapsed < self.send_delay {
                tokio::time::sleep(self.send_delay - elapsed).await;
            }
        }
    }

    /// Delivers `offer` to `destination_id`. Every failure comes back as
    /// `AppError::Destination`; none of them is fatal.
    pub async fn send(&mut self, offer: &Offer, destination_id: u64) -> Result<DeliveryReceipt> {
        self.throttle().await;
        let result = self.deliver(offer, destination_id).await;
        self.last_send = Some(Instant::now());

        match result {
            Ok(receipt) => {
                tracing::info!(
                    title = %offer.title,
                    destination_id,
                    message_id = receipt.message_id.as_deref().unwrap_or("-"),
                    "Sent offer"
                );
                Ok(receipt)
            }
            Err(e @ AppError::Destination { .. }) => Err(e),
            Err(e) => Err(AppError::Destination {
                destination_id,
                message: e.to_string(),
            }),
        }
    }

    async fn deliver(&self, offer: &Offer, destination_id: u64) -> Result<DeliveryReceipt> {
        let destination = self
            .notifier
            .resolve_destination(destination_id)
            .await?
            .ok_or_else(|| AppError::Destination {
                destination_id,
                message: "channel not found".to_string(),
            })?;

        let message = self.build_message(offer);
        self.notifier.deliver(&destination, &message).await
    }
}
