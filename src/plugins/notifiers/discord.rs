use crate::config::DiscordConfig;
use crate::plugins::traits::{DeliveryReceipt, Destination, Notifier, OfferMessage};
use crate::utils::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::json;
use std::time::Duration;

const EMBED_COLOR: u32 = 0x2ecc71;

/// Bot-token client for the Discord REST API.
pub struct DiscordNotifier {
    client: Client,
    config: DiscordConfig,
}

impl DiscordNotifier {
    pub fn new(config: DiscordConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("DiscordBot (olx-watcher, ", env!("CARGO_PKG_VERSION"), ")"))
            .build()?;

        Ok(DiscordNotifier { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base_url.trim_end_matches('/'), path)
    }

    fn authorization(&self) -> String {
        format!("Bot {}", self.config.token)
    }

    fn create_embed(&self, message: &OfferMessage) -> serde_json::Value {
        json!({
            "title": message.title,
            "url": message.url,
            "description": format!(
                "💰 **Price:** {}\n🕒 **Posted:** {}",
                message.price_text, message.recency_text
            ),
            "color": EMBED_COLOR,
            "footer": { "text": message.footer },
            "timestamp": message.timestamp.to_rfc3339(),
        })
    }

    fn create_message_payload(&self, message: &OfferMessage) -> serde_json::Value {
        json!({
            "embeds": [self.create_embed(message)]
        })
    }

    async fn error_text(response: Response) -> String {
        let status = response.status();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();

        match (status, retry_after) {
            (StatusCode::TOO_MANY_REQUESTS, Some(after)) => {
                format!("rate limited, retry after {}s", after)
            }
            (StatusCode::TOO_MANY_REQUESTS, None) => "rate limited".to_string(),
            _ => format!("HTTP {}: {}", status, body),
        }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    fn name(&self) -> &str {
        "discord"
    }

    async fn connect(&self) -> Result<()> {
        let response = self
            .client
            .get(self.endpoint("users/@me"))
            .header("Authorization", self.authorization())
            .send()
            .await
            .map_err(|e| AppError::FatalInit(format!("Discord login failed: {}", e)))?;

        if !response.status().is_success() {
            let reason = Self::error_text(response).await;
            return Err(AppError::FatalInit(format!("Discord login failed: {}", reason)));
        }

        let user: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::FatalInit(format!("Discord login failed: {}", e)))?;
        tracing::info!(
            bot = user.get("username").and_then(|v| v.as_str()).unwrap_or("unknown"),
            "Discord bot logged in"
        );
        Ok(())
    }

    async fn resolve_destination(&self, id: u64) -> Result<Option<Destination>> {
        let response = self
            .client
            .get(self.endpoint(&format!("channels/{}", id)))
            .header("Authorization", self.authorization())
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                let channel: serde_json::Value = response.json().await?;
                Ok(Some(Destination {
                    id,
                    name: channel.get("name").and_then(|v| v.as_str()).map(str::to_string),
                }))
            }
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => Ok(None),
            _ => Err(AppError::Destination {
                destination_id: id,
                message: Self::error_text(response).await,
            }),
        }
    }

    async fn deliver(&self, destination: &Destination, message: &OfferMessage) -> Result<DeliveryReceipt> {
        let response = self
            .client
            .post(self.endpoint(&format!("channels/{}/messages", destination.id)))
            .header("Authorization", self.authorization())
            .json(&self.create_message_payload(message))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Destination {
                destination_id: destination.id,
                message: Self::error_text(response).await,
            });
        }

        let sent: serde_json::Value = response.json().await?;
        Ok(DeliveryReceipt {
            message_id: sent.get("id").and_then(|v| v.as_str()).map(str::to_string),
        })
    }

    async fn shutdown(&self) -> Result<()> {
        tracing::info!("Discord client stopped");
        Ok(())
    }
}
