use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;
use url::Url;

pub const DEFAULT_LISTING_URL: &str =
    "https://www.olx.pl/elektronika/telefony/q-iphone/?search%5Border%5D=created_at:desc";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub scanner: ScannerConfig,
    pub browser: BrowserConfig,
    pub discord: DiscordConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    pub listing_url: String,
    pub card_selector: String,
    pub title_selector: String,
    pub price_selector: String,
    pub link_selector: String,
    pub date_selector: String,
    pub max_age_minutes: i64,
    pub scan_interval_secs: u64,
    pub selector_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    pub headless: bool,
    pub chrome_path: Option<String>,
    pub user_agent: Option<String>,
    pub navigation_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub token: String,
    pub api_base_url: String,
    pub footer: String,
    pub send_delay_ms: u64,
    pub title_max_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub filters_path: String,
    pub sent_offers_path: String,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            listing_url: DEFAULT_LISTING_URL.to_string(),
            card_selector: "div[data-testid='l-card']".to_string(),
            title_selector: "a > h4".to_string(),
            price_selector: "p[data-testid='ad-price']".to_string(),
            link_selector: "a".to_string(),
            date_selector: "p[data-testid='location-date']".to_string(),
            max_age_minutes: 10,
            scan_interval_secs: 120,
            selector_timeout_secs: 30,
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            user_agent: None,
            navigation_timeout_secs: 30,
        }
    }
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_base_url: "https://discord.com/api/v10".to_string(),
            footer: "OLX Bot".to_string(),
            send_delay_ms: 500,
            title_max_len: 256,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            filters_path: "filters.json".to_string(),
            sent_offers_path: "sent_offers.txt".to_string(),
        }
    }
}

impl ScannerConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn selector_timeout(&self) -> Duration {
        Duration::from_secs(self.selector_timeout_secs)
    }
}

impl DiscordConfig {
    pub fn send_delay(&self) -> Duration {
        Duration::from_millis(self.send_delay_ms)
    }
}

impl AppConfig {
    /// Layered load: built-in defaults, then `config/default` and `config/local`
    /// (or an explicit file), then `OLX_WATCH__SECTION__KEY` environment variables.
    pub fn load(explicit_file: Option<&Path>) -> Result<Self, ConfigError> {
        let scanner = ScannerConfig::default();
        let browser = BrowserConfig::default();
        let discord = DiscordConfig::default();
        let storage = StorageConfig::default();

        let mut builder = Config::builder()
            .set_default("scanner.listing_url", scanner.listing_url)?
            .set_default("scanner.card_selector", scanner.card_selector)?
            .set_default("scanner.title_selector", scanner.title_selector)?
            .set_default("scanner.price_selector", scanner.price_selector)?
            .set_default("scanner.link_selector", scanner.link_selector)?
            .set_default("scanner.date_selector", scanner.date_selector)?
            .set_default("scanner.max_age_minutes", scanner.max_age_minutes)?
            .set_default("scanner.scan_interval_secs", scanner.scan_interval_secs as i64)?
            .set_default("scanner.selector_timeout_secs", scanner.selector_timeout_secs as i64)?
            .set_default("browser.headless", browser.headless)?
            .set_default(
                "browser.navigation_timeout_secs",
                browser.navigation_timeout_secs as i64,
            )?
            .set_default("discord.token", discord.token)?
            .set_default("discord.api_base_url", discord.api_base_url)?
            .set_default("discord.footer", discord.footer)?
            .set_default("discord.send_delay_ms", discord.send_delay_ms as i64)?
            .set_default("discord.title_max_len", discord.title_max_len as i64)?
            .set_default("storage.filters_path", storage.filters_path)?
            .set_default("storage.sent_offers_path", storage.sent_offers_path)?;

        builder = match explicit_file {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder
                .add_source(File::with_name("config/default").required(false))
                .add_source(File::with_name("config/local").required(false)),
        };

        let s = builder
            .add_source(Environment::with_prefix("OLX_WATCH").separator("__"))
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;

        if config.browser.chrome_path.is_none() {
            config.browser.chrome_path = env::var("CHROME_PATH").ok();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if Url::parse(&self.scanner.listing_url).is_err() {
            return Err(ConfigError::Message("Invalid listing URL format".into()));
        }

        let selectors = [
            ("card_selector", &self.scanner.card_selector),
            ("title_selector", &self.scanner.title_selector),
            ("price_selector", &self.scanner.price_selector),
            ("link_selector", &self.scanner.link_selector),
            ("date_selector", &self.scanner.date_selector),
        ];
        for (name, selector) in selectors {
            if selector.trim().is_empty() {
                return Err(ConfigError::Message(format!("scanner.{} must not be empty", name)));
            }
        }

        if self.scanner.max_age_minutes <= 0 {
            return Err(ConfigError::Message("scanner.max_age_minutes must be greater than 0".into()));
        }

        if self.scanner.scan_interval_secs == 0 {
            return Err(ConfigError::Message("scanner.scan_interval_secs must be greater than 0".into()));
        }

        if self.discord.title_max_len == 0 {
            return Err(ConfigError::Message("discord.title_max_len must be greater than 0".into()));
        }

        if self.discord.token.trim().is_empty() {
            return Err(ConfigError::Message(
                "discord.token is required (set OLX_WATCH__DISCORD__TOKEN)".into(),
            ));
        }

        if Url::parse(&self.discord.api_base_url).is_err() {
            return Err(ConfigError::Message("Invalid discord.api_base_url format".into()));
        }

        Ok(())
    }
}
