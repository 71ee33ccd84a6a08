use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use rust_decimal::Decimal;
use scraper::{ElementRef, Selector};
use std::str::FromStr;
use std::sync::{Arc, LazyLock};
use url::Url;

use crate::config::ScannerConfig;
use crate::models::Offer;
use crate::scraper::{PageFetcher, PageRequest, RenderedPage};
use crate::utils::error::{AppError, Result};

static PRICE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d[\d\s]*)").expect("price pattern is valid"));

static POSTED_TODAY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Dzisiaj o (\d{2}:\d{2})").expect("date pattern is valid"));

/// Source of "now" for freshness checks, in the marketplace's local time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Longest leading digit group of `text` (digits with inner whitespace), with
/// the whitespace removed. Anything unparseable is zero.
pub fn parse_price(text: &str) -> Decimal {
    PRICE_REGEX
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().chars().filter(|c| !c.is_whitespace()).collect::<String>())
        .and_then(|digits| Decimal::from_str(&digits).ok())
        .unwrap_or(Decimal::ZERO)
}

/// Posting instant for "posted today" phrasing, `None` for anything else.
pub fn parse_posted_today(date_text: &str, today: NaiveDate) -> Option<NaiveDateTime> {
    let captures = POSTED_TODAY_REGEX.captures(date_text)?;
    let time = NaiveTime::parse_from_str(captures.get(1)?.as_str(), "%H:%M").ok()?;
    Some(today.and_time(time))
}

/// True when the offer was posted today within `[now - max_age, now]`.
pub fn is_fresh(date_text: &str, now: NaiveDateTime, max_age_minutes: i64) -> bool {
    match parse_posted_today(date_text, now.date()) {
        Some(posted_at) => {
            let age = now - posted_at;
            age >= Duration::zero() && age <= Duration::minutes(max_age_minutes)
        }
        None => false,
    }
}

struct CardSelectors {
    card: Selector,
    title: Selector,
    price: Selector,
    link: Selector,
    date: Selector,
}

impl CardSelectors {
    fn from_config(config: &ScannerConfig) -> Result<Self> {
        Ok(Self {
            card: parse_selector(&config.card_selector)?,
            title: parse_selector(&config.title_selector)?,
            price: parse_selector(&config.price_selector)?,
            link: parse_selector(&config.link_selector)?,
            date: parse_selector(&config.date_selector)?,
        })
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| AppError::Parse {
        message: format!("Invalid CSS selector '{}': {:?}", selector, e),
    })
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

pub struct OfferExtractor {
    config: ScannerConfig,
    selectors: CardSelectors,
    fetcher: Arc<dyn PageFetcher>,
    clock: Arc<dyn Clock>,
}

impl OfferExtractor {
    pub fn new(config: ScannerConfig, fetcher: Arc<dyn PageFetcher>, clock: Arc<dyn Clock>) -> Result<Self> {
        let selectors = CardSelectors::from_config(&config)?;
        Ok(Self {
            config,
            selectors,
            fetcher,
            clock,
        })
    }

    /// Fetches the listing page and returns the fresh offers on it. Fetch
    /// failures yield an empty batch; the next cycle retries.
    pub async fn extract(&self) -> Vec<Offer> {
        let request = PageRequest {
            url: self.config.listing_url.clone(),
            wait_for_selector: self.config.card_selector.clone(),
            timeout: self.config.selector_timeout(),
        };

        match self.fetcher.fetch(&request).await {
            Ok(page) => {
                tracing::debug!(url = %page.url, response_time_ms = page.response_time_ms, "Listing page rendered");
                self.parse_page(&page)
            }
            Err(e) => {
                tracing::warn!("Failed to fetch listing page: {}", e);
                Vec::new()
            }
        }
    }

    pub fn parse_page(&self, page: &RenderedPage) -> Vec<Offer> {
        let now = self.clock.now();
        let base_url = Url::parse(&page.url)
            .or_else(|_| Url::parse(&self.config.listing_url))
            .ok();
        let document = page.document();

        let mut offers = Vec::new();
        let mut cards = 0usize;
        for card in document.select(&self.selectors.card) {
            cards += 1;
            let offer = match self.parse_card(card, base_url.as_ref()) {
                Ok(offer) => offer,
                Err(e) => {
                    tracing::debug!("Skipping listing card: {}", e);
                    continue;
                }
            };

            if is_fresh(&offer.posted_at_text, now, self.config.max_age_minutes) {
                offers.push(offer);
            } else {
                tracing::trace!(title = %offer.title, posted = %offer.posted_at_text, "Offer outside freshness window");
            }
        }

        tracing::debug!(cards, fresh = offers.len(), "Parsed listing page");
        offers
    }

    fn parse_card(&self, card: ElementRef<'_>, base_url: Option<&Url>) -> Result<Offer> {
        let title = self.required_text(card, &self.selectors.title, &self.config.title_selector)?;
        let price = self.required_text(card, &self.selectors.price, &self.config.price_selector)?;
        let date_text = self.required_text(card, &self.selectors.date, &self.config.date_selector)?;

        let href = card
            .select(&self.selectors.link)
            .find_map(|a| a.value().attr("href"))
            .ok_or_else(|| AppError::ElementNotFound {
                selector: format!("{}[href]", self.config.link_selector),
            })?;

        let link = match base_url {
            Some(base) => base
                .join(href)
                .map(|url| url.to_string())
                .map_err(|e| AppError::Parse {
                    message: format!("Invalid offer link '{}': {}", href, e),
                })?,
            None => href.to_string(),
        };

        let numeric_price = parse_price(&price);
        Ok(Offer::new(title, price, numeric_price, link, date_text))
    }

    fn required_text(&self, card: ElementRef<'_>, selector: &Selector, raw: &str) -> Result<String> {
        card.select(selector)
            .next()
            .map(element_text)
            .ok_or_else(|| AppError::ElementNotFound {
                selector: raw.to_string(),
            })
    }
}
