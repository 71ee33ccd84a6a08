use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static OFFER_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)ID(\w+)\.html").expect("offer id pattern is valid"));

/// One listing card taken from the marketplace page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Offer {
    /// `None` when the link carries no `ID<token>.html` segment; such offers
    /// cannot be deduplicated and are never dispatched.
    pub id: Option<String>,
    pub title: String,
    pub display_price: String,
    pub numeric_price: Decimal,
    pub link: String,
    pub posted_at_text: String,
}

impl Offer {
    pub fn new(
        title: impl Into<String>,
        display_price: impl Into<String>,
        numeric_price: Decimal,
        link: impl Into<String>,
        posted_at_text: impl Into<String>,
    ) -> Self {
        let link = link.into();
        Self {
            id: offer_id_from_link(&link),
            title: title.into(),
            display_price: display_price.into(),
            numeric_price,
            link,
            posted_at_text: posted_at_text.into(),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

/// Extracts the marketplace's own identifier from an offer link, e.g.
/// `.../d/oferta/iphone-13-CID99-IDxyz123.html` yields `xyz123`.
pub fn offer_id_from_link(link: &str) -> Option<String> {
    OFFER_ID_REGEX
        .captures(link)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
}
