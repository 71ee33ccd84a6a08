pub mod filter_rule;
pub mod offer;

pub use filter_rule::FilterRule;
pub use offer::{Offer, offer_id_from_link};
