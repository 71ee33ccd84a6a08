pub mod notifier;

pub use notifier::{DeliveryReceipt, Destination, Notifier, OfferMessage};
