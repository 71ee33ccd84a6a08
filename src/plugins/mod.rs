pub mod notifiers;
pub mod traits;

pub use notifiers::DiscordNotifier;
pub use traits::{DeliveryReceipt, Destination, Notifier, OfferMessage};
