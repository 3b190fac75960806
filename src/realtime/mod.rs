pub mod events;
pub mod hub;

pub use events::{OrderEvent, Topic};
pub use hub::BroadcastHub;
