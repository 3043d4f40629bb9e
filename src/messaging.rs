//! Chat transport, reply chunking and paced delivery.

pub mod dispatch;
pub mod traits;
pub mod twitch;

pub use dispatch::{OutboundPlan, PlannedMessage, deliver, plan};
pub use traits::{InboundStream, Messaging};
pub use twitch::TwitchAdapter;
