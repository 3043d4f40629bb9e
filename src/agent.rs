//! Conversation orchestration: classification, cooldown, model calls and
//! the bot event loop.

pub mod bot;
pub mod classifier;
pub mod cooldown;
pub mod engine;

pub use bot::Bot;
pub use classifier::{Interaction, InterjectionSampler, classify};
pub use cooldown::{Admission, CooldownGate};
pub use engine::{Engine, EventResult, InteractionKind, Outcome};
