//! Live bot settings: the current configuration snapshot, hot reload and
//! in-flight cancellation.

pub mod store;

pub use store::{Reset, SettingsStore, SettingsWatcher};
