//! # Core Module
//!
//! Configuration, the local clock and viewer identity shared by all features.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false

pub mod clock;
pub mod config;
pub mod viewer;

// Re-export commonly used items
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, ReminderSettings};
pub use viewer::{Role, Viewer};
