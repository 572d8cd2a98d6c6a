//! # freqline Common Library
//!
//! Shared code for the freqline pipeline crates including:
//! - Error type and result alias
//! - TOML configuration loading and config-file discovery
//! - Stage identity (`StageKind`)
//! - Pipeline event types and the broadcast `EventBus`
//! - Directory stores with staged, atomic commits
//! - Run-date helpers

pub mod config;
pub mod error;
pub mod events;
pub mod stage;
pub mod store;
pub mod time;

pub use error::{Error, Result};
pub use stage::StageKind;
pub use store::{Store, StoreBatch};
