//! ctiscan - entity cache synchronization and text scanning for threat-intelligence platforms
//!
//! The crate keeps a local snapshot of every named entity (assets, teams,
//! threat actors, attack patterns, ...) known to the configured platforms and
//! scans arbitrary text for mentions of them.
//!
//! - [`scheduler`] keeps snapshots fresh, one scheduler per platform family
//! - [`source`] fetches raw entity lists from platforms
//! - [`cache`] persists snapshots
//! - [`matcher`] finds entity names and aliases in text

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod matcher;
pub mod models;
pub mod output;
pub mod scheduler;
pub mod source;

pub use error::{Error, Result};
