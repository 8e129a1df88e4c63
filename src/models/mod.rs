//! Domain and display models
//!
//! - [`entity`] - cached entities and the category taxonomy
//! - [`snapshot`] - per-platform cache snapshots
//! - [`index`] - the lowercased name/alias index scanned by the matcher
//! - [`display`] - table/JSON display models for the CLI

pub mod display;
pub mod entity;
pub mod index;
pub mod snapshot;

pub use entity::{CachedEntity, EntityCategory, EntityType, PlatformFamily};
pub use index::{CachedEntityIndex, IndexEntry, fold_case};
pub use snapshot::PlatformCacheSnapshot;
