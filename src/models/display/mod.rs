//! Display model implementations for table and JSON output
//!
//! Display models turn domain types into CLI-friendly rows with column names
//! and serialization.

mod common;
mod matches;
mod snapshot;

pub use common::{format_age, format_size, truncate_string};
pub use matches::MatchDisplay;
pub use snapshot::SnapshotDisplay;
