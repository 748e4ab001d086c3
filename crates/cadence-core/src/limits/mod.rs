//! Frequency limits
//!
//! Caps how often an action may happen using sliding time windows:
//! a [`FrequencyConstraint`] allows at most `count` occurrences per `range`.
//!
//! ```text
//! FrequencyChecker ──► cache (one lock) ──► FrequencyWriter ──► FrequencyStore
//! ```

mod manager;
mod store;
mod types;
mod writer;

pub use manager::{FrequencyChecker, FrequencyLimitManager};
pub use store::FrequencyStore;
pub use types::{FrequencyConstraint, LimitError, LimitResult, Occurrence};
