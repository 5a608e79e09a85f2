//! Condition tracking modules
//!
//! - `pattern` - compiled full-string condition patterns
//! - `classifier` - alarm vs. informational classification
//! - `format` - canonical condition strings and wildcard patterns
//! - `store` - the set of currently-true conditions

mod classifier;
pub mod format;
mod pattern;
mod store;

pub use classifier::is_alarm;
pub use pattern::Pattern;
pub use store::{AlarmRecord, ConditionStore};
