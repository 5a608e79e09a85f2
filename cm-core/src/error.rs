//! Error types for cm-core
//!
//! Re-exports the unified error type from the cm-error crate.

pub use cm_error::{ChassisError, Result};
