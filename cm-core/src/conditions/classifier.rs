//! Alarm classification

use std::sync::OnceLock;

use super::Pattern;
use crate::constants::patterns::NON_ALARM;

static NON_ALARM_PATTERNS: OnceLock<Vec<Pattern>> = OnceLock::new();

fn non_alarm_patterns() -> &'static [Pattern] {
    NON_ALARM_PATTERNS.get_or_init(|| {
        NON_ALARM
            .iter()
            .filter_map(|p| Pattern::new(p).ok())
            .collect()
    })
}

/// Whether a condition is an alarm rather than an informational state.
///
/// Anything not ending in " present" or " nominal" is an alarm.
pub fn is_alarm(condition: &str) -> bool {
    !non_alarm_patterns().iter().any(|p| p.matches(condition))
}
