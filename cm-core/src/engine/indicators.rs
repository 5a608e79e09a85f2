//! Indicator derivation
//!
//! Indicator state is recomputed from the full condition set every loop
//! iteration: each indicator is off unless some present condition matches a
//! rule naming it. Writes are issued all-on first, then all-off, each group in
//! configured indicator order.

use tracing::trace;

use crate::conditions::Pattern;
use crate::error::Result;
use crate::source::IndicatorSink;

/// Light `indicator` while any condition matches `pattern`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorRule {
    pub pattern: Pattern,
    pub indicator: String,
}

/// Desired state of every configured indicator, in configured order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorPlan {
    states: Vec<(String, bool)>,
}

impl IndicatorPlan {
    pub fn state(&self, indicator: &str) -> Option<bool> {
        self.states
            .iter()
            .find(|(name, _)| name == indicator)
            .map(|(_, on)| *on)
    }

    /// Writes in emission order: every "on" first, then every "off"
    pub fn writes(&self) -> Vec<(&str, bool)> {
        let on = self.states.iter().filter(|(_, on)| *on);
        let off = self.states.iter().filter(|(_, on)| !*on);
        on.chain(off).map(|(name, on)| (name.as_str(), *on)).collect()
    }

    pub fn apply(&self, sink: &mut dyn IndicatorSink) -> Result<()> {
        for (name, on) in self.writes() {
            trace!("Indicator {} -> {}", name, if on { "on" } else { "off" });
            sink.set_indicator(name, on)?;
        }
        Ok(())
    }
}

/// Compute indicator state from the present conditions
pub fn derive_indicators<S: AsRef<str>>(
    indicators: &[String],
    rules: &[IndicatorRule],
    conditions: &[S],
) -> IndicatorPlan {
    let mut states: Vec<(String, bool)> = indicators.iter().map(|name| (name.clone(), false)).collect();
    for condition in conditions {
        for rule in rules {
            if !rule.pattern.matches(condition.as_ref()) {
                continue;
            }
            if let Some(slot) = states.iter_mut().find(|(name, _)| *name == rule.indicator) {
                slot.1 = true;
            }
        }
    }
    IndicatorPlan { states }
}
