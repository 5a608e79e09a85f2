//! Sysfs LED indicators
//!
//! Drives `<led_base>/<name>/brightness`. "On" writes the LED's
//! `max_brightness` (read once and cached; `1` when unreadable), "off"
//! writes `0`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use cm_core::{ChassisError, IndicatorSink, Result};
use tracing::{debug, trace};

pub struct SysfsLeds {
    base: PathBuf,
    on_values: HashMap<String, u32>,
}

/// LED names are single path components under the sysfs LED class
pub fn validate_led_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ChassisError::InvalidIndicatorName("empty name".to_string()));
    }
    if name.contains('/') || name.contains('\0') || name == "." || name.contains("..") {
        return Err(ChassisError::InvalidIndicatorName(name.to_string()));
    }
    Ok(())
}

impl SysfsLeds {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            on_values: HashMap::new(),
        }
    }

    fn led_dir(&self, name: &str) -> PathBuf {
        self.base.join(name)
    }

    fn on_value(&mut self, name: &str) -> u32 {
        if let Some(value) = self.on_values.get(name) {
            return *value;
        }
        let value = read_max_brightness(&self.led_dir(name).join("max_brightness")).unwrap_or(1);
        debug!("LED {} on-brightness {}", name, value);
        self.on_values.insert(name.to_string(), value);
        value
    }
}

fn read_max_brightness(path: &Path) -> Option<u32> {
    let content = fs::read_to_string(path).ok()?;
    content.trim().parse::<u32>().ok().filter(|v| *v > 0)
}

impl IndicatorSink for SysfsLeds {
    fn set_indicator(&mut self, name: &str, on: bool) -> Result<()> {
        validate_led_name(name)?;
        let value = if on { self.on_value(name) } else { 0 };
        let path = self.led_dir(name).join("brightness");
        trace!("Writing {} to {}", value, path.display());
        fs::write(&path, value.to_string()).map_err(|e| ChassisError::IndicatorWrite {
            name: name.to_string(),
            reason: format!("Failed to write {}: {}", path.display(), e),
        })
    }
}
