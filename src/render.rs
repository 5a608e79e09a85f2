//! Alarm list rendering for the CLI

use cm_protocol::AlarmEntry;

/// Two-column table: timestamp, condition. Empty list prints a single notice.
pub fn alarms_table(alarms: &[AlarmEntry]) -> String {
    if alarms.is_empty() {
        return "No active alarms\n".to_string();
    }
    let width = alarms
        .iter()
        .map(|a| a.timestamp.len())
        .max()
        .unwrap_or(0)
        .max("TIMESTAMP".len());

    let mut out = format!("{:<width$}  CONDITION\n", "TIMESTAMP", width = width);
    for alarm in alarms {
        out.push_str(&format!("{:<width$}  {}\n", alarm.timestamp, alarm.condition, width = width));
    }
    out
}

pub fn alarms_json(alarms: &[AlarmEntry]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(alarms)
}
