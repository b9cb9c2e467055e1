//! Output formatting for CLI commands

use chrono::{Local, TimeZone};
use serde::Serialize;

use crate::notification::NotificationAttributes;

/// Pretty JSON, `{}` if serialization fails
pub fn format_output<T: Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
}

/// One line per scheduled notification, local time
pub fn format_schedule_table(records: &[NotificationAttributes]) -> String {
    if records.is_empty() {
        return "No scheduled notifications".to_string();
    }

    let mut out = format!("{:<12} {:<20} {:<8} {}\n", "ID", "FIRES AT", "REPEAT", "MESSAGE");
    for record in records {
        let fires_at = Local
            .timestamp_millis_opt(record.fire_date)
            .single()
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| record.fire_date.to_string());
        out.push_str(&format!(
            "{:<12} {:<20} {:<8} {}\n",
            truncate(&record.id, 12),
            fires_at,
            record.repeat_type.as_deref().unwrap_or("-"),
            truncate(&record.message, 60)
        ));
    }
    out
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long message", 10), "this is...");
        assert_eq!(truncate("日本語のメッセージです", 5), "日本...");
    }

    #[test]
    fn test_empty_table() {
        assert_eq!(format_schedule_table(&[]), "No scheduled notifications");
    }

    #[test]
    fn test_table_has_row_per_record() {
        let mut a = NotificationAttributes::default();
        a.id = "1".into();
        a.message = "hello".into();
        a.fire_date = 1_700_000_000_000;
        a.repeat_type = Some("week".into());
        let table = format_schedule_table(&[a]);
        assert_eq!(table.lines().count(), 2);
        assert!(table.contains("week"));
    }
}
