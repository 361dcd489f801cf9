//! Timestamp formatting for persisted rows.

use chrono::{DateTime, FixedOffset, Utc};

/// Persisted timestamps use UTC+3 wall-clock time, the sheet's house zone.
pub const STORE_UTC_OFFSET_HOURS: i32 = 3;

pub const STAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn store_zone() -> FixedOffset {
    FixedOffset::east_opt(STORE_UTC_OFFSET_HOURS * 3600).unwrap()
}

/// Current time formatted the way every sheet column expects it.
pub fn now_stamp() -> String {
    format_stamp(Utc::now())
}

pub fn format_stamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&store_zone()).format(STAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_stamp_format_and_offset() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 21, 30, 0).unwrap();
        // 21:30 UTC is 00:30 the next day in UTC+3
        assert_eq!(format_stamp(at), "2025-03-02 00:30:00");
    }
}
