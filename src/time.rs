use chrono::{Duration, Local, NaiveDate, TimeZone, Utc};

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Inclusive epoch-millisecond bounds of one local calendar day.
///
/// The daily production totals only count records whose timestamp falls
/// inside this window, so both bounds are inclusive: `start_ms` is
/// 00:00:00.000 and `end_ms` is 23:59:59.999.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl DayWindow {
    pub fn today_local() -> Self {
        Self::for_date(Local::now().date_naive())
    }

    pub fn for_date(date: NaiveDate) -> Self {
        let start = local_midnight(date);
        let end = local_midnight(date + Duration::days(1)) - 1;
        DayWindow {
            start_ms: start,
            end_ms: end,
        }
    }

    pub fn contains(&self, ts_ms: i64) -> bool {
        ts_ms >= self.start_ms && ts_ms <= self.end_ms
    }
}

fn local_midnight(date: NaiveDate) -> i64 {
    let naive = match date.and_hms_opt(0, 0, 0) {
        Some(naive) => naive,
        None => return 0,
    };
    match Local.from_local_datetime(&naive).earliest() {
        Some(dt) => dt.timestamp_millis(),
        // Midnight erased by a DST jump; read the naive time as UTC instead.
        None => Utc.from_utc_datetime(&naive).timestamp_millis(),
    }
}

/// Date stamp used on ledger entries, e.g. "Aug 5, 2026".
pub fn format_entry_date(date: NaiveDate) -> String {
    date.format("%b %-d, %Y").to_string()
}
