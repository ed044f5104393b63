use chrono::{Duration, NaiveDate, NaiveTime};

/// Seconds either side of a primary event that a candidate may fall in.
pub const WINDOW_SECS: i64 = 30;

/// Inclusive date/time bounds searched for candidate events. The date range
/// and the time range are applied independently by the candidate query.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CorrelationWindow {
    pub start_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_date: NaiveDate,
    pub end_time: NaiveTime,
}

impl CorrelationWindow {
    /// The ±30 s window around a primary event, both bounds inclusive.
    ///
    /// Times at or below `00:00:29` pull the start date into the previous
    /// calendar day; times at or above `23:59:30` push the end date into the
    /// next one. The time-of-day bounds themselves wrap around midnight.
    pub fn around(date: NaiveDate, time: NaiveTime) -> CorrelationWindow {
        let span = Duration::seconds(WINDOW_SECS);
        let (start_time, _) = time.overflowing_sub_signed(span);
        let (end_time, _) = time.overflowing_add_signed(span);

        // unwraps are safe: fixed in-range constants
        let wraps_backward = NaiveTime::from_hms_opt(0, 0, 29).unwrap();
        let wraps_forward = NaiveTime::from_hms_opt(23, 59, 30).unwrap();

        let mut start_date = date;
        let mut end_date = date;
        if time <= wraps_backward {
            start_date = date.pred_opt().unwrap_or(date);
        } else if time >= wraps_forward {
            end_date = date.succ_opt().unwrap_or(date);
        }

        CorrelationWindow {
            start_date,
            start_time,
            end_date,
            end_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn time(s: &str) -> NaiveTime {
        s.parse().unwrap()
    }

    #[test]
    fn early_morning_window_starts_on_previous_day() {
        let window = CorrelationWindow::around(date("2024-01-02"), time("00:00:10"));
        assert_eq!(window.start_date, date("2024-01-01"));
        assert_eq!(window.end_date, date("2024-01-02"));
        assert_eq!(window.start_time, time("23:59:40"));
        assert_eq!(window.end_time, time("00:00:40"));
    }

    #[test]
    fn late_night_window_ends_on_next_day() {
        let window = CorrelationWindow::around(date("2024-01-02"), time("23:59:45"));
        assert_eq!(window.start_date, date("2024-01-02"));
        assert_eq!(window.end_date, date("2024-01-03"));
        assert_eq!(window.start_time, time("23:59:15"));
        assert_eq!(window.end_time, time("00:00:15"));
    }

    #[test]
    fn midday_window_stays_on_the_same_day() {
        let window = CorrelationWindow::around(date("2024-01-02"), time("12:00:00"));
        assert_eq!(window.start_date, date("2024-01-02"));
        assert_eq!(window.end_date, date("2024-01-02"));
        assert_eq!(window.start_time, time("11:59:30"));
        assert_eq!(window.end_time, time("12:00:30"));
    }

    #[test]
    fn wrap_thresholds_are_inclusive() {
        let window = CorrelationWindow::around(date("2024-01-02"), time("00:00:29"));
        assert_eq!(window.start_date, date("2024-01-01"));

        let window = CorrelationWindow::around(date("2024-01-02"), time("00:00:30"));
        assert_eq!(window.start_date, date("2024-01-02"));

        let window = CorrelationWindow::around(date("2024-01-02"), time("23:59:30"));
        assert_eq!(window.end_date, date("2024-01-03"));

        let window = CorrelationWindow::around(date("2024-01-02"), time("23:59:29"));
        assert_eq!(window.end_date, date("2024-01-02"));
    }
}
