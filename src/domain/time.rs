//! Calendar identifiers for a run.
//!
//! A `TimeContext` is derived once at the start of a run and reused by every
//! stage, so a run that straddles midnight still files everything under the
//! day (and week) it started on.

use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};

/// Date pattern used in every document and audio file name.
pub const DATE_FORMAT: &str = "%m-%d-%Y";

/// Marker shared by daily and weekly summary documents.
pub const SUMMARY_SUFFIX: &str = "-summary";

/// Marker for transcript documents.
pub const TRANSCRIPT_SUFFIX: &str = "-transcript";

/// Calendar identifiers derived from a single timestamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeContext {
    /// Calendar year
    pub year: i32,

    /// 1-based week of the year; weeks start on Sunday and week 1 contains Jan 1
    pub week_number: u32,

    /// Date formatted as MM-DD-YYYY
    pub formatted_date: String,
}

impl TimeContext {
    /// Resolve the context for today's local date
    pub fn now() -> Self {
        Self::from_date(Local::now().date_naive())
    }

    /// Resolve the context for a specific calendar date
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            week_number: week_of_year(date),
            formatted_date: date.format(DATE_FORMAT).to_string(),
        }
    }

    /// Name of the root-level year folder (`2024`)
    pub fn year_folder_name(&self) -> String {
        self.year.to_string()
    }

    /// Name of the week folder under the year folder (`week_07`)
    pub fn week_folder_name(&self) -> String {
        format!("week_{:02}", self.week_number)
    }

    /// File name for the merged recording (`03-14-2024.m4a`)
    pub fn audio_file_name(&self, extension: &str) -> String {
        format!("{}.{}", self.formatted_date, extension.trim_start_matches('.'))
    }

    /// Title of the daily transcript document
    pub fn transcript_title(&self) -> String {
        format!("{}{}", self.formatted_date, TRANSCRIPT_SUFFIX)
    }

    /// Title of the daily summary document
    pub fn summary_title(&self) -> String {
        format!("{}{}", self.formatted_date, SUMMARY_SUFFIX)
    }

    /// Title of the weekly summary document.
    ///
    /// Not zero-padded, unlike the week folder name. Existing journals depend
    /// on both spellings.
    pub fn weekly_summary_title(&self) -> String {
        weekly_summary_title(self.week_number)
    }
}

/// Title of the weekly summary document for a week number
pub fn weekly_summary_title(week_number: u32) -> String {
    format!("week-{}{}", week_number, SUMMARY_SUFFIX)
}

/// Whether a document name is a weekly summary rather than a daily one
pub fn is_weekly_summary_title(name: &str) -> bool {
    name.starts_with("week-") && name.ends_with(SUMMARY_SUFFIX)
}

/// Week number: ceil((days since Jan 1 + weekday of Jan 1 + 1) / 7).
///
/// Days are whole days and the weekday index counts from Sunday = 0.
pub fn week_of_year(date: NaiveDate) -> u32 {
    let days_since_jan1 = date.ordinal0();
    let jan1_offset = date
        .with_ordinal0(0)
        .map(|jan1| jan1.weekday().num_days_from_sunday())
        .unwrap_or(0);

    (days_since_jan1 + jan1_offset + 1).div_ceil(7)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_context_for_known_thursday() {
        let ctx = TimeContext::from_date(date(2024, 3, 14));

        assert_eq!(ctx.year, 2024);
        assert_eq!(ctx.week_number, 11);
        assert_eq!(ctx.formatted_date, "03-14-2024");
        assert_eq!(ctx.week_folder_name(), "week_11");
        assert_eq!(ctx.audio_file_name("m4a"), "03-14-2024.m4a");
        assert_eq!(ctx.transcript_title(), "03-14-2024-transcript");
        assert_eq!(ctx.summary_title(), "03-14-2024-summary");
        assert_eq!(ctx.weekly_summary_title(), "week-11-summary");
    }

    #[test]
    fn test_week_folder_is_zero_padded() {
        let ctx = TimeContext::from_date(date(2024, 1, 2));
        assert_eq!(ctx.week_number, 1);
        assert_eq!(ctx.week_folder_name(), "week_01");
        assert_eq!(ctx.weekly_summary_title(), "week-1-summary");
    }

    #[test]
    fn test_weeks_start_on_sunday() {
        // Jan 1 2024 is a Monday, so Saturday Jan 6 closes week 1
        assert_eq!(week_of_year(date(2024, 1, 6)), 1);
        assert_eq!(week_of_year(date(2024, 1, 7)), 2);

        // Jan 1 2023 is a Sunday
        assert_eq!(week_of_year(date(2023, 1, 1)), 1);
        assert_eq!(week_of_year(date(2023, 1, 7)), 1);
        assert_eq!(week_of_year(date(2023, 1, 8)), 2);
    }

    #[test]
    fn test_week_number_monotonic_and_resets() {
        for year in [2021, 2023, 2024] {
            let mut current = date(year, 1, 1);
            let mut previous = week_of_year(current);
            assert_eq!(previous, 1);

            while current.year() == year {
                let week = week_of_year(current);
                assert!(week >= previous, "week went backwards on {}", current);
                assert!(week <= 54);
                previous = week;
                current = current.succ_opt().unwrap();
            }

            assert_eq!(week_of_year(current), 1, "no reset at {}", current);
        }
    }

    #[test]
    fn test_audio_extension_dot_is_optional() {
        let ctx = TimeContext::from_date(date(2024, 12, 31));
        assert_eq!(ctx.audio_file_name(".mp3"), "12-31-2024.mp3");
    }

    #[test]
    fn test_weekly_title_detection() {
        assert!(is_weekly_summary_title("week-11-summary"));
        assert!(!is_weekly_summary_title("03-11-2024-summary"));
        assert!(!is_weekly_summary_title("week_11"));
    }
}
