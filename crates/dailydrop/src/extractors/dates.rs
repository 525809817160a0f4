//! Date detection in section headings ("Links for October 26, 2025").

use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").unwrap());

static US_NUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").unwrap());

// "October 26, 2025", "Oct 26th 2025", "October 26"
static MONTH_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([a-z]{3,9})\.?\s+(\d{1,2})(?:st|nd|rd|th)?(?:,?\s+(\d{4}))?\b").unwrap()
});

// "26 October 2025", "26th Oct"
static DAY_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})(?:st|nd|rd|th)?\s+([a-z]{3,9})\.?(?:,?\s+(\d{4}))?\b").unwrap()
});

fn month_number(name: &str) -> Option<u32> {
    let name = name.to_lowercase();
    let month = match name.get(..3)? {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    // Reject words that merely start like a month ("marker", "decide").
    const FULL: [&str; 12] = [
        "january", "february", "march", "april", "may", "june", "july", "august",
        "september", "october", "november", "december",
    ];
    let full = FULL[month as usize - 1];
    let valid = full.starts_with(&name) || (month == 9 && name == "sept");
    valid.then_some(month)
}

/// Year-less dates take the run date's year, or the previous year when that
/// would put them in the future.
fn with_inferred_year(month: u32, day: u32, year: Option<i32>, run_date: NaiveDate) -> Option<NaiveDate> {
    if let Some(year) = year {
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    let candidate = NaiveDate::from_ymd_opt(run_date.year(), month, day)?;
    if candidate > run_date {
        NaiveDate::from_ymd_opt(run_date.year() - 1, month, day)
    } else {
        Some(candidate)
    }
}

/// Find a calendar date in heading text.
///
/// Recognises `YYYY-MM-DD`, `MM/DD/YYYY`, `Month D, YYYY` and `D Month YYYY`,
/// with any surrounding words.
pub fn parse_heading_date(text: &str, run_date: NaiveDate) -> Option<NaiveDate> {
    if let Some(caps) = ISO_DATE.captures(text) {
        let date = NaiveDate::from_ymd_opt(
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
            caps[3].parse().ok()?,
        );
        if date.is_some() {
            return date;
        }
    }

    if let Some(caps) = US_NUMERIC.captures(text) {
        let date = NaiveDate::from_ymd_opt(
            caps[3].parse().ok()?,
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
        );
        if date.is_some() {
            return date;
        }
    }

    for caps in MONTH_FIRST.captures_iter(text) {
        let Some(month) = month_number(&caps[1]) else {
            continue;
        };
        let day: u32 = caps[2].parse().ok()?;
        let year = caps.get(3).and_then(|m| m.as_str().parse().ok());
        if let Some(date) = with_inferred_year(month, day, year, run_date) {
            return Some(date);
        }
    }

    for caps in DAY_FIRST.captures_iter(text) {
        let Some(month) = month_number(&caps[2]) else {
            continue;
        };
        let day: u32 = caps[1].parse().ok()?;
        let year = caps.get(3).and_then(|m| m.as_str().parse().ok());
        if let Some(date) = with_inferred_year(month, day, year, run_date) {
            return Some(date);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn run() -> NaiveDate {
        day(2025, 10, 26)
    }

    #[test]
    fn test_iso_and_numeric() {
        assert_eq!(parse_heading_date("Links 2025-10-25", run()), Some(day(2025, 10, 25)));
        assert_eq!(parse_heading_date("10/24/2025 rewards", run()), Some(day(2025, 10, 24)));
    }

    #[test]
    fn test_month_names() {
        assert_eq!(
            parse_heading_date("Links for October 26, 2025", run()),
            Some(day(2025, 10, 26))
        );
        assert_eq!(parse_heading_date("Sept 3rd 2025", run()), Some(day(2025, 9, 3)));
        assert_eq!(parse_heading_date("25 October 2025", run()), Some(day(2025, 10, 25)));
    }

    #[test]
    fn test_year_inferred_from_run_date() {
        assert_eq!(parse_heading_date("Oct 25", run()), Some(day(2025, 10, 25)));
        assert_eq!(parse_heading_date("December 31", run()), Some(day(2024, 12, 31)));
    }

    #[test]
    fn test_no_date() {
        assert_eq!(parse_heading_date("Free spins and coins", run()), None);
        assert_eq!(parse_heading_date("Marker 12 update", run()), None);
    }
}
