//! Day-granular date arithmetic — the Date/Period kernel (spec.md §4.1).
//!
//! jiff `Span` operations (`Date - Date`, `Span::years()`, `Span::resign()`)
//! are correct but relatively heavy for a hot simulation loop that compares
//! and advances dates millions of times across a Monte-Carlo batch. The
//! helpers here use Rata Die day-numbering for O(1) day-difference
//! calculations and direct calendar arithmetic for period advances — no
//! `Span` allocation or normalisation involved. All arithmetic is UTC-based
//! (jiff's `civil::Date` carries no offset) so results are bit-exact across
//! hosts, as spec.md §4.1 requires.

use jiff::civil::Date;
use serde::{Deserialize, Serialize};

/// The four schedule period units spec.md §3/§4.1 names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Period {
    Day,
    Week,
    Month,
    Year,
}

#[inline]
pub fn is_leap_year(year: i16) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

#[inline]
pub fn days_in_month(year: i16, month: i8) -> i8 {
    const DAYS: [i8; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
    if month == 2 && is_leap_year(year) {
        29
    } else {
        DAYS[(month - 1) as usize]
    }
}

/// Convert a civil date to a Rata Die day number (days since 0001-01-01),
/// proleptic Gregorian calendar (Baum 2017).
#[inline]
fn rata_die(d: Date) -> i32 {
    let y = d.year() as i32;
    let m = d.month() as i32;
    let day = d.day() as i32;

    let a = (14 - m) / 12;
    let y2 = y - a;
    let m2 = m + 12 * a - 3;

    day + (153 * m2 + 2) / 5 + 365 * y2 + y2 / 4 - y2 / 100 + y2 / 400 - 306
}

#[inline]
fn rd_to_date(rd: i32) -> Date {
    let z = rd + 306;
    let h = 100 * z - 25;
    let a = h / 3_652_425;
    let b = a - a / 4;
    let y = (100 * b + h) / 36_525;
    let c = b + z - 365 * y - y / 4;
    let m = (5 * c + 456) / 153;
    let day = c - (153 * m - 457) / 5;

    let (year, month) = if m > 12 { (y + 1, m - 12) } else { (y, m) };
    jiff::civil::date(year as i16, month as i8, day as i8)
}

/// Number of days between two dates (`d2 - d1`), positive when `d2 > d1`.
#[inline]
pub fn fast_days_between(d1: Date, d2: Date) -> i32 {
    rata_die(d2) - rata_die(d1)
}

/// Add `n` days to a date without going through `jiff::Span`.
#[inline]
pub fn add_days(d: Date, n: i32) -> Date {
    rd_to_date(rata_die(d) + n)
}

/// Add `n` months to a date, clamping the day-of-month to the target
/// month's length (e.g. Jan 31 + 1 month = Feb 28/29).
#[inline]
pub fn add_months(d: Date, n: i32) -> Date {
    let total_months = d.year() as i32 * 12 + d.month() as i32 - 1 + n;
    let new_year = total_months.div_euclid(12) as i16;
    let new_month = (total_months.rem_euclid(12) + 1) as i8;
    let max_day = days_in_month(new_year, new_month);
    let new_day = d.day().min(max_day);
    jiff::civil::date(new_year, new_month, new_day)
}

/// Add `n` years to a date, clamping Feb 29 -> Feb 28 on non-leap targets.
#[inline]
pub fn add_years(d: Date, n: i32) -> Date {
    let new_year = (d.year() as i32 + n) as i16;
    let max_day = days_in_month(new_year, d.month());
    let new_day = d.day().min(max_day);
    jiff::civil::date(new_year, d.month(), new_day)
}

/// Advance `date` by `n * period`, optionally snapping the result onto a
/// fixed `(month, day)` anchor for annual cycles (spec.md §4.1: "an
/// anchor-date rule optionally snaps the result to a fixed (month,
/// day-of-year) for annual cycles").
#[inline]
pub fn next_date(date: Date, period: Period, n: u32, anchor: Option<(i8, i8)>) -> Date {
    let n = n as i32;
    let advanced = match period {
        Period::Day => add_days(date, n),
        Period::Week => add_days(date, n * 7),
        Period::Month => add_months(date, n),
        Period::Year => add_years(date, n),
    };

    match anchor {
        Some((month, day)) if period == Period::Year => {
            let clamped_day = day.min(days_in_month(advanced.year(), month));
            jiff::civil::date(advanced.year(), month, clamped_day)
        }
        _ => advanced,
    }
}

/// True if `d1` is the last day of its month (used for month-end checks).
#[inline]
pub fn is_month_end(d: Date) -> bool {
    d.day() == days_in_month(d.year(), d.month())
}

/// The last day of the month containing `d`.
#[inline]
pub fn month_end(d: Date) -> Date {
    jiff::civil::date(d.year(), d.month(), days_in_month(d.year(), d.month()))
}

/// The first day of the month containing `d`.
#[inline]
pub fn month_start(d: Date) -> Date {
    jiff::civil::date(d.year(), d.month(), 1)
}

/// The first day of the month following the one containing `d`.
#[inline]
pub fn next_month_start(d: Date) -> Date {
    add_months(month_start(d), 1)
}

/// Whole years between `birth` and `on`, the common "age in years" used by
/// RMD/early-withdrawal/Social-Security eligibility checks.
#[inline]
pub fn age_in_years(birth: Date, on: Date) -> i32 {
    let mut years = on.year() as i32 - birth.year() as i32;
    if (on.month(), on.day()) < (birth.month(), birth.day()) {
        years -= 1;
    }
    years
}

#[cfg(test)]
mod tests {
    use super::*;
    use jiff::civil::date;

    #[test]
    fn fast_days_between_same_date() {
        let d = date(2025, 6, 15);
        assert_eq!(fast_days_between(d, d), 0);
    }

    #[test]
    fn fast_days_between_matches_jiff() {
        let pairs = [
            (date(2020, 1, 1), date(2030, 6, 15)),
            (date(2024, 2, 29), date(2025, 2, 28)),
            (date(2025, 12, 31), date(2026, 1, 1)),
        ];
        for (d1, d2) in pairs {
            let jiff_days = (d2 - d1).get_days();
            assert_eq!(fast_days_between(d1, d2), jiff_days);
        }
    }

    #[test]
    fn add_days_crosses_year() {
        assert_eq!(add_days(date(2025, 12, 31), 1), date(2026, 1, 1));
    }

    #[test]
    fn add_months_clamps_short_month() {
        assert_eq!(add_months(date(2025, 1, 31), 1), date(2025, 2, 28));
        assert_eq!(add_months(date(2024, 1, 31), 1), date(2024, 2, 29));
    }

    #[test]
    fn add_years_clamps_leap_day() {
        assert_eq!(add_years(date(2024, 2, 29), 1), date(2025, 2, 28));
    }

    #[test]
    fn next_date_every_n_months() {
        let d = date(2023, 1, 1);
        assert_eq!(next_date(d, Period::Month, 3, None), date(2023, 4, 1));
    }

    #[test]
    fn next_date_anchors_annual_cycle() {
        // Anniversary anchored to (3, 15) regardless of the date it's stepped from.
        let d = date(2023, 1, 10);
        let stepped = next_date(d, Period::Year, 1, Some((3, 15)));
        assert_eq!(stepped, date(2024, 3, 15));
    }

    #[test]
    fn is_month_end_detects_boundary() {
        assert!(is_month_end(date(2024, 2, 29)));
        assert!(!is_month_end(date(2024, 2, 28)));
        assert!(is_month_end(date(2025, 2, 28)));
    }

    #[test]
    fn age_in_years_before_and_after_birthday() {
        assert_eq!(age_in_years(date(1960, 6, 15), date(2025, 6, 14)), 64);
        assert_eq!(age_in_years(date(1960, 6, 15), date(2025, 6, 15)), 65);
    }
}
