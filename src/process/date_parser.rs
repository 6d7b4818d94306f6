use chrono::{Datelike, NaiveDate};

/// Days between 0001-01-01 (CE day 1) and 1970-01-01.
const UNIX_EPOCH_FROM_CE: i32 = 719_163;

/// Julian day number of 1970-01-01.
const UNIX_EPOCH_JDN: i64 = 2_440_588;

/// First day of the Gregorian calendar, 1582-10-15, in days since the epoch.
pub const GREGORIAN_CUTOVER_DAYS: i32 = -141_427;

pub fn days_from_date(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_FROM_CE
}

pub fn date_from_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days.checked_add(UNIX_EPOCH_FROM_CE)?)
}

/// Parse `s` with a chrono format, e.g. `%Y-%m-%d` → days since epoch.
pub fn parse_date_days(s: &str, format: &str) -> Option<i32> {
    NaiveDate::parse_from_str(s, format)
        .ok()
        .map(days_from_date)
}

/// Lenient cast of free text to a date.
///
/// Accepts `yyyy`, `yyyy-m`, `yyyy-m-d`, each optionally followed by a space or
/// `T` and anything after it (a time part). Surrounding whitespace is ignored.
pub fn cast_str_to_days(s: &str) -> Option<i32> {
    let s = s.trim();
    let date_part = s.split(|c: char| c == ' ' || c == 'T').next()?;
    let mut parts = date_part.split('-');

    let year_str = parts.next()?;
    if year_str.len() != 4 || !year_str.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let year: i32 = year_str.parse().ok()?;
    let month: u32 = match parts.next() {
        Some(m) if (1..=2).contains(&m.len()) => m.parse().ok()?,
        Some(_) => return None,
        None => 1,
    };
    let day: u32 = match parts.next() {
        Some(d) if (1..=2).contains(&d.len()) => d.parse().ok()?,
        Some(_) => return None,
        None => 1,
    };
    if parts.next().is_some() {
        return None;
    }

    NaiveDate::from_ymd_opt(year, month, day).map(days_from_date)
}

/// Julian day number of a Julian-calendar date.
fn julian_calendar_jdn(year: i32, month: u32, day: u32) -> i64 {
    let (year, month, day) = (year as i64, month as i64, day as i64);
    let a = (14 - month) / 12;
    let y = year + 4800 - a;
    let m = month + 12 * a - 3;
    day + (153 * m + 2) / 5 + 365 * y + y.div_euclid(4) - 32_083
}

/// Julian-calendar (year, month, day) of a Julian day number.
fn julian_calendar_ymd(jdn: i64) -> (i32, u32, u32) {
    let c = jdn + 32_082;
    let d = (4 * c + 3).div_euclid(1461);
    let e = c - (1461 * d).div_euclid(4);
    let m = (5 * e + 2) / 153;
    let day = e - (153 * m + 2) / 5 + 1;
    let month = m + 3 - 12 * (m / 10);
    let year = d - 4800 + m / 10;
    (year as i32, month as u32, day as u32)
}

/// Rebase a proleptic Gregorian day number to the hybrid Julian/Gregorian
/// calendar: the same calendar label, read as a Julian date before the cutover.
pub fn rebase_gregorian_to_julian(days: i32) -> i32 {
    if days >= GREGORIAN_CUTOVER_DAYS {
        return days;
    }
    match date_from_days(days) {
        Some(date) => {
            let jdn = julian_calendar_jdn(date.year(), date.month(), date.day());
            (jdn - UNIX_EPOCH_JDN) as i32
        }
        None => days,
    }
}

/// Inverse of [`rebase_gregorian_to_julian`].
///
/// Julian leap days that do not exist in the proleptic Gregorian calendar
/// (e.g. 1500-02-29) move to March 1st.
pub fn rebase_julian_to_gregorian(days: i32) -> i32 {
    if days >= GREGORIAN_CUTOVER_DAYS {
        return days;
    }
    let (year, month, day) = julian_calendar_ymd(days as i64 + UNIX_EPOCH_JDN);
    NaiveDate::from_ymd_opt(year, month, day)
        .or_else(|| NaiveDate::from_ymd_opt(year, 3, 1))
        .map(days_from_date)
        .unwrap_or(days)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> i32 {
        days_from_date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[test]
    fn epoch_and_cutover_constants() {
        assert_eq!(ymd(1970, 1, 1), 0);
        assert_eq!(ymd(1582, 10, 15), GREGORIAN_CUTOVER_DAYS);
        assert_eq!(date_from_days(0), NaiveDate::from_ymd_opt(1970, 1, 1));
    }

    #[test]
    fn parses_fixed_pattern() {
        assert_eq!(parse_date_days("2020-01-05", "%Y-%m-%d"), Some(ymd(2020, 1, 5)));
        assert_eq!(parse_date_days("2020/01/05", "%Y-%m-%d"), None);
        assert_eq!(parse_date_days("hello", "%Y-%m-%d"), None);
    }

    #[test]
    fn lenient_cast_accepts_partial_dates_and_time_suffixes() {
        assert_eq!(cast_str_to_days("2019"), Some(ymd(2019, 1, 1)));
        assert_eq!(cast_str_to_days("2019-7"), Some(ymd(2019, 7, 1)));
        assert_eq!(cast_str_to_days(" 2019-07-04 "), Some(ymd(2019, 7, 4)));
        assert_eq!(cast_str_to_days("2019-07-04 12:30:00"), Some(ymd(2019, 7, 4)));
        assert_eq!(cast_str_to_days("2019-07-04T12:30:00Z"), Some(ymd(2019, 7, 4)));
        assert_eq!(cast_str_to_days("2019-13-01"), None);
        assert_eq!(cast_str_to_days("19-07-04"), None);
        assert_eq!(cast_str_to_days("not a date"), None);
        assert_eq!(cast_str_to_days(""), None);
    }

    #[test]
    fn modern_dates_are_not_rebased() {
        for days in [GREGORIAN_CUTOVER_DAYS, 0, ymd(1900, 2, 28), ymd(2024, 2, 29)] {
            assert_eq!(rebase_gregorian_to_julian(days), days);
            assert_eq!(rebase_julian_to_gregorian(days), days);
        }
    }

    #[test]
    fn rebase_shifts_by_the_calendar_drift() {
        // the day before the cutover is ten days apart in the two calendars
        let before_cutover = ymd(1582, 10, 14);
        assert_eq!(rebase_gregorian_to_julian(before_cutover) - before_cutover, 10);

        // 1000 is a Julian leap year only, so the drift grows by one after February
        let jan_1000 = ymd(1000, 1, 1);
        assert_eq!(rebase_gregorian_to_julian(jan_1000) - jan_1000, 5);
        let mar_1000 = ymd(1000, 3, 1);
        assert_eq!(rebase_gregorian_to_julian(mar_1000) - mar_1000, 6);
    }

    #[test]
    fn rebase_round_trips() {
        for days in [ymd(1000, 1, 1), ymd(1500, 3, 1), ymd(1582, 10, 4), ymd(1, 1, 1)] {
            let julian = rebase_gregorian_to_julian(days);
            assert_eq!(rebase_julian_to_gregorian(julian), days);
        }
    }
}
