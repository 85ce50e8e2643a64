//! CF time decoding and monthly canonicalization
//!
//! Model output arrives as numeric offsets (`days since 1850-01-01`, ...) in
//! whatever calendar the model uses. Every timestamp is reduced to its
//! (year, month) and re-anchored on the 15th of that month in the proleptic
//! Gregorian calendar, so all models compare on identical monthly anchors.

use crate::errors::{Result, WranglerError};
use chrono::{Datelike, NaiveDate};
use std::fmt;
use std::str::FromStr;

/// Epoch used for time coordinates written by this crate
pub const CANONICAL_EPOCH: (i32, u32, u32) = (1850, 1, 1);

/// Units attribute written next to every persisted time axis
pub const CANONICAL_TIME_UNITS: &str = "days since 1850-01-01";

/// Calendar attribute written next to every persisted time axis
pub const CANONICAL_CALENDAR: &str = "proleptic_gregorian";

/// Day of month every canonical timestamp is anchored on
pub const ANCHOR_DAY: u32 = 15;

const SECONDS_PER_DAY: f64 = 86_400.0;
// Larger offsets would overflow day-number arithmetic
const MAX_OFFSET_DAYS: f64 = 1e12;
const NOLEAP_CUMULATIVE: [i64; 13] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334, 365];
const ALLLEAP_CUMULATIVE: [i64; 13] = [0, 31, 60, 91, 121, 152, 182, 213, 244, 274, 305, 335, 366];

/// Calendars found in CMIP6 output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Calendar {
    /// `standard`, `gregorian` and `proleptic_gregorian`
    Gregorian,
    /// `noleap` / `365_day`
    NoLeap,
    /// `all_leap` / `366_day`
    AllLeap,
    /// `360_day`
    Day360,
    /// `julian`
    Julian,
}

impl FromStr for Calendar {
    type Err = WranglerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" | "gregorian" | "proleptic_gregorian" => Ok(Self::Gregorian),
            "noleap" | "no_leap" | "365_day" => Ok(Self::NoLeap),
            "all_leap" | "366_day" => Ok(Self::AllLeap),
            "360_day" => Ok(Self::Day360),
            "julian" => Ok(Self::Julian),
            other => Err(WranglerError::UnsupportedCalendar(format!(
                "calendar '{other}' is not recognised"
            ))),
        }
    }
}

impl fmt::Display for Calendar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Gregorian => "proleptic_gregorian",
            Self::NoLeap => "noleap",
            Self::AllLeap => "all_leap",
            Self::Day360 => "360_day",
            Self::Julian => "julian",
        };
        f.write_str(name)
    }
}

impl Calendar {
    /// Absolute day number of a date in this calendar
    pub fn day_number(self, year: i32, month: u32, day: u32) -> Result<i64> {
        if !(1..=12).contains(&month) || day == 0 || day > self.days_in_month(year, month) {
            return Err(WranglerError::UnsupportedCalendar(format!(
                "{year:04}-{month:02}-{day:02} does not exist in the {self} calendar"
            )));
        }
        let (y, m, d) = (i64::from(year), i64::from(month), i64::from(day));
        let number = match self {
            Self::Day360 => y * 360 + (m - 1) * 30 + (d - 1),
            Self::NoLeap => y * 365 + NOLEAP_CUMULATIVE[(m - 1) as usize] + (d - 1),
            Self::AllLeap => y * 366 + ALLLEAP_CUMULATIVE[(m - 1) as usize] + (d - 1),
            Self::Gregorian => {
                let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
                    WranglerError::UnsupportedCalendar(format!(
                        "{year:04}-{month:02}-{day:02} is outside the supported range"
                    ))
                })?;
                i64::from(date.num_days_from_ce())
            }
            Self::Julian => {
                367 * y - (7 * (y + 5001 + (m - 9) / 7)) / 4 + (275 * m) / 9 + d + 1_729_777
            }
        };
        Ok(number)
    }

    /// Inverse of [`Calendar::day_number`], returning (year, month, day)
    pub fn from_day_number(self, number: i64) -> Result<(i32, u32, u32)> {
        let (year, month, day) = match self {
            Self::Day360 => {
                let year = number.div_euclid(360);
                let rem = number.rem_euclid(360);
                (year, rem / 30 + 1, rem % 30 + 1)
            }
            Self::NoLeap => split_fixed_year(number, 365, &NOLEAP_CUMULATIVE),
            Self::AllLeap => split_fixed_year(number, 366, &ALLLEAP_CUMULATIVE),
            Self::Gregorian => {
                let days = i32::try_from(number).map_err(|_| out_of_range(number))?;
                let date = NaiveDate::from_num_days_from_ce_opt(days)
                    .ok_or_else(|| out_of_range(number))?;
                (
                    i64::from(date.year()),
                    i64::from(date.month()),
                    i64::from(date.day()),
                )
            }
            Self::Julian => {
                let c = number + 32_082;
                let d = (4 * c + 3).div_euclid(1461);
                let e = c - (1461 * d).div_euclid(4);
                let m = (5 * e + 2).div_euclid(153);
                let day = e - (153 * m + 2).div_euclid(5) + 1;
                let month = m + 3 - 12 * (m / 10);
                let year = d - 4800 + m / 10;
                (year, month, day)
            }
        };
        let year = i32::try_from(year).map_err(|_| out_of_range(number))?;
        Ok((year, month as u32, day as u32))
    }

    /// Number of days in a month of this calendar
    pub fn days_in_month(self, year: i32, month: u32) -> u32 {
        const LENGTHS: [u32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
        if !(1..=12).contains(&month) {
            return 0;
        }
        let base = LENGTHS[(month - 1) as usize];
        match self {
            Self::Day360 => 30,
            Self::NoLeap => base,
            Self::AllLeap => {
                if month == 2 {
                    29
                } else {
                    base
                }
            }
            Self::Gregorian | Self::Julian => {
                let leap = match self {
                    Self::Julian => year.rem_euclid(4) == 0,
                    _ => (year % 4 == 0 && year % 100 != 0) || year % 400 == 0,
                };
                if month == 2 && leap {
                    29
                } else {
                    base
                }
            }
        }
    }
}

fn split_fixed_year(number: i64, year_len: i64, cumulative: &[i64; 13]) -> (i64, i64, i64) {
    let year = number.div_euclid(year_len);
    let rem = number.rem_euclid(year_len);
    let month = cumulative.iter().rposition(|&start| start <= rem).unwrap_or(0);
    (year, month as i64 + 1, rem - cumulative[month] + 1)
}

fn out_of_range(number: i64) -> WranglerError {
    WranglerError::UnsupportedCalendar(format!("day number {number} is out of range"))
}

/// Parsed CF `units` attribute of a time coordinate
#[derive(Debug, Clone, PartialEq)]
pub struct TimeUnits {
    /// Length of one unit in seconds
    pub unit_seconds: f64,
    /// Reference date (year, month, day) in the native calendar
    pub epoch: (i32, u32, u32),
    /// Time of day of the reference instant, as a fraction of a day
    pub epoch_day_fraction: f64,
}

impl FromStr for TimeUnits {
    type Err = WranglerError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || WranglerError::UnsupportedCalendar(format!("cannot parse time units '{s}'"));
        let (unit, reference) = s.split_once(" since ").ok_or_else(invalid)?;

        let unit_seconds = match unit.trim().to_ascii_lowercase().as_str() {
            "days" | "day" | "d" => SECONDS_PER_DAY,
            "hours" | "hour" | "h" => 3_600.0,
            "minutes" | "minute" | "min" => 60.0,
            "seconds" | "second" | "s" => 1.0,
            _ => return Err(invalid()),
        };

        let reference = reference.trim().trim_end_matches('Z');
        let (date_part, time_part) = match reference.split_once(['T', ' ']) {
            Some((date, time)) => (date, Some(time.trim())),
            None => (reference, None),
        };

        let mut fields = date_part.split('-');
        let year = fields.next().and_then(|v| v.parse::<i32>().ok()).ok_or_else(invalid)?;
        let month = fields.next().map_or(Some(1), |v| v.parse::<u32>().ok()).ok_or_else(invalid)?;
        let day = fields.next().map_or(Some(1), |v| v.parse::<u32>().ok()).ok_or_else(invalid)?;

        let epoch_day_fraction = match time_part {
            Some(time) if !time.is_empty() => {
                let mut parts = time.split(':');
                let mut seconds = 0.0;
                for scale in [3_600.0, 60.0, 1.0] {
                    if let Some(part) = parts.next() {
                        seconds += part.parse::<f64>().map_err(|_| invalid())? * scale;
                    }
                }
                seconds / SECONDS_PER_DAY
            }
            _ => 0.0,
        };

        Ok(Self {
            unit_seconds,
            epoch: (year, month, day),
            epoch_day_fraction,
        })
    }
}

/// Decode one CF time value into (year, month) of its native calendar
pub fn decode_year_month(value: f64, units: &TimeUnits, calendar: Calendar) -> Result<(i32, u32)> {
    if !value.is_finite() {
        return Err(WranglerError::UnsupportedCalendar(format!(
            "time value {value} cannot be decoded"
        )));
    }
    let (ey, em, ed) = units.epoch;
    let epoch_number = calendar.day_number(ey, em, ed)?;
    let offset_days = value * units.unit_seconds / SECONDS_PER_DAY + units.epoch_day_fraction;
    if offset_days.abs() > MAX_OFFSET_DAYS {
        return Err(WranglerError::UnsupportedCalendar(format!(
            "time value {value} is too far from the reference date"
        )));
    }
    let offset = offset_days.floor() as i64;
    let number = epoch_number
        .checked_add(offset)
        .ok_or_else(|| out_of_range(offset))?;
    let (year, month, _) = calendar.from_day_number(number)?;
    Ok((year, month))
}

/// Day-15 anchor of a month in the proleptic Gregorian calendar
pub fn month_anchor(year: i32, month: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, ANCHOR_DAY).ok_or_else(|| {
        WranglerError::UnsupportedCalendar(format!("{year:04}-{month:02} has no day {ANCHOR_DAY}"))
    })
}

/// Re-anchor a whole CF time axis on the 15th of each month
///
/// Fails on the first value that cannot be reduced to (year, month) rather
/// than dropping it.
pub fn canonicalize_times(values: &[f64], units: &str, calendar: &str) -> Result<Vec<NaiveDate>> {
    let units: TimeUnits = units.parse()?;
    let calendar: Calendar = calendar.parse()?;
    values
        .iter()
        .map(|&value| {
            let (year, month) = decode_year_month(value, &units, calendar)?;
            month_anchor(year, month)
        })
        .collect()
}

/// Convert a decimal-year timestamp (e.g. `1850.041667`) to its month anchor
pub fn decimal_year_anchor(value: f64) -> Result<NaiveDate> {
    if !value.is_finite() {
        return Err(WranglerError::UnsupportedCalendar(format!(
            "decimal year {value} cannot be decoded"
        )));
    }
    let year = value.floor();
    // Small epsilon keeps 1850.0833.. (stored as 1850.08329..) in February
    let month = (((value - year) * 12.0 + 1e-6).floor() as u32 + 1).min(12);
    month_anchor(year as i32, month)
}

fn canonical_epoch() -> NaiveDate {
    let (y, m, d) = CANONICAL_EPOCH;
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
}

/// Encode canonical dates as whole days since [`CANONICAL_EPOCH`]
pub fn encode_days(dates: &[NaiveDate]) -> Vec<f64> {
    let epoch = canonical_epoch();
    dates
        .iter()
        .map(|date| (*date - epoch).num_days() as f64)
        .collect()
}

/// Decode values written by [`encode_days`]
pub fn decode_days(values: &[f64]) -> Result<Vec<NaiveDate>> {
    let epoch = canonical_epoch();
    values
        .iter()
        .map(|&days| {
            if !days.is_finite() || days.fract() != 0.0 {
                return Err(WranglerError::UnsupportedCalendar(format!(
                    "stored time value {days} is not a whole day offset"
                )));
            }
            epoch
                .checked_add_signed(chrono::Duration::days(days as i64))
                .ok_or_else(|| out_of_range(days as i64))
        })
        .collect()
}
