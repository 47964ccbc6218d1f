//! Decoding of raw time coordinate values into calendar dates.
//!
//! Decoding is best-effort enrichment: [`decode_time`] returns `None`
//! when the units or calendar cannot be understood, and callers keep the
//! raw values without date columns.

use anyhow::{Result, anyhow, bail};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use log::debug;

/// Units token for Julian Day Numbers
pub const JULIAN_DAY_UNITS: &str = "julian_day";

/// Day 0 of the Julian Day Number system, counted from 1970-01-01
pub const JULIAN_DAY_EPOCH_OFFSET: i64 = -2_440_588;

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Decoded values of a time coordinate, one entry per raw value
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTime {
    pub dates: Vec<NaiveDate>,
    /// Full timestamps; absent for day-resolution encodings such as `julian_day`
    pub datetimes: Option<Vec<NaiveDateTime>>,
}

/// Converts raw offsets with CF-style units into absolute timestamps.
pub trait CalendarDecoder {
    fn decode(&self, raw: &[f64], units: &str, calendar: Option<&str>) -> Result<Vec<NaiveDateTime>>;
}

/// Decode raw time values, returning `None` when they cannot be decoded.
pub fn decode_time(
    raw: &[f64],
    units: Option<&str>,
    calendar: Option<&str>,
    decoder: &dyn CalendarDecoder,
) -> Option<DecodedTime> {
    let units = units?.trim();

    let decoded = if units == JULIAN_DAY_UNITS {
        decode_julian_days(raw).map(|dates| DecodedTime {
            dates,
            datetimes: None,
        })
    } else {
        decoder.decode(raw, units, calendar).map(|datetimes| DecodedTime {
            dates: datetimes.iter().map(NaiveDateTime::date).collect(),
            datetimes: Some(datetimes),
        })
    };

    match decoded {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            debug!("keeping raw time values, decoding '{}' failed: {:#}", units, e);
            None
        }
    }
}

/// Julian Day Numbers to dates; fractional days are floored.
pub fn decode_julian_days(raw: &[f64]) -> Result<Vec<NaiveDate>> {
    raw.iter()
        .map(|&value| {
            if !value.is_finite() || value.abs() > 1e9 {
                bail!("julian day {} is not a usable day number", value);
            }
            let days = value.floor() as i64 + JULIAN_DAY_EPOCH_OFFSET;
            unix_epoch()
                .checked_add_signed(TimeDelta::days(days))
                .ok_or_else(|| anyhow!("julian day {} is out of range", value))
        })
        .collect()
}

/// Days since 1970-01-01, the numeric form of a date in boundaries
pub fn days_since_epoch(date: NaiveDate) -> f64 {
    (date - unix_epoch()).num_days() as f64
}

fn unix_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).expect("1970-01-01 is a valid date")
}

/// Calendars understood by [`CfCalendar`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Calendar {
    /// `standard`, `gregorian`, `proleptic_gregorian`; treated as proleptic Gregorian
    Gregorian,
    /// `noleap`, `365_day`
    NoLeap,
    /// `all_leap`, `366_day`
    AllLeap,
    /// `360_day`
    Day360,
}

impl Calendar {
    pub fn parse(name: &str) -> Result<Calendar> {
        match name.trim().to_ascii_lowercase().as_str() {
            "standard" | "gregorian" | "proleptic_gregorian" => Ok(Calendar::Gregorian),
            "noleap" | "365_day" => Ok(Calendar::NoLeap),
            "all_leap" | "366_day" => Ok(Calendar::AllLeap),
            "360_day" => Ok(Calendar::Day360),
            other => Err(anyhow!("unsupported calendar '{}'", other)),
        }
    }

    fn month_lengths(self) -> [i64; 12] {
        match self {
            Calendar::Day360 => [30; 12],
            Calendar::AllLeap => [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31],
            _ => [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31],
        }
    }

    fn year_length(self) -> i64 {
        self.month_lengths().iter().sum()
    }

    /// Day number of a date in a fixed-length-year calendar
    fn day_number(self, year: i32, month: u32, day: u32) -> i64 {
        let before: i64 = self.month_lengths()[..(month as usize - 1)].iter().sum();
        year as i64 * self.year_length() + before + day as i64 - 1
    }

    fn from_day_number(self, days: i64) -> (i32, u32, u32) {
        let year = days.div_euclid(self.year_length());
        let mut rest = days.rem_euclid(self.year_length());
        let mut month = 1;
        for len in self.month_lengths() {
            if rest < len {
                break;
            }
            rest -= len;
            month += 1;
        }
        (year as i32, month, rest as u32 + 1)
    }
}

/// Decoder for CF `<unit> since <reference>` time units
#[derive(Debug, Clone, Copy, Default)]
pub struct CfCalendar;

impl CalendarDecoder for CfCalendar {
    fn decode(&self, raw: &[f64], units: &str, calendar: Option<&str>) -> Result<Vec<NaiveDateTime>> {
        let calendar = Calendar::parse(calendar.unwrap_or("standard"))?;
        let (unit_millis, reference) = parse_time_units(units)?;

        raw.iter()
            .map(|&value| {
                if !value.is_finite() {
                    bail!("non-finite time value {}", value);
                }
                let offset = (value * unit_millis).round();
                if offset.abs() > i64::MAX as f64 / 2.0 {
                    bail!("time value {} is out of range", value);
                }
                apply_offset(calendar, reference, offset as i64)
            })
            .collect()
    }
}

fn apply_offset(calendar: Calendar, reference: NaiveDateTime, offset_ms: i64) -> Result<NaiveDateTime> {
    let out_of_range = || anyhow!("offset of {} ms from {} is out of range", offset_ms, reference);

    if calendar == Calendar::Gregorian {
        return reference
            .checked_add_signed(TimeDelta::milliseconds(offset_ms))
            .ok_or_else(out_of_range);
    }

    let date = reference.date();
    let reference_ms = calendar.day_number(date.year(), date.month(), date.day()) * MILLIS_PER_DAY
        + reference.time().signed_duration_since(NaiveTime::MIN).num_milliseconds();
    let total = reference_ms.checked_add(offset_ms).ok_or_else(out_of_range)?;

    let (year, month, day) = calendar.from_day_number(total.div_euclid(MILLIS_PER_DAY));
    let time = NaiveTime::MIN + TimeDelta::milliseconds(total.rem_euclid(MILLIS_PER_DAY));

    // Days missing from the Gregorian calendar (360_day Feb 30) clamp to month end
    let day = day.min(gregorian_month_length(year, month));
    let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(out_of_range)?;
    Ok(date.and_time(time))
}

fn gregorian_month_length(year: i32, month: u32) -> u32 {
    match month {
        2 if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

/// Split `<unit> since <reference>` into milliseconds per unit and the reference time
pub fn parse_time_units(units: &str) -> Result<(f64, NaiveDateTime)> {
    let lower = units.trim().to_ascii_lowercase();
    let (unit, reference) = lower
        .split_once(" since ")
        .ok_or_else(|| anyhow!("time units '{}' are not of the form '<unit> since <date>'", units))?;

    let unit_millis = match unit.trim() {
        "milliseconds" | "millisecond" | "msec" | "ms" => 1.0,
        "seconds" | "second" | "secs" | "sec" | "s" => 1_000.0,
        "minutes" | "minute" | "mins" | "min" => 60_000.0,
        "hours" | "hour" | "hrs" | "hr" | "h" => 3_600_000.0,
        "days" | "day" | "d" => MILLIS_PER_DAY as f64,
        "weeks" | "week" => 7.0 * MILLIS_PER_DAY as f64,
        other => bail!("unsupported time unit '{}'", other),
    };

    Ok((unit_millis, parse_reference(reference.trim())?))
}

fn parse_reference(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim_end_matches(" utc").trim_end_matches('z').trim();
    let (date_part, time_part) = match s.split_once(['t', ' ']) {
        Some((d, t)) => (d, t.trim()),
        None => (s, ""),
    };

    let fields: Vec<&str> = date_part.split('-').collect();
    let [year, month, day] = fields.as_slice() else {
        bail!("reference date '{}' is not YYYY-MM-DD", date_part);
    };
    let date = NaiveDate::from_ymd_opt(year.parse()?, month.parse()?, day.parse()?)
        .ok_or_else(|| anyhow!("reference date '{}' does not exist", date_part))?;

    // Drop any trailing zone offset such as "+00:00" or " 0:00"
    let clock = time_part.split([' ', '+']).next().unwrap_or("");
    if clock.is_empty() {
        return Ok(date.and_time(NaiveTime::MIN));
    }

    let parts: Vec<&str> = clock.split(':').collect();
    let hour: u32 = parts[0].parse()?;
    let minute: u32 = parts.get(1).map(|m| m.parse()).transpose()?.unwrap_or(0);
    let seconds: f64 = parts.get(2).map(|s| s.parse()).transpose()?.unwrap_or(0.0);
    let time = NaiveTime::from_hms_milli_opt(
        hour,
        minute,
        seconds.trunc() as u32,
        (seconds.fract() * 1000.0).round() as u32,
    )
    .ok_or_else(|| anyhow!("reference time '{}' is invalid", clock))?;

    Ok(date.and_time(time))
}
