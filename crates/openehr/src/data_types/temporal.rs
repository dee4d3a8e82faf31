//! ISO 8601 date, time, date-time and duration values.
//!
//! openEHR allows partial dates and times (`2024`, `2024-03`, `10:30`), so these types keep the
//! precision they were written with and only fill in missing components when they are compared.
//! Zoned values are normalised to UTC before comparison; unzoned values are compared as if
//! they were UTC.

use crate::{OpenEhrError, OpenEhrResult};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use std::cmp::Ordering;
use std::fmt;

const SECONDS_PER_DAY: f64 = 86_400.0;
const AVERAGE_DAYS_IN_YEAR: f64 = 365.24;
const AVERAGE_DAYS_IN_MONTH: f64 = 30.42;

macro_rules! string_serde {
    ($ty:ty) => {
        impl serde::Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> serde::Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                <$ty>::parse(&s).map_err(serde::de::Error::custom)
            }
        }

        impl std::str::FromStr for $ty {
            type Err = OpenEhrError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                <$ty>::parse(s)
            }
        }
    };
}

fn parse_digits(raw: &str, len: usize, kind: &str, whole: &str) -> OpenEhrResult<u32> {
    if raw.len() != len || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(OpenEhrError::invalid_value(kind, whole));
    }
    raw.parse::<u32>()
        .map_err(|_| OpenEhrError::invalid_value(kind, whole))
}

/// An ISO 8601 calendar date, possibly partial (`YYYY`, `YYYY-MM`, `YYYY-MM-DD`).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Iso8601Date {
    year: i32,
    month: Option<u32>,
    day: Option<u32>,
}

impl Iso8601Date {
    /// Parses extended (`2024-03-01`), basic (`20240301`) or partial (`2024-03`, `2024`) forms.
    ///
    /// # Errors
    ///
    /// Returns [`OpenEhrError::InvalidValue`] if the text is not a valid ISO 8601 date.
    pub fn parse(raw: &str) -> OpenEhrResult<Self> {
        const KIND: &str = "ISO8601 date";
        let text = raw.trim();

        let (year, month, day) = if text.contains('-') {
            let mut parts = text.split('-');
            let year = parts.next().unwrap_or_default();
            let month = parts.next();
            let day = parts.next();
            if parts.next().is_some() {
                return Err(OpenEhrError::invalid_value(KIND, raw));
            }
            (year, month, day)
        } else if text.len() == 8 {
            (&text[0..4], Some(&text[4..6]), Some(&text[6..8]))
        } else {
            (text, None, None)
        };

        let year = parse_digits(year, 4, KIND, raw)? as i32;
        let month = month.map(|m| parse_digits(m, 2, KIND, raw)).transpose()?;
        let day = day.map(|d| parse_digits(d, 2, KIND, raw)).transpose()?;

        NaiveDate::from_ymd_opt(year, month.unwrap_or(1), day.unwrap_or(1))
            .ok_or_else(|| OpenEhrError::invalid_value(KIND, raw))?;

        Ok(Self { year, month, day })
    }

    /// Today's date (UTC).
    pub fn today() -> Self {
        let now = Utc::now().date_naive();
        Self::from_naive(now)
    }

    pub fn from_naive(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: Some(date.month()),
            day: Some(date.day()),
        }
    }

    /// The date with missing components filled with their minimum.
    pub fn to_naive_date(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month.unwrap_or(1), self.day.unwrap_or(1))
            .unwrap_or(NaiveDate::MIN)
    }

    pub fn is_partial(&self) -> bool {
        self.day.is_none()
    }
}

impl fmt::Display for Iso8601Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.year)?;
        if let Some(month) = self.month {
            write!(f, "-{:02}", month)?;
            if let Some(day) = self.day {
                write!(f, "-{:02}", day)?;
            }
        }
        Ok(())
    }
}

impl PartialOrd for Iso8601Date {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Iso8601Date {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.year, self.month.unwrap_or(0), self.day.unwrap_or(0)).cmp(&(
            other.year,
            other.month.unwrap_or(0),
            other.day.unwrap_or(0),
        ))
    }
}

string_serde!(Iso8601Date);

/// An ISO 8601 time of day, possibly partial (`hh`, `hh:mm`), with optional fraction and zone.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Iso8601Time {
    hour: u32,
    minute: Option<u32>,
    second: Option<u32>,
    fraction: Option<String>,
    offset_seconds: Option<i32>,
}

impl Iso8601Time {
    /// Parses `hh[:mm[:ss[.fff]]][Z|±hh[:mm]]` and the basic `hhmmss` forms.
    ///
    /// # Errors
    ///
    /// Returns [`OpenEhrError::InvalidValue`] if the text is not a valid ISO 8601 time.
    pub fn parse(raw: &str) -> OpenEhrResult<Self> {
        const KIND: &str = "ISO8601 time";
        let text = raw.trim();

        let (body, offset_seconds) = split_zone(text).ok_or_else(|| {
            OpenEhrError::invalid_value(KIND, raw)
        })?;

        let (body, fraction) = match body.split_once(['.', ',']) {
            Some((body, fraction)) => {
                if fraction.is_empty() || !fraction.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(OpenEhrError::invalid_value(KIND, raw));
                }
                (body, Some(fraction.to_string()))
            }
            None => (body, None),
        };

        let parts: Vec<&str> = if body.contains(':') {
            body.split(':').collect()
        } else {
            match body.len() {
                2 => vec![&body[0..2]],
                4 => vec![&body[0..2], &body[2..4]],
                6 => vec![&body[0..2], &body[2..4], &body[4..6]],
                _ => return Err(OpenEhrError::invalid_value(KIND, raw)),
            }
        };
        if parts.is_empty() || parts.len() > 3 {
            return Err(OpenEhrError::invalid_value(KIND, raw));
        }

        let hour = parse_digits(parts[0], 2, KIND, raw)?;
        let minute = parts
            .get(1)
            .map(|m| parse_digits(m, 2, KIND, raw))
            .transpose()?;
        let second = parts
            .get(2)
            .map(|s| parse_digits(s, 2, KIND, raw))
            .transpose()?;

        if fraction.is_some() && second.is_none() {
            return Err(OpenEhrError::invalid_value(KIND, raw));
        }
        if hour > 23 || minute.unwrap_or(0) > 59 || second.unwrap_or(0) > 59 {
            return Err(OpenEhrError::invalid_value(KIND, raw));
        }

        Ok(Self {
            hour,
            minute,
            second,
            fraction,
            offset_seconds,
        })
    }

    /// The current time of day, in UTC.
    pub fn now() -> Self {
        Self::from_naive(Utc::now().time(), Some(0))
    }

    fn from_naive(time: NaiveTime, offset_seconds: Option<i32>) -> Self {
        Self {
            hour: time.hour(),
            minute: Some(time.minute()),
            second: Some(time.second()),
            fraction: None,
            offset_seconds,
        }
    }

    fn nanos(&self) -> u32 {
        let Some(fraction) = &self.fraction else {
            return 0;
        };
        let digits: String = fraction.chars().chain(std::iter::repeat('0')).take(9).collect();
        digits.parse().unwrap_or(0)
    }

    /// The local (unzoned) time with missing components filled with zero.
    pub fn to_naive_time(&self) -> NaiveTime {
        NaiveTime::from_hms_nano_opt(
            self.hour,
            self.minute.unwrap_or(0),
            self.second.unwrap_or(0),
            self.nanos(),
        )
        .unwrap_or(NaiveTime::MIN)
    }

    /// Seconds since midnight, normalised to UTC when a zone is present.
    pub fn seconds_of_day_utc(&self) -> f64 {
        let local = f64::from(self.hour * 3600 + self.minute.unwrap_or(0) * 60)
            + f64::from(self.second.unwrap_or(0))
            + f64::from(self.nanos()) / 1e9;
        local - f64::from(self.offset_seconds.unwrap_or(0))
    }

    pub fn offset_seconds(&self) -> Option<i32> {
        self.offset_seconds
    }
}

fn split_zone(text: &str) -> Option<(&str, Option<i32>)> {
    if let Some(body) = text.strip_suffix('Z') {
        return Some((body, Some(0)));
    }
    // A sign after the hour digits starts a zone designator.
    let sign_at = text
        .char_indices()
        .skip(2)
        .find(|(_, c)| *c == '+' || *c == '-')
        .map(|(i, _)| i);
    let Some(at) = sign_at else {
        return Some((text, None));
    };
    let (body, zone) = text.split_at(at);
    let sign = if zone.starts_with('-') { -1 } else { 1 };
    let digits: String = zone[1..].chars().filter(|c| *c != ':').collect();
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = match digits.len() {
        2 => (digits.parse::<i32>().ok()?, 0),
        4 => (
            digits[0..2].parse::<i32>().ok()?,
            digits[2..4].parse::<i32>().ok()?,
        ),
        _ => return None,
    };
    if hours > 14 || minutes > 59 {
        return None;
    }
    Some((body, Some(sign * (hours * 3600 + minutes * 60))))
}

impl fmt::Display for Iso8601Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.hour)?;
        if let Some(minute) = self.minute {
            write!(f, ":{:02}", minute)?;
            if let Some(second) = self.second {
                write!(f, ":{:02}", second)?;
                if let Some(fraction) = &self.fraction {
                    write!(f, ".{}", fraction)?;
                }
            }
        }
        match self.offset_seconds {
            None => Ok(()),
            Some(0) => write!(f, "Z"),
            Some(offset) => {
                let sign = if offset < 0 { '-' } else { '+' };
                let offset = offset.abs();
                write!(f, "{}{:02}:{:02}", sign, offset / 3600, (offset % 3600) / 60)
            }
        }
    }
}

impl PartialOrd for Iso8601Time {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.seconds_of_day_utc()
            .partial_cmp(&other.seconds_of_day_utc())
    }
}

string_serde!(Iso8601Time);

/// An ISO 8601 date-time; the time part may be partial or absent.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Iso8601DateTime {
    date: Iso8601Date,
    time: Option<Iso8601Time>,
}

impl Iso8601DateTime {
    /// Parses `<date>T<time>` (a space separator is also accepted) or a bare date.
    ///
    /// # Errors
    ///
    /// Returns [`OpenEhrError::InvalidValue`] if either part is malformed.
    pub fn parse(raw: &str) -> OpenEhrResult<Self> {
        const KIND: &str = "ISO8601 date-time";
        let text = raw.trim();
        let (date, time) = match text.split_once(['T', ' ']) {
            Some((date, time)) => (date, Some(time)),
            None => (text, None),
        };

        let date =
            Iso8601Date::parse(date).map_err(|_| OpenEhrError::invalid_value(KIND, raw))?;
        let time = time
            .map(Iso8601Time::parse)
            .transpose()
            .map_err(|_| OpenEhrError::invalid_value(KIND, raw))?;

        if time.is_some() && date.is_partial() {
            return Err(OpenEhrError::invalid_value(KIND, raw));
        }

        Ok(Self { date, time })
    }

    /// The current instant, in UTC.
    pub fn now() -> Self {
        let now = Utc::now().naive_utc();
        Self {
            date: Iso8601Date::from_naive(now.date()),
            time: Some(Iso8601Time::from_naive(now.time(), Some(0))),
        }
    }

    /// The instant in UTC, with missing components filled with their minimum.
    pub fn to_utc_naive(&self) -> NaiveDateTime {
        let date = self.date.to_naive_date();
        match &self.time {
            None => date.and_time(NaiveTime::MIN),
            Some(time) => {
                let local = date.and_time(time.to_naive_time());
                local - chrono::Duration::seconds(i64::from(time.offset_seconds().unwrap_or(0)))
            }
        }
    }

    /// Adds a duration, producing an unzoned (UTC) date-time.
    pub fn add(&self, duration: &Iso8601Duration) -> Self {
        let millis = (duration.total_seconds() * 1000.0).round() as i64;
        let instant = self.to_utc_naive() + chrono::Duration::milliseconds(millis);
        Self {
            date: Iso8601Date::from_naive(instant.date()),
            time: Some(Iso8601Time::from_naive(instant.time(), Some(0))),
        }
    }

    /// The elapsed time from `earlier` to `self`.
    pub fn since(&self, earlier: &Iso8601DateTime) -> Iso8601Duration {
        let delta = self.to_utc_naive() - earlier.to_utc_naive();
        Iso8601Duration::from_seconds(delta.num_seconds())
    }
}

impl fmt::Display for Iso8601DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.date)?;
        if let Some(time) = &self.time {
            write!(f, "T{}", time)?;
        }
        Ok(())
    }
}

impl PartialOrd for Iso8601DateTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.to_utc_naive().cmp(&other.to_utc_naive()))
    }
}

string_serde!(Iso8601DateTime);

/// An ISO 8601 duration (`P1Y2M3W4DT5H6M7.5S`, optionally negated with a leading `-`).
///
/// Durations compare by their total length in seconds, using the openEHR average year and
/// month lengths for the nominal components.
#[derive(Clone, Debug, Default)]
pub struct Iso8601Duration {
    negative: bool,
    years: u64,
    months: u64,
    weeks: u64,
    days: u64,
    hours: u64,
    minutes: u64,
    seconds: f64,
}

impl Iso8601Duration {
    /// # Errors
    ///
    /// Returns [`OpenEhrError::InvalidValue`] if the text is not a valid ISO 8601 duration.
    pub fn parse(raw: &str) -> OpenEhrResult<Self> {
        const KIND: &str = "ISO8601 duration";
        let invalid = || OpenEhrError::invalid_value(KIND, raw);

        let text = raw.trim();
        let (negative, text) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let text = text.strip_prefix('P').ok_or_else(invalid)?;

        let mut duration = Self {
            negative,
            ..Self::default()
        };
        let mut in_time = false;
        let mut number = String::new();
        let mut seen_component = false;
        let mut seen_time_component = false;

        for c in text.chars() {
            match c {
                '0'..='9' | '.' | ',' => number.push(if c == ',' { '.' } else { c }),
                'T' if !in_time && number.is_empty() => in_time = true,
                designator => {
                    if number.is_empty() {
                        return Err(invalid());
                    }
                    let is_fractional = number.contains('.');
                    if is_fractional && !(in_time && designator == 'S') {
                        return Err(invalid());
                    }
                    let whole = || number.parse::<u64>().map_err(|_| invalid());
                    match (in_time, designator) {
                        (false, 'Y') => duration.years = whole()?,
                        (false, 'M') => duration.months = whole()?,
                        (false, 'W') => duration.weeks = whole()?,
                        (false, 'D') => duration.days = whole()?,
                        (true, 'H') => duration.hours = whole()?,
                        (true, 'M') => duration.minutes = whole()?,
                        (true, 'S') => {
                            duration.seconds = number.parse::<f64>().map_err(|_| invalid())?
                        }
                        _ => return Err(invalid()),
                    }
                    seen_component = true;
                    seen_time_component |= in_time;
                    number.clear();
                }
            }
        }

        if !number.is_empty() || !seen_component || (in_time && !seen_time_component) {
            return Err(invalid());
        }
        Ok(duration)
    }

    /// A duration of exactly `seconds` seconds, expressed in days, hours, minutes and seconds.
    pub fn from_seconds(seconds: i64) -> Self {
        let negative = seconds < 0;
        let mut remaining = seconds.unsigned_abs();
        let days = remaining / 86_400;
        remaining %= 86_400;
        let hours = remaining / 3_600;
        remaining %= 3_600;
        let minutes = remaining / 60;
        let seconds = (remaining % 60) as f64;
        Self {
            negative,
            days,
            hours,
            minutes,
            seconds,
            ..Self::default()
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn total_seconds(&self) -> f64 {
        let days = self.years as f64 * AVERAGE_DAYS_IN_YEAR
            + self.months as f64 * AVERAGE_DAYS_IN_MONTH
            + (self.weeks * 7 + self.days) as f64;
        let total = days * SECONDS_PER_DAY
            + (self.hours * 3_600 + self.minutes * 60) as f64
            + self.seconds;
        if self.negative {
            -total
        } else {
            total
        }
    }
}

impl fmt::Display for Iso8601Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            write!(f, "-")?;
        }
        write!(f, "P")?;
        for (amount, designator) in [
            (self.years, 'Y'),
            (self.months, 'M'),
            (self.weeks, 'W'),
            (self.days, 'D'),
        ] {
            if amount > 0 {
                write!(f, "{amount}{designator}")?;
            }
        }
        let has_time = self.hours > 0 || self.minutes > 0 || self.seconds > 0.0;
        let is_empty =
            self.years + self.months + self.weeks + self.days == 0 && !has_time;
        if has_time || is_empty {
            write!(f, "T")?;
            if self.hours > 0 {
                write!(f, "{}H", self.hours)?;
            }
            if self.minutes > 0 {
                write!(f, "{}M", self.minutes)?;
            }
            if self.seconds > 0.0 || is_empty {
                write!(f, "{}S", self.seconds)?;
            }
        }
        Ok(())
    }
}

impl PartialEq for Iso8601Duration {
    fn eq(&self, other: &Self) -> bool {
        self.total_seconds() == other.total_seconds()
    }
}

impl PartialOrd for Iso8601Duration {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.total_seconds().partial_cmp(&other.total_seconds())
    }
}

string_serde!(Iso8601Duration);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_dates_keep_their_precision() {
        let date = Iso8601Date::parse("2024-03").expect("partial date");
        assert!(date.is_partial());
        assert_eq!(date.to_string(), "2024-03");
        assert!(Iso8601Date::parse("2024-02-30").is_err());
        assert_eq!(
            Iso8601Date::parse("20240301").expect("basic form").to_string(),
            "2024-03-01"
        );
    }

    #[test]
    fn zoned_date_times_compare_in_utc() {
        let london = Iso8601DateTime::parse("2024-03-01T10:00:00Z").expect("valid");
        let paris = Iso8601DateTime::parse("2024-03-01T10:30:00+01:00").expect("valid");
        assert!(paris < london);
        assert_eq!(paris.to_string(), "2024-03-01T10:30:00+01:00");
    }

    #[test]
    fn times_accept_fractions_and_reject_out_of_range() {
        let time = Iso8601Time::parse("08:15:30.250").expect("valid time");
        assert_eq!(time.to_string(), "08:15:30.250");
        assert!(Iso8601Time::parse("24:00").is_err());
        assert!(Iso8601Time::parse("08:15.5").is_err());
    }

    #[test]
    fn durations_compare_by_length() {
        let minute = Iso8601Duration::parse("PT60S").expect("valid");
        let also_minute = Iso8601Duration::parse("PT1M").expect("valid");
        assert_eq!(minute, also_minute);
        assert!(Iso8601Duration::parse("P1D").expect("valid") > minute);
        assert!(Iso8601Duration::parse("-PT1S").expect("valid") < Iso8601Duration::zero());
    }

    #[test]
    fn rejects_malformed_durations() {
        for raw in ["P", "PT", "1D", "P1.5D", "P1S", "PT1D"] {
            assert!(Iso8601Duration::parse(raw).is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn elapsed_time_between_date_times() {
        let origin = Iso8601DateTime::parse("2024-03-01T10:00:00Z").expect("valid");
        let later = Iso8601DateTime::parse("2024-03-01T11:30:05Z").expect("valid");
        let offset = later.since(&origin);
        assert_eq!(offset.to_string(), "PT1H30M5S");
        assert_eq!(origin.add(&offset), later);
    }

    #[test]
    fn zero_duration_displays_canonically() {
        assert_eq!(Iso8601Duration::zero().to_string(), "PT0S");
        assert_eq!(Iso8601Duration::from_seconds(90_061).to_string(), "P1DT1H1M1S");
    }
}
