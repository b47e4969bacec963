use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{NaiveTime, Timelike};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

const TIME_FORMAT: &str = "%H:%M";
const TIME_WITH_SECONDS_FORMAT: &str = "%H:%M:%S";

static TIME_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

fn time_pattern() -> Option<&'static Regex> {
    TIME_PATTERN
        .get_or_init(|| Regex::new(r"^([01]?[0-9]|2[0-3]):([0-5][0-9])$").ok())
        .as_ref()
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid time '{0}', expected HH:MM")]
pub struct TimeParseError(pub String);

/// Wall-clock time with minute granularity, `00:00` to `23:59`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(NaiveTime);

impl TimeOfDay {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }

    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    pub fn minute(&self) -> u32 {
        self.0.minute()
    }

    pub fn as_naive_time(&self) -> NaiveTime {
        self.0
    }

    /// Also accepts the `HH:MM:SS` form the backend stores; seconds are dropped.
    pub fn parse_lenient(s: &str) -> Result<Self, TimeParseError> {
        let s = s.trim();
        NaiveTime::parse_from_str(s, TIME_FORMAT)
            .or_else(|_| NaiveTime::parse_from_str(s, TIME_WITH_SECONDS_FORMAT))
            .ok()
            .and_then(|t| Self::new(t.hour(), t.minute()))
            .ok_or_else(|| TimeParseError(s.to_string()))
    }
}

impl From<NaiveTime> for TimeOfDay {
    fn from(time: NaiveTime) -> Self {
        Self::new(time.hour(), time.minute()).unwrap_or_default()
    }
}

impl FromStr for TimeOfDay {
    type Err = TimeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !is_valid_time_format(s) {
            return Err(TimeParseError(s.to_string()));
        }
        NaiveTime::parse_from_str(s, TIME_FORMAT)
            .map(Self)
            .map_err(|_| TimeParseError(s.to_string()))
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(TIME_FORMAT))
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        TimeOfDay::parse_lenient(&raw).map_err(serde::de::Error::custom)
    }
}

/// `H:MM` or `HH:MM`, hours 0-23, minutes 0-59.
pub fn is_valid_time_format(s: &str) -> bool {
    time_pattern().is_some_and(|pattern| pattern.is_match(s))
}

/// Orders two time strings chronologically. `None` when either one is not a
/// valid time; callers check the format first.
pub fn compare_time(a: &str, b: &str) -> Option<Ordering> {
    let a: TimeOfDay = a.parse().ok()?;
    let b: TimeOfDay = b.parse().ok()?;
    Some(a.cmp(&b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_valid_formats() {
        for s in ["09:00", "23:59", "0:00", "9:05", "00:00", "19:30"] {
            assert!(is_valid_time_format(s), "{} should be valid", s);
        }
    }

    #[test]
    fn test_invalid_formats() {
        for s in ["24:00", "9:60", "9-00", "", "9:5", "123:00", " 09:00", "09:00:00", "٠٩:٠٠"] {
            assert!(!is_valid_time_format(s), "{} should be invalid", s);
            assert!(s.parse::<TimeOfDay>().is_err(), "{} should not parse", s);
        }
    }

    #[test]
    fn test_compare_time_orders_chronologically() {
        assert_eq!(compare_time("09:00", "17:00"), Some(Ordering::Less));
        assert_eq!(compare_time("17:00", "09:00"), Some(Ordering::Greater));
        assert_eq!(compare_time("12:30", "12:30"), Some(Ordering::Equal));
        assert_eq!(compare_time("9:00", "09:00"), Some(Ordering::Equal));
        assert_eq!(compare_time("9:59", "10:00"), Some(Ordering::Less));
    }

    #[test]
    fn test_compare_time_total_order_over_all_pairs() {
        let start = NaiveTime::from_hms_opt(0, 0, 0).unwrap();
        let times: Vec<String> = (0..39)
            .map(|i| TimeOfDay::from(start + Duration::minutes(37 * i)).to_string())
            .collect();

        for (i, a) in times.iter().enumerate() {
            assert_eq!(compare_time(a, a), Some(Ordering::Equal));
            for b in &times[i + 1..] {
                assert_eq!(compare_time(a, b), Some(Ordering::Less), "{} < {}", a, b);
                assert_eq!(compare_time(b, a), Some(Ordering::Greater), "{} > {}", b, a);
            }
        }
    }

    #[test]
    fn test_compare_time_malformed() {
        assert_eq!(compare_time("25:00", "09:00"), None);
        assert_eq!(compare_time("09:00", "nine"), None);
    }

    #[test]
    fn test_display_is_zero_padded() {
        let t: TimeOfDay = "7:05".parse().unwrap();
        assert_eq!(t.to_string(), "07:05");
        assert_eq!(t.hour(), 7);
        assert_eq!(t.minute(), 5);
        assert_eq!(t.as_naive_time(), NaiveTime::from_hms_opt(7, 5, 0).unwrap());
    }

    #[test]
    fn test_constructors_reject_out_of_range() {
        assert!(TimeOfDay::new(24, 0).is_none());
        assert!(TimeOfDay::new(23, 60).is_none());
        assert_eq!(TimeOfDay::new(23, 59).map(|t| t.to_string()), Some("23:59".to_string()));
        assert_eq!(TimeOfDay::default().to_string(), "00:00");
    }

    #[test]
    fn test_lenient_parse_drops_seconds() {
        assert_eq!(TimeOfDay::parse_lenient("09:30:00").unwrap().to_string(), "09:30");
        assert_eq!(TimeOfDay::parse_lenient("09:30:45").unwrap(), "09:30".parse().unwrap());
        assert_eq!(TimeOfDay::parse_lenient(" 8:15 ").unwrap().to_string(), "08:15");
        assert!(TimeOfDay::parse_lenient("09:30:61").is_err());
        assert!(TimeOfDay::parse_lenient("").is_err());
        assert!("09:30:00".parse::<TimeOfDay>().is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let t: TimeOfDay = serde_json::from_str("\"13:00:00\"").unwrap();
        assert_eq!(serde_json::to_string(&t).unwrap(), "\"13:00\"");
        assert!(serde_json::from_str::<TimeOfDay>("\"noon\"").is_err());
    }
}
