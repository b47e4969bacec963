use serde::{Deserialize, Serialize};
use tracing::warn;

use shared_models::ids::string_or_number;

use crate::error::InvalidDayOfWeek;
use crate::time::TimeOfDay;

pub const DAY_NAMES: [&str; 7] = [
    "Domingo", "Lunes", "Martes", "Miércoles", "Jueves", "Viernes", "Sábado",
];

pub const DAY_SHORT_NAMES: [&str; 7] = ["Dom", "Lun", "Mar", "Mié", "Jue", "Vie", "Sáb"];

/// Display name for `0` (Sunday) to `6` (Saturday); empty outside that range.
pub fn day_name(day_of_week: i32) -> &'static str {
    usize::try_from(day_of_week)
        .ok()
        .and_then(|i| DAY_NAMES.get(i))
        .copied()
        .unwrap_or("")
}

pub fn day_short_name(day_of_week: i32) -> &'static str {
    usize::try_from(day_of_week)
        .ok()
        .and_then(|i| DAY_SHORT_NAMES.get(i))
        .copied()
        .unwrap_or("")
}

/// 0 = Sunday, 1 = Monday, ... 6 = Saturday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct DayOfWeek(u8);

impl DayOfWeek {
    pub const SUNDAY: DayOfWeek = DayOfWeek(0);
    pub const MONDAY: DayOfWeek = DayOfWeek(1);
    pub const TUESDAY: DayOfWeek = DayOfWeek(2);
    pub const WEDNESDAY: DayOfWeek = DayOfWeek(3);
    pub const THURSDAY: DayOfWeek = DayOfWeek(4);
    pub const FRIDAY: DayOfWeek = DayOfWeek(5);
    pub const SATURDAY: DayOfWeek = DayOfWeek(6);

    pub fn all() -> impl Iterator<Item = DayOfWeek> {
        (0..7u8).map(DayOfWeek)
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }

    pub fn value(&self) -> i32 {
        self.0 as i32
    }

    pub fn name(&self) -> &'static str {
        DAY_NAMES[self.index()]
    }

    pub fn short_name(&self) -> &'static str {
        DAY_SHORT_NAMES[self.index()]
    }

    pub fn is_weekend(&self) -> bool {
        *self == DayOfWeek::SUNDAY || *self == DayOfWeek::SATURDAY
    }
}

impl TryFrom<i32> for DayOfWeek {
    type Error = InvalidDayOfWeek;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match u8::try_from(value) {
            Ok(day) if day < 7 => Ok(DayOfWeek(day)),
            _ => Err(InvalidDayOfWeek(value)),
        }
    }
}

impl From<DayOfWeek> for i32 {
    fn from(day: DayOfWeek) -> Self {
        day.value()
    }
}

/// One weekday's availability window plus optional break.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "DayScheduleWire")]
pub struct DaySchedule {
    pub day_of_week: DayOfWeek,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    pub is_available: bool,
    pub break_start: Option<TimeOfDay>,
    pub break_end: Option<TimeOfDay>,
}

impl DaySchedule {
    /// 09:00-17:00 with a 12:00-13:00 break, available Monday to Friday.
    pub fn default_for(day: DayOfWeek) -> Self {
        Self {
            day_of_week: day,
            start_time: hm(9, 0),
            end_time: hm(17, 0),
            is_available: !day.is_weekend(),
            break_start: Some(hm(12, 0)),
            break_end: Some(hm(13, 0)),
        }
    }

    pub fn has_break(&self) -> bool {
        self.break_start.is_some() && self.break_end.is_some()
    }

    pub fn to_payload(&self, doctor_id: &str) -> SchedulePayload {
        SchedulePayload {
            doctor_id: doctor_id.to_string(),
            day_of_week: self.day_of_week.value(),
            start_time: self.start_time,
            end_time: self.end_time,
            break_start: self.break_start,
            break_end: self.break_end,
            is_available: self.is_available,
        }
    }
}

fn hm(hour: u32, minute: u32) -> TimeOfDay {
    TimeOfDay::new(hour, minute).unwrap_or_default()
}

/// Time fields of a day entry as received. Blank strings count as missing.
struct RawWindow {
    start_time: Option<String>,
    end_time: Option<String>,
    break_start: Option<String>,
    break_end: Option<String>,
}

struct Window {
    start_time: TimeOfDay,
    end_time: TimeOfDay,
    break_start: Option<TimeOfDay>,
    break_end: Option<TimeOfDay>,
}

impl RawWindow {
    /// An available day needs a valid start and end. An unavailable day keeps
    /// whatever parses and falls back to 09:00-17:00 with no break.
    fn resolve(self, is_available: bool) -> Result<Window, String> {
        let parse = |field: &str, value: Option<String>| -> Result<Option<TimeOfDay>, String> {
            let Some(value) = value.filter(|v| !v.trim().is_empty()) else {
                return Ok(None);
            };
            match TimeOfDay::parse_lenient(&value) {
                Ok(time) => Ok(Some(time)),
                Err(e) if is_available => Err(format!("{}: {}", field, e)),
                Err(_) => Ok(None),
            }
        };
        let required = |field: &str, time: Option<TimeOfDay>, fallback: TimeOfDay| match time {
            Some(time) => Ok(time),
            None if is_available => Err(format!("{} is required on an available day", field)),
            None => Ok(fallback),
        };

        let start_time = parse("startTime", self.start_time)?;
        let end_time = parse("endTime", self.end_time)?;
        Ok(Window {
            start_time: required("startTime", start_time, hm(9, 0))?,
            end_time: required("endTime", end_time, hm(17, 0))?,
            break_start: parse("breakStart", self.break_start)?,
            break_end: parse("breakEnd", self.break_end)?,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DayScheduleWire {
    day_of_week: DayOfWeek,
    #[serde(default)]
    start_time: Option<String>,
    #[serde(default)]
    end_time: Option<String>,
    is_available: bool,
    #[serde(default)]
    break_start: Option<String>,
    #[serde(default)]
    break_end: Option<String>,
}

impl TryFrom<DayScheduleWire> for DaySchedule {
    type Error = String;

    fn try_from(wire: DayScheduleWire) -> Result<Self, Self::Error> {
        let window = RawWindow {
            start_time: wire.start_time,
            end_time: wire.end_time,
            break_start: wire.break_start,
            break_end: wire.break_end,
        }
        .resolve(wire.is_available)?;

        Ok(Self {
            day_of_week: wire.day_of_week,
            start_time: window.start_time,
            end_time: window.end_time,
            is_available: wire.is_available,
            break_start: window.break_start,
            break_end: window.break_end,
        })
    }
}

/// A schedule entry as the backend stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "ScheduleWire")]
pub struct Schedule {
    pub id: String,
    pub doctor_id: String,
    pub day_of_week: i32,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    pub break_start: Option<TimeOfDay>,
    pub break_end: Option<TimeOfDay>,
    pub is_available: bool,
}

fn default_available() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleWire {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    #[serde(deserialize_with = "string_or_number")]
    doctor_id: String,
    day_of_week: i32,
    #[serde(default)]
    start_time: Option<String>,
    #[serde(default)]
    end_time: Option<String>,
    #[serde(default)]
    break_start: Option<String>,
    #[serde(default)]
    break_end: Option<String>,
    #[serde(default = "default_available")]
    is_available: bool,
}

impl TryFrom<ScheduleWire> for Schedule {
    type Error = String;

    fn try_from(wire: ScheduleWire) -> Result<Self, Self::Error> {
        let window = RawWindow {
            start_time: wire.start_time,
            end_time: wire.end_time,
            break_start: wire.break_start,
            break_end: wire.break_end,
        }
        .resolve(wire.is_available)
        .map_err(|e| format!("schedule {}: {}", wire.id, e))?;

        Ok(Self {
            id: wire.id,
            doctor_id: wire.doctor_id,
            day_of_week: wire.day_of_week,
            start_time: window.start_time,
            end_time: window.end_time,
            break_start: window.break_start,
            break_end: window.break_end,
            is_available: wire.is_available,
        })
    }
}

impl Schedule {
    pub fn to_day_schedule(&self) -> Result<DaySchedule, InvalidDayOfWeek> {
        Ok(DaySchedule {
            day_of_week: DayOfWeek::try_from(self.day_of_week)?,
            start_time: self.start_time,
            end_time: self.end_time,
            is_available: self.is_available,
            break_start: self.break_start,
            break_end: self.break_end,
        })
    }
}

/// Raw values of the single-schedule form, before validation. Blank strings
/// count as missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleDraft {
    pub doctor_id: Option<String>,
    pub day_of_week: i32,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub break_start: Option<String>,
    pub break_end: Option<String>,
    pub is_available: bool,
}

/// Body sent to the backend for one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulePayload {
    pub doctor_id: String,
    pub day_of_week: i32,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    pub break_start: Option<TimeOfDay>,
    pub break_end: Option<TimeOfDay>,
    pub is_available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklySubmission {
    pub schedules: Vec<SchedulePayload>,
}

/// The seven-day availability template of one doctor. Slot `i` always holds
/// day `i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<DaySchedule>", into = "Vec<DaySchedule>")]
pub struct WeeklySchedule {
    days: [DaySchedule; 7],
}

impl Default for WeeklySchedule {
    fn default() -> Self {
        Self {
            days: std::array::from_fn(|i| DaySchedule::default_for(DayOfWeek(i as u8))),
        }
    }
}

impl WeeklySchedule {
    /// Persisted entries laid over the defaults, keyed by day of week.
    pub fn from_persisted(entries: &[Schedule]) -> Self {
        let mut week = Self::default();
        for entry in entries {
            match entry.to_day_schedule() {
                Ok(day) => week.set(day),
                Err(e) => warn!("Skipping persisted schedule {}: {}", entry.id, e),
            }
        }
        week
    }

    pub fn day(&self, day: DayOfWeek) -> &DaySchedule {
        &self.days[day.index()]
    }

    pub fn day_mut(&mut self, day: DayOfWeek) -> &mut DaySchedule {
        &mut self.days[day.index()]
    }

    /// Replaces the slot for `day.day_of_week`.
    pub fn set(&mut self, day: DaySchedule) {
        let index = day.day_of_week.index();
        self.days[index] = day;
    }

    pub fn days(&self) -> &[DaySchedule; 7] {
        &self.days
    }

    pub fn iter(&self) -> impl Iterator<Item = &DaySchedule> {
        self.days.iter()
    }

    pub fn available_days(&self) -> impl Iterator<Item = &DaySchedule> {
        self.days.iter().filter(|d| d.is_available)
    }

    /// Back to defaults, as on cancel or when another doctor is selected.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Submission body carrying only the available days.
    pub fn to_submission(&self, doctor_id: &str) -> WeeklySubmission {
        WeeklySubmission {
            schedules: self
                .available_days()
                .map(|d| d.to_payload(doctor_id))
                .collect(),
        }
    }
}

impl From<Vec<DaySchedule>> for WeeklySchedule {
    fn from(days: Vec<DaySchedule>) -> Self {
        let mut week = Self::default();
        for day in days {
            week.set(day);
        }
        week
    }
}

impl From<WeeklySchedule> for Vec<DaySchedule> {
    fn from(week: WeeklySchedule) -> Self {
        week.days.into_iter().collect()
    }
}
