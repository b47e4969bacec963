use tracing::{debug, instrument};

use crate::error::{ScheduleField, ScheduleValidationError};
use crate::models::{DayOfWeek, DaySchedule, ScheduleDraft, SchedulePayload, WeeklySchedule};
use crate::time::TimeOfDay;

type ValidationResult<T> = Result<T, ScheduleValidationError>;

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_field(value: &str, field: ScheduleField) -> ValidationResult<TimeOfDay> {
    value
        .parse()
        .map_err(|_| ScheduleValidationError::InvalidTimeFormat {
            field,
            value: value.to_string(),
        })
}

/// Work window and break rules shared by the single and weekly forms.
pub fn check_windows(
    start: TimeOfDay,
    end: TimeOfDay,
    break_start: Option<TimeOfDay>,
    break_end: Option<TimeOfDay>,
) -> ValidationResult<()> {
    if start >= end {
        return Err(ScheduleValidationError::EndNotAfterStart);
    }

    match (break_start, break_end) {
        (None, None) => Ok(()),
        (Some(_), None) => Err(ScheduleValidationError::IncompleteBreak {
            missing: ScheduleField::BreakEnd,
        }),
        (None, Some(_)) => Err(ScheduleValidationError::IncompleteBreak {
            missing: ScheduleField::BreakStart,
        }),
        (Some(break_start), Some(break_end)) => {
            if break_start >= break_end {
                return Err(ScheduleValidationError::BreakEndNotAfterStart);
            }
            if break_start < start || break_end > end {
                return Err(ScheduleValidationError::BreakOutsideWorkHours);
            }
            Ok(())
        }
    }
}

/// Validates the single-schedule form and turns it into a request body.
#[instrument(skip(draft), fields(day = draft.day_of_week))]
pub fn validate_schedule(draft: &ScheduleDraft) -> ValidationResult<SchedulePayload> {
    let doctor_id = present(&draft.doctor_id).ok_or(ScheduleValidationError::MissingDoctor)?;
    let day = DayOfWeek::try_from(draft.day_of_week)?;

    let start_raw = present(&draft.start_time).ok_or(ScheduleValidationError::MissingStartTime)?;
    let end_raw = present(&draft.end_time).ok_or(ScheduleValidationError::MissingEndTime)?;

    let start = parse_field(start_raw, ScheduleField::StartTime)?;
    let end = parse_field(end_raw, ScheduleField::EndTime)?;

    if start >= end {
        return Err(ScheduleValidationError::EndNotAfterStart);
    }

    // Pairing is checked on presence alone so a lone value is rejected
    // whatever it contains.
    let (break_start, break_end) = match (present(&draft.break_start), present(&draft.break_end)) {
        (None, None) => (None, None),
        (Some(_), None) => {
            return Err(ScheduleValidationError::IncompleteBreak {
                missing: ScheduleField::BreakEnd,
            })
        }
        (None, Some(_)) => {
            return Err(ScheduleValidationError::IncompleteBreak {
                missing: ScheduleField::BreakStart,
            })
        }
        (Some(bs), Some(be)) => (
            Some(parse_field(bs, ScheduleField::BreakStart)?),
            Some(parse_field(be, ScheduleField::BreakEnd)?),
        ),
    };

    check_windows(start, end, break_start, break_end)?;

    debug!("Schedule for {} validated", day.name());

    Ok(SchedulePayload {
        doctor_id: doctor_id.to_string(),
        day_of_week: day.value(),
        start_time: start,
        end_time: end,
        break_start,
        break_end,
        is_available: draft.is_available,
    })
}

pub fn validate_day(day: &DaySchedule) -> ValidationResult<()> {
    check_windows(day.start_time, day.end_time, day.break_start, day.break_end)
}

/// Checks every available day in order and stops at the first failure,
/// naming the day. Unavailable days are not looked at.
#[instrument(skip(week))]
pub fn validate_weekly(week: &WeeklySchedule) -> ValidationResult<()> {
    for day in week.available_days() {
        validate_day(day).map_err(|source| ScheduleValidationError::Day {
            day: day.day_of_week,
            day_name: day.day_of_week.name(),
            source: Box::new(source),
        })?;
    }
    Ok(())
}
