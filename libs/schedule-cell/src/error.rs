use std::fmt;

use thiserror::Error;

use shared_models::error::ClientError;

use crate::models::DayOfWeek;

/// Form field a validation error belongs to, named as the API names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScheduleField {
    DoctorId,
    DayOfWeek,
    StartTime,
    EndTime,
    BreakStart,
    BreakEnd,
}

impl ScheduleField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleField::DoctorId => "doctorId",
            ScheduleField::DayOfWeek => "dayOfWeek",
            ScheduleField::StartTime => "startTime",
            ScheduleField::EndTime => "endTime",
            ScheduleField::BreakStart => "breakStart",
            ScheduleField::BreakEnd => "breakEnd",
        }
    }
}

impl fmt::Display for ScheduleField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("day of week must be between 0 (Sunday) and 6 (Saturday), got {0}")]
pub struct InvalidDayOfWeek(pub i32);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleValidationError {
    #[error("A doctor must be selected")]
    MissingDoctor,

    #[error("Start time is required")]
    MissingStartTime,

    #[error("End time is required")]
    MissingEndTime,

    #[error("Invalid time '{value}' for {field}, expected HH:MM")]
    InvalidTimeFormat { field: ScheduleField, value: String },

    #[error(transparent)]
    InvalidDay(#[from] InvalidDayOfWeek),

    #[error("End time must be after start time")]
    EndNotAfterStart,

    #[error("Break start and break end must be given together")]
    IncompleteBreak { missing: ScheduleField },

    #[error("Break end must be after break start")]
    BreakEndNotAfterStart,

    #[error("Break must fall within working hours")]
    BreakOutsideWorkHours,

    #[error("{day_name}: {source}")]
    Day {
        day: DayOfWeek,
        day_name: &'static str,
        source: Box<ScheduleValidationError>,
    },
}

impl ScheduleValidationError {
    /// The field the error should be rendered next to.
    pub fn field(&self) -> ScheduleField {
        match self {
            ScheduleValidationError::MissingDoctor => ScheduleField::DoctorId,
            ScheduleValidationError::MissingStartTime => ScheduleField::StartTime,
            ScheduleValidationError::MissingEndTime => ScheduleField::EndTime,
            ScheduleValidationError::InvalidTimeFormat { field, .. } => *field,
            ScheduleValidationError::InvalidDay(_) => ScheduleField::DayOfWeek,
            ScheduleValidationError::EndNotAfterStart => ScheduleField::EndTime,
            ScheduleValidationError::IncompleteBreak { missing } => *missing,
            ScheduleValidationError::BreakEndNotAfterStart => ScheduleField::BreakEnd,
            ScheduleValidationError::BreakOutsideWorkHours => ScheduleField::BreakStart,
            ScheduleValidationError::Day { source, .. } => source.field(),
        }
    }

    /// Day a weekly validation failed on.
    pub fn day(&self) -> Option<DayOfWeek> {
        match self {
            ScheduleValidationError::Day { day, .. } => Some(*day),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Validation error: {0}")]
    Validation(#[from] ScheduleValidationError),

    #[error(transparent)]
    Client(#[from] ClientError),
}
