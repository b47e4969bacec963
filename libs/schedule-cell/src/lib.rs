pub mod error;
pub mod models;
pub mod services;
pub mod time;

pub use error::{InvalidDayOfWeek, ScheduleError, ScheduleField, ScheduleValidationError};
pub use models::*;
pub use services::*;
pub use time::{compare_time, is_valid_time_format, TimeOfDay, TimeParseError};
