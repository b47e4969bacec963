pub mod schedule;
pub mod validation;

pub use schedule::ScheduleService;
pub use validation::{check_windows, validate_day, validate_schedule, validate_weekly};
