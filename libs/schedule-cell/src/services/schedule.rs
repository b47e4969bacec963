use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use shared_http::ApiClient;
use shared_models::envelope::unwrap_data;
use shared_models::error::ClientError;

use crate::error::{ScheduleError, ScheduleValidationError};
use crate::models::{Schedule, ScheduleDraft, WeeklySchedule};
use crate::services::validation::{validate_schedule, validate_weekly};

/// Doctor availability over `/schedules`. Every write is validated locally
/// first; an invalid form never reaches the backend.
pub struct ScheduleService {
    client: Arc<ApiClient>,
}

impl ScheduleService {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    #[instrument(skip(self))]
    pub async fn get_doctor_schedules(&self, doctor_id: &str) -> Result<Vec<Schedule>, ScheduleError> {
        debug!("Fetching schedules for doctor: {}", doctor_id);

        let path = format!("/schedules/doctor/{}", doctor_id);
        let payload: Value = self.client.get(&path).await?;

        let schedules: Option<Vec<Schedule>> = unwrap_data(payload).map_err(ClientError::from)?;
        Ok(schedules.unwrap_or_default())
    }

    /// Weekly template for the selected doctor: defaults when no doctor is
    /// selected or nothing is stored yet, stored days merged in otherwise.
    pub async fn load_weekly(&self, doctor_id: Option<&str>) -> Result<WeeklySchedule, ScheduleError> {
        let Some(doctor_id) = doctor_id.map(str::trim).filter(|id| !id.is_empty()) else {
            return Ok(WeeklySchedule::default());
        };

        let persisted = self.get_doctor_schedules(doctor_id).await?;
        if persisted.is_empty() {
            debug!("No stored schedule for doctor {}, using defaults", doctor_id);
            return Ok(WeeklySchedule::default());
        }

        Ok(WeeklySchedule::from_persisted(&persisted))
    }

    #[instrument(skip(self, draft))]
    pub async fn create_schedule(&self, draft: &ScheduleDraft) -> Result<Schedule, ScheduleError> {
        let payload = validate_schedule(draft)?;

        let created: Value = self.client.post("/schedules", &payload).await?;
        let schedule: Schedule = unwrap_data(created).map_err(ClientError::from)?;

        info!("Schedule {} created for doctor {}", schedule.id, schedule.doctor_id);
        Ok(schedule)
    }

    #[instrument(skip(self, draft))]
    pub async fn update_schedule(&self, schedule_id: &str, draft: &ScheduleDraft) -> Result<Schedule, ScheduleError> {
        let payload = validate_schedule(draft)?;

        let path = format!("/schedules/{}", schedule_id);
        let updated: Value = self.client.put(&path, &payload).await?;
        let schedule: Schedule = unwrap_data(updated).map_err(ClientError::from)?;

        debug!("Schedule {} updated", schedule.id);
        Ok(schedule)
    }

    #[instrument(skip(self))]
    pub async fn delete_schedule(&self, schedule_id: &str) -> Result<(), ScheduleError> {
        let path = format!("/schedules/{}", schedule_id);
        let _: Value = self.client.delete(&path).await?;

        debug!("Schedule {} deleted", schedule_id);
        Ok(())
    }

    /// Validates the whole week, then sends only the available days in one batch.
    #[instrument(skip(self, week))]
    pub async fn submit_weekly(&self, doctor_id: &str, week: &WeeklySchedule) -> Result<Vec<Schedule>, ScheduleError> {
        let doctor_id = doctor_id.trim();
        if doctor_id.is_empty() {
            return Err(ScheduleValidationError::MissingDoctor.into());
        }

        if let Err(e) = validate_weekly(week) {
            warn!("Weekly schedule rejected for doctor {}: {}", doctor_id, e);
            return Err(e.into());
        }

        let submission = week.to_submission(doctor_id);
        info!(
            "Submitting {} available days for doctor {}",
            submission.schedules.len(),
            doctor_id
        );

        let response: Value = self.client.post("/schedules/bulk", &submission).await?;

        // The bulk endpoint may answer with the stored rows or only a message.
        match unwrap_data::<Option<Vec<Schedule>>>(response) {
            Ok(saved) => Ok(saved.unwrap_or_default()),
            Err(e) => {
                warn!("Unrecognised bulk schedule response: {}", e);
                Ok(Vec::new())
            }
        }
    }
}
