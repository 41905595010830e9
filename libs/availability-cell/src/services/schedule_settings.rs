use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::error::AvailabilityError;
use crate::models::OrganisationSchedule;

/// Read-side access to the per-organisation scheduling prerequisites:
/// the configured week-start day and IANA timezone. Organisation CRUD
/// itself lives outside this cell; availability resolution only consumes
/// these two fields.
pub struct ScheduleSettingsService {
    supabase: SupabaseClient,
}

impl ScheduleSettingsService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn get(
        &self,
        organisation_id: Uuid,
        auth_token: &str,
    ) -> Result<OrganisationSchedule, AvailabilityError> {
        debug!("Fetching schedule settings for organisation {}", organisation_id);

        let path = format!(
            "/rest/v1/organisation_schedules?organisation_id=eq.{}",
            organisation_id
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        let row = result
            .into_iter()
            .next()
            .ok_or(AvailabilityError::ScheduleNotConfigured(organisation_id))?;

        let schedule: OrganisationSchedule = serde_json::from_value(row)?;
        Ok(schedule)
    }
}
