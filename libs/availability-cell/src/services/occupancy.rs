use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::error::AvailabilityError;
use crate::models::{Occupancy, OccupancyInput};

/// Store for concrete busy intervals. Records may overlap in time; the
/// resolver unions them. Invalidation of cancelled sources belongs to the
/// booking workflow, so this store exposes create and read only.
pub struct OccupancyService {
    supabase: SupabaseClient,
}

impl OccupancyService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    fn validate(input: &OccupancyInput) -> Result<(), AvailabilityError> {
        if input.start_time >= input.end_time {
            return Err(AvailabilityError::InvalidRange(format!(
                "occupancy start {} must be before end {}",
                input.start_time, input.end_time
            )));
        }
        Ok(())
    }

    fn to_row(organisation_id: Uuid, user_id: Uuid, input: &OccupancyInput) -> Value {
        json!({
            "organisation_id": organisation_id,
            "user_id": user_id,
            "start_time": input.start_time.to_rfc3339(),
            "end_time": input.end_time.to_rfc3339(),
            "source_type": input.source_type,
            "reference_id": input.reference_id,
            "created_at": Utc::now().to_rfc3339()
        })
    }

    pub async fn add(
        &self,
        organisation_id: Uuid,
        user_id: Uuid,
        input: OccupancyInput,
        auth_token: &str,
    ) -> Result<Occupancy, AvailabilityError> {
        debug!(
            "Adding occupancy for user {} in organisation {}: {} - {}",
            user_id, organisation_id, input.start_time, input.end_time
        );

        Self::validate(&input)?;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/staff_occupancies",
                Some(auth_token),
                Some(Self::to_row(organisation_id, user_id, &input)),
                Some(headers),
            )
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        let stored = result
            .into_iter()
            .next()
            .ok_or_else(|| AvailabilityError::DatabaseError("insert returned no row".into()))?;

        let occupancy: Occupancy = serde_json::from_value(stored)?;
        Ok(occupancy)
    }

    /// Batch insert with all-or-nothing semantics: every entry is validated
    /// before the write, and all rows go in one PostgREST request, which
    /// commits them in a single transaction.
    pub async fn add_all(
        &self,
        organisation_id: Uuid,
        user_id: Uuid,
        inputs: Vec<OccupancyInput>,
        auth_token: &str,
    ) -> Result<Vec<Occupancy>, AvailabilityError> {
        debug!(
            "Adding {} occupancies for user {} in organisation {}",
            inputs.len(),
            user_id,
            organisation_id
        );

        for input in &inputs {
            Self::validate(input)?;
        }

        if inputs.is_empty() {
            return Ok(vec![]);
        }

        let rows: Vec<Value> = inputs
            .iter()
            .map(|input| Self::to_row(organisation_id, user_id, input))
            .collect();

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/staff_occupancies",
                Some(auth_token),
                Some(Value::Array(rows)),
                Some(headers),
            )
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        let occupancies: Vec<Occupancy> = result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Occupancy>, _>>()?;

        Ok(occupancies)
    }

    /// Every record whose interval intersects `[start, end)`, ordered by
    /// start time. Records merely touching the window boundary are excluded.
    pub async fn get_in_range(
        &self,
        organisation_id: Uuid,
        user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Vec<Occupancy>, AvailabilityError> {
        debug!(
            "Fetching occupancies for user {} in organisation {} between {} and {}",
            user_id, organisation_id, start, end
        );

        let path = format!(
            "/rest/v1/staff_occupancies?organisation_id=eq.{}&user_id=eq.{}&start_time=lt.{}&end_time=gt.{}&order=start_time.asc",
            organisation_id,
            user_id,
            end.to_rfc3339(),
            start.to_rfc3339()
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        let occupancies: Vec<Occupancy> = result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Occupancy>, _>>()?;

        Ok(occupancies)
    }
}
