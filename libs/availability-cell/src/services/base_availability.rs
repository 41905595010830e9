use std::collections::BTreeMap;

use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::error::AvailabilityError;
use crate::models::{BaseAvailability, DayOfWeek, DayTemplate, TimeSlot};
use crate::services::timerange::normalize_slots;

/// Store for the recurring weekly template. One row per
/// (organisation, user); the whole template is replaced atomically by a
/// keyed upsert, never patched day by day.
pub struct BaseAvailabilityService {
    supabase: SupabaseClient,
}

impl BaseAvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Full replace of the weekly template. Every day is validated before
    /// any write is issued, so a bad slot list leaves the stored template
    /// untouched. Repeated identical calls store identical state.
    pub async fn set_all(
        &self,
        organisation_id: Uuid,
        user_id: Uuid,
        entries: Vec<DayTemplate>,
        auth_token: &str,
    ) -> Result<BaseAvailability, AvailabilityError> {
        debug!(
            "Replacing base availability for user {} in organisation {}",
            user_id, organisation_id
        );

        let mut days: BTreeMap<DayOfWeek, Vec<TimeSlot>> = BTreeMap::new();
        for entry in entries {
            if days.contains_key(&entry.day_of_week) {
                return Err(AvailabilityError::InvalidSlot(format!(
                    "duplicate entry for {:?}",
                    entry.day_of_week
                )));
            }
            let slots = normalize_slots(&entry.slots)?;
            if !slots.is_empty() {
                days.insert(entry.day_of_week, slots);
            }
        }

        let now = Utc::now();
        let row = json!({
            "organisation_id": organisation_id,
            "user_id": user_id,
            "days": days,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static(
                "resolution=merge-duplicates,return=representation",
            ),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/staff_base_availability?on_conflict=organisation_id,user_id",
                Some(auth_token),
                Some(row),
                Some(headers),
            )
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        let stored = result
            .into_iter()
            .next()
            .ok_or_else(|| AvailabilityError::DatabaseError("upsert returned no row".into()))?;

        let availability: BaseAvailability = serde_json::from_value(stored)?;
        debug!(
            "Base availability replaced for user {} ({} open days)",
            user_id,
            availability.days.len()
        );

        Ok(availability)
    }

    /// Fetches the stored template. A user without one gets an all-closed
    /// template, never an error.
    pub async fn get(
        &self,
        organisation_id: Uuid,
        user_id: Uuid,
        auth_token: &str,
    ) -> Result<BaseAvailability, AvailabilityError> {
        debug!(
            "Fetching base availability for user {} in organisation {}",
            user_id, organisation_id
        );

        let path = format!(
            "/rest/v1/staff_base_availability?organisation_id=eq.{}&user_id=eq.{}",
            organisation_id, user_id
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        match result.into_iter().next() {
            Some(row) => Ok(serde_json::from_value(row)?),
            None => Ok(BaseAvailability::empty(organisation_id, user_id)),
        }
    }

    /// Removes the template entirely (staff offboarding). Idempotent.
    pub async fn delete(
        &self,
        organisation_id: Uuid,
        user_id: Uuid,
        auth_token: &str,
    ) -> Result<(), AvailabilityError> {
        debug!(
            "Deleting base availability for user {} in organisation {}",
            user_id, organisation_id
        );

        let path = format!(
            "/rest/v1/staff_base_availability?organisation_id=eq.{}&user_id=eq.{}",
            organisation_id, user_id
        );
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let _: Vec<Value> = self
            .supabase
            .request_with_headers(Method::DELETE, &path, Some(auth_token), None, Some(headers))
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        Ok(())
    }
}
