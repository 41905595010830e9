use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::error::AvailabilityError;
use crate::models::{DayOfWeek, TimeSlot, WeeklyOverride};
use crate::services::schedule_settings::ScheduleSettingsService;
use crate::services::timerange::{normalize_slots, week_start_for};

/// Store for week-specific exceptions. One row per
/// (organisation, user, normalized week start); adding replaces the whole
/// document for that week, it never merges with a previous override.
pub struct WeeklyOverrideService {
    supabase: SupabaseClient,
    settings: ScheduleSettingsService,
}

impl WeeklyOverrideService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            settings: ScheduleSettingsService::new(config),
        }
    }

    /// Normalizes any date inside the target week to the organisation's
    /// week-start day, so the same calendar week always maps to one key.
    async fn normalized_week_start(
        &self,
        organisation_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<NaiveDate, AvailabilityError> {
        let schedule = self.settings.get(organisation_id, auth_token).await?;
        Ok(week_start_for(date, schedule.week_start_day))
    }

    pub async fn add(
        &self,
        organisation_id: Uuid,
        user_id: Uuid,
        week_start_date: NaiveDate,
        overrides: BTreeMap<DayOfWeek, Vec<TimeSlot>>,
        auth_token: &str,
    ) -> Result<WeeklyOverride, AvailabilityError> {
        let week_start = self
            .normalized_week_start(organisation_id, week_start_date, auth_token)
            .await?;
        debug!(
            "Replacing weekly override for user {} in organisation {}, week of {}",
            user_id, organisation_id, week_start
        );

        // An empty slot list is a valid override meaning "explicitly closed";
        // it is validated like any other day, not skipped.
        let mut days: BTreeMap<DayOfWeek, Vec<TimeSlot>> = BTreeMap::new();
        for (day, slots) in overrides {
            days.insert(day, normalize_slots(&slots)?);
        }

        let now = Utc::now();
        let row = json!({
            "organisation_id": organisation_id,
            "user_id": user_id,
            "week_start_date": week_start,
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
                "/rest/v1/staff_weekly_overrides?on_conflict=organisation_id,user_id,week_start_date",
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

        let override_doc: WeeklyOverride = serde_json::from_value(stored)?;
        Ok(override_doc)
    }

    /// Exact-key lookup on the normalized week start. `None` means "no
    /// override, use base for every day this week" and is a normal state.
    pub async fn get(
        &self,
        organisation_id: Uuid,
        user_id: Uuid,
        week_start_date: NaiveDate,
        auth_token: &str,
    ) -> Result<Option<WeeklyOverride>, AvailabilityError> {
        let week_start = self
            .normalized_week_start(organisation_id, week_start_date, auth_token)
            .await?;
        self.get_normalized(organisation_id, user_id, week_start, auth_token)
            .await
    }

    /// Lookup with a week start the caller has already normalized (the
    /// resolver derives it once per request).
    pub async fn get_normalized(
        &self,
        organisation_id: Uuid,
        user_id: Uuid,
        week_start: NaiveDate,
        auth_token: &str,
    ) -> Result<Option<WeeklyOverride>, AvailabilityError> {
        debug!(
            "Fetching weekly override for user {} in organisation {}, week of {}",
            user_id, organisation_id, week_start
        );

        let path = format!(
            "/rest/v1/staff_weekly_overrides?organisation_id=eq.{}&user_id=eq.{}&week_start_date=eq.{}",
            organisation_id, user_id, week_start
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        match result.into_iter().next() {
            Some(row) => Ok(Some(serde_json::from_value(row)?)),
            None => Ok(None),
        }
    }

    /// Reverts the whole week to base. Idempotent.
    pub async fn delete(
        &self,
        organisation_id: Uuid,
        user_id: Uuid,
        week_start_date: NaiveDate,
        auth_token: &str,
    ) -> Result<(), AvailabilityError> {
        let week_start = self
            .normalized_week_start(organisation_id, week_start_date, auth_token)
            .await?;
        debug!(
            "Deleting weekly override for user {} in organisation {}, week of {}",
            user_id, organisation_id, week_start
        );

        let path = format!(
            "/rest/v1/staff_weekly_overrides?organisation_id=eq.{}&user_id=eq.{}&week_start_date=eq.{}",
            organisation_id, user_id, week_start
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
