use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use chrono::{DateTime, NaiveDate, Utc};
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    BulkOccupancyRequest, CreateOccupancyRequest, CreateWeeklyOverrideRequest,
    SetBaseAvailabilityRequest,
};
use crate::services::{
    AvailabilityResolver, BaseAvailabilityService, OccupancyService, WeeklyOverrideService,
};

// Query parameters for the availability endpoints
#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct WeekQuery {
    pub week_start_date: NaiveDate,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct OccupancyRangeQuery {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct FinalAvailabilityQuery {
    pub reference_date: NaiveDate,
    pub user_id: Option<Uuid>,
}

/// The staff member acted on: an explicit `user_id` when a scheduling admin
/// manages someone else's calendar, otherwise the authenticated subject.
fn acting_user_id(requested: Option<Uuid>, user: &User) -> Result<Uuid, AppError> {
    match requested {
        Some(id) => Ok(id),
        None => Uuid::parse_str(&user.id)
            .map_err(|_| AppError::BadRequest("Authenticated user id is not a valid UUID".to_string())),
    }
}

// ==============================================================================
// BASE AVAILABILITY
// ==============================================================================

#[axum::debug_handler]
pub async fn set_base_availability(
    State(state): State<Arc<AppConfig>>,
    Path(organisation_id): Path<Uuid>,
    Extension(user): Extension<User>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<SetBaseAvailabilityRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let user_id = acting_user_id(request.user_id, &user)?;
    let service = BaseAvailabilityService::new(&state);

    let stored = service
        .set_all(organisation_id, user_id, request.availabilities, auth.token())
        .await
        .map_err(AppError::from)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "organisation_id": stored.organisation_id,
            "user_id": stored.user_id,
            "availabilities": stored.day_templates()
        })),
    ))
}

#[axum::debug_handler]
pub async fn get_base_availability(
    State(state): State<Arc<AppConfig>>,
    Path(organisation_id): Path<Uuid>,
    Extension(user): Extension<User>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Value>, AppError> {
    let user_id = acting_user_id(query.user_id, &user)?;
    let service = BaseAvailabilityService::new(&state);

    let availability = service
        .get(organisation_id, user_id, auth.token())
        .await
        .map_err(AppError::from)?;

    Ok(Json(json!({
        "organisation_id": availability.organisation_id,
        "user_id": availability.user_id,
        "availabilities": availability.day_templates()
    })))
}

#[axum::debug_handler]
pub async fn delete_base_availability(
    State(state): State<Arc<AppConfig>>,
    Path(organisation_id): Path<Uuid>,
    Extension(user): Extension<User>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Value>, AppError> {
    let user_id = acting_user_id(query.user_id, &user)?;
    let service = BaseAvailabilityService::new(&state);

    service
        .delete(organisation_id, user_id, auth.token())
        .await
        .map_err(AppError::from)?;

    Ok(Json(json!({
        "message": "Base availability deleted"
    })))
}

// ==============================================================================
// WEEKLY OVERRIDES
// ==============================================================================

#[axum::debug_handler]
pub async fn create_weekly_override(
    State(state): State<Arc<AppConfig>>,
    Path(organisation_id): Path<Uuid>,
    Extension(user): Extension<User>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<CreateWeeklyOverrideRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let user_id = acting_user_id(request.user_id, &user)?;
    let service = WeeklyOverrideService::new(&state);

    let stored = service
        .add(
            organisation_id,
            user_id,
            request.week_start_date,
            request.overrides,
            auth.token(),
        )
        .await
        .map_err(AppError::from)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "organisation_id": stored.organisation_id,
            "user_id": stored.user_id,
            "week_start_date": stored.week_start_date,
            "overrides": stored.days
        })),
    ))
}

#[axum::debug_handler]
pub async fn get_weekly_override(
    State(state): State<Arc<AppConfig>>,
    Path(organisation_id): Path<Uuid>,
    Extension(user): Extension<User>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<WeekQuery>,
) -> Result<Json<Value>, AppError> {
    let user_id = acting_user_id(query.user_id, &user)?;
    let service = WeeklyOverrideService::new(&state);

    let override_doc = service
        .get(organisation_id, user_id, query.week_start_date, auth.token())
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "No weekly override for the week of {}",
                query.week_start_date
            ))
        })?;

    Ok(Json(json!({
        "organisation_id": override_doc.organisation_id,
        "user_id": override_doc.user_id,
        "week_start_date": override_doc.week_start_date,
        "overrides": override_doc.days
    })))
}

#[axum::debug_handler]
pub async fn delete_weekly_override(
    State(state): State<Arc<AppConfig>>,
    Path(organisation_id): Path<Uuid>,
    Extension(user): Extension<User>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<WeekQuery>,
) -> Result<Json<Value>, AppError> {
    let user_id = acting_user_id(query.user_id, &user)?;
    let service = WeeklyOverrideService::new(&state);

    service
        .delete(organisation_id, user_id, query.week_start_date, auth.token())
        .await
        .map_err(AppError::from)?;

    Ok(Json(json!({
        "message": "Weekly override deleted"
    })))
}

// ==============================================================================
// OCCUPANCY
// ==============================================================================

#[axum::debug_handler]
pub async fn add_occupancy(
    State(state): State<Arc<AppConfig>>,
    Path(organisation_id): Path<Uuid>,
    Extension(user): Extension<User>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<CreateOccupancyRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let user_id = acting_user_id(request.user_id, &user)?;
    let service = OccupancyService::new(&state);

    let occupancy = service
        .add(organisation_id, user_id, request.into_input(), auth.token())
        .await
        .map_err(AppError::from)?;

    Ok((StatusCode::CREATED, Json(json!(occupancy))))
}

#[axum::debug_handler]
pub async fn add_occupancies_bulk(
    State(state): State<Arc<AppConfig>>,
    Extension(_user): Extension<User>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<BulkOccupancyRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let service = OccupancyService::new(&state);

    let occupancies = service
        .add_all(
            request.organisation_id,
            request.user_id,
            request.occupancies,
            auth.token(),
        )
        .await
        .map_err(AppError::from)?;

    let count = occupancies.len();
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "data": occupancies,
            "count": count
        })),
    ))
}

#[axum::debug_handler]
pub async fn get_occupancy(
    State(state): State<Arc<AppConfig>>,
    Path(organisation_id): Path<Uuid>,
    Extension(user): Extension<User>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<OccupancyRangeQuery>,
) -> Result<Json<Value>, AppError> {
    let user_id = acting_user_id(query.user_id, &user)?;
    let service = OccupancyService::new(&state);

    let occupancies = service
        .get_in_range(
            organisation_id,
            user_id,
            query.start_date,
            query.end_date,
            auth.token(),
        )
        .await
        .map_err(AppError::from)?;

    Ok(Json(json!({
        "data": occupancies
    })))
}

// ==============================================================================
// RESOLUTION
// ==============================================================================

#[axum::debug_handler]
pub async fn get_final_availability(
    State(state): State<Arc<AppConfig>>,
    Path(organisation_id): Path<Uuid>,
    Extension(user): Extension<User>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<FinalAvailabilityQuery>,
) -> Result<Json<Value>, AppError> {
    let user_id = acting_user_id(query.user_id, &user)?;
    let resolver = AvailabilityResolver::new(&state);

    let ranges = resolver
        .final_availability_for_date(organisation_id, user_id, query.reference_date, auth.token())
        .await
        .map_err(AppError::from)?;

    Ok(Json(json!({
        "data": ranges
    })))
}

#[axum::debug_handler]
pub async fn get_current_status(
    State(state): State<Arc<AppConfig>>,
    Path(organisation_id): Path<Uuid>,
    Extension(user): Extension<User>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Value>, AppError> {
    let user_id = acting_user_id(query.user_id, &user)?;
    let resolver = AvailabilityResolver::new(&state);

    let status = resolver
        .current_status(organisation_id, user_id, auth.token())
        .await
        .map_err(AppError::from)?;

    Ok(Json(json!({
        "status": status
    })))
}
