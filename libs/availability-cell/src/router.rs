use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn availability_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        // Recurring weekly template
        .route(
            "/base-availability/{organisation_id}",
            put(handlers::set_base_availability)
                .get(handlers::get_base_availability)
                .delete(handlers::delete_base_availability),
        )
        // Week-specific exceptions
        .route(
            "/weekly-override/{organisation_id}",
            post(handlers::create_weekly_override)
                .get(handlers::get_weekly_override)
                .delete(handlers::delete_weekly_override),
        )
        // Busy intervals
        .route("/occupancy/bulk", post(handlers::add_occupancies_bulk))
        .route(
            "/occupancy/{organisation_id}",
            post(handlers::add_occupancy).get(handlers::get_occupancy),
        )
        // Derived, read-side answers
        .route(
            "/final-availability/{organisation_id}",
            get(handlers::get_final_availability),
        )
        .route(
            "/current-status/{organisation_id}",
            get(handlers::get_current_status),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
