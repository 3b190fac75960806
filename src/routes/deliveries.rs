use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, put},
};

use crate::{
    dto::deliveries::LocationReport,
    error::AppResult,
    middleware::auth::AuthUser,
    models::Delivery,
    response::ApiResponse,
    services::delivery_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{order_id}", get(get_delivery))
        .route("/{order_id}/location", put(update_location))
}

#[utoipa::path(
    get,
    path = "/api/deliveries/{order_id}",
    responses(
        (status = 200, description = "Last-known driver position", body = ApiResponse<Delivery>),
        (status = 404, description = "No delivery for this order"),
    ),
    security(("bearer_auth" = [])),
    tag = "Deliveries"
)]
pub async fn get_delivery(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(order_id): Path<i64>,
) -> AppResult<Json<ApiResponse<Delivery>>> {
    let resp = delivery_service::get_delivery(&state, order_id).await?;
    Ok(Json(resp))
}

/// REST entry point of the location relay; the socket carries the same call.
#[utoipa::path(
    put,
    path = "/api/deliveries/{order_id}/location",
    request_body = LocationReport,
    responses(
        (status = 200, description = "Location stored and broadcast", body = ApiResponse<Delivery>),
        (status = 400, description = "Coordinates out of range"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Order not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Deliveries"
)]
pub async fn update_location(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<i64>,
    Json(payload): Json<LocationReport>,
) -> AppResult<Json<ApiResponse<Delivery>>> {
    let resp =
        delivery_service::report_location(&state, &user, order_id, payload.into_point()).await?;
    Ok(Json(resp))
}
