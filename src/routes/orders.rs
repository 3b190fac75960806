use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
};

use crate::{
    dto::orders::{
        AssignDriverRequest, CreateOrderRequest, CreatedOrder, OrderList, OrderWithItems,
        UpdateOrderStatusRequest,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    models::Order,
    response::ApiResponse,
    routes::params::OrderListQuery,
    services::{order_service, status_service},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_order).get(list_orders))
        .route("/status/confirmed", get(list_confirmed))
        .route(
            "/{id}",
            get(get_order).put(update_status).delete(delete_order),
        )
        .route("/{id}/success", put(mark_paid))
        .route("/{id}/failure", put(mark_failed))
        .route("/{id}/confirm", put(confirm))
        .route("/{id}/ready", put(mark_ready))
        .route("/{id}/assign-driver", put(assign_driver))
        .route("/{id}/cancel", put(cancel))
}

#[utoipa::path(
    post,
    path = "/api/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = ApiResponse<CreatedOrder>),
        (status = 400, description = "Invalid input"),
        (status = 404, description = "Restaurant or menu item not found"),
        (status = 502, description = "Payment provider failure; order stays PENDING"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateOrderRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<CreatedOrder>>)> {
    let resp = order_service::create_order(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(get, path = "/api/orders", tag = "Orders", security(("bearer_auth" = [])))]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<OrderListQuery>,
) -> AppResult<Json<ApiResponse<OrderList>>> {
    let resp = order_service::list_orders(&state, &user, query).await?;
    Ok(Json(resp))
}

/// Driver-facing queue of orders waiting for pickup.
#[utoipa::path(
    get,
    path = "/api/orders/status/confirmed",
    responses(
        (status = 200, description = "Confirmed orders", body = ApiResponse<OrderList>),
        (status = 403, description = "Forbidden"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn list_confirmed(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<OrderList>>> {
    let resp = order_service::list_confirmed(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(get, path = "/api/orders/{id}", tag = "Orders", security(("bearer_auth" = [])))]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<OrderWithItems>>> {
    let resp = order_service::get_order(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/orders/{id}",
    responses(
        (status = 200, description = "Order deleted"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn delete_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = order_service::delete_order(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(put, path = "/api/orders/{id}/success", tag = "Orders", security(("bearer_auth" = [])))]
pub async fn mark_paid(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let resp = status_service::mark_paid(&state, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(put, path = "/api/orders/{id}/failure", tag = "Orders", security(("bearer_auth" = [])))]
pub async fn mark_failed(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let resp = status_service::mark_failed(&state, id).await?;
    Ok(Json(resp))
}

/// Confirm the order and notify every connected dashboard.
#[utoipa::path(
    put,
    path = "/api/orders/{id}/confirm",
    responses(
        (status = 200, description = "Order confirmed", body = ApiResponse<Order>),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Transition not allowed from current status"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn confirm(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let resp = status_service::confirm(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(put, path = "/api/orders/{id}/ready", tag = "Orders", security(("bearer_auth" = [])))]
pub async fn mark_ready(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let resp = status_service::mark_ready(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/orders/{id}/assign-driver",
    request_body = AssignDriverRequest,
    responses(
        (status = 200, description = "Driver assigned, status unchanged", body = ApiResponse<Order>),
        (status = 400, description = "Order not in an assignable status"),
        (status = 404, description = "Order or driver not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn assign_driver(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<AssignDriverRequest>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let resp = status_service::assign_driver(&state, &user, id, payload.driver_id).await?;
    Ok(Json(resp))
}

#[utoipa::path(put, path = "/api/orders/{id}/cancel", tag = "Orders", security(("bearer_auth" = [])))]
pub async fn cancel(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let resp = status_service::cancel(&state, &user, id).await?;
    Ok(Json(resp))
}

/// Generic status transition; the target is validated against the allowed
/// enum values and the transition table.
#[utoipa::path(
    put,
    path = "/api/orders/{id}",
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Order updated", body = ApiResponse<Order>),
        (status = 400, description = "Invalid status value"),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Transition not allowed from current status"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn update_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let resp = status_service::update_status(&state, &user, id, payload.status).await?;
    Ok(Json(resp))
}
