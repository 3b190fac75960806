use chrono::Utc;
use sea_orm::ActiveValue::Set;
use sea_orm::{ActiveModelTrait, EntityTrait};

use crate::{
    entity::{
        deliveries::{ActiveModel as DeliveryActive, Entity as Deliveries},
        orders::Entity as Orders,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ROLE_ADMIN, ROLE_DRIVER},
    models::{Delivery, GeoPoint},
    realtime::{OrderEvent, Topic},
    response::{ApiResponse, Meta},
    state::AppState,
};

/// Accept a driver position report and fan it out to everyone watching the
/// order's delivery channel.
///
/// Coordinates are range-checked before anything else; an out-of-range point
/// is rejected with no write and no broadcast. Only the latest position is
/// kept; each report overwrites the previous row. Every in-range report is
/// published as-is: there is no deduplication and no staleness filtering.
pub async fn report_location(
    state: &AppState,
    user: &AuthUser,
    order_id: i64,
    point: GeoPoint,
) -> AppResult<ApiResponse<Delivery>> {
    if user.role != ROLE_DRIVER && user.role != ROLE_ADMIN {
        return Err(AppError::Forbidden);
    }
    point.validate()?;

    let order = Orders::find_by_id(order_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Order {order_id} not found")))?;

    // Reports from a driver carry their own id; relayed reports keep the
    // driver already on the order.
    let driver_id = if user.role == ROLE_DRIVER {
        Some(user.user_id)
    } else {
        order.driver_id
    };

    let delivery = match Deliveries::find_by_id(order_id).one(&state.orm).await? {
        Some(existing) => {
            let mut active: DeliveryActive = existing.into();
            active.driver_id = Set(driver_id);
            active.latitude = Set(point.latitude);
            active.longitude = Set(point.longitude);
            active.updated_at = Set(Utc::now().into());
            active.update(&state.orm).await?
        }
        None => DeliveryActive {
            order_id: Set(order_id),
            driver_id: Set(driver_id),
            latitude: Set(point.latitude),
            longitude: Set(point.longitude),
            updated_at: Set(Utc::now().into()),
        }
        .insert(&state.orm)
        .await?,
    };

    state.hub.publish(
        Topic::Delivery(order_id),
        OrderEvent::DeliveryUpdate { location: point },
    );

    Ok(ApiResponse::success(
        "Location updated",
        delivery.into(),
        Some(Meta::empty()),
    ))
}

/// Last-known position for an order, if any was ever reported.
pub async fn get_delivery(state: &AppState, order_id: i64) -> AppResult<ApiResponse<Delivery>> {
    let delivery = Deliveries::find_by_id(order_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No delivery for order {order_id}")))?;

    Ok(ApiResponse::success(
        "OK",
        delivery.into(),
        Some(Meta::empty()),
    ))
}
