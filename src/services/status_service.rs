use chrono::Utc;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};

use crate::{
    entity::{
        deliveries::{ActiveModel as DeliveryActive, Entity as Deliveries},
        orders::{ActiveModel as OrderActive, Entity as Orders, Model as OrderModel},
        payments::{ActiveModel as PaymentActive, Column as PaymentCol, Entity as Payments},
        users::Entity as Users,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ROLE_ADMIN, ROLE_DRIVER, ROLE_RESTAURANT, ensure_admin},
    models::{Order, OrderStatus, PaymentStatus},
    notify::notify_user,
    realtime::{OrderEvent, Topic},
    response::{ApiResponse, Meta},
    state::AppState,
};

/// Order states in which a driver may be assigned.
const ASSIGNABLE: &[OrderStatus] = &[
    OrderStatus::Confirmed,
    OrderStatus::Preparing,
    OrderStatus::Ready,
];

/// Payment callback: the provider settled the charge.
pub async fn mark_paid(state: &AppState, id: i64) -> AppResult<ApiResponse<Order>> {
    let order = settle(state, id, OrderStatus::Paid, PaymentStatus::Paid).await?;
    best_effort_notify(
        state,
        order.customer_id,
        order.id,
        format!("Payment received for order #{}", order.id),
    )
    .await;
    Ok(ApiResponse::success(
        "Order marked paid",
        order.into(),
        Some(Meta::empty()),
    ))
}

/// Payment callback: the charge failed.
pub async fn mark_failed(state: &AppState, id: i64) -> AppResult<ApiResponse<Order>> {
    let order = settle(state, id, OrderStatus::Failed, PaymentStatus::Failed).await?;
    best_effort_notify(
        state,
        order.customer_id,
        order.id,
        format!("Payment failed for order #{}", order.id),
    )
    .await;
    Ok(ApiResponse::success(
        "Order marked failed",
        order.into(),
        Some(Meta::empty()),
    ))
}

/// Restaurant accepts the order. Subscribers of the global channel learn the
/// order id; subscribers of the order's own confirmation channel get the new
/// status.
pub async fn confirm(state: &AppState, user: &AuthUser, id: i64) -> AppResult<ApiResponse<Order>> {
    ensure_staff(user)?;
    let order = apply_transition(state, id, OrderStatus::Confirmed).await?;

    state
        .hub
        .publish(Topic::Orders, OrderEvent::OrderPaymentConfirmed { order_id: order.id });
    state.hub.publish(
        Topic::OrderConfirmation(order.id),
        OrderEvent::OrderConfirmation {
            status: order.status,
        },
    );

    Ok(ApiResponse::success(
        "Order confirmed",
        order.into(),
        Some(Meta::empty()),
    ))
}

/// Kitchen finished; the order can be picked up.
pub async fn mark_ready(
    state: &AppState,
    user: &AuthUser,
    id: i64,
) -> AppResult<ApiResponse<Order>> {
    ensure_staff(user)?;
    let order = apply_transition(state, id, OrderStatus::Ready).await?;

    state.hub.publish(
        Topic::Orders,
        OrderEvent::OrderStatusUpdated {
            order_id: order.id,
            status: order.status,
        },
    );

    Ok(ApiResponse::success(
        "Order ready",
        order.into(),
        Some(Meta::empty()),
    ))
}

/// Attach a driver to an order. The order status is left untouched.
pub async fn assign_driver(
    state: &AppState,
    user: &AuthUser,
    id: i64,
    driver_id: i64,
) -> AppResult<ApiResponse<Order>> {
    ensure_staff(user)?;

    let txn = state.orm.begin().await?;
    let order = load_for_update(&txn, id).await?;

    if !ASSIGNABLE.contains(&order.status) {
        return Err(AppError::BadRequest(format!(
            "Cannot assign a driver while order is {}",
            order.status
        )));
    }

    let driver = Users::find_by_id(driver_id)
        .one(&txn)
        .await?
        .filter(|u| u.role == ROLE_DRIVER)
        .ok_or_else(|| AppError::NotFound(format!("Driver {driver_id} not found")))?;

    let mut active: OrderActive = order.into();
    active.driver_id = Set(Some(driver.id));
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;

    // Keep the delivery record in step when a location was already reported.
    if let Some(delivery) = Deliveries::find_by_id(order.id).one(&txn).await? {
        let mut active: DeliveryActive = delivery.into();
        active.driver_id = Set(Some(driver.id));
        active.updated_at = Set(Utc::now().into());
        active.update(&txn).await?;
    }

    txn.commit().await?;

    state.hub.publish(
        Topic::Orders,
        OrderEvent::DriverAssigned {
            order_id: order.id,
            driver_id: driver.id,
        },
    );
    best_effort_notify(
        state,
        order.customer_id,
        order.id,
        format!("A driver was assigned to your order #{}", order.id),
    )
    .await;

    Ok(ApiResponse::success(
        "Driver assigned",
        order.into(),
        Some(Meta::empty()),
    ))
}

pub async fn cancel(state: &AppState, user: &AuthUser, id: i64) -> AppResult<ApiResponse<Order>> {
    // Customers may cancel their own order; staff may cancel any.
    let existing = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Order {id} not found")))?;
    if user.role != ROLE_ADMIN
        && user.role != ROLE_RESTAURANT
        && existing.customer_id != user.user_id
    {
        return Err(AppError::Forbidden);
    }

    let order = apply_transition(state, id, OrderStatus::Canceled).await?;

    state.hub.publish(
        Topic::Orders,
        OrderEvent::OrderStatusUpdated {
            order_id: order.id,
            status: order.status,
        },
    );
    best_effort_notify(
        state,
        order.customer_id,
        order.id,
        format!("Your order #{} was canceled", order.id),
    )
    .await;

    Ok(ApiResponse::success(
        "Order canceled",
        order.into(),
        Some(Meta::empty()),
    ))
}

/// Generic transition used by the admin dashboard. The target is checked
/// against the transition table like every dedicated operation.
pub async fn update_status(
    state: &AppState,
    user: &AuthUser,
    id: i64,
    target: OrderStatus,
) -> AppResult<ApiResponse<Order>> {
    ensure_admin(user)?;
    let order = apply_transition(state, id, target).await?;

    state.hub.publish(
        Topic::Orders,
        OrderEvent::OrderStatusUpdated {
            order_id: order.id,
            status: order.status,
        },
    );
    best_effort_notify(
        state,
        order.customer_id,
        order.id,
        format!("Your order #{} is now {}", order.id, order.status),
    )
    .await;

    Ok(ApiResponse::success(
        "Order updated",
        order.into(),
        Some(Meta::empty()),
    ))
}

/// Move an order to `target`, failing when the transition table forbids it.
/// The row lock serializes concurrent transitions on the same order without
/// blocking unrelated orders.
async fn apply_transition(
    state: &AppState,
    id: i64,
    target: OrderStatus,
) -> AppResult<OrderModel> {
    let txn = state.orm.begin().await?;
    let order = load_for_update(&txn, id).await?;

    if !order.status.can_transition_to(target) {
        return Err(AppError::InvalidTransition {
            from: order.status,
            to: target,
        });
    }

    let mut active: OrderActive = order.into();
    active.status = Set(target);
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;

    txn.commit().await?;
    Ok(order)
}

/// Transition the order and settle its most recent payment attempt in the
/// same transaction.
async fn settle(
    state: &AppState,
    id: i64,
    order_status: OrderStatus,
    payment_status: PaymentStatus,
) -> AppResult<OrderModel> {
    let txn = state.orm.begin().await?;
    let order = load_for_update(&txn, id).await?;

    if !order.status.can_transition_to(order_status) {
        return Err(AppError::InvalidTransition {
            from: order.status,
            to: order_status,
        });
    }

    let mut active: OrderActive = order.into();
    active.status = Set(order_status);
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;

    let payment = Payments::find()
        .filter(PaymentCol::OrderId.eq(order.id))
        .order_by_desc(PaymentCol::CreatedAt)
        .one(&txn)
        .await?;
    if let Some(payment) = payment {
        let mut active: PaymentActive = payment.into();
        active.status = Set(payment_status);
        active.updated_at = Set(Utc::now().into());
        active.update(&txn).await?;
    }

    txn.commit().await?;
    Ok(order)
}

async fn load_for_update(txn: &DatabaseTransaction, id: i64) -> AppResult<OrderModel> {
    Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(txn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Order {id} not found")))
}

fn ensure_staff(user: &AuthUser) -> Result<(), AppError> {
    if user.role != ROLE_RESTAURANT && user.role != ROLE_ADMIN {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

async fn best_effort_notify(state: &AppState, user_id: i64, order_id: i64, message: String) {
    if let Err(err) = notify_user(&state.orm, user_id, Some(order_id), message).await {
        tracing::warn!(error = %err, order_id, "notification insert failed");
    }
}
