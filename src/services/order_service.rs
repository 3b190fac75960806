use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    dto::orders::{CreateOrderRequest, CreatedOrder, OrderList, OrderWithItems},
    entity::{
        menu_items::Entity as MenuItems,
        order_items::{ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems},
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders},
        payments::{ActiveModel as PaymentActive, Column as PaymentCol, Entity as Payments},
        restaurants::Entity as Restaurants,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ROLE_ADMIN, ROLE_CUSTOMER, ROLE_DRIVER, ensure_admin},
    models::{Order, OrderItem, OrderStatus, Payment, PaymentStatus},
    notify::notify_user,
    payment::PaymentClient,
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    state::AppState,
};

/// Create an order with its line items and an initial payment attempt.
///
/// Everything up to the provider charge runs in one transaction, so a failed
/// lookup leaves no partial rows behind. Immediate-settlement methods are
/// charged after commit; a provider failure surfaces as 502 with the order
/// still PENDING so the payment can be retried or reconciled.
pub async fn create_order(
    state: &AppState,
    user: &AuthUser,
    payload: CreateOrderRequest,
) -> AppResult<ApiResponse<CreatedOrder>> {
    if payload.items.is_empty() {
        return Err(AppError::BadRequest("Order has no items".into()));
    }
    if payload.payment_method.trim().is_empty() {
        return Err(AppError::BadRequest("paymentMethod is required".into()));
    }
    if payload.items.iter().any(|line| line.quantity <= 0) {
        return Err(AppError::BadRequest("Item quantity must be positive".into()));
    }

    let txn = state.orm.begin().await?;

    let restaurant = Restaurants::find_by_id(payload.restaurant_id)
        .one(&txn)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("Restaurant {} not found", payload.restaurant_id))
        })?;

    // Resolve every line against the menu before writing anything.
    let mut total_price = Decimal::ZERO;
    let mut priced_lines = Vec::with_capacity(payload.items.len());
    for line in &payload.items {
        let menu_item = MenuItems::find_by_id(line.menu_item_id)
            .one(&txn)
            .await?
            .filter(|item| item.restaurant_id == restaurant.id)
            .ok_or_else(|| {
                AppError::NotFound(format!("Menu item {} not found", line.menu_item_id))
            })?;
        if !menu_item.available {
            return Err(AppError::BadRequest(format!(
                "Menu item {} is currently unavailable",
                menu_item.id
            )));
        }
        total_price += menu_item.price * Decimal::from(line.quantity);
        priced_lines.push((line.menu_item_id, line.quantity, menu_item.price));
    }

    let order = OrderActive {
        id: NotSet,
        customer_id: Set(user.user_id),
        restaurant_id: Set(restaurant.id),
        driver_id: Set(None),
        status: Set(OrderStatus::Pending),
        total_price: Set(total_price),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut items: Vec<OrderItem> = Vec::with_capacity(priced_lines.len());
    for (menu_item_id, quantity, price) in priced_lines {
        let item = OrderItemActive {
            id: NotSet,
            order_id: Set(order.id),
            menu_item_id: Set(menu_item_id),
            quantity: Set(quantity),
            price: Set(price),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;
        items.push(item.into());
    }

    let payment = PaymentActive {
        id: NotSet,
        order_id: Set(order.id),
        method: Set(payload.payment_method.clone()),
        amount: Set(total_price),
        status: Set(PaymentStatus::Pending),
        reference: Set(build_payment_reference(order.id)),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;

    let (order, payment) = if PaymentClient::settles_immediately(&payload.payment_method) {
        state
            .payments
            .charge(&payment.reference, &payment.method, payment.amount)
            .await?;
        settle_created_order(state, order, payment).await?
    } else {
        (order, payment)
    };

    Ok(ApiResponse::success(
        "Order created",
        CreatedOrder {
            order: order.into(),
            items,
            payment: payment.into(),
        },
        Some(Meta::empty()),
    ))
}

/// Mark a freshly created order and its payment attempt PAID after the
/// provider confirmed the charge.
async fn settle_created_order(
    state: &AppState,
    order: crate::entity::orders::Model,
    payment: crate::entity::payments::Model,
) -> AppResult<(crate::entity::orders::Model, crate::entity::payments::Model)> {
    let txn = state.orm.begin().await?;

    let customer_id = order.customer_id;
    let order_id = order.id;

    let mut active: OrderActive = order.into();
    active.status = Set(OrderStatus::Paid);
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;

    let mut active: PaymentActive = payment.into();
    active.status = Set(PaymentStatus::Paid);
    active.updated_at = Set(Utc::now().into());
    let payment = active.update(&txn).await?;

    txn.commit().await?;

    if let Err(err) = notify_user(
        &state.orm,
        customer_id,
        Some(order_id),
        format!("Payment received for order #{order_id}"),
    )
    .await
    {
        tracing::warn!(error = %err, "notification insert failed");
    }

    Ok((order, payment))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: i64,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let mut condition = Condition::all().add(OrderCol::Id.eq(id));
    // Customers only ever see their own orders.
    if user.role == ROLE_CUSTOMER {
        condition = condition.add(OrderCol::CustomerId.eq(user.user_id));
    }

    let order = Orders::find()
        .filter(condition)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Order {id} not found")))?;

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(OrderItem::from)
        .collect();

    Ok(ApiResponse::success(
        "OK",
        OrderWithItems {
            order: order.into(),
            items,
        },
        Some(Meta::empty()),
    ))
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination.normalize();

    let mut condition = Condition::all();
    if user.role == ROLE_CUSTOMER {
        condition = condition.add(OrderCol::CustomerId.eq(user.user_id));
    } else if let Some(customer_id) = query.customer_id {
        condition = condition.add(OrderCol::CustomerId.eq(customer_id));
    }
    if let Some(status) = query.status {
        condition = condition.add(OrderCol::Status.eq(status));
    }

    let mut finder = Orders::find().filter(condition);
    finder = match query.sort_order.unwrap_or(SortOrder::Desc) {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Order::from)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Ok",
        OrderList { items: orders },
        Some(meta),
    ))
}

/// Queue of confirmed orders waiting for a driver.
pub async fn list_confirmed(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<OrderList>> {
    if user.role != ROLE_DRIVER && user.role != ROLE_ADMIN {
        return Err(AppError::Forbidden);
    }

    let orders = Orders::find()
        .filter(OrderCol::Status.eq(OrderStatus::Confirmed))
        .order_by_asc(OrderCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Order::from)
        .collect();

    Ok(ApiResponse::success(
        "Confirmed orders",
        OrderList { items: orders },
        Some(Meta::empty()),
    ))
}

/// Remove an order permanently. Line items cascade; payment, delivery and
/// notification rows keep the dangling order id.
pub async fn delete_order(
    state: &AppState,
    user: &AuthUser,
    id: i64,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;

    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Order {id} not found")))?;

    let customer_id = order.customer_id;
    Orders::delete_by_id(order.id).exec(&state.orm).await?;

    if let Err(err) = notify_user(
        &state.orm,
        customer_id,
        Some(id),
        format!("Your order #{id} was removed"),
    )
    .await
    {
        tracing::warn!(error = %err, "notification insert failed");
    }

    Ok(ApiResponse::message_only("Order deleted"))
}

/// Latest payment attempt for an order, if any.
pub async fn latest_payment(
    state: &AppState,
    order_id: i64,
) -> AppResult<Option<Payment>> {
    let payment = Payments::find()
        .filter(PaymentCol::OrderId.eq(order_id))
        .order_by_desc(PaymentCol::CreatedAt)
        .one(&state.orm)
        .await?;
    Ok(payment.map(Payment::from))
}

fn build_payment_reference(order_id: i64) -> String {
    let date = Utc::now().format("%Y%m%d");
    let suffix = Uuid::new_v4().to_string();
    let short = &suffix[..8];
    format!("PAY-{date}-{order_id}-{short}")
}
