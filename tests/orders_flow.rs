use delivery_orders_api::{
    db::{create_orm_conn, run_migrations},
    dto::orders::{CreateOrderRequest, OrderLineRequest},
    entity::{
        menu_items::ActiveModel as MenuItemActive,
        notifications::{Column as NotificationCol, Entity as Notifications},
        order_items::{Column as OrderItemCol, Entity as OrderItems},
        orders::Entity as Orders,
        restaurants::ActiveModel as RestaurantActive,
        users::ActiveModel as UserActive,
    },
    error::AppError,
    middleware::auth::AuthUser,
    models::{GeoPoint, OrderStatus, PaymentStatus},
    payment::PaymentClient,
    realtime::{BroadcastHub, OrderEvent, Topic},
    services::{delivery_service, order_service, status_service},
    state::AppState,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, Set, Statement};
use tokio::sync::broadcast::error::TryRecvError;

// The tests share one database and truncate it on setup; serialize them.
static DB_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

// Integration flow: create -> paid -> confirmed (global broadcast) ->
// driver assigned -> location relay. Exercises the end-to-end contract of
// the status controller and the realtime hub against a real database.
#[tokio::test]
async fn order_lifecycle_and_realtime_flow() -> anyhow::Result<()> {
    let _guard = DB_LOCK.lock().await;
    // Allow skipping when no DB is configured in the environment.
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    let state = setup_state(&database_url).await?;

    let customer_id = create_user(&state, "customer", "customer@example.com").await?;
    let driver_id = create_user(&state, "driver", "driver@example.com").await?;
    let admin_id = create_user(&state, "admin", "admin@example.com").await?;
    let owner_id = create_user(&state, "restaurant", "owner@example.com").await?;

    let restaurant_id = create_restaurant(&state, owner_id).await?;
    let couscous_id = create_menu_item(&state, restaurant_id, "Couscous", dec!(12.50)).await?;
    let tea_id = create_menu_item(&state, restaurant_id, "Mint tea", dec!(6.00)).await?;

    let customer = AuthUser {
        user_id: customer_id,
        role: "customer".into(),
    };
    let driver = AuthUser {
        user_id: driver_id,
        role: "driver".into(),
    };
    let admin = AuthUser {
        user_id: admin_id,
        role: "admin".into(),
    };
    let owner = AuthUser {
        user_id: owner_id,
        role: "restaurant".into(),
    };

    // Create: 2 x 12.50 + 1 x 6.00 = 31.00, PENDING, payment attempt PENDING.
    let created = order_service::create_order(
        &state,
        &customer,
        CreateOrderRequest {
            restaurant_id,
            items: vec![
                OrderLineRequest {
                    menu_item_id: couscous_id,
                    quantity: 2,
                },
                OrderLineRequest {
                    menu_item_id: tea_id,
                    quantity: 1,
                },
            ],
            payment_method: "cash".into(),
        },
    )
    .await?
    .data
    .unwrap();

    let order_id = created.order.id;
    assert_eq!(created.order.total_price, dec!(31.00));
    assert_eq!(created.order.status, OrderStatus::Pending);
    assert_eq!(created.items.len(), 2);
    assert_eq!(created.payment.status, PaymentStatus::Pending);
    assert_eq!(created.payment.amount, dec!(31.00));

    // Illegal jump is rejected before anything is written.
    let err = status_service::update_status(&state, &admin, order_id, OrderStatus::Delivered)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition { .. }));

    // Paid: order and payment settle together.
    let paid = status_service::mark_paid(&state, order_id)
        .await?
        .data
        .unwrap();
    assert_eq!(paid.status, OrderStatus::Paid);
    let payment = order_service::latest_payment(&state, order_id)
        .await?
        .expect("payment attempt");
    assert_eq!(payment.status, PaymentStatus::Paid);

    // Confirm: only subscribers registered before the call see the event.
    let mut early = state.hub.subscribe(Topic::Orders);
    let confirmed = status_service::confirm(&state, &owner, order_id)
        .await?
        .data
        .unwrap();
    assert_eq!(confirmed.status, OrderStatus::Confirmed);

    assert_eq!(
        early.try_recv().unwrap(),
        OrderEvent::OrderPaymentConfirmed { order_id }
    );
    assert!(matches!(early.try_recv(), Err(TryRecvError::Empty)));

    let mut late = state.hub.subscribe(Topic::Orders);
    assert!(matches!(late.try_recv(), Err(TryRecvError::Empty)));

    // Driver queue shows the confirmed order.
    let queue = order_service::list_confirmed(&state, &driver)
        .await?
        .data
        .unwrap();
    assert!(queue.items.iter().any(|o| o.id == order_id));

    // Assign driver: driver id set, status untouched, broadcast on the
    // global channel.
    let assigned = status_service::assign_driver(&state, &owner, order_id, driver_id)
        .await?
        .data
        .unwrap();
    assert_eq!(assigned.driver_id, Some(driver_id));
    assert_eq!(assigned.status, OrderStatus::Confirmed);
    assert_eq!(
        early.try_recv().unwrap(),
        OrderEvent::DriverAssigned {
            order_id,
            driver_id
        }
    );

    // Location relay: two reports arrive on the order's channel in call
    // order, out-of-range input is rejected with no broadcast.
    let mut watcher = state.hub.subscribe(Topic::Delivery(order_id));

    delivery_service::report_location(&state, &driver, order_id, GeoPoint::new(36.80, 10.18))
        .await?;
    delivery_service::report_location(&state, &driver, order_id, GeoPoint::new(36.81, 10.19))
        .await?;

    assert_eq!(
        watcher.try_recv().unwrap(),
        OrderEvent::DeliveryUpdate {
            location: GeoPoint::new(36.80, 10.18)
        }
    );
    assert_eq!(
        watcher.try_recv().unwrap(),
        OrderEvent::DeliveryUpdate {
            location: GeoPoint::new(36.81, 10.19)
        }
    );

    let err = delivery_service::report_location(
        &state,
        &driver,
        order_id,
        GeoPoint::new(91.0, 10.0),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    assert!(matches!(watcher.try_recv(), Err(TryRecvError::Empty)));

    // Last-known position is the second report.
    let delivery = delivery_service::get_delivery(&state, order_id)
        .await?
        .data
        .unwrap();
    assert_eq!(delivery.location, GeoPoint::new(36.81, 10.19));
    assert_eq!(delivery.driver_id, Some(driver_id));

    Ok(())
}

#[tokio::test]
async fn create_order_validation_and_atomicity() -> anyhow::Result<()> {
    let _guard = DB_LOCK.lock().await;
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    let state = setup_state(&database_url).await?;

    let customer_id = create_user(&state, "customer", "customer2@example.com").await?;
    let owner_id = create_user(&state, "restaurant", "owner2@example.com").await?;
    let restaurant_id = create_restaurant(&state, owner_id).await?;
    let item_id = create_menu_item(&state, restaurant_id, "Brik", dec!(4.25)).await?;

    let customer = AuthUser {
        user_id: customer_id,
        role: "customer".into(),
    };

    // Empty item list fails before storage.
    let err = order_service::create_order(
        &state,
        &customer,
        CreateOrderRequest {
            restaurant_id,
            items: vec![],
            payment_method: "cash".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    assert_eq!(Orders::find().count(&state.orm).await?, 0);

    // Missing payment method fails before storage.
    let err = order_service::create_order(
        &state,
        &customer,
        CreateOrderRequest {
            restaurant_id,
            items: vec![OrderLineRequest {
                menu_item_id: item_id,
                quantity: 1,
            }],
            payment_method: "".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    // Unknown menu item rolls the whole order back.
    let err = order_service::create_order(
        &state,
        &customer,
        CreateOrderRequest {
            restaurant_id,
            items: vec![
                OrderLineRequest {
                    menu_item_id: item_id,
                    quantity: 1,
                },
                OrderLineRequest {
                    menu_item_id: 999_999,
                    quantity: 1,
                },
            ],
            payment_method: "cash".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(Orders::find().count(&state.orm).await?, 0);
    assert_eq!(OrderItems::find().count(&state.orm).await?, 0);

    Ok(())
}

#[tokio::test]
async fn delete_order_notifies_customer_and_keeps_payment_row() -> anyhow::Result<()> {
    let _guard = DB_LOCK.lock().await;
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    let state = setup_state(&database_url).await?;

    let customer_id = create_user(&state, "customer", "customer3@example.com").await?;
    let admin_id = create_user(&state, "admin", "admin3@example.com").await?;
    let owner_id = create_user(&state, "restaurant", "owner3@example.com").await?;
    let restaurant_id = create_restaurant(&state, owner_id).await?;
    let item_id = create_menu_item(&state, restaurant_id, "Brik", dec!(4.25)).await?;

    let customer = AuthUser {
        user_id: customer_id,
        role: "customer".into(),
    };
    let admin = AuthUser {
        user_id: admin_id,
        role: "admin".into(),
    };

    let err = order_service::delete_order(&state, &admin, 424_242)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let created = order_service::create_order(
        &state,
        &customer,
        CreateOrderRequest {
            restaurant_id,
            items: vec![OrderLineRequest {
                menu_item_id: item_id,
                quantity: 3,
            }],
            payment_method: "cash".into(),
        },
    )
    .await?
    .data
    .unwrap();
    let order_id = created.order.id;

    order_service::delete_order(&state, &admin, order_id).await?;

    let err = order_service::get_order(&state, &customer, order_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    // Items cascade; the payment attempt keeps the dangling order id.
    assert_eq!(
        OrderItems::find()
            .filter(OrderItemCol::OrderId.eq(order_id))
            .count(&state.orm)
            .await?,
        0
    );
    let payment = order_service::latest_payment(&state, order_id).await?;
    assert!(payment.is_some());

    // The customer was told about the removal.
    let notifications = Notifications::find()
        .filter(NotificationCol::UserId.eq(customer_id))
        .filter(NotificationCol::OrderId.eq(order_id))
        .count(&state.orm)
        .await?;
    assert!(notifications >= 1);

    Ok(())
}

async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let orm = create_orm_conn(database_url).await?;
    run_migrations(&orm).await?;

    // Clean tables between runs
    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE order_items, orders, deliveries, payments, notifications, menu_items, restaurants, users RESTART IDENTITY CASCADE",
    ))
    .await?;

    Ok(AppState {
        orm,
        hub: BroadcastHub::new(),
        payments: PaymentClient::disconnected(),
    })
}

async fn create_user(state: &AppState, role: &str, email: &str) -> anyhow::Result<i64> {
    let user = UserActive {
        id: NotSet,
        email: Set(email.to_string()),
        role: Set(role.to_string()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(user.id)
}

async fn create_restaurant(state: &AppState, owner_id: i64) -> anyhow::Result<i64> {
    let restaurant = RestaurantActive {
        id: NotSet,
        name: Set("Test Kitchen".into()),
        owner_id: Set(owner_id),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(restaurant.id)
}

async fn create_menu_item(
    state: &AppState,
    restaurant_id: i64,
    name: &str,
    price: Decimal,
) -> anyhow::Result<i64> {
    let item = MenuItemActive {
        id: NotSet,
        restaurant_id: Set(restaurant_id),
        name: Set(name.to_string()),
        price: Set(price),
        available: Set(true),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(item.id)
}
