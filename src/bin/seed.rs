use rust_decimal::Decimal;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};

use delivery_orders_api::{
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    entity::{
        menu_items::ActiveModel as MenuItemActive,
        restaurants::{ActiveModel as RestaurantActive, Column as RestaurantCol, Entity as Restaurants},
        users::{ActiveModel as UserActive, Column as UserCol, Entity as Users},
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let orm = create_orm_conn(&config.database_url).await?;
    run_migrations(&orm).await?;

    let admin_id = ensure_user(&orm, "admin@example.com", "admin").await?;
    let customer_id = ensure_user(&orm, "customer@example.com", "customer").await?;
    let driver_id = ensure_user(&orm, "driver@example.com", "driver").await?;
    let owner_id = ensure_user(&orm, "owner@example.com", "restaurant").await?;

    let restaurant_id = ensure_restaurant(&orm, "Chez Demo", owner_id).await?;

    println!(
        "Seed completed. Admin {admin_id}, customer {customer_id}, driver {driver_id}, restaurant {restaurant_id}"
    );
    Ok(())
}

async fn ensure_user(
    orm: &sea_orm::DatabaseConnection,
    email: &str,
    role: &str,
) -> anyhow::Result<i64> {
    if let Some(existing) = Users::find()
        .filter(UserCol::Email.eq(email))
        .one(orm)
        .await?
    {
        return Ok(existing.id);
    }

    let user = UserActive {
        id: NotSet,
        email: Set(email.to_string()),
        role: Set(role.to_string()),
        created_at: NotSet,
    }
    .insert(orm)
    .await?;

    Ok(user.id)
}

async fn ensure_restaurant(
    orm: &sea_orm::DatabaseConnection,
    name: &str,
    owner_id: i64,
) -> anyhow::Result<i64> {
    if let Some(existing) = Restaurants::find()
        .filter(RestaurantCol::Name.eq(name))
        .one(orm)
        .await?
    {
        return Ok(existing.id);
    }

    let restaurant = RestaurantActive {
        id: NotSet,
        name: Set(name.to_string()),
        owner_id: Set(owner_id),
        created_at: NotSet,
    }
    .insert(orm)
    .await?;

    for (item, price) in [("Couscous", "12.50"), ("Mint tea", "6.00"), ("Brik", "4.25")] {
        MenuItemActive {
            id: NotSet,
            restaurant_id: Set(restaurant.id),
            name: Set(item.to_string()),
            price: Set(price.parse::<Decimal>()?),
            available: Set(true),
            created_at: NotSet,
        }
        .insert(orm)
        .await?;
    }

    Ok(restaurant.id)
}
