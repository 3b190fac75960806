use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::{ActiveModelTrait, DatabaseConnection};

use crate::{entity::notifications, error::AppResult};

/// Insert a notification row for a user.
///
/// Callers treat this as best-effort: a failure is logged, never propagated
/// into the operation that triggered it.
pub async fn notify_user(
    orm: &DatabaseConnection,
    user_id: i64,
    order_id: Option<i64>,
    message: impl Into<String>,
) -> AppResult<()> {
    notifications::ActiveModel {
        id: NotSet,
        user_id: Set(user_id),
        order_id: Set(order_id),
        message: Set(message.into()),
        created_at: NotSet,
    }
    .insert(orm)
    .await?;

    Ok(())
}
