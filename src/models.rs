use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;

/// Lifecycle state of an order. String values are the wire/database form.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "PAID")]
    Paid,
    #[sea_orm(string_value = "FAILED")]
    Failed,
    #[sea_orm(string_value = "CONFIRMED")]
    Confirmed,
    #[sea_orm(string_value = "PREPARING")]
    Preparing,
    #[sea_orm(string_value = "READY")]
    Ready,
    #[sea_orm(string_value = "IN_TRANSIT")]
    InTransit,
    #[sea_orm(string_value = "DELIVERED")]
    Delivered,
    #[sea_orm(string_value = "CANCELED")]
    Canceled,
}

impl OrderStatus {
    /// States reachable from `self`. Terminal states return an empty slice.
    ///
    /// PENDING → CONFIRMED stays open for payment methods settled outside the
    /// platform (cash on delivery).
    pub fn allowed_next(self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Paid, Failed, Confirmed, Canceled],
            Paid => &[Confirmed, Canceled],
            Failed => &[Paid, Canceled],
            Confirmed => &[Preparing, Ready, Canceled],
            Preparing => &[Ready, Canceled],
            Ready => &[InTransit, Canceled],
            InTransit => &[Delivered, Canceled],
            Delivered | Canceled => &[],
        }
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        self.allowed_next().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_next().is_empty()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Paid => "PAID",
            OrderStatus::Failed => "FAILED",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Preparing => "PREPARING",
            OrderStatus::Ready => "READY",
            OrderStatus::InTransit => "IN_TRANSIT",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Canceled => "CANCELED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settlement state of a single payment attempt.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "PAID")]
    Paid,
    #[sea_orm(string_value = "FAILED")]
    Failed,
}

/// Canonical location payload used by every producer and consumer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Range check; out-of-range coordinates must never reach subscribers.
    pub fn validate(&self) -> Result<(), AppError> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(AppError::BadRequest(format!(
                "latitude {} out of range [-90, 90]",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(AppError::BadRequest(format!(
                "longitude {} out of range [-180, 180]",
                self.longitude
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i64,
    pub customer_id: i64,
    pub restaurant_id: i64,
    pub driver_id: Option<i64>,
    pub status: OrderStatus,
    pub total_price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub menu_item_id: i64,
    pub quantity: i32,
    pub price: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: i64,
    pub order_id: i64,
    pub method: String,
    pub amount: Decimal,
    pub status: PaymentStatus,
    pub reference: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub order_id: i64,
    pub driver_id: Option<i64>,
    pub location: GeoPoint,
    pub updated_at: DateTime<Utc>,
}

impl From<crate::entity::orders::Model> for Order {
    fn from(model: crate::entity::orders::Model) -> Self {
        Order {
            id: model.id,
            customer_id: model.customer_id,
            restaurant_id: model.restaurant_id,
            driver_id: model.driver_id,
            status: model.status,
            total_price: model.total_price,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

impl From<crate::entity::order_items::Model> for OrderItem {
    fn from(model: crate::entity::order_items::Model) -> Self {
        OrderItem {
            id: model.id,
            order_id: model.order_id,
            menu_item_id: model.menu_item_id,
            quantity: model.quantity,
            price: model.price,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

impl From<crate::entity::payments::Model> for Payment {
    fn from(model: crate::entity::payments::Model) -> Self {
        Payment {
            id: model.id,
            order_id: model.order_id,
            method: model.method,
            amount: model.amount,
            status: model.status,
            reference: model.reference,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

impl From<crate::entity::deliveries::Model> for Delivery {
    fn from(model: crate::entity::deliveries::Model) -> Self {
        Delivery {
            order_id: model.order_id,
            driver_id: model.driver_id,
            location: GeoPoint::new(model.latitude, model.longitude),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_have_no_successors() {
        assert!(OrderStatus::Delivered.is_terminal());
        assert!(OrderStatus::Canceled.is_terminal());
        assert!(!OrderStatus::Pending.is_terminal());
    }

    #[test]
    fn forward_transitions_are_allowed() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Paid));
        assert!(OrderStatus::Paid.can_transition_to(OrderStatus::Confirmed));
        assert!(OrderStatus::Confirmed.can_transition_to(OrderStatus::Preparing));
        assert!(OrderStatus::Preparing.can_transition_to(OrderStatus::Ready));
        assert!(OrderStatus::Ready.can_transition_to(OrderStatus::InTransit));
        assert!(OrderStatus::InTransit.can_transition_to(OrderStatus::Delivered));
    }

    #[test]
    fn skipping_and_rewinding_are_rejected() {
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Delivered));
        assert!(!OrderStatus::Paid.can_transition_to(OrderStatus::Ready));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Canceled.can_transition_to(OrderStatus::Confirmed));
        assert!(!OrderStatus::Confirmed.can_transition_to(OrderStatus::Paid));
    }

    #[test]
    fn cash_orders_confirm_before_settlement() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Confirmed));
    }

    #[test]
    fn geo_point_range_validation() {
        assert!(GeoPoint::new(36.80, 10.18).validate().is_ok());
        assert!(GeoPoint::new(-90.0, 180.0).validate().is_ok());
        assert!(GeoPoint::new(91.0, 10.0).validate().is_err());
        assert!(GeoPoint::new(-90.5, 0.0).validate().is_err());
        assert!(GeoPoint::new(0.0, 180.5).validate().is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).validate().is_err());
    }

    #[test]
    fn status_serializes_to_wire_form() {
        let json = serde_json::to_string(&OrderStatus::InTransit).unwrap();
        assert_eq!(json, "\"IN_TRANSIT\"");
        let back: OrderStatus = serde_json::from_str("\"CONFIRMED\"").unwrap();
        assert_eq!(back, OrderStatus::Confirmed);
    }
}
