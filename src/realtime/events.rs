use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{GeoPoint, OrderStatus};

/// Named channel a client can subscribe to.
///
/// `Orders` is the global channel carrying confirmation/status/driver events;
/// the other two are scoped to a single order. `Display` renders the wire
/// name clients see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Orders,
    Delivery(i64),
    OrderConfirmation(i64),
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Orders => f.write_str("orders"),
            Topic::Delivery(order_id) => write!(f, "deliveryUpdate-{order_id}"),
            Topic::OrderConfirmation(order_id) => write!(f, "orderConfirmation-{order_id}"),
        }
    }
}

/// Events pushed to subscribers. The `event` tag matches the names the
/// frontend listens for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum OrderEvent {
    OrderPaymentConfirmed {
        order_id: i64,
    },
    OrderStatusUpdated {
        order_id: i64,
        status: OrderStatus,
    },
    DriverAssigned {
        order_id: i64,
        driver_id: i64,
    },
    OrderConfirmation {
        status: OrderStatus,
    },
    DeliveryUpdate {
        #[serde(flatten)]
        location: GeoPoint,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_wire_names() {
        assert_eq!(Topic::Orders.to_string(), "orders");
        assert_eq!(Topic::Delivery(42).to_string(), "deliveryUpdate-42");
        assert_eq!(
            Topic::OrderConfirmation(7).to_string(),
            "orderConfirmation-7"
        );
    }

    #[test]
    fn events_serialize_with_source_tags() {
        let json = serde_json::to_value(OrderEvent::OrderPaymentConfirmed { order_id: 3 }).unwrap();
        assert_eq!(json["event"], "orderPaymentConfirmed");
        assert_eq!(json["data"]["orderId"], 3);

        let json = serde_json::to_value(OrderEvent::DriverAssigned {
            order_id: 3,
            driver_id: 7,
        })
        .unwrap();
        assert_eq!(json["event"], "driverAssigned");
        assert_eq!(json["data"]["driverId"], 7);

        let json = serde_json::to_value(OrderEvent::OrderStatusUpdated {
            order_id: 3,
            status: OrderStatus::Ready,
        })
        .unwrap();
        assert_eq!(json["event"], "orderStatusUpdated");
        assert_eq!(json["data"]["status"], "READY");
    }

    #[test]
    fn delivery_update_uses_canonical_field_names() {
        let json = serde_json::to_value(OrderEvent::DeliveryUpdate {
            location: GeoPoint::new(36.80, 10.18),
        })
        .unwrap();
        assert_eq!(json["event"], "deliveryUpdate");
        assert_eq!(json["data"]["latitude"], 36.80);
        assert_eq!(json["data"]["longitude"], 10.18);
        assert!(json["data"].get("lat").is_none());
    }
}
