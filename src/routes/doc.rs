use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        deliveries::LocationReport,
        orders::{
            AssignDriverRequest, CreateOrderRequest, CreatedOrder, OrderLineRequest, OrderList,
            OrderWithItems, UpdateOrderStatusRequest,
        },
    },
    error::ErrorData,
    models::{Delivery, GeoPoint, Order, OrderItem, OrderStatus, Payment, PaymentStatus},
    response::{ApiResponse, Meta},
    routes::{deliveries, health, orders, params},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        orders::create_order,
        orders::list_orders,
        orders::list_confirmed,
        orders::get_order,
        orders::delete_order,
        orders::mark_paid,
        orders::mark_failed,
        orders::confirm,
        orders::mark_ready,
        orders::assign_driver,
        orders::cancel,
        orders::update_status,
        deliveries::get_delivery,
        deliveries::update_location
    ),
    components(
        schemas(
            Order,
            OrderItem,
            OrderStatus,
            Payment,
            PaymentStatus,
            Delivery,
            GeoPoint,
            CreateOrderRequest,
            OrderLineRequest,
            AssignDriverRequest,
            UpdateOrderStatusRequest,
            CreatedOrder,
            OrderWithItems,
            OrderList,
            LocationReport,
            params::Pagination,
            params::OrderListQuery,
            params::SortOrder,
            ErrorData,
            Meta,
            ApiResponse<Order>,
            ApiResponse<CreatedOrder>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<Delivery>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Orders", description = "Order lifecycle endpoints"),
        (name = "Deliveries", description = "Driver location relay endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
