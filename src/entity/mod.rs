pub mod deliveries;
pub mod menu_items;
pub mod notifications;
pub mod order_items;
pub mod orders;
pub mod payments;
pub mod restaurants;
pub mod users;

pub use deliveries::Entity as Deliveries;
pub use menu_items::Entity as MenuItems;
pub use notifications::Entity as Notifications;
pub use order_items::Entity as OrderItems;
pub use orders::Entity as Orders;
pub use payments::Entity as Payments;
pub use restaurants::Entity as Restaurants;
pub use users::Entity as Users;
