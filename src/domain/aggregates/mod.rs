//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;
pub mod discount;

pub use product::Product;
pub use order::{NewOrder, Order, OrderItem, OrderStatus};
pub use cart::{Cart, CartLine};
pub use discount::DiscountCode;
