//! Order aggregate and related types.

mod aggregate;
mod commands;
mod status;
mod value_objects;

pub use aggregate::Order;
pub use commands::{NewOrder, OrderUpdate};
pub use status::{OrderStatus, TransitionPolicy};
pub use value_objects::{Address, OrderItem, PaymentStatus};
