//! Aggregates module
pub mod cart;
pub mod order;

pub use cart::{Cart, CartItem, CartStorage, FileCartStorage, MemoryCartStorage};
pub use order::{Order, OrderError, OrderItem, OrderStatus, PaymentMethod, PaymentStatus};
