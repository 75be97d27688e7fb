//! Order lifecycle domain: cart, pricing, drafts, checkout, the order
//! aggregate and its tracking view.
pub mod aggregates;
pub mod checkout;
pub mod draft;
pub mod events;
pub mod pricing;
pub mod tracking;
pub mod value_objects;
