//! Domain models for the storefront.
//!
//! All entities are owned by the external backend; these are the transient
//! copies the storefront reads, caches and renders. Wire names are camelCase.

pub mod cart;
pub mod customer;
pub mod points;
pub mod salesperson;
pub mod session;

pub use cart::{Cart, CartItem, CartTotals};
pub use customer::{CustomerRecord, LineProfile};
pub use points::{PointsBalance, PointsTransaction, PurchaseRecord, VirtualCardProduct};
pub use salesperson::SalespersonCredential;
pub use session::storage_keys;
