//! Core types for Bakery Points.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod id;
pub mod line;
pub mod price;
pub mod status;

pub use id::*;
pub use line::{LineUserId, LineUserIdError};
pub use price::Price;
pub use status::*;
