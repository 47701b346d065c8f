//! Bakery Points Core - Shared types library.
//!
//! This crate provides common types used across all Bakery Points components:
//! - `storefront` - LINE storefront (points, virtual cards, sales portal)
//! - `integration-tests` - End-to-end flow tests
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no HTTP clients.
//! This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, LINE identities, prices and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
