//! Bazaar Core - Shared types library.
//!
//! This crate provides the types used across the Bazaar cart components:
//! - `client` - Cart session manager, local storage, and backend HTTP client
//! - `cli` - Command-line front end over the client library
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no
//! storage access, no HTTP clients. This keeps it lightweight and allows it
//! to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, cart items and totals, geo points and ETA math

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
