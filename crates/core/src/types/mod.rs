//! Core types for Bazaar.
//!
//! This module provides type-safe wrappers for the cart and delivery domain.

pub mod cart;
pub mod geo;
pub mod id;

pub use cart::{CartItem, CartPhase, CartTotals};
pub use geo::{Eta, EtaModel, GeoError, GeoPoint, SelectedAddress, estimate_eta, haversine_km};
pub use id::*;
