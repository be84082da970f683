//! Core types for Vitrine.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod cart;
pub mod id;
pub mod price;
pub mod product;
pub mod status;

pub use cart::{CartItem, Normalized, ProductInput, RawPrice};
pub use id::*;
pub use price::{Price, PriceParseError};
pub use product::{Product, badges};
pub use status::ProductStatus;
