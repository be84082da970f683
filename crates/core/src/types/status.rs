//! Status enums for catalog entities.

use serde::{Deserialize, Serialize};

/// Product lifecycle status as stored by the backend.
///
/// Only [`ProductStatus::Active`] products are eligible for storefront views.
/// Values the backend may add later deserialize as [`ProductStatus::Unknown`]
/// instead of failing the whole catalog fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    #[default]
    Active,
    Inactive,
    Draft,
    Archived,
    #[serde(other)]
    Unknown,
}

impl ProductStatus {
    /// Whether products with this status may be shown in the storefront.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}
