//! Catalog product record and the storefront classification rules.
//!
//! Products arrive from the hosted backend as loosely-maintained rows, so
//! deserialization tolerates `null` in place of most fields and accepts
//! prices either as display strings or as JSON numbers.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::id::ProductId;
use super::price::Price;
use super::status::ProductStatus;

/// Badge vocabularies that drive storefront sections.
///
/// Membership is exact (case-sensitive): the admin panel writes these
/// literal spellings.
pub mod badges {
    /// Badges that mark a product as featured.
    pub const FEATURED: &[&str] = &["DESTAQUE", "Destaque"];

    /// Badges that mark a product as new.
    pub const NEW: &[&str] = &["NOVIDADE", "Novidade", "NOVO", "Novo", "LIMITADO", "Limitado"];

    /// Badges that mark a product as on sale.
    pub const ON_SALE: &[&str] = &[
        "OFERTA",
        "PROMOÇÃO",
        "DESCONTO",
        "Oferta",
        "Promoção",
        "Desconto",
    ];
}

/// How long after creation a product counts as new.
pub const NEW_PRODUCT_WINDOW_DAYS: i64 = 30;

/// A watch in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub brand: String,
    /// Display price, e.g. `R$ 1.299,90`.
    #[serde(default, deserialize_with = "price_text")]
    pub price: String,
    /// Display price before discount, if any.
    #[serde(default, deserialize_with = "optional_price_text")]
    pub original_price: Option<String>,
    #[serde(default, alias = "image_url")]
    pub image: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub images: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub badges: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_featured: bool,
    #[serde(default = "default_visible", deserialize_with = "null_as_default")]
    pub is_visible: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: ProductStatus,
    /// Units in stock; absent means zero.
    #[serde(default)]
    pub stock_quantity: Option<i64>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub sort_order: Option<i32>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

const fn default_visible() -> bool {
    true
}

impl Product {
    /// Visible and active: the precondition for every storefront view.
    #[must_use]
    pub const fn is_listed(&self) -> bool {
        self.is_visible && self.status.is_active()
    }

    /// Stock on hand, treating an absent count as zero.
    #[must_use]
    pub fn stock(&self) -> i64 {
        self.stock_quantity.unwrap_or(0)
    }

    /// Whether any of the product's badges appears in `vocabulary`.
    #[must_use]
    pub fn has_badge(&self, vocabulary: &[&str]) -> bool {
        self.badges.iter().any(|b| vocabulary.contains(&b.as_str()))
    }

    /// Flagged as featured, or carries a featured badge.
    #[must_use]
    pub fn is_featured_product(&self) -> bool {
        self.is_featured || self.has_badge(badges::FEATURED)
    }

    /// Created within [`NEW_PRODUCT_WINDOW_DAYS`] of `now`, or carries a
    /// new/limited badge.
    #[must_use]
    pub fn is_new(&self, now: DateTime<Utc>) -> bool {
        let recent = self
            .created_at
            .is_some_and(|created| created >= now - Duration::days(NEW_PRODUCT_WINDOW_DAYS));
        recent || self.has_badge(badges::NEW)
    }

    /// Carries a sale badge, or its original price is above the current one.
    #[must_use]
    pub fn is_on_sale(&self) -> bool {
        if self.has_badge(badges::ON_SALE) {
            return true;
        }

        let Some(original) = self.original_price.as_deref() else {
            return false;
        };
        match (Price::parse(original), Price::parse(&self.price)) {
            (Ok(original), Ok(current)) => original > current,
            _ => false,
        }
    }

    /// No units on hand.
    #[must_use]
    pub fn is_out_of_stock(&self) -> bool {
        self.stock() <= 0
    }

    /// Case-insensitive substring match over the searchable text fields.
    ///
    /// `needle` must already be lowercase.
    #[must_use]
    pub fn matches_query(&self, needle: &str) -> bool {
        let fields = [
            Some(self.name.as_str()),
            Some(self.brand.as_str()),
            self.description.as_deref(),
            self.category.as_deref(),
        ];
        fields
            .into_iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(needle))
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn price_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(optional_price_text(deserializer)?.unwrap_or_default())
}

fn optional_price_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(text)) if !text.trim().is_empty() => Some(text),
        Some(serde_json::Value::Number(number)) => {
            Price::from_json_number(&number).map(|p| p.display())
        }
        _ => None,
    })
}
