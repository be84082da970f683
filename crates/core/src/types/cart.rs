//! Cart line items and the normalization of incoming product shapes.
//!
//! Callers hand the cart whatever product shape they have at hand: a full
//! catalog [`Product`], a search hit with only a title and an image, or a
//! JSON body from a form. [`ProductInput`] captures all of those as explicit
//! optional fields, and [`ProductInput::into_cart_item`] applies one set of
//! defaulting rules to produce a [`CartItem`].

use serde::{Deserialize, Serialize};

use super::id::ProductId;
use super::price::Price;
use super::product::Product;

/// Name used when an incoming product has none.
pub const DEFAULT_NAME: &str = "Produto";
/// Image used when an incoming product has none.
pub const DEFAULT_IMAGE: &str = "/placeholder.svg";
/// Brand used when an incoming product has none.
pub const DEFAULT_BRAND: &str = "Sem marca";

/// One line in the cart.
///
/// `price` is the display string (`R$ 100,00`); totals parse it on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: ProductId,
    pub name: String,
    pub price: String,
    pub image: String,
    pub brand: String,
    pub quantity: u32,
}

impl CartItem {
    /// Parsed unit price; unparseable prices count as zero.
    #[must_use]
    pub fn unit_price(&self) -> Price {
        Price::parse_or_zero(&self.price)
    }

    /// Unit price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.unit_price() * self.quantity
    }
}

/// A price as it may arrive from a loosely-typed source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawPrice {
    Text(String),
    Number(serde_json::Number),
}

/// Loosely-typed product shape accepted by the cart.
///
/// Every field is optional. `title`, `image_url`, and `images` are accepted
/// as fallbacks for `name` and `image`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductInput {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub price: Option<RawPrice>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub images: Option<Vec<String>>,
    #[serde(default)]
    pub brand: Option<String>,
}

/// Result of normalizing a [`ProductInput`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub item: CartItem,
    /// Names of the fields that fell back to defaults.
    pub defaulted: Vec<&'static str>,
}

impl Normalized {
    /// Whether any field had to be defaulted.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.defaulted.is_empty()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

impl ProductInput {
    /// Normalize into a cart line with the given quantity.
    #[must_use]
    pub fn into_cart_item(self, quantity: u32) -> Normalized {
        let mut defaulted = Vec::new();

        let id = non_blank(self.id).map_or_else(
            || {
                defaulted.push("id");
                ProductId::synthetic()
            },
            ProductId::new,
        );

        let name = non_blank(self.name)
            .or_else(|| non_blank(self.title))
            .unwrap_or_else(|| {
                defaulted.push("name");
                DEFAULT_NAME.to_string()
            });

        let price = self.price.and_then(normalize_price).unwrap_or_else(|| {
            defaulted.push("price");
            Price::ZERO.display()
        });

        let first_image = self
            .images
            .and_then(|images| images.into_iter().find(|i| !i.trim().is_empty()));
        let image = non_blank(self.image)
            .or_else(|| non_blank(self.image_url))
            .or(first_image)
            .unwrap_or_else(|| {
                defaulted.push("image");
                DEFAULT_IMAGE.to_string()
            });

        let brand = non_blank(self.brand).unwrap_or_else(|| {
            defaulted.push("brand");
            DEFAULT_BRAND.to_string()
        });

        Normalized {
            item: CartItem {
                id,
                name,
                price,
                image,
                brand,
                quantity,
            },
            defaulted,
        }
    }
}

/// Keep display strings that already carry the currency symbol, reformat
/// bare numbers, and reject anything without digits.
fn normalize_price(raw: RawPrice) -> Option<String> {
    match raw {
        RawPrice::Text(text) => {
            let text = text.trim();
            let parsed = Price::parse(text).ok()?;
            if text.starts_with("R$") {
                Some(text.to_string())
            } else {
                Some(parsed.display())
            }
        }
        RawPrice::Number(number) => Price::from_json_number(&number).map(|p| p.display()),
    }
}

impl From<&Product> for ProductInput {
    fn from(product: &Product) -> Self {
        Self {
            id: Some(product.id.to_string()),
            name: Some(product.name.clone()),
            title: None,
            price: Some(RawPrice::Text(product.price.clone())),
            image: product.image.clone(),
            image_url: None,
            images: Some(product.images.clone()),
            brand: Some(product.brand.clone()),
        }
    }
}
