//! Derived catalog views.
//!
//! Every view filters the snapshot in memory; none of them touches the
//! network. Only listed (visible and active) products are eligible.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use vitrine_core::{Product, ProductId};

/// Maximum featured products returned.
pub const FEATURED_LIMIT: usize = 8;
/// Maximum products returned for one brand.
pub const BRAND_LIMIT: usize = 30;
/// Maximum new products returned.
pub const NEW_LIMIT: usize = 12;
/// Maximum on-sale products returned.
pub const OFFERS_LIMIT: usize = 12;
/// Maximum out-of-stock products returned.
pub const OUT_OF_STOCK_LIMIT: usize = 30;
/// Maximum search results returned.
pub const SEARCH_LIMIT: usize = 30;
/// Maximum related products returned.
pub const RELATED_LIMIT: usize = 4;

fn listed(products: &[Product]) -> impl Iterator<Item = &Product> {
    products.iter().filter(|p| p.is_listed())
}

fn take_matching<F>(products: &[Product], limit: usize, predicate: F) -> Vec<Product>
where
    F: Fn(&Product) -> bool,
{
    listed(products)
        .filter(|p| predicate(p))
        .take(limit)
        .cloned()
        .collect()
}

#[must_use]
pub fn featured(products: &[Product]) -> Vec<Product> {
    take_matching(products, FEATURED_LIMIT, Product::is_featured_product)
}

/// Products of `brand`, compared case-insensitively.
#[must_use]
pub fn by_brand(products: &[Product], brand: &str) -> Vec<Product> {
    let brand = brand.trim().to_lowercase();
    take_matching(products, BRAND_LIMIT, |p| p.brand.to_lowercase() == brand)
}

#[must_use]
pub fn new_arrivals(products: &[Product], now: DateTime<Utc>) -> Vec<Product> {
    take_matching(products, NEW_LIMIT, |p| p.is_new(now))
}

#[must_use]
pub fn offers(products: &[Product]) -> Vec<Product> {
    take_matching(products, OFFERS_LIMIT, Product::is_on_sale)
}

#[must_use]
pub fn out_of_stock(products: &[Product]) -> Vec<Product> {
    take_matching(products, OUT_OF_STOCK_LIMIT, Product::is_out_of_stock)
}

/// Substring search over name, brand, description and category.
///
/// A blank query matches nothing.
#[must_use]
pub fn search(products: &[Product], query: &str) -> Vec<Product> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    take_matching(products, SEARCH_LIMIT, |p| p.matches_query(&needle))
}

/// Other listed products sharing the brand of `id`, then its category.
#[must_use]
pub fn related(products: &[Product], id: &ProductId) -> Vec<Product> {
    let Some(anchor) = products.iter().find(|p| &p.id == id) else {
        return Vec::new();
    };
    let brand = anchor.brand.to_lowercase();

    let candidates = || listed(products).filter(move |p| &p.id != id);
    let same_brand = candidates().filter(|p| !brand.is_empty() && p.brand.to_lowercase() == brand);
    let same_category = candidates().filter(|p| {
        anchor.category.is_some()
            && p.category == anchor.category
            && p.brand.to_lowercase() != brand
    });

    same_brand
        .chain(same_category)
        .take(RELATED_LIMIT)
        .cloned()
        .collect()
}

/// Sorted, de-duplicated brand names of listed products.
#[must_use]
pub fn brands(products: &[Product]) -> Vec<String> {
    listed(products)
        .map(|p| p.brand.trim())
        .filter(|b| !b.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
