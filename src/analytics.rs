//! Derived analytics over purchase records
//!
//! Pure aggregation functions working on rows the store has already
//! fetched: the purchase cost rule, per-product price comparison across
//! suppliers, and the top-products spending ranking.

use serde::Serialize;
use std::cmp::Ordering;

use crate::models::{Company, Product, Purchase, PurchaseWithCompany};

/// The purchase cost rule: total cost is price times quantity
pub fn total_cost(price: f64, quantity: i64) -> f64 {
    price * quantity as f64
}

/// Aggregated purchase statistics for one supplier of a product
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyPriceEntry {
    pub company: Company,
    pub latest_price: f64,
    pub latest_purchase_date: String,
    pub average_price: f64,
    pub total_purchases: usize,
}

/// Supplier ranking for one product, cheapest current price first
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceComparison {
    pub product_id: i64,
    pub companies: Vec<CompanyPriceEntry>,
    pub best_price: Option<CompanyPriceEntry>,
}

/// Compare supplier prices for one product.
///
/// Expects the product's purchases ordered by purchase date descending, so
/// the first purchase seen per company is that company's latest. Output is
/// sorted ascending by latest price; the sort is stable, ties keep
/// first-seen order. `best_price` is the cheapest entry, or None when the
/// product has no purchases.
pub fn compare_supplier_prices(
    product_id: i64,
    purchases: &[PurchaseWithCompany],
) -> PriceComparison {
    struct Acc {
        entry: CompanyPriceEntry,
        price_sum: f64,
    }

    let mut groups: Vec<Acc> = Vec::new();

    for record in purchases {
        let company_id = record.company.id;
        match groups.iter_mut().find(|g| g.entry.company.id == company_id) {
            Some(group) => {
                group.price_sum += record.purchase.price;
                group.entry.total_purchases += 1;
                group.entry.average_price = group.price_sum / group.entry.total_purchases as f64;
            }
            None => groups.push(Acc {
                entry: CompanyPriceEntry {
                    company: record.company.clone(),
                    latest_price: record.purchase.price,
                    latest_purchase_date: record.purchase.purchase_date.clone(),
                    average_price: record.purchase.price,
                    total_purchases: 1,
                },
                price_sum: record.purchase.price,
            }),
        }
    }

    let mut companies: Vec<CompanyPriceEntry> = groups.into_iter().map(|g| g.entry).collect();
    companies.sort_by(|a, b| {
        a.latest_price
            .partial_cmp(&b.latest_price)
            .unwrap_or(Ordering::Equal)
    });

    PriceComparison {
        product_id,
        best_price: companies.first().cloned(),
        companies,
    }
}

/// A product ranked by how much was spent on it
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSpending {
    #[serde(flatten)]
    pub product: Product,
    pub total_spent: f64,
    pub total_quantity: i64,
    pub purchase_count: usize,
}

/// Rank products by total spend, descending, truncated to `limit`.
///
/// The sort is stable, so products with equal spend keep their input order.
pub fn rank_top_products(
    products: Vec<(Product, Vec<Purchase>)>,
    limit: usize,
) -> Vec<ProductSpending> {
    let mut ranked: Vec<ProductSpending> = products
        .into_iter()
        .map(|(product, purchases)| ProductSpending {
            product,
            total_spent: purchases.iter().map(|p| p.total_cost).sum(),
            total_quantity: purchases.iter().map(|p| p.quantity).sum(),
            purchase_count: purchases.len(),
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.total_spent
            .partial_cmp(&a.total_spent)
            .unwrap_or(Ordering::Equal)
    });
    ranked.truncate(limit);
    ranked
}
