//! Entity types and request payloads
//!
//! All wire types serialize with camelCase field names to match the JSON API.
//! Timestamps are RFC 3339 strings in UTC.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A catalog item that can be purchased from suppliers
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub unit: String,
    pub sku: Option<String>,
    pub min_stock: Option<i64>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A supplier company from which products are purchased
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: i64,
    pub name: String,
    pub contact: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A record of buying a quantity of a product from a company
///
/// `total_cost` is stored redundantly and kept equal to `price * quantity`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    pub id: i64,
    pub product_id: i64,
    pub company_id: i64,
    pub price: f64,
    pub quantity: i64,
    pub total_cost: f64,
    pub purchase_date: String,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Purchase with its supplier attached (embedded in product responses)
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseWithCompany {
    #[serde(flatten)]
    pub purchase: Purchase,
    pub company: Company,
}

/// Purchase with its product attached (embedded in company responses)
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseWithProduct {
    #[serde(flatten)]
    pub purchase: Purchase,
    pub product: Product,
}

/// Purchase with both sides of the relation attached
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseDetail {
    #[serde(flatten)]
    pub purchase: Purchase,
    pub product: Product,
    pub company: Company,
}

/// Product with its purchase history attached, newest first
#[derive(Debug, Clone, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub purchases: Vec<PurchaseWithCompany>,
}

/// Company with its purchase history attached, newest first
#[derive(Debug, Clone, Serialize)]
pub struct CompanyDetail {
    #[serde(flatten)]
    pub company: Company,
    pub purchases: Vec<PurchaseWithProduct>,
}

/// Overall statistics for the dashboard
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_products: i64,
    pub total_companies: i64,
    pub total_purchases: i64,
    pub total_spent: f64,
    pub recent_purchases: Vec<PurchaseDetail>,
}

// ── Request payloads ───────────────────────────────────────────────────────
//
// Every field is optional at the wire level so that missing required fields
// surface as field-level diagnostics instead of deserialization failures.
// The same payload type serves create (full validation) and update (partial
// validation), mirroring how the API treats PUT bodies as partial patches.

/// Incoming product fields for create/update
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPayload {
    pub name: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub sku: Option<String>,
    pub min_stock: Option<i64>,
    pub notes: Option<String>,
}

/// Incoming company fields for create/update
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyPayload {
    pub name: Option<String>,
    pub contact: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

/// Incoming purchase fields for create/update
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchasePayload {
    pub product_id: Option<i64>,
    pub company_id: Option<i64>,
    pub price: Option<f64>,
    pub quantity: Option<i64>,
    pub purchase_date: Option<String>,
    pub notes: Option<String>,
}

// ── Validated inputs ───────────────────────────────────────────────────────

/// A product payload that passed create validation
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub unit: String,
    pub sku: Option<String>,
    pub min_stock: Option<i64>,
    pub notes: Option<String>,
}

/// A company payload that passed create validation
#[derive(Debug, Clone)]
pub struct NewCompany {
    pub name: String,
    pub contact: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

/// A purchase payload that passed create validation
///
/// `purchase_date` is parsed here; the store formats it back to RFC 3339 UTC
/// (or uses the creation instant when absent).
#[derive(Debug, Clone)]
pub struct NewPurchase {
    pub product_id: i64,
    pub company_id: i64,
    pub price: f64,
    pub quantity: i64,
    pub purchase_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// A purchase payload that passed partial validation
#[derive(Debug, Clone, Default)]
pub struct PurchasePatch {
    pub product_id: Option<i64>,
    pub company_id: Option<i64>,
    pub price: Option<f64>,
    pub quantity: Option<i64>,
    pub purchase_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}
