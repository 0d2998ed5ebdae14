//! Payload validation with field-level diagnostics
//!
//! Create validation enforces required fields and produces a fully typed
//! input struct; partial validation checks only the fields a PUT body
//! actually supplies. Every failure names the offending field so the API
//! can return structured 400 responses.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{
    CompanyPayload, NewCompany, NewProduct, NewPurchase, ProductPayload, PurchasePatch,
    PurchasePayload,
};

/// A single validation failure, tied to the field that caused it
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: &str) -> Self {
        FieldError {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

/// Parse an RFC 3339 timestamp into UTC
pub fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Minimal structural check for email addresses (local@domain.tld)
fn is_valid_email(value: &str) -> bool {
    let mut parts = value.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.chars().any(char::is_whitespace)
        }
        _ => false,
    }
}

fn check_name(name: &Option<String>, required: bool, errors: &mut Vec<FieldError>) {
    match name {
        Some(value) if value.trim().is_empty() => {
            errors.push(FieldError::new("name", "must not be empty"));
        }
        None if required => {
            errors.push(FieldError::new("name", "is required"));
        }
        _ => {}
    }
}

/// Validate a product payload for create
pub fn validate_new_product(payload: &ProductPayload) -> Result<NewProduct, Vec<FieldError>> {
    let mut errors = Vec::new();
    check_name(&payload.name, true, &mut errors);
    check_min_stock(payload.min_stock, &mut errors);

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(NewProduct {
        name: payload.name.clone().unwrap_or_default(),
        category: payload.category.clone(),
        description: payload.description.clone(),
        unit: payload.unit.clone().unwrap_or_else(|| "piece".to_string()),
        sku: payload.sku.clone(),
        min_stock: payload.min_stock,
        notes: payload.notes.clone(),
    })
}

/// Validate a product payload for partial update
pub fn validate_product_patch(payload: &ProductPayload) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();
    check_name(&payload.name, false, &mut errors);
    check_min_stock(payload.min_stock, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_min_stock(min_stock: Option<i64>, errors: &mut Vec<FieldError>) {
    if let Some(value) = min_stock {
        if value < 0 {
            errors.push(FieldError::new("minStock", "must not be negative"));
        }
    }
}

/// Validate a company payload for create
pub fn validate_new_company(payload: &CompanyPayload) -> Result<NewCompany, Vec<FieldError>> {
    let mut errors = Vec::new();
    check_name(&payload.name, true, &mut errors);
    check_email(&payload.email, &mut errors);

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(NewCompany {
        name: payload.name.clone().unwrap_or_default(),
        contact: payload.contact.clone(),
        email: payload.email.clone(),
        phone: payload.phone.clone(),
        address: payload.address.clone(),
        notes: payload.notes.clone(),
    })
}

/// Validate a company payload for partial update
pub fn validate_company_patch(payload: &CompanyPayload) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();
    check_name(&payload.name, false, &mut errors);
    check_email(&payload.email, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_email(email: &Option<String>, errors: &mut Vec<FieldError>) {
    if let Some(value) = email {
        if !is_valid_email(value) {
            errors.push(FieldError::new("email", "must be a valid email address"));
        }
    }
}

fn check_price(price: Option<f64>, required: bool, errors: &mut Vec<FieldError>) {
    match price {
        Some(value) if !value.is_finite() || value <= 0.0 => {
            errors.push(FieldError::new("price", "must be a positive number"));
        }
        None if required => {
            errors.push(FieldError::new("price", "is required"));
        }
        _ => {}
    }
}

fn check_quantity(quantity: Option<i64>, errors: &mut Vec<FieldError>) {
    if let Some(value) = quantity {
        if value < 1 {
            errors.push(FieldError::new("quantity", "must be a positive integer"));
        }
    }
}

fn check_purchase_date(
    date: &Option<String>,
    errors: &mut Vec<FieldError>,
) -> Option<DateTime<Utc>> {
    match date {
        Some(value) => match parse_datetime(value) {
            Some(parsed) => Some(parsed),
            None => {
                errors.push(FieldError::new(
                    "purchaseDate",
                    "must be an RFC 3339 datetime",
                ));
                None
            }
        },
        None => None,
    }
}

/// Validate a purchase payload for create
pub fn validate_new_purchase(payload: &PurchasePayload) -> Result<NewPurchase, Vec<FieldError>> {
    let mut errors = Vec::new();

    if payload.product_id.is_none() {
        errors.push(FieldError::new("productId", "is required"));
    }
    if payload.company_id.is_none() {
        errors.push(FieldError::new("companyId", "is required"));
    }
    check_price(payload.price, true, &mut errors);
    check_quantity(payload.quantity, &mut errors);
    let purchase_date = check_purchase_date(&payload.purchase_date, &mut errors);

    let (Some(product_id), Some(company_id), Some(price)) =
        (payload.product_id, payload.company_id, payload.price)
    else {
        return Err(errors);
    };
    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(NewPurchase {
        product_id,
        company_id,
        price,
        quantity: payload.quantity.unwrap_or(1),
        purchase_date,
        notes: payload.notes.clone(),
    })
}

/// Validate a purchase payload for partial update
pub fn validate_purchase_patch(payload: &PurchasePayload) -> Result<PurchasePatch, Vec<FieldError>> {
    let mut errors = Vec::new();
    check_price(payload.price, false, &mut errors);
    check_quantity(payload.quantity, &mut errors);
    let purchase_date = check_purchase_date(&payload.purchase_date, &mut errors);

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(PurchasePatch {
        product_id: payload.product_id,
        company_id: payload.company_id,
        price: payload.price,
        quantity: payload.quantity,
        purchase_date,
        notes: payload.notes.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_names(errors: &[FieldError]) -> Vec<&str> {
        errors.iter().map(|e| e.field.as_str()).collect()
    }

    #[test]
    fn new_product_requires_name() {
        let errors = validate_new_product(&ProductPayload::default()).unwrap_err();
        assert_eq!(field_names(&errors), vec!["name"]);
    }

    #[test]
    fn new_product_rejects_blank_name() {
        let payload = ProductPayload {
            name: Some("   ".to_string()),
            ..Default::default()
        };
        let errors = validate_new_product(&payload).unwrap_err();
        assert_eq!(field_names(&errors), vec!["name"]);
    }

    #[test]
    fn new_product_defaults_unit_to_piece() {
        let payload = ProductPayload {
            name: Some("Copy paper".to_string()),
            ..Default::default()
        };
        let product = validate_new_product(&payload).unwrap();
        assert_eq!(product.unit, "piece");
    }

    #[test]
    fn new_product_rejects_negative_min_stock() {
        let payload = ProductPayload {
            name: Some("Copy paper".to_string()),
            min_stock: Some(-1),
            ..Default::default()
        };
        let errors = validate_new_product(&payload).unwrap_err();
        assert_eq!(field_names(&errors), vec!["minStock"]);
    }

    #[test]
    fn product_patch_allows_missing_name() {
        let payload = ProductPayload {
            category: Some("office".to_string()),
            ..Default::default()
        };
        assert!(validate_product_patch(&payload).is_ok());
    }

    #[test]
    fn product_patch_rejects_blank_name() {
        let payload = ProductPayload {
            name: Some("".to_string()),
            ..Default::default()
        };
        assert!(validate_product_patch(&payload).is_err());
    }

    #[test]
    fn new_company_checks_email_shape() {
        let payload = CompanyPayload {
            name: Some("Acme GmbH".to_string()),
            email: Some("not-an-email".to_string()),
            ..Default::default()
        };
        let errors = validate_new_company(&payload).unwrap_err();
        assert_eq!(field_names(&errors), vec!["email"]);

        let payload = CompanyPayload {
            name: Some("Acme GmbH".to_string()),
            email: Some("orders@acme.example".to_string()),
            ..Default::default()
        };
        assert!(validate_new_company(&payload).is_ok());
    }

    #[test]
    fn email_shapes() {
        assert!(is_valid_email("a@b.example"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("@b.example"));
        assert!(!is_valid_email("a@.example"));
        assert!(!is_valid_email("a b@c.example"));
        assert!(!is_valid_email("a@b@c.example"));
    }

    #[test]
    fn new_purchase_requires_refs_and_price() {
        let errors = validate_new_purchase(&PurchasePayload::default()).unwrap_err();
        assert_eq!(field_names(&errors), vec!["productId", "companyId", "price"]);
    }

    #[test]
    fn new_purchase_rejects_non_positive_price() {
        let payload = PurchasePayload {
            product_id: Some(1),
            company_id: Some(1),
            price: Some(0.0),
            ..Default::default()
        };
        let errors = validate_new_purchase(&payload).unwrap_err();
        assert_eq!(field_names(&errors), vec!["price"]);
    }

    #[test]
    fn new_purchase_rejects_zero_quantity() {
        let payload = PurchasePayload {
            product_id: Some(1),
            company_id: Some(1),
            price: Some(9.5),
            quantity: Some(0),
            ..Default::default()
        };
        let errors = validate_new_purchase(&payload).unwrap_err();
        assert_eq!(field_names(&errors), vec!["quantity"]);
    }

    #[test]
    fn new_purchase_defaults_quantity_to_one() {
        let payload = PurchasePayload {
            product_id: Some(1),
            company_id: Some(2),
            price: Some(4.25),
            ..Default::default()
        };
        let purchase = validate_new_purchase(&payload).unwrap();
        assert_eq!(purchase.quantity, 1);
        assert!(purchase.purchase_date.is_none());
    }

    #[test]
    fn new_purchase_parses_purchase_date() {
        let payload = PurchasePayload {
            product_id: Some(1),
            company_id: Some(2),
            price: Some(4.25),
            purchase_date: Some("2026-03-01T12:00:00+01:00".to_string()),
            ..Default::default()
        };
        let purchase = validate_new_purchase(&payload).unwrap();
        let parsed = purchase.purchase_date.unwrap();
        assert_eq!(parsed.to_rfc3339(), "2026-03-01T11:00:00+00:00");
    }

    #[test]
    fn new_purchase_rejects_malformed_date() {
        let payload = PurchasePayload {
            product_id: Some(1),
            company_id: Some(2),
            price: Some(4.25),
            purchase_date: Some("yesterday".to_string()),
            ..Default::default()
        };
        let errors = validate_new_purchase(&payload).unwrap_err();
        assert_eq!(field_names(&errors), vec!["purchaseDate"]);
    }

    #[test]
    fn purchase_patch_accepts_partial_fields() {
        let payload = PurchasePayload {
            quantity: Some(3),
            ..Default::default()
        };
        let patch = validate_purchase_patch(&payload).unwrap();
        assert_eq!(patch.quantity, Some(3));
        assert!(patch.price.is_none());
    }
}
