//! Database operations for the supplies catalog
//!
//! Uses parameterized queries exclusively (no SQL string concatenation).
//! Multi-statement writes are wrapped in transactions; purchase updates in
//! particular read, recompute and write inside a single transaction so the
//! stored total cost can never be derived from stale price or quantity.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};

use crate::analytics;
use crate::error::{Result, TrackerError};
use crate::models::{
    Company, CompanyDetail, CompanyPayload, NewCompany, NewProduct, NewPurchase, Product,
    ProductDetail, ProductPayload, Purchase, PurchaseDetail, PurchasePatch, PurchaseWithCompany,
    PurchaseWithProduct,
};
use crate::validation::FieldError;

/// Initialize the database schema
///
/// Creates tables if they don't exist:
/// - `products`: the supplies catalog
/// - `companies`: supplier companies
/// - `purchases`: purchase records referencing both
///
/// Also turns on foreign key enforcement, which SQLite scopes to the
/// connection, so this must run on every freshly opened connection.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;

        -- Supplies catalog
        CREATE TABLE IF NOT EXISTS products (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            category TEXT,
            description TEXT,
            unit TEXT NOT NULL DEFAULT 'piece',
            sku TEXT,
            min_stock INTEGER,
            notes TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        -- Supplier companies
        CREATE TABLE IF NOT EXISTS companies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            contact TEXT,
            email TEXT,
            phone TEXT,
            address TEXT,
            notes TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        -- Purchase records; total_cost is stored redundantly
        CREATE TABLE IF NOT EXISTS purchases (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            product_id INTEGER NOT NULL,
            company_id INTEGER NOT NULL,
            price REAL NOT NULL,
            quantity INTEGER NOT NULL DEFAULT 1,
            total_cost REAL NOT NULL,
            purchase_date TEXT NOT NULL,
            notes TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (product_id) REFERENCES products(id),
            FOREIGN KEY (company_id) REFERENCES companies(id)
        );

        CREATE INDEX IF NOT EXISTS idx_purchases_product ON purchases(product_id);
        CREATE INDEX IF NOT EXISTS idx_purchases_company ON purchases(company_id);
        CREATE INDEX IF NOT EXISTS idx_purchases_date ON purchases(purchase_date);
        ",
    )?;

    log::info!("Database schema initialized");
    Ok(())
}

/// Format a timestamp the way this store writes them: RFC 3339 UTC with
/// millisecond precision. Lexicographic order on these strings matches
/// chronological order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current instant as a stored timestamp string
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

// ── Row mappers ────────────────────────────────────────────────────────────
//
// Each mapper reads a fixed column window starting at `base`, so the same
// mapper serves both standalone selects and joined selects where the
// entity's columns sit at an offset.

fn map_product(row: &rusqlite::Row<'_>, base: usize) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(base)?,
        name: row.get(base + 1)?,
        category: row.get(base + 2)?,
        description: row.get(base + 3)?,
        unit: row.get(base + 4)?,
        sku: row.get(base + 5)?,
        min_stock: row.get(base + 6)?,
        notes: row.get(base + 7)?,
        created_at: row.get(base + 8)?,
        updated_at: row.get(base + 9)?,
    })
}

fn map_company(row: &rusqlite::Row<'_>, base: usize) -> rusqlite::Result<Company> {
    Ok(Company {
        id: row.get(base)?,
        name: row.get(base + 1)?,
        contact: row.get(base + 2)?,
        email: row.get(base + 3)?,
        phone: row.get(base + 4)?,
        address: row.get(base + 5)?,
        notes: row.get(base + 6)?,
        created_at: row.get(base + 7)?,
        updated_at: row.get(base + 8)?,
    })
}

fn map_purchase(row: &rusqlite::Row<'_>, base: usize) -> rusqlite::Result<Purchase> {
    Ok(Purchase {
        id: row.get(base)?,
        product_id: row.get(base + 1)?,
        company_id: row.get(base + 2)?,
        price: row.get(base + 3)?,
        quantity: row.get(base + 4)?,
        total_cost: row.get(base + 5)?,
        purchase_date: row.get(base + 6)?,
        notes: row.get(base + 7)?,
        created_at: row.get(base + 8)?,
        updated_at: row.get(base + 9)?,
    })
}

const PRODUCT_COLS: &str =
    "id, name, category, description, unit, sku, min_stock, notes, created_at, updated_at";
const COMPANY_COLS: &str =
    "id, name, contact, email, phone, address, notes, created_at, updated_at";

fn get_product_row(conn: &Connection, id: i64) -> Result<Option<Product>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, name, category, description, unit, sku, min_stock, notes,
                created_at, updated_at
         FROM products WHERE id = ?1",
    )?;
    let mut rows = stmt.query(params![id])?;
    match rows.next()? {
        Some(row) => Ok(Some(map_product(row, 0)?)),
        None => Ok(None),
    }
}

fn get_company_row(conn: &Connection, id: i64) -> Result<Option<Company>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, name, contact, email, phone, address, notes, created_at, updated_at
         FROM companies WHERE id = ?1",
    )?;
    let mut rows = stmt.query(params![id])?;
    match rows.next()? {
        Some(row) => Ok(Some(map_company(row, 0)?)),
        None => Ok(None),
    }
}

fn get_purchase_row(conn: &Connection, id: i64) -> Result<Option<Purchase>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, product_id, company_id, price, quantity, total_cost, purchase_date,
                notes, created_at, updated_at
         FROM purchases WHERE id = ?1",
    )?;
    let mut rows = stmt.query(params![id])?;
    match rows.next()? {
        Some(row) => Ok(Some(map_purchase(row, 0)?)),
        None => Ok(None),
    }
}

/// All purchases of one product with the supplier attached, newest first
pub fn purchases_with_company(conn: &Connection, product_id: i64) -> Result<Vec<PurchaseWithCompany>> {
    let mut stmt = conn.prepare_cached(
        "SELECT pu.id, pu.product_id, pu.company_id, pu.price, pu.quantity, pu.total_cost,
                pu.purchase_date, pu.notes, pu.created_at, pu.updated_at,
                c.id, c.name, c.contact, c.email, c.phone, c.address, c.notes,
                c.created_at, c.updated_at
         FROM purchases pu
         JOIN companies c ON c.id = pu.company_id
         WHERE pu.product_id = ?1
         ORDER BY pu.purchase_date DESC, pu.id DESC",
    )?;

    let rows: rusqlite::Result<Vec<PurchaseWithCompany>> = stmt
        .query_map(params![product_id], |row| {
            Ok(PurchaseWithCompany {
                purchase: map_purchase(row, 0)?,
                company: map_company(row, 10)?,
            })
        })?
        .collect();
    Ok(rows?)
}

/// All purchases from one company with the product attached, newest first
pub fn purchases_with_product(conn: &Connection, company_id: i64) -> Result<Vec<PurchaseWithProduct>> {
    let mut stmt = conn.prepare_cached(
        "SELECT pu.id, pu.product_id, pu.company_id, pu.price, pu.quantity, pu.total_cost,
                pu.purchase_date, pu.notes, pu.created_at, pu.updated_at,
                pr.id, pr.name, pr.category, pr.description, pr.unit, pr.sku, pr.min_stock,
                pr.notes, pr.created_at, pr.updated_at
         FROM purchases pu
         JOIN products pr ON pr.id = pu.product_id
         WHERE pu.company_id = ?1
         ORDER BY pu.purchase_date DESC, pu.id DESC",
    )?;

    let rows: rusqlite::Result<Vec<PurchaseWithProduct>> = stmt
        .query_map(params![company_id], |row| {
            Ok(PurchaseWithProduct {
                purchase: map_purchase(row, 0)?,
                product: map_product(row, 10)?,
            })
        })?
        .collect();
    Ok(rows?)
}

// ── Products ───────────────────────────────────────────────────────────────

/// All products with their purchase history, ordered by name ascending
pub fn list_products(conn: &Connection) -> Result<Vec<ProductDetail>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PRODUCT_COLS} FROM products ORDER BY name ASC, id ASC"
    ))?;
    let products: rusqlite::Result<Vec<Product>> =
        stmt.query_map([], |row| map_product(row, 0))?.collect();

    let mut result = Vec::new();
    for product in products? {
        let purchases = purchases_with_company(conn, product.id)?;
        result.push(ProductDetail { product, purchases });
    }
    Ok(result)
}

/// One product with its purchase history, or None
pub fn get_product(conn: &Connection, id: i64) -> Result<Option<ProductDetail>> {
    match get_product_row(conn, id)? {
        Some(product) => {
            let purchases = purchases_with_company(conn, product.id)?;
            Ok(Some(ProductDetail { product, purchases }))
        }
        None => Ok(None),
    }
}

pub fn insert_product(conn: &Connection, product: &NewProduct) -> Result<Product> {
    let now = now_timestamp();
    conn.execute(
        "INSERT INTO products (name, category, description, unit, sku, min_stock, notes,
                               created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            &product.name,
            &product.category,
            &product.description,
            &product.unit,
            &product.sku,
            product.min_stock,
            &product.notes,
            &now,
            &now,
        ],
    )?;
    let id = conn.last_insert_rowid();
    log::debug!("Created product {} ({})", id, product.name);

    Ok(Product {
        id,
        name: product.name.clone(),
        category: product.category.clone(),
        description: product.description.clone(),
        unit: product.unit.clone(),
        sku: product.sku.clone(),
        min_stock: product.min_stock,
        notes: product.notes.clone(),
        created_at: now.clone(),
        updated_at: now,
    })
}

/// Apply a partial update to a product. Returns None if the id is absent.
pub fn update_product(
    conn: &mut Connection,
    id: i64,
    patch: &ProductPayload,
) -> Result<Option<Product>> {
    let tx = conn.transaction()?;
    let Some(existing) = get_product_row(&tx, id)? else {
        return Ok(None);
    };

    let updated = Product {
        id: existing.id,
        name: patch.name.clone().unwrap_or(existing.name),
        category: patch.category.clone().or(existing.category),
        description: patch.description.clone().or(existing.description),
        unit: patch.unit.clone().unwrap_or(existing.unit),
        sku: patch.sku.clone().or(existing.sku),
        min_stock: patch.min_stock.or(existing.min_stock),
        notes: patch.notes.clone().or(existing.notes),
        created_at: existing.created_at,
        updated_at: now_timestamp(),
    };

    tx.execute(
        "UPDATE products
         SET name = ?1, category = ?2, description = ?3, unit = ?4, sku = ?5,
             min_stock = ?6, notes = ?7, updated_at = ?8
         WHERE id = ?9",
        params![
            &updated.name,
            &updated.category,
            &updated.description,
            &updated.unit,
            &updated.sku,
            updated.min_stock,
            &updated.notes,
            &updated.updated_at,
            id,
        ],
    )?;
    tx.commit()?;
    Ok(Some(updated))
}

/// Delete a product by id. Returns false if the id is absent.
///
/// Products still referenced by purchases are protected by the foreign key
/// constraint; that failure is reported as a field-level validation error.
pub fn delete_product(conn: &Connection, id: i64) -> Result<bool> {
    let deleted = conn
        .execute("DELETE FROM products WHERE id = ?1", params![id])
        .map_err(|e| referenced_delete_error(e, "product"))?;
    Ok(deleted > 0)
}

// ── Companies ──────────────────────────────────────────────────────────────

/// All companies with their purchase history, ordered by name ascending
pub fn list_companies(conn: &Connection) -> Result<Vec<CompanyDetail>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COMPANY_COLS} FROM companies ORDER BY name ASC, id ASC"
    ))?;
    let companies: rusqlite::Result<Vec<Company>> =
        stmt.query_map([], |row| map_company(row, 0))?.collect();

    let mut result = Vec::new();
    for company in companies? {
        let purchases = purchases_with_product(conn, company.id)?;
        result.push(CompanyDetail { company, purchases });
    }
    Ok(result)
}

/// One company with its purchase history, or None
pub fn get_company(conn: &Connection, id: i64) -> Result<Option<CompanyDetail>> {
    match get_company_row(conn, id)? {
        Some(company) => {
            let purchases = purchases_with_product(conn, company.id)?;
            Ok(Some(CompanyDetail { company, purchases }))
        }
        None => Ok(None),
    }
}

pub fn insert_company(conn: &Connection, company: &NewCompany) -> Result<Company> {
    let now = now_timestamp();
    conn.execute(
        "INSERT INTO companies (name, contact, email, phone, address, notes,
                                created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            &company.name,
            &company.contact,
            &company.email,
            &company.phone,
            &company.address,
            &company.notes,
            &now,
            &now,
        ],
    )?;
    let id = conn.last_insert_rowid();
    log::debug!("Created company {} ({})", id, company.name);

    Ok(Company {
        id,
        name: company.name.clone(),
        contact: company.contact.clone(),
        email: company.email.clone(),
        phone: company.phone.clone(),
        address: company.address.clone(),
        notes: company.notes.clone(),
        created_at: now.clone(),
        updated_at: now,
    })
}

/// Apply a partial update to a company. Returns None if the id is absent.
pub fn update_company(
    conn: &mut Connection,
    id: i64,
    patch: &CompanyPayload,
) -> Result<Option<Company>> {
    let tx = conn.transaction()?;
    let Some(existing) = get_company_row(&tx, id)? else {
        return Ok(None);
    };

    let updated = Company {
        id: existing.id,
        name: patch.name.clone().unwrap_or(existing.name),
        contact: patch.contact.clone().or(existing.contact),
        email: patch.email.clone().or(existing.email),
        phone: patch.phone.clone().or(existing.phone),
        address: patch.address.clone().or(existing.address),
        notes: patch.notes.clone().or(existing.notes),
        created_at: existing.created_at,
        updated_at: now_timestamp(),
    };

    tx.execute(
        "UPDATE companies
         SET name = ?1, contact = ?2, email = ?3, phone = ?4, address = ?5,
             notes = ?6, updated_at = ?7
         WHERE id = ?8",
        params![
            &updated.name,
            &updated.contact,
            &updated.email,
            &updated.phone,
            &updated.address,
            &updated.notes,
            &updated.updated_at,
            id,
        ],
    )?;
    tx.commit()?;
    Ok(Some(updated))
}

/// Delete a company by id. Returns false if the id is absent.
pub fn delete_company(conn: &Connection, id: i64) -> Result<bool> {
    let deleted = conn
        .execute("DELETE FROM companies WHERE id = ?1", params![id])
        .map_err(|e| referenced_delete_error(e, "company"))?;
    Ok(deleted > 0)
}

fn referenced_delete_error(err: rusqlite::Error, entity: &str) -> TrackerError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            TrackerError::Validation(vec![FieldError::new(
                "id",
                &format!("{} is still referenced by existing purchases", entity),
            )])
        }
        _ => TrackerError::Database(err),
    }
}

// ── Purchases ──────────────────────────────────────────────────────────────

const PURCHASE_DETAIL_SELECT: &str = "
    SELECT pu.id, pu.product_id, pu.company_id, pu.price, pu.quantity, pu.total_cost,
           pu.purchase_date, pu.notes, pu.created_at, pu.updated_at,
           pr.id, pr.name, pr.category, pr.description, pr.unit, pr.sku, pr.min_stock,
           pr.notes, pr.created_at, pr.updated_at,
           c.id, c.name, c.contact, c.email, c.phone, c.address, c.notes,
           c.created_at, c.updated_at
    FROM purchases pu
    JOIN products pr ON pr.id = pu.product_id
    JOIN companies c ON c.id = pu.company_id";

fn map_purchase_detail(row: &rusqlite::Row<'_>) -> rusqlite::Result<PurchaseDetail> {
    Ok(PurchaseDetail {
        purchase: map_purchase(row, 0)?,
        product: map_product(row, 10)?,
        company: map_company(row, 20)?,
    })
}

/// All purchases with product and company attached, newest first
pub fn list_purchases(conn: &Connection) -> Result<Vec<PurchaseDetail>> {
    let mut stmt = conn.prepare(&format!(
        "{PURCHASE_DETAIL_SELECT} ORDER BY pu.purchase_date DESC, pu.id DESC"
    ))?;
    let rows: rusqlite::Result<Vec<PurchaseDetail>> =
        stmt.query_map([], map_purchase_detail)?.collect();
    Ok(rows?)
}

/// One purchase with product and company attached, or None
pub fn get_purchase(conn: &Connection, id: i64) -> Result<Option<PurchaseDetail>> {
    let mut stmt = conn.prepare_cached(&format!("{PURCHASE_DETAIL_SELECT} WHERE pu.id = ?1"))?;
    let mut rows = stmt.query(params![id])?;
    match rows.next()? {
        Some(row) => Ok(Some(map_purchase_detail(row)?)),
        None => Ok(None),
    }
}

/// The most recent purchases with relations attached
pub fn recent_purchases(conn: &Connection, limit: usize) -> Result<Vec<PurchaseDetail>> {
    let mut stmt = conn.prepare_cached(&format!(
        "{PURCHASE_DETAIL_SELECT} ORDER BY pu.purchase_date DESC, pu.id DESC LIMIT ?1"
    ))?;
    let rows: rusqlite::Result<Vec<PurchaseDetail>> = stmt
        .query_map(params![limit as i64], map_purchase_detail)?
        .collect();
    Ok(rows?)
}

/// Create a purchase record
///
/// Both referenced rows are checked inside the transaction so a missing
/// product or company surfaces as a field-level validation error instead of
/// a bare constraint failure. The stored total cost is derived here.
pub fn insert_purchase(conn: &mut Connection, purchase: &NewPurchase) -> Result<PurchaseDetail> {
    let tx = conn.transaction()?;

    let product = get_product_row(&tx, purchase.product_id)?;
    let company = get_company_row(&tx, purchase.company_id)?;

    let mut missing = Vec::new();
    if product.is_none() {
        missing.push(FieldError::new("productId", "referenced product does not exist"));
    }
    if company.is_none() {
        missing.push(FieldError::new("companyId", "referenced company does not exist"));
    }
    let (Some(product), Some(company)) = (product, company) else {
        return Err(TrackerError::Validation(missing));
    };

    let now = now_timestamp();
    let purchase_date = purchase
        .purchase_date
        .map(format_timestamp)
        .unwrap_or_else(|| now.clone());
    let total_cost = analytics::total_cost(purchase.price, purchase.quantity);

    tx.execute(
        "INSERT INTO purchases (product_id, company_id, price, quantity, total_cost,
                                purchase_date, notes, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            purchase.product_id,
            purchase.company_id,
            purchase.price,
            purchase.quantity,
            total_cost,
            &purchase_date,
            &purchase.notes,
            &now,
            &now,
        ],
    )?;
    let id = tx.last_insert_rowid();
    tx.commit()?;
    log::debug!("Created purchase {} ({} x {})", id, purchase.quantity, product.name);

    Ok(PurchaseDetail {
        purchase: Purchase {
            id,
            product_id: purchase.product_id,
            company_id: purchase.company_id,
            price: purchase.price,
            quantity: purchase.quantity,
            total_cost,
            purchase_date,
            notes: purchase.notes.clone(),
            created_at: now.clone(),
            updated_at: now,
        },
        product,
        company,
    })
}

/// Apply a partial update to a purchase. Returns None if the id is absent.
///
/// The read of the current row, the total cost recomputation and the write
/// all happen inside one transaction. If price and/or quantity is supplied
/// the total is recomputed from the effective pair; otherwise it is left
/// untouched.
pub fn update_purchase(
    conn: &mut Connection,
    id: i64,
    patch: &PurchasePatch,
) -> Result<Option<PurchaseDetail>> {
    let tx = conn.transaction()?;
    let Some(existing) = get_purchase_row(&tx, id)? else {
        return Ok(None);
    };

    let product_id = patch.product_id.unwrap_or(existing.product_id);
    let company_id = patch.company_id.unwrap_or(existing.company_id);

    let product = get_product_row(&tx, product_id)?;
    let company = get_company_row(&tx, company_id)?;

    let mut missing = Vec::new();
    if product.is_none() {
        missing.push(FieldError::new("productId", "referenced product does not exist"));
    }
    if company.is_none() {
        missing.push(FieldError::new("companyId", "referenced company does not exist"));
    }
    let (Some(product), Some(company)) = (product, company) else {
        return Err(TrackerError::Validation(missing));
    };

    let price = patch.price.unwrap_or(existing.price);
    let quantity = patch.quantity.unwrap_or(existing.quantity);
    let total_cost = if patch.price.is_some() || patch.quantity.is_some() {
        analytics::total_cost(price, quantity)
    } else {
        existing.total_cost
    };

    let updated = Purchase {
        id: existing.id,
        product_id,
        company_id,
        price,
        quantity,
        total_cost,
        purchase_date: patch
            .purchase_date
            .map(format_timestamp)
            .unwrap_or(existing.purchase_date),
        notes: patch.notes.clone().or(existing.notes),
        created_at: existing.created_at,
        updated_at: now_timestamp(),
    };

    tx.execute(
        "UPDATE purchases
         SET product_id = ?1, company_id = ?2, price = ?3, quantity = ?4, total_cost = ?5,
             purchase_date = ?6, notes = ?7, updated_at = ?8
         WHERE id = ?9",
        params![
            updated.product_id,
            updated.company_id,
            updated.price,
            updated.quantity,
            updated.total_cost,
            &updated.purchase_date,
            &updated.notes,
            &updated.updated_at,
            id,
        ],
    )?;
    tx.commit()?;

    Ok(Some(PurchaseDetail {
        purchase: updated,
        product,
        company,
    }))
}

/// Delete a purchase by id. Returns false if the id is absent.
pub fn delete_purchase(conn: &Connection, id: i64) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM purchases WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}

// ── Aggregate queries ──────────────────────────────────────────────────────

pub fn count_products(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))?)
}

pub fn count_companies(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM companies", [], |row| row.get(0))?)
}

pub fn count_purchases(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM purchases", [], |row| row.get(0))?)
}

/// Sum of total_cost over all purchases, 0 when there are none
pub fn total_spent(conn: &Connection) -> Result<f64> {
    Ok(conn.query_row(
        "SELECT COALESCE(SUM(total_cost), 0) FROM purchases",
        [],
        |row| row.get(0),
    )?)
}

/// All products paired with their bare purchase rows, ordered by name
/// ascending (the stable input order for the top-products ranking)
pub fn products_with_purchases(conn: &Connection) -> Result<Vec<(Product, Vec<Purchase>)>> {
    let mut product_stmt = conn.prepare(&format!(
        "SELECT {PRODUCT_COLS} FROM products ORDER BY name ASC, id ASC"
    ))?;
    let products: rusqlite::Result<Vec<Product>> =
        product_stmt.query_map([], |row| map_product(row, 0))?.collect();

    let mut purchase_stmt = conn.prepare_cached(
        "SELECT id, product_id, company_id, price, quantity, total_cost, purchase_date,
                notes, created_at, updated_at
         FROM purchases
         WHERE product_id = ?1
         ORDER BY purchase_date DESC, id DESC",
    )?;

    let mut result = Vec::new();
    for product in products? {
        let purchases: rusqlite::Result<Vec<Purchase>> = purchase_stmt
            .query_map(params![product.id], |row| map_purchase(row, 0))?
            .collect();
        result.push((product, purchases?));
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::{validate_new_company, validate_new_product, validate_new_purchase};

    /// Create an in-memory database for testing
    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn make_product(conn: &Connection, name: &str) -> Product {
        let payload = ProductPayload {
            name: Some(name.to_string()),
            ..Default::default()
        };
        insert_product(conn, &validate_new_product(&payload).unwrap()).unwrap()
    }

    fn make_company(conn: &Connection, name: &str) -> Company {
        let payload = CompanyPayload {
            name: Some(name.to_string()),
            ..Default::default()
        };
        insert_company(conn, &validate_new_company(&payload).unwrap()).unwrap()
    }

    fn make_purchase(
        conn: &mut Connection,
        product_id: i64,
        company_id: i64,
        price: f64,
        quantity: i64,
        date: Option<&str>,
    ) -> PurchaseDetail {
        let payload = crate::models::PurchasePayload {
            product_id: Some(product_id),
            company_id: Some(company_id),
            price: Some(price),
            quantity: Some(quantity),
            purchase_date: date.map(|d| d.to_string()),
            notes: None,
        };
        insert_purchase(conn, &validate_new_purchase(&payload).unwrap()).unwrap()
    }

    #[test]
    fn init_schema_creates_tables() {
        let conn = test_db();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master
                 WHERE type='table' AND name IN ('products', 'companies', 'purchases')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn insert_product_roundtrip() {
        let conn = test_db();
        let created = make_product(&conn, "Copy paper");
        assert_eq!(created.unit, "piece");

        let fetched = get_product(&conn, created.id).unwrap().unwrap();
        assert_eq!(fetched.product.name, "Copy paper");
        assert!(fetched.purchases.is_empty());
        assert_eq!(fetched.product.created_at, created.created_at);
    }

    #[test]
    fn get_product_missing_returns_none() {
        let conn = test_db();
        assert!(get_product(&conn, 999).unwrap().is_none());
    }

    #[test]
    fn update_product_merges_partial_fields() {
        let mut conn = test_db();
        let created = make_product(&conn, "Copy paper");

        let patch = ProductPayload {
            category: Some("office".to_string()),
            ..Default::default()
        };
        let updated = update_product(&mut conn, created.id, &patch).unwrap().unwrap();

        assert_eq!(updated.name, "Copy paper");
        assert_eq!(updated.category.as_deref(), Some("office"));
        assert_eq!(updated.created_at, created.created_at);
    }

    #[test]
    fn update_product_missing_returns_none() {
        let mut conn = test_db();
        let patch = ProductPayload::default();
        assert!(update_product(&mut conn, 999, &patch).unwrap().is_none());
    }

    #[test]
    fn delete_product_reports_existence() {
        let conn = test_db();
        let created = make_product(&conn, "Copy paper");
        assert!(delete_product(&conn, created.id).unwrap());
        assert!(!delete_product(&conn, created.id).unwrap());
    }

    #[test]
    fn delete_product_with_purchases_is_rejected() {
        let mut conn = test_db();
        let product = make_product(&conn, "Copy paper");
        let company = make_company(&conn, "Acme");
        make_purchase(&mut conn, product.id, company.id, 4.5, 2, None);

        let err = delete_product(&conn, product.id).unwrap_err();
        match err {
            TrackerError::Validation(details) => {
                assert!(details[0].message.contains("referenced"));
            }
            other => panic!("expected validation error, got {}", other),
        }

        // Company deletion is protected the same way
        assert!(delete_company(&conn, company.id).is_err());
    }

    #[test]
    fn insert_purchase_derives_total_cost() {
        let mut conn = test_db();
        let product = make_product(&conn, "Copy paper");
        let company = make_company(&conn, "Acme");

        let detail = make_purchase(&mut conn, product.id, company.id, 4.5, 3, None);
        assert!((detail.purchase.total_cost - 13.5).abs() < 1e-9);
        assert_eq!(detail.product.id, product.id);
        assert_eq!(detail.company.id, company.id);

        // The stored row agrees with the returned one
        let stored = get_purchase(&conn, detail.purchase.id).unwrap().unwrap();
        assert!((stored.purchase.total_cost - 13.5).abs() < 1e-9);
    }

    #[test]
    fn insert_purchase_defaults_date_to_now() {
        let mut conn = test_db();
        let product = make_product(&conn, "Copy paper");
        let company = make_company(&conn, "Acme");

        let detail = make_purchase(&mut conn, product.id, company.id, 4.5, 1, None);
        assert_eq!(detail.purchase.purchase_date, detail.purchase.created_at);
    }

    #[test]
    fn insert_purchase_normalizes_supplied_date_to_utc() {
        let mut conn = test_db();
        let product = make_product(&conn, "Copy paper");
        let company = make_company(&conn, "Acme");

        let detail = make_purchase(
            &mut conn,
            product.id,
            company.id,
            4.5,
            1,
            Some("2026-03-01T12:00:00+01:00"),
        );
        assert_eq!(detail.purchase.purchase_date, "2026-03-01T11:00:00.000Z");
    }

    #[test]
    fn insert_purchase_rejects_unknown_references() {
        let mut conn = test_db();
        let product = make_product(&conn, "Copy paper");

        let payload = crate::models::PurchasePayload {
            product_id: Some(product.id),
            company_id: Some(999),
            price: Some(4.5),
            ..Default::default()
        };
        let err = insert_purchase(&mut conn, &validate_new_purchase(&payload).unwrap()).unwrap_err();
        match err {
            TrackerError::Validation(details) => {
                assert_eq!(details.len(), 1);
                assert_eq!(details[0].field, "companyId");
            }
            other => panic!("expected validation error, got {}", other),
        }

        // Nothing was written
        assert_eq!(count_purchases(&conn).unwrap(), 0);
    }

    #[test]
    fn update_purchase_quantity_recomputes_with_existing_price() {
        let mut conn = test_db();
        let product = make_product(&conn, "Copy paper");
        let company = make_company(&conn, "Acme");
        let detail = make_purchase(&mut conn, product.id, company.id, 4.5, 2, None);

        let patch = PurchasePatch {
            quantity: Some(5),
            ..Default::default()
        };
        let updated = update_purchase(&mut conn, detail.purchase.id, &patch)
            .unwrap()
            .unwrap();

        assert!((updated.purchase.price - 4.5).abs() < 1e-9);
        assert_eq!(updated.purchase.quantity, 5);
        assert!((updated.purchase.total_cost - 22.5).abs() < 1e-9);
    }

    #[test]
    fn update_purchase_without_price_or_quantity_keeps_total() {
        let mut conn = test_db();
        let product = make_product(&conn, "Copy paper");
        let company = make_company(&conn, "Acme");
        let detail = make_purchase(&mut conn, product.id, company.id, 4.5, 2, None);

        let patch = PurchasePatch {
            notes: Some("bulk order".to_string()),
            ..Default::default()
        };
        let updated = update_purchase(&mut conn, detail.purchase.id, &patch)
            .unwrap()
            .unwrap();

        assert!((updated.purchase.total_cost - 9.0).abs() < 1e-9);
        assert_eq!(updated.purchase.notes.as_deref(), Some("bulk order"));
    }

    #[test]
    fn update_purchase_missing_returns_none() {
        let mut conn = test_db();
        let patch = PurchasePatch::default();
        assert!(update_purchase(&mut conn, 999, &patch).unwrap().is_none());
    }

    #[test]
    fn update_purchase_rejects_unknown_company() {
        let mut conn = test_db();
        let product = make_product(&conn, "Copy paper");
        let company = make_company(&conn, "Acme");
        let detail = make_purchase(&mut conn, product.id, company.id, 4.5, 2, None);

        let patch = PurchasePatch {
            company_id: Some(999),
            ..Default::default()
        };
        assert!(update_purchase(&mut conn, detail.purchase.id, &patch).is_err());

        // The row is unchanged
        let stored = get_purchase(&conn, detail.purchase.id).unwrap().unwrap();
        assert_eq!(stored.purchase.company_id, company.id);
    }

    #[test]
    fn list_products_orders_by_name() {
        let conn = test_db();
        make_product(&conn, "Toner");
        make_product(&conn, "Copy paper");
        make_product(&conn, "Staples");

        let names: Vec<String> = list_products(&conn)
            .unwrap()
            .into_iter()
            .map(|p| p.product.name)
            .collect();
        assert_eq!(names, vec!["Copy paper", "Staples", "Toner"]);
    }

    #[test]
    fn list_purchases_orders_newest_first() {
        let mut conn = test_db();
        let product = make_product(&conn, "Copy paper");
        let company = make_company(&conn, "Acme");
        make_purchase(&mut conn, product.id, company.id, 1.0, 1, Some("2026-01-01T00:00:00Z"));
        make_purchase(&mut conn, product.id, company.id, 2.0, 1, Some("2026-03-01T00:00:00Z"));
        make_purchase(&mut conn, product.id, company.id, 3.0, 1, Some("2026-02-01T00:00:00Z"));

        let prices: Vec<f64> = list_purchases(&conn)
            .unwrap()
            .into_iter()
            .map(|p| p.purchase.price)
            .collect();
        assert_eq!(prices, vec![2.0, 3.0, 1.0]);
    }

    #[test]
    fn product_detail_embeds_purchases_with_company() {
        let mut conn = test_db();
        let product = make_product(&conn, "Copy paper");
        let company = make_company(&conn, "Acme");
        make_purchase(&mut conn, product.id, company.id, 4.5, 2, None);

        let detail = get_product(&conn, product.id).unwrap().unwrap();
        assert_eq!(detail.purchases.len(), 1);
        assert_eq!(detail.purchases[0].company.name, "Acme");
    }

    #[test]
    fn aggregate_counts_and_spend() {
        let mut conn = test_db();
        assert_eq!(count_products(&conn).unwrap(), 0);
        assert!((total_spent(&conn).unwrap() - 0.0).abs() < 1e-9);

        let product = make_product(&conn, "Copy paper");
        let company = make_company(&conn, "Acme");
        make_purchase(&mut conn, product.id, company.id, 4.5, 2, None);
        make_purchase(&mut conn, product.id, company.id, 2.0, 1, None);

        assert_eq!(count_products(&conn).unwrap(), 1);
        assert_eq!(count_companies(&conn).unwrap(), 1);
        assert_eq!(count_purchases(&conn).unwrap(), 2);
        assert!((total_spent(&conn).unwrap() - 11.0).abs() < 1e-9);
    }

    #[test]
    fn recent_purchases_respects_limit() {
        let mut conn = test_db();
        let product = make_product(&conn, "Copy paper");
        let company = make_company(&conn, "Acme");
        for day in 1..=12 {
            let date = format!("2026-01-{:02}T00:00:00Z", day);
            make_purchase(&mut conn, product.id, company.id, 1.0, 1, Some(&date));
        }

        let recent = recent_purchases(&conn, 10).unwrap();
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].purchase.purchase_date, "2026-01-12T00:00:00.000Z");
    }

    #[test]
    fn products_with_purchases_pairs_rows() {
        let mut conn = test_db();
        let paper = make_product(&conn, "Copy paper");
        make_product(&conn, "Toner");
        let company = make_company(&conn, "Acme");
        make_purchase(&mut conn, paper.id, company.id, 4.5, 2, None);

        let pairs = products_with_purchases(&conn).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].0.name, "Copy paper");
        assert_eq!(pairs[0].1.len(), 1);
        assert!(pairs[1].1.is_empty());
    }

    #[test]
    fn database_persists_across_connections() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db_path = temp_dir.path().join("tracker.db");

        {
            let conn = Connection::open(&db_path).unwrap();
            init_schema(&conn).unwrap();
            make_product(&conn, "Copy paper");
        }

        let conn = Connection::open(&db_path).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(count_products(&conn).unwrap(), 1);
    }
}
