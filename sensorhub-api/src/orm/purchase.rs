//! Checkout and purchase history.

use std::collections::HashMap;

use diesel::prelude::*;
use thiserror::Error;

use crate::models::{CartItem, NewPurchase, Product, Purchase, PurchaseStatus};
use crate::orm::last_insert_id;
use crate::schema::{products, purchases};

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("cart is empty")]
    EmptyCart,
    #[error("quantity for product {product_id} must be at least 1")]
    InvalidQuantity { product_id: i32 },
    #[error("product {0} does not exist")]
    UnknownProduct(i32),
    #[error("product {0} is not available")]
    InactiveProduct(i32),
    #[error("order total is too large")]
    Overflow,
    #[error(transparent)]
    Database(#[from] diesel::result::Error),
}

/// Rows written by one checkout plus the grand total in cents.
#[derive(Debug, Clone)]
pub struct CheckoutReceipt {
    pub purchases: Vec<Purchase>,
    pub total_cents: i64,
}

/// Validates the whole cart, then writes one `completed` purchase per line at
/// the product's current price. Nothing is written unless every line is valid.
pub fn checkout(
    conn: &mut SqliteConnection,
    company_id: i32,
    user_id: Option<i32>,
    items: &[CartItem],
) -> Result<CheckoutReceipt, CheckoutError> {
    if items.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }
    if let Some(item) = items.iter().find(|i| i.quantity < 1) {
        return Err(CheckoutError::InvalidQuantity {
            product_id: item.product_id,
        });
    }

    conn.transaction(|conn| {
        let ids: Vec<i32> = items.iter().map(|i| i.product_id).collect();
        let catalog: HashMap<i32, Product> = products::table
            .filter(products::id.eq_any(&ids))
            .select(Product::as_select())
            .load(conn)?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut rows = Vec::with_capacity(items.len());
        let mut grand_total: i64 = 0;
        for item in items {
            let product = catalog
                .get(&item.product_id)
                .ok_or(CheckoutError::UnknownProduct(item.product_id))?;
            if !product.active {
                return Err(CheckoutError::InactiveProduct(product.id));
            }
            let line_total = product
                .price_cents
                .checked_mul(item.quantity)
                .ok_or(CheckoutError::Overflow)?;
            grand_total += i64::from(line_total);
            rows.push(NewPurchase {
                company_id,
                user_id,
                product_id: product.id,
                quantity: item.quantity,
                unit_price_cents: product.price_cents,
                total_cents: line_total,
                status: PurchaseStatus::Completed.as_str().to_string(),
            });
        }

        let mut written = Vec::with_capacity(rows.len());
        for row in &rows {
            diesel::insert_into(purchases::table).values(row).execute(conn)?;
            let purchase_id = last_insert_id(conn)?;
            if let Some(purchase) = get_purchase_by_id(conn, purchase_id)? {
                written.push(purchase);
            }
        }

        Ok(CheckoutReceipt {
            purchases: written,
            total_cents: grand_total,
        })
    })
}

pub fn get_purchase_by_id(
    conn: &mut SqliteConnection,
    purchase_id: i32,
) -> Result<Option<Purchase>, diesel::result::Error> {
    purchases::table
        .filter(purchases::id.eq(purchase_id))
        .select(Purchase::as_select())
        .first(conn)
        .optional()
}

/// Purchases newest first, optionally restricted to one company.
pub fn list_purchases(
    conn: &mut SqliteConnection,
    company: Option<i32>,
) -> Result<Vec<Purchase>, diesel::result::Error> {
    let mut query = purchases::table
        .order(purchases::id.desc())
        .select(Purchase::as_select())
        .into_boxed();
    if let Some(comp_id) = company {
        query = query.filter(purchases::company_id.eq(comp_id));
    }
    query.load(conn)
}

/// Marks a purchase cancelled. Returns Ok(None) when it does not exist and
/// Ok(Some(Err(status))) when it is already cancelled.
pub fn cancel_purchase(
    conn: &mut SqliteConnection,
    purchase_id: i32,
) -> Result<Option<Result<Purchase, PurchaseStatus>>, diesel::result::Error> {
    conn.transaction(|conn| {
        let purchase = match get_purchase_by_id(conn, purchase_id)? {
            Some(p) => p,
            None => return Ok(None),
        };
        if purchase.status == PurchaseStatus::Cancelled.as_str() {
            return Ok(Some(Err(PurchaseStatus::Cancelled)));
        }

        diesel::update(purchases::table.filter(purchases::id.eq(purchase_id)))
            .set(purchases::status.eq(PurchaseStatus::Cancelled.as_str()))
            .execute(conn)?;
        Ok(get_purchase_by_id(conn, purchase_id)?.map(Ok))
    })
}
