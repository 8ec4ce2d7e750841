//! Store catalog endpoints.
//!
//! Everybody signed in can browse active products. Masters maintain the
//! catalog and also see inactive products. Products are never deleted, only
//! deactivated, so past purchases keep pointing at them.

use rocket::Route;
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::api::{ApiError, api_error, db_error, is_unique_violation, not_found, nullable};
use crate::logged_json::LoggedJson;
use crate::models::{Product, ProductInput};
use crate::orm::DbConn;
use crate::orm::product::{
    ProductChanges, get_product_by_id, get_product_by_sku, insert_product, list_products, update_product,
};
use crate::session_guards::{AuthenticatedUser, MasterUser};

#[derive(Deserialize, Serialize, TS)]
#[ts(export)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    #[ts(type = "string | null")]
    pub description: Option<Option<String>>,
    pub price_cents: Option<i32>,
    pub sku: Option<String>,
    pub active: Option<bool>,
}

fn check_price(price_cents: i32) -> Result<(), ApiError> {
    if price_cents < 0 {
        return Err(api_error(Status::BadRequest, "price_cents must not be negative"));
    }
    Ok(())
}

fn non_blank(field: &str, value: &str) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(api_error(Status::BadRequest, format!("{} must not be empty", field)));
    }
    Ok(value.to_string())
}

fn sku_conflict(e: diesel::result::Error) -> ApiError {
    if is_unique_violation(&e) {
        api_error(Status::Conflict, "A product with this SKU already exists")
    } else {
        db_error("saving product", e)
    }
}

/// List Products endpoint.
///
/// - **URL:** `/api/1/Products`
/// - **Method:** `GET`
/// - **Authentication:** Required
///
/// Ordered by name. Inactive products are included for masters only.
///
/// ```json
/// [{ "id": 1, "name": "GPS Tracker T1", "description": null, "price_cents": 4999,
///    "sku": "TRK-T1", "active": true, "created_at": "...", "updated_at": "..." }]
/// ```
#[get("/1/Products")]
pub async fn list_products_endpoint(
    db: DbConn,
    auth_user: AuthenticatedUser,
) -> Result<Json<Vec<Product>>, ApiError> {
    let include_inactive = auth_user.is_master();
    db.run(move |conn| list_products(conn, include_inactive))
        .await
        .map(Json)
        .map_err(|e| db_error("listing products", e))
}

/// Get Product endpoint: `GET /api/1/Products/<product_id>`.
///
/// Inactive products answer 404 unless the caller is a master.
#[get("/1/Products/<product_id>")]
pub async fn get_product(
    db: DbConn,
    product_id: i32,
    auth_user: AuthenticatedUser,
) -> Result<Json<Product>, ApiError> {
    let product = db
        .run(move |conn| get_product_by_id(conn, product_id))
        .await
        .map_err(|e| db_error("fetching product", e))?
        .ok_or_else(|| not_found("Product"))?;
    if !product.active && !auth_user.is_master() {
        return Err(not_found("Product"));
    }
    Ok(Json(product))
}

/// Create Product endpoint.
///
/// - **URL:** `/api/1/Products`
/// - **Method:** `POST`
/// - **Authentication:** master role
///
/// ```json
/// { "name": "GPS Tracker T1", "price_cents": 4999, "sku": "TRK-T1" }
/// ```
#[post("/1/Products", data = "<request>")]
pub async fn create_product(
    db: DbConn,
    request: LoggedJson<ProductInput>,
    _master: MasterUser,
) -> Result<status::Created<Json<Product>>, ApiError> {
    let mut input = request.into_inner();
    input.name = non_blank("name", &input.name)?;
    input.sku = non_blank("sku", &input.sku)?;
    check_price(input.price_cents)?;

    db.run(move |conn| -> Result<status::Created<Json<Product>>, ApiError> {
        if get_product_by_sku(conn, &input.sku)
            .map_err(|e| db_error("checking for existing product", e))?
            .is_some()
        {
            return Err(api_error(
                Status::Conflict,
                format!("A product with SKU '{}' already exists", input.sku),
            ));
        }
        let product = insert_product(conn, input).map_err(sku_conflict)?;
        info!("Added product {} '{}' ({})", product.id, product.name, product.sku);
        Ok(status::Created::new(format!("/api/1/Products/{}", product.id)).body(Json(product)))
    })
    .await
}

/// Update Product endpoint.
///
/// - **URL:** `/api/1/Products/<product_id>`
/// - **Method:** `PUT`
/// - **Authentication:** master role
///
/// Price changes apply to future checkouts only.
#[put("/1/Products/<product_id>", data = "<request>")]
pub async fn update_product_endpoint(
    db: DbConn,
    product_id: i32,
    request: LoggedJson<UpdateProductRequest>,
    _master: MasterUser,
) -> Result<Json<Product>, ApiError> {
    let request = request.into_inner();
    if let Some(price) = request.price_cents {
        check_price(price)?;
    }
    let changes = ProductChanges {
        name: request.name.as_deref().map(|n| non_blank("name", n)).transpose()?,
        description: request.description,
        price_cents: request.price_cents,
        sku: request.sku.as_deref().map(|s| non_blank("sku", s)).transpose()?,
        active: request.active,
    };

    db.run(move |conn| update_product(conn, product_id, changes))
        .await
        .map_err(sku_conflict)?
        .map(Json)
        .ok_or_else(|| not_found("Product"))
}

/// Deactivate Product endpoint.
///
/// - **URL:** `/api/1/Products/<product_id>`
/// - **Method:** `DELETE`
/// - **Authentication:** master role
///
/// Hides the product from the store and from checkout. Answers with the
/// updated product.
#[delete("/1/Products/<product_id>")]
pub async fn deactivate_product(
    db: DbConn,
    product_id: i32,
    _master: MasterUser,
) -> Result<Json<Product>, ApiError> {
    let changes = ProductChanges {
        active: Some(false),
        ..Default::default()
    };
    let product = db
        .run(move |conn| update_product(conn, product_id, changes))
        .await
        .map_err(|e| db_error("deactivating product", e))?
        .ok_or_else(|| not_found("Product"))?;
    info!("Deactivated product {} ({})", product.id, product.sku);
    Ok(Json(product))
}

pub fn routes() -> Vec<Route> {
    routes![
        list_products_endpoint,
        get_product,
        create_product,
        update_product_endpoint,
        deactivate_product
    ]
}
