//! Checkout and purchase history endpoints.

use rocket::Route;
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::api::{ApiError, api_error, db_error, forbidden, not_found};
use crate::logged_json::LoggedJson;
use crate::models::{CartItem, Purchase};
use crate::orm::DbConn;
use crate::orm::purchase::{CheckoutError, cancel_purchase, checkout, get_purchase_by_id, list_purchases};
use crate::session_guards::AuthenticatedUser;

#[derive(Deserialize, Serialize, TS)]
#[ts(export)]
pub struct CheckoutRequest {
    pub items: Vec<CartItem>,
}

#[derive(Debug, Deserialize, Serialize, TS)]
#[ts(export)]
pub struct CheckoutResponse {
    pub purchases: Vec<Purchase>,
    #[ts(type = "number")]
    pub total_cents: i64,
}

/// Checkout endpoint.
///
/// - **URL:** `/api/1/Checkout`
/// - **Method:** `POST`
/// - **Authentication:** Required
///
/// ```json
/// { "items": [{ "product_id": 1, "quantity": 2 }, { "product_id": 2, "quantity": 1 }] }
/// ```
///
/// Buys on behalf of the caller's company. Every product must exist and be
/// active and every quantity must be at least 1, otherwise nothing is
/// recorded and the answer is 400.
///
/// ```json
/// { "purchases": [{ "id": 7, "product_id": 1, "quantity": 2, "unit_price_cents": 4999,
///                   "total_cents": 9998, "status": "completed", ... }],
///   "total_cents": 11997 }
/// ```
#[post("/1/Checkout", data = "<request>")]
pub async fn checkout_endpoint(
    db: DbConn,
    request: LoggedJson<CheckoutRequest>,
    auth_user: AuthenticatedUser,
) -> Result<status::Created<Json<CheckoutResponse>>, ApiError> {
    let items = request.into_inner().items;
    let company_id = auth_user.user.company_id;
    let user_id = auth_user.user.id;

    let receipt = db
        .run(move |conn| checkout(conn, company_id, Some(user_id), &items))
        .await
        .map_err(|e| match e {
            CheckoutError::Database(e) => db_error("recording purchase", e),
            other => api_error(Status::BadRequest, other.to_string()),
        })?;
    info!(
        "User {} checked out {} line(s) for company {}, total {} cents",
        user_id,
        receipt.purchases.len(),
        company_id,
        receipt.total_cents
    );

    Ok(status::Created::new("/api/1/Purchases").body(Json(CheckoutResponse {
        purchases: receipt.purchases,
        total_cents: receipt.total_cents,
    })))
}

/// List Purchases endpoint.
///
/// - **URL:** `/api/1/Purchases`
/// - **Method:** `GET`
///
/// Newest first. Masters see every company's purchases.
#[get("/1/Purchases")]
pub async fn list_purchases_endpoint(
    db: DbConn,
    auth_user: AuthenticatedUser,
) -> Result<Json<Vec<Purchase>>, ApiError> {
    let scope = if auth_user.is_master() {
        None
    } else {
        Some(auth_user.user.company_id)
    };
    db.run(move |conn| list_purchases(conn, scope))
        .await
        .map(Json)
        .map_err(|e| db_error("listing purchases", e))
}

/// Cancel Purchase endpoint.
///
/// - **URL:** `/api/1/Purchases/<purchase_id>/Cancel`
/// - **Method:** `PUT`
/// - **Authentication:** admin of the purchasing company, or master
///
/// Answers 409 when the purchase is already cancelled.
#[put("/1/Purchases/<purchase_id>/Cancel")]
pub async fn cancel_purchase_endpoint(
    db: DbConn,
    purchase_id: i32,
    auth_user: AuthenticatedUser,
) -> Result<Json<Purchase>, ApiError> {
    let purchase = db
        .run(move |conn| get_purchase_by_id(conn, purchase_id))
        .await
        .map_err(|e| db_error("fetching purchase", e))?
        .ok_or_else(|| not_found("Purchase"))?;
    if !auth_user.can_access_company(purchase.company_id) {
        return Err(forbidden("Insufficient permissions to access this purchase"));
    }
    if !auth_user.can_manage_company(purchase.company_id) {
        return Err(forbidden("Insufficient permissions to cancel purchases"));
    }

    match db.run(move |conn| cancel_purchase(conn, purchase_id)).await {
        Ok(Some(Ok(cancelled))) => {
            info!("User {} cancelled purchase {}", auth_user.user.id, purchase_id);
            Ok(Json(cancelled))
        }
        Ok(Some(Err(state))) => Err(api_error(
            Status::Conflict,
            format!("Purchase is already {}", state),
        )),
        Ok(None) => Err(not_found("Purchase")),
        Err(e) => Err(db_error("cancelling purchase", e)),
    }
}

pub fn routes() -> Vec<Route> {
    routes![checkout_endpoint, list_purchases_endpoint, cancel_purchase_endpoint]
}
