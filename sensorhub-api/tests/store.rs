use rocket::http::{Header, Status};
use rocket::local::asynchronous::Client;
use serde_json::{Value, json};

use sensorhub_api::api::purchase::CheckoutResponse;
use sensorhub_api::models::{Product, Purchase};
use sensorhub_api::orm::testing::test_rocket;

async fn login_token(client: &Client, email: &str, password: &str) -> Header<'static> {
    let response = client
        .post("/api/1/login")
        .json(&json!({ "email": email, "password": password }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let body: Value = response.into_json().await.expect("valid login JSON");
    Header::new("Authorization", format!("Bearer {}", body["token"].as_str().unwrap()))
}

async fn products(client: &Client, auth: &Header<'static>) -> Vec<Product> {
    let response = client.get("/api/1/Products").header(auth.clone()).dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    response.into_json().await.unwrap()
}

async fn purchases(client: &Client, auth: &Header<'static>) -> Vec<Purchase> {
    let response = client.get("/api/1/Purchases").header(auth.clone()).dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    response.into_json().await.unwrap()
}

fn sku_id(catalog: &[Product], sku: &str) -> i32 {
    catalog.iter().find(|p| p.sku == sku).map(|p| p.id).unwrap()
}

#[rocket::async_test]
async fn test_catalog_visibility() {
    let client = Client::untracked(test_rocket()).await.expect("valid rocket instance");
    let user = login_token(&client, "user@acme.com", "userpass").await;
    let master = login_token(&client, "superadmin@example.com", "admin").await;

    let visible = products(&client, &user).await;
    let names: Vec<&str> = visible.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Smart Plug P1", "Tracker T1"]);

    let everything = products(&client, &master).await;
    assert_eq!(everything.len(), 3);
    let legacy = sku_id(&everything, "LEG-B0");

    let response = client
        .get(format!("/api/1/Products/{}", legacy))
        .header(user)
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::NotFound);
    let response = client
        .get(format!("/api/1/Products/{}", legacy))
        .header(master)
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
}

#[rocket::async_test]
async fn test_checkout_records_purchases() {
    let client = Client::untracked(test_rocket()).await.expect("valid rocket instance");
    let user = login_token(&client, "user@acme.com", "userpass").await;
    let catalog = products(&client, &user).await;
    let tracker = sku_id(&catalog, "TRK-T1");
    let plug = sku_id(&catalog, "PLG-P1");

    let response = client
        .post("/api/1/Checkout")
        .header(user.clone())
        .json(&json!({ "items": [
            { "product_id": tracker, "quantity": 2 },
            { "product_id": plug, "quantity": 1 }
        ]}))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Created);
    let receipt: CheckoutResponse = response.into_json().await.unwrap();
    assert_eq!(receipt.total_cents, 11997);
    assert_eq!(receipt.purchases.len(), 2);
    assert_eq!(receipt.purchases[0].unit_price_cents, 4999);
    assert_eq!(receipt.purchases[0].total_cents, 9998);
    assert!(receipt.purchases.iter().all(|p| p.company_id == 2 && p.status == "completed"));

    assert_eq!(purchases(&client, &user).await.len(), 2);
    let globex = login_token(&client, "user@globex.com", "userpass").await;
    assert!(purchases(&client, &globex).await.is_empty());
    let master = login_token(&client, "superadmin@example.com", "admin").await;
    assert_eq!(purchases(&client, &master).await.len(), 2);
}

#[rocket::async_test]
async fn test_checkout_rejects_invalid_carts() {
    let client = Client::untracked(test_rocket()).await.expect("valid rocket instance");
    let user = login_token(&client, "user@acme.com", "userpass").await;
    let master = login_token(&client, "superadmin@example.com", "admin").await;
    let catalog = products(&client, &master).await;
    let tracker = sku_id(&catalog, "TRK-T1");
    let legacy = sku_id(&catalog, "LEG-B0");

    for items in [
        json!([]),
        json!([{ "product_id": tracker, "quantity": 0 }]),
        json!([{ "product_id": tracker, "quantity": 1 }, { "product_id": legacy, "quantity": 1 }]),
        json!([{ "product_id": 999, "quantity": 1 }]),
    ] {
        let response = client
            .post("/api/1/Checkout")
            .header(user.clone())
            .json(&json!({ "items": items }))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest, "cart {}", items);
    }
    assert!(purchases(&client, &user).await.is_empty());
}

#[rocket::async_test]
async fn test_cancel_purchase() {
    let client = Client::untracked(test_rocket()).await.expect("valid rocket instance");
    let user = login_token(&client, "user@acme.com", "userpass").await;
    let admin = login_token(&client, "admin@acme.com", "adminpass").await;
    let globex_admin = login_token(&client, "admin@globex.com", "adminpass").await;
    let plug = sku_id(&products(&client, &user).await, "PLG-P1");

    let response = client
        .post("/api/1/Checkout")
        .header(user.clone())
        .json(&json!({ "items": [{ "product_id": plug, "quantity": 3 }] }))
        .dispatch()
        .await;
    let receipt: CheckoutResponse = response.into_json().await.unwrap();
    let purchase_id = receipt.purchases[0].id;
    let cancel_uri = format!("/api/1/Purchases/{}/Cancel", purchase_id);

    let response = client.put(cancel_uri.clone()).header(user).dispatch().await;
    assert_eq!(response.status(), Status::Forbidden);
    let response = client.put(cancel_uri.clone()).header(globex_admin).dispatch().await;
    assert_eq!(response.status(), Status::Forbidden);

    let response = client.put(cancel_uri.clone()).header(admin.clone()).dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let cancelled: Purchase = response.into_json().await.unwrap();
    assert_eq!(cancelled.status, "cancelled");

    let response = client.put(cancel_uri).header(admin.clone()).dispatch().await;
    assert_eq!(response.status(), Status::Conflict);
    let body: Value = response.into_json().await.unwrap();
    assert_eq!(body["error"], "Purchase is already cancelled");

    let response = client.put("/api/1/Purchases/999/Cancel").header(admin).dispatch().await;
    assert_eq!(response.status(), Status::NotFound);
}

#[rocket::async_test]
async fn test_catalog_maintenance_is_master_only() {
    let client = Client::untracked(test_rocket()).await.expect("valid rocket instance");
    let admin = login_token(&client, "admin@acme.com", "adminpass").await;
    let master = login_token(&client, "superadmin@example.com", "admin").await;
    let new_product = json!({ "name": "Solar Panel", "price_cents": 12900, "sku": "SOL-1" });

    let response = client
        .post("/api/1/Products")
        .header(admin.clone())
        .json(&new_product)
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Forbidden);

    let response = client
        .post("/api/1/Products")
        .header(master.clone())
        .json(&new_product)
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Created);
    let created: Product = response.into_json().await.unwrap();
    assert!(created.active);

    let response = client
        .post("/api/1/Products")
        .header(master.clone())
        .json(&new_product)
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Conflict);

    let response = client
        .post("/api/1/Products")
        .header(master.clone())
        .json(&json!({ "name": "Refund", "price_cents": -5, "sku": "NEG-1" }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);

    let response = client
        .put(format!("/api/1/Products/{}", created.id))
        .header(master.clone())
        .json(&json!({ "price_cents": 11900, "description": "Roof mount" }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let updated: Product = response.into_json().await.unwrap();
    assert_eq!(updated.price_cents, 11900);
    assert_eq!(updated.description.as_deref(), Some("Roof mount"));

    let response = client
        .delete(format!("/api/1/Products/{}", created.id))
        .header(admin.clone())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Forbidden);

    let response = client
        .delete(format!("/api/1/Products/{}", created.id))
        .header(master)
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let deactivated: Product = response.into_json().await.unwrap();
    assert!(!deactivated.active);
    assert!(products(&client, &admin).await.iter().all(|p| p.sku != "SOL-1"));
}
