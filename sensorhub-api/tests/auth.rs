use rocket::http::{ContentType, Header, Status};
use rocket::local::asynchronous::Client;
use serde_json::json;

use sensorhub_api::api::login::LoginSuccessResponse;
use sensorhub_api::orm::testing::test_rocket;

async fn login(client: &Client, email: &str, password: &str) -> LoginSuccessResponse {
    let response = client
        .post("/api/1/login")
        .header(ContentType::JSON)
        .body(json!({ "email": email, "password": password }).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    response.into_json().await.expect("valid login JSON")
}

fn bearer(token: &str) -> Header<'static> {
    Header::new("Authorization", format!("Bearer {}", token))
}

#[rocket::async_test]
async fn test_login_success_sets_cookie_and_token() {
    let client = Client::untracked(test_rocket()).await.expect("valid rocket instance");

    let response = client
        .post("/api/1/login")
        .json(&json!({ "email": "admin@acme.com", "password": "adminpass" }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let cookie = response.cookies().get("session").expect("session cookie").value().to_string();

    let body: LoginSuccessResponse = response.into_json().await.expect("valid JSON");
    assert_eq!(body.email, "admin@acme.com");
    assert_eq!(body.company_name, "Acme Farms");
    assert_eq!(body.roles, vec!["admin".to_string()]);
    assert_eq!(body.token.as_deref(), Some(cookie.as_str()));
}

#[rocket::async_test]
async fn test_wrong_password_and_unknown_user() {
    let client = Client::untracked(test_rocket()).await.expect("valid rocket instance");

    for (email, password) in [("admin@acme.com", "nope"), ("nobody@acme.com", "adminpass")] {
        let response = client
            .post("/api/1/login")
            .json(&json!({ "email": email, "password": password }))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Unauthorized);
        let body: serde_json::Value = response.into_json().await.unwrap();
        assert_eq!(body["error"], "Invalid credentials");
    }
}

#[rocket::async_test]
async fn test_inactive_user_cannot_login() {
    let client = Client::untracked(test_rocket()).await.expect("valid rocket instance");

    let response = client
        .post("/api/1/login")
        .json(&json!({ "email": "inactive@acme.com", "password": "userpass" }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Unauthorized);
}

#[rocket::async_test]
async fn test_hello_accepts_cookie_and_bearer() {
    let client = Client::untracked(test_rocket()).await.expect("valid rocket instance");

    let response = client.get("/api/1/hello").dispatch().await;
    assert_eq!(response.status(), Status::Unauthorized);
    let body: serde_json::Value = response.into_json().await.unwrap();
    assert_eq!(body["status"], 401);
    assert_eq!(body["path"], "/api/1/hello");

    let identity = login(&client, "user@globex.com", "userpass").await;
    let token = identity.token.expect("login returns a token");

    let response = client.get("/api/1/hello").header(bearer(&token)).dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let hello: LoginSuccessResponse = response.into_json().await.unwrap();
    assert_eq!(hello.email, "user@globex.com");
    assert!(hello.token.is_none());

    let response = client
        .get("/api/1/hello")
        .cookie(rocket::http::Cookie::new("session", token))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
}

#[rocket::async_test]
async fn test_logout_revokes_session() {
    let client = Client::untracked(test_rocket()).await.expect("valid rocket instance");
    let token = login(&client, "user@acme.com", "userpass").await.token.unwrap();

    let response = client.post("/api/1/logout").header(bearer(&token)).dispatch().await;
    assert_eq!(response.status(), Status::Ok);

    let response = client.get("/api/1/hello").header(bearer(&token)).dispatch().await;
    assert_eq!(response.status(), Status::Unauthorized);
}

#[rocket::async_test]
async fn test_status_is_public() {
    let client = Client::untracked(test_rocket()).await.expect("valid rocket instance");

    let response = client.get("/api/1/status").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let body: serde_json::Value = response.into_json().await.unwrap();
    assert_eq!(body["status"], "running");
    assert!(body["version"].is_string());
}
