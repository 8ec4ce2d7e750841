use rocket::http::{Header, Status};
use rocket::local::asynchronous::Client;
use serde_json::json;

use sensorhub_api::models::UserWithRoles;
use sensorhub_api::orm::testing::test_rocket;

async fn login_as(client: &Client, email: &str, password: &str) -> (Header<'static>, serde_json::Value) {
    let response = client
        .post("/api/1/login")
        .json(&json!({ "email": email, "password": password }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let body: serde_json::Value = response.into_json().await.expect("valid login JSON");
    let token = body["token"].as_str().expect("token in login response").to_string();
    (Header::new("Authorization", format!("Bearer {}", token)), body)
}

async fn find_user(client: &Client, auth: &Header<'static>, email: &str) -> UserWithRoles {
    let response = client.get("/api/1/Users").header(auth.clone()).dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let users: Vec<UserWithRoles> = response.into_json().await.expect("valid users JSON");
    users
        .into_iter()
        .find(|u| u.email == email)
        .unwrap_or_else(|| panic!("user {} should be visible", email))
}

#[rocket::async_test]
async fn test_admin_creates_user_in_own_company() {
    let client = Client::untracked(test_rocket()).await.expect("valid rocket instance");
    let (admin, identity) = login_as(&client, "admin@acme.com", "adminpass").await;
    let acme = identity["company_id"].as_i64().unwrap();

    let response = client
        .post("/api/1/Users")
        .header(admin.clone())
        .json(&json!({
            "email": "new@acme.com",
            "password": "secret-pass",
            "first_name": "Ada",
            "last_name": null,
            "company_id": acme,
            "role_names": ["user"]
        }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Created);
    let created: UserWithRoles = response.into_json().await.unwrap();
    assert_eq!(created.email, "new@acme.com");
    assert_eq!(created.roles.len(), 1);
    assert_eq!(created.roles[0].name, "user");

    let (_, new_identity) = login_as(&client, "new@acme.com", "secret-pass").await;
    assert_eq!(new_identity["company_name"], "Acme Farms");

    let response = client
        .post("/api/1/Users")
        .header(admin)
        .json(&json!({
            "email": "new@acme.com",
            "password": "another-pass",
            "company_id": acme,
            "role_names": ["user"]
        }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Conflict);
}

#[rocket::async_test]
async fn test_admin_cannot_grant_master_or_cross_company() {
    let client = Client::untracked(test_rocket()).await.expect("valid rocket instance");
    let (admin, identity) = login_as(&client, "admin@acme.com", "adminpass").await;
    let acme = identity["company_id"].as_i64().unwrap();
    let (_, globex_identity) = login_as(&client, "user@globex.com", "userpass").await;
    let globex = globex_identity["company_id"].as_i64().unwrap();

    let response = client
        .post("/api/1/Users")
        .header(admin.clone())
        .json(&json!({
            "email": "boss@acme.com",
            "password": "secret-pass",
            "company_id": acme,
            "role_names": ["master"]
        }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Forbidden);

    let response = client
        .post("/api/1/Users")
        .header(admin)
        .json(&json!({
            "email": "spy@globex.com",
            "password": "secret-pass",
            "company_id": globex,
            "role_names": ["user"]
        }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Forbidden);
}

#[rocket::async_test]
async fn test_plain_user_cannot_create_users() {
    let client = Client::untracked(test_rocket()).await.expect("valid rocket instance");
    let (user, identity) = login_as(&client, "user@acme.com", "userpass").await;

    let response = client
        .post("/api/1/Users")
        .header(user)
        .json(&json!({
            "email": "friend@acme.com",
            "password": "secret-pass",
            "company_id": identity["company_id"],
            "role_names": ["user"]
        }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Forbidden);
}

#[rocket::async_test]
async fn test_user_list_is_scoped() {
    let client = Client::untracked(test_rocket()).await.expect("valid rocket instance");
    let (admin, _) = login_as(&client, "admin@globex.com", "adminpass").await;

    let response = client.get("/api/1/Users").header(admin.clone()).dispatch().await;
    let users: Vec<UserWithRoles> = response.into_json().await.unwrap();
    assert_eq!(users.len(), 2);
    assert!(users.iter().all(|u| u.email.ends_with("@globex.com")));

    let (acme_admin, _) = login_as(&client, "admin@acme.com", "adminpass").await;
    let acme_user = find_user(&client, &acme_admin, "user@acme.com").await;
    let response = client
        .get(format!("/api/1/Users/{}", acme_user.id))
        .header(admin)
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Forbidden);
}

#[rocket::async_test]
async fn test_user_updates_own_name_but_not_status() {
    let client = Client::untracked(test_rocket()).await.expect("valid rocket instance");
    let (user, identity) = login_as(&client, "user@acme.com", "userpass").await;
    let user_id = identity["user_id"].as_i64().unwrap();

    let response = client
        .put(format!("/api/1/Users/{}", user_id))
        .header(user.clone())
        .json(&json!({ "first_name": "Grace" }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let body: serde_json::Value = response.into_json().await.unwrap();
    assert_eq!(body["first_name"], "Grace");

    let response = client
        .put(format!("/api/1/Users/{}", user_id))
        .header(user)
        .json(&json!({ "status": "inactive" }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Forbidden);
}

#[rocket::async_test]
async fn test_deactivation_ends_sessions() {
    let client = Client::untracked(test_rocket()).await.expect("valid rocket instance");
    let (admin, _) = login_as(&client, "admin@acme.com", "adminpass").await;
    let (user, identity) = login_as(&client, "user@acme.com", "userpass").await;
    let user_id = identity["user_id"].as_i64().unwrap();

    let response = client
        .put(format!("/api/1/Users/{}", user_id))
        .header(admin)
        .json(&json!({ "status": "inactive" }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);

    let response = client.get("/api/1/hello").header(user).dispatch().await;
    assert_eq!(response.status(), Status::Unauthorized);
}

#[rocket::async_test]
async fn test_cannot_delete_self() {
    let client = Client::untracked(test_rocket()).await.expect("valid rocket instance");
    let (admin, identity) = login_as(&client, "admin@acme.com", "adminpass").await;

    let response = client
        .delete(format!("/api/1/Users/{}", identity["user_id"]))
        .header(admin.clone())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);

    let target = find_user(&client, &admin, "user@acme.com").await;
    let response = client
        .delete(format!("/api/1/Users/{}", target.id))
        .header(admin)
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::NoContent);
}

#[rocket::async_test]
async fn test_role_management_keeps_one_role() {
    let client = Client::untracked(test_rocket()).await.expect("valid rocket instance");
    let (admin, _) = login_as(&client, "admin@acme.com", "adminpass").await;
    let target = find_user(&client, &admin, "user@acme.com").await;
    let roles_url = format!("/api/1/Users/{}/Roles", target.id);

    let response = client
        .delete(roles_url.clone())
        .header(admin.clone())
        .json(&json!({ "role_name": "user" }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);

    let response = client
        .post(roles_url.clone())
        .header(admin.clone())
        .json(&json!({ "role_name": "admin" }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);

    let response = client
        .delete(roles_url.clone())
        .header(admin.clone())
        .json(&json!({ "role_name": "user" }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);

    let response = client.get(roles_url).header(admin).dispatch().await;
    let roles: serde_json::Value = response.into_json().await.unwrap();
    let names: Vec<&str> = roles
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|r| r["name"].as_str())
        .collect();
    assert_eq!(names, vec!["admin"]);
}

#[rocket::async_test]
async fn test_list_roles() {
    let client = Client::untracked(test_rocket()).await.expect("valid rocket instance");
    let (user, _) = login_as(&client, "user@acme.com", "userpass").await;

    let response = client.get("/api/1/Roles").header(user).dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let roles: serde_json::Value = response.into_json().await.unwrap();
    let names: Vec<&str> = roles
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|r| r["name"].as_str())
        .collect();
    for expected in ["master", "admin", "user"] {
        assert!(names.contains(&expected), "missing role {}", expected);
    }
}
