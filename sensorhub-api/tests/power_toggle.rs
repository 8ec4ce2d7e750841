use rocket::http::{Header, Status};
use rocket::local::asynchronous::Client;
use serde_json::{Value, json};

use sensorhub_api::models::{PowerAuditEntry, PowerSensorWithStatus, PowerStatus};
use sensorhub_api::orm::testing::{spawn_fake_gateway, test_rocket, test_rocket_with_gateway};

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

async fn plug_id(client: &Client, auth: &Header<'static>, name: &str) -> i32 {
    let response = client.get("/api/1/PowerSensors").header(auth.clone()).dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let plugs: Vec<PowerSensorWithStatus> = response.into_json().await.unwrap();
    plugs
        .into_iter()
        .find(|p| p.sensor.name == name)
        .map(|p| p.sensor.id)
        .unwrap_or_else(|| panic!("{} not visible", name))
}

async fn audit_log(client: &Client, auth: &Header<'static>, id: i32) -> Vec<PowerAuditEntry> {
    let response = client
        .get(format!("/api/1/PowerSensors/{}/AuditLog", id))
        .header(auth.clone())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    response.into_json().await.unwrap()
}

#[rocket::async_test]
async fn test_power_toggle_requires_authentication() {
    let client = Client::untracked(test_rocket()).await.expect("valid rocket instance");
    let response = client
        .post("/api/device/power-toggle")
        .json(&json!({ "sensorId": 1, "powerState": true }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Unauthorized);
    let body: Value = response.into_json().await.unwrap();
    assert_eq!(body, json!({ "success": false, "message": "Authentication required" }));
}

#[rocket::async_test]
async fn test_power_toggle_saves_state_when_gateway_is_down() {
    let client = Client::untracked(test_rocket()).await.expect("valid rocket instance");
    let user = login_token(&client, "user@acme.com", "userpass").await;
    let pump = plug_id(&client, &user, "Pump Plug").await;

    let response = client
        .get(format!("/api/1/PowerSensors/{}/Status", pump))
        .header(user.clone())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let status: PowerStatus = response.into_json().await.unwrap();
    assert!(!status.power_state);

    let response = client
        .post("/api/device/power-toggle")
        .header(user.clone())
        .json(&json!({ "sensorId": pump, "powerState": true, "imei": "86720604-0000114" }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let body: Value = response.into_json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["sensorId"], pump);
    assert_eq!(body["powerState"], true);
    assert_eq!(body["gateway"]["delivered"], false);
    assert_eq!(body["gateway"]["attempts"], 2);
    assert_eq!(body["message"], "Power state saved as on; gateway not reached");

    let response = client
        .get(format!("/api/1/PowerSensors/{}/Status", pump))
        .header(user.clone())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let status: PowerStatus = response.into_json().await.unwrap();
    assert!(status.power_state);

    let log = audit_log(&client, &user, pump).await;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].action, "power_on");
    assert!(!log[0].previous_state);
    assert!(log[0].new_state);
}

#[rocket::async_test]
async fn test_power_toggle_relays_to_gateway() {
    let gateway = spawn_fake_gateway().await;
    let client = Client::untracked(test_rocket_with_gateway(gateway.config()))
        .await
        .expect("valid rocket instance");
    let admin = login_token(&client, "admin@acme.com", "adminpass").await;
    let pump = plug_id(&client, &admin, "Pump Plug").await;

    let response = client
        .post("/api/device/power-toggle")
        .header(admin.clone())
        .json(&json!({ "sensorId": pump, "powerState": "on" }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let body: Value = response.into_json().await.unwrap();
    assert_eq!(body["gateway"]["delivered"], true);
    assert_eq!(body["gateway"]["protocol"], "http");
    assert_eq!(body["message"], "Power turned on");

    let response = client
        .post("/api/device/power-toggle-auth")
        .header(admin.clone())
        .json(&json!({ "sensorId": pump, "powerState": 0 }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let body: Value = response.into_json().await.unwrap();
    assert_eq!(body["powerState"], false);

    let requests = gateway.requests().await;
    assert_eq!(
        requests,
        vec![
            "/powerplug?imei=867206040000114&state=1".to_string(),
            "/powerplug?imei=867206040000114&state=0".to_string(),
        ]
    );

    let log = audit_log(&client, &admin, pump).await;
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].action, "power_off");
    assert!(log[0].previous_state);
}

#[rocket::async_test]
async fn test_power_toggle_rejections() {
    let client = Client::untracked(test_rocket()).await.expect("valid rocket instance");
    let acme = login_token(&client, "user@acme.com", "userpass").await;
    let globex = login_token(&client, "user@globex.com", "userpass").await;
    let pump = plug_id(&client, &acme, "Pump Plug").await;

    let cases = [
        (&globex, json!({ "sensorId": pump, "powerState": true }), Status::Forbidden),
        (&acme, json!({ "sensorId": 9999, "powerState": true }), Status::NotFound),
        (
            &acme,
            json!({ "sensorId": pump, "powerState": true, "imei": "867206040000221" }),
            Status::BadRequest,
        ),
        (&acme, json!({ "sensorId": pump }), Status::BadRequest),
        (&acme, json!({ "sensorId": pump, "powerState": "dim" }), Status::BadRequest),
        (&acme, json!({ "powerState": true }), Status::BadRequest),
    ];
    for (auth, request, expected) in cases {
        let response = client
            .post("/api/device/power-toggle")
            .header(auth.clone())
            .json(&request)
            .dispatch()
            .await;
        assert_eq!(response.status(), expected, "request {}", request);
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["success"], false);
        assert!(body["message"].is_string());
    }

    let response = client
        .post("/api/device/power-toggle")
        .header(acme.clone())
        .header(rocket::http::ContentType::JSON)
        .body("{not json")
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);

    assert!(audit_log(&client, &acme, pump).await.is_empty());
}

#[rocket::async_test]
async fn test_device_toggle_only_relays() {
    let gateway = spawn_fake_gateway().await;
    let client = Client::untracked(test_rocket_with_gateway(gateway.config()))
        .await
        .expect("valid rocket instance");
    let user = login_token(&client, "user@acme.com", "userpass").await;
    let heater = plug_id(&client, &user, "Heater Plug").await;

    let response = client
        .post("/api/device/toggle")
        .header(user.clone())
        .json(&json!({ "deviceId": heater, "powerState": 1 }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let body: Value = response.into_json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Command on delivered");
    assert_eq!(
        gateway.requests().await,
        vec!["/powerplug?imei=867206040000221&state=1".to_string()]
    );

    assert!(audit_log(&client, &user, heater).await.is_empty());
    let response = client
        .get(format!("/api/1/PowerSensors/{}/Status", heater))
        .header(user)
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let status: PowerStatus = response.into_json().await.unwrap();
    assert!(!status.power_state);
}

#[rocket::async_test]
async fn test_device_toggle_reports_unreachable_gateway() {
    let client = Client::untracked(test_rocket()).await.expect("valid rocket instance");
    let user = login_token(&client, "user@acme.com", "userpass").await;
    let heater = plug_id(&client, &user, "Heater Plug").await;

    let response = client
        .post("/api/device/toggle")
        .header(user)
        .json(&json!({ "deviceId": heater, "powerState": false }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let body: Value = response.into_json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["gateway"]["delivered"], false);
}

#[rocket::async_test]
async fn test_power_sensor_crud() {
    let client = Client::untracked(test_rocket()).await.expect("valid rocket instance");
    let admin = login_token(&client, "admin@acme.com", "adminpass").await;
    let user = login_token(&client, "user@acme.com", "userpass").await;

    let response = client
        .post("/api/1/PowerSensors")
        .header(admin.clone())
        .json(&json!({ "name": "Fan Plug", "imei": "867206040000445", "location": "Loft" }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Created);
    let created: PowerSensorWithStatus = response.into_json().await.unwrap();
    assert!(!created.power_state);
    let id = created.sensor.id;

    let response = client
        .post("/api/1/PowerSensors")
        .header(admin.clone())
        .json(&json!({ "name": "Fan Clone", "imei": "867206040000445" }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Conflict);

    let response = client
        .post("/api/1/PowerSensors")
        .header(user.clone())
        .json(&json!({ "name": "User Plug", "imei": "990000860012345" }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Forbidden);

    let response = client
        .put(format!("/api/1/PowerSensors/{}", id))
        .header(admin.clone())
        .json(&json!({ "location": null, "name": "Ceiling Fan" }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let updated: Value = response.into_json().await.unwrap();
    assert_eq!(updated["name"], "Ceiling Fan");
    assert!(updated["location"].is_null());

    let response = client
        .delete(format!("/api/1/PowerSensors/{}", id))
        .header(admin.clone())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::NoContent);

    let response = client
        .get(format!("/api/1/PowerSensors/{}", id))
        .header(admin)
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::NotFound);
}
