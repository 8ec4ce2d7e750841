use rocket::http::{Header, Status};
use rocket::local::asynchronous::Client;
use serde_json::json;

use sensorhub_api::map::{MapData, MarkerKind};
use sensorhub_api::models::{Folder, PowerSensorWithStatus, Sensor};
use sensorhub_api::orm::testing::test_rocket;

async fn login_token(client: &Client, email: &str, password: &str) -> Header<'static> {
    let response = client
        .post("/api/1/login")
        .json(&json!({ "email": email, "password": password }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let body: serde_json::Value = response.into_json().await.expect("valid login JSON");
    Header::new("Authorization", format!("Bearer {}", body["token"].as_str().unwrap()))
}

async fn folder_by_name(client: &Client, auth: &Header<'static>, name: &str) -> Folder {
    let response = client.get("/api/1/Folders").header(auth.clone()).dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let folders: Vec<Folder> = response.into_json().await.expect("valid folders JSON");
    folders
        .into_iter()
        .find(|f| f.name == name)
        .unwrap_or_else(|| panic!("folder '{}' should be visible", name))
}

#[rocket::async_test]
async fn test_folders_are_scoped_by_company() {
    let client = Client::untracked(test_rocket()).await.expect("valid rocket instance");
    let acme_user = login_token(&client, "user@acme.com", "userpass").await;

    let response = client.get("/api/1/Folders").header(acme_user.clone()).dispatch().await;
    let folders: Vec<Folder> = response.into_json().await.unwrap();
    let mut names: Vec<String> = folders.into_iter().map(|f| f.name).collect();
    names.sort();
    assert_eq!(names, vec!["Barn A".to_string(), "North Field".to_string()]);

    let globex_admin = login_token(&client, "admin@globex.com", "adminpass").await;
    let warehouse = folder_by_name(&client, &globex_admin, "Warehouse 1").await;
    let response = client
        .get(format!("/api/1/Folders/{}", warehouse.id))
        .header(acme_user)
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Forbidden);
}

#[rocket::async_test]
async fn test_create_folder_rules() {
    let client = Client::untracked(test_rocket()).await.expect("valid rocket instance");
    let admin = login_token(&client, "admin@acme.com", "adminpass").await;
    let north = folder_by_name(&client, &admin, "North Field").await;

    let response = client
        .post("/api/1/Folders")
        .header(admin.clone())
        .json(&json!({ "name": "Silo", "parent_id": north.id, "latitude": 52.3, "longitude": 5.3 }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Created);
    let silo: Folder = response.into_json().await.unwrap();
    assert_eq!(silo.parent_id, Some(north.id));
    assert_eq!(silo.company_id, north.company_id);

    let response = client
        .post("/api/1/Folders")
        .header(admin.clone())
        .json(&json!({ "name": "Silo" }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Conflict);

    let response = client
        .post("/api/1/Folders")
        .header(admin.clone())
        .json(&json!({ "name": "Off The Map", "latitude": 91.0, "longitude": 0.0 }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);

    let globex_admin = login_token(&client, "admin@globex.com", "adminpass").await;
    let warehouse = folder_by_name(&client, &globex_admin, "Warehouse 1").await;
    let response = client
        .post("/api/1/Folders")
        .header(admin)
        .json(&json!({ "name": "Annex", "parent_id": warehouse.id }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);

    let user = login_token(&client, "user@acme.com", "userpass").await;
    let response = client
        .post("/api/1/Folders")
        .header(user)
        .json(&json!({ "name": "Shed" }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Forbidden);
}

#[rocket::async_test]
async fn test_folder_cannot_move_into_own_subfolder() {
    let client = Client::untracked(test_rocket()).await.expect("valid rocket instance");
    let admin = login_token(&client, "admin@acme.com", "adminpass").await;
    let north = folder_by_name(&client, &admin, "North Field").await;
    let barn = folder_by_name(&client, &admin, "Barn A").await;

    let response = client
        .put(format!("/api/1/Folders/{}", north.id))
        .header(admin.clone())
        .json(&json!({ "parent_id": barn.id }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);

    let response = client
        .put(format!("/api/1/Folders/{}", barn.id))
        .header(admin)
        .json(&json!({ "parent_id": null, "description": "Dairy barn" }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let moved: Folder = response.into_json().await.unwrap();
    assert_eq!(moved.parent_id, None);
    assert_eq!(moved.description.as_deref(), Some("Dairy barn"));
}

#[rocket::async_test]
async fn test_folder_contents_and_delete() {
    let client = Client::untracked(test_rocket()).await.expect("valid rocket instance");
    let admin = login_token(&client, "admin@acme.com", "adminpass").await;
    let north = folder_by_name(&client, &admin, "North Field").await;
    let barn = folder_by_name(&client, &admin, "Barn A").await;

    let response = client
        .get(format!("/api/1/Folders/{}/Sensors", north.id))
        .header(admin.clone())
        .dispatch()
        .await;
    let sensors: Vec<Sensor> = response.into_json().await.unwrap();
    assert_eq!(sensors.len(), 1);
    assert_eq!(sensors[0].name, "Tractor Tracker");

    let response = client
        .get(format!("/api/1/Folders/{}/PowerSensors", barn.id))
        .header(admin.clone())
        .dispatch()
        .await;
    let plugs: Vec<PowerSensorWithStatus> = response.into_json().await.unwrap();
    assert_eq!(plugs.len(), 1);
    assert_eq!(plugs[0].sensor.name, "Pump Plug");
    assert!(!plugs[0].power_state);

    let response = client
        .delete(format!("/api/1/Folders/{}", north.id))
        .header(admin.clone())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::NoContent);

    let response = client
        .get(format!("/api/1/Folders/{}", barn.id))
        .header(admin.clone())
        .dispatch()
        .await;
    let barn: Folder = response.into_json().await.unwrap();
    assert_eq!(barn.parent_id, None);

    let response = client.get("/api/1/Sensors").header(admin).dispatch().await;
    let sensors: Vec<Sensor> = response.into_json().await.unwrap();
    let tractor = sensors.iter().find(|s| s.name == "Tractor Tracker").unwrap();
    assert_eq!(tractor.folder_id, None);
}

#[rocket::async_test]
async fn test_map_markers_and_bounds() {
    let client = Client::untracked(test_rocket()).await.expect("valid rocket instance");
    let user = login_token(&client, "user@acme.com", "userpass").await;

    let response = client.get("/api/1/Map").header(user.clone()).dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let map: MapData = response.into_json().await.unwrap();

    // Heater Plug has no folder and therefore no position.
    assert_eq!(map.markers.len(), 3);
    assert!(map.markers.iter().all(|m| m.company_id == map.markers[0].company_id));
    let pump = map
        .markers
        .iter()
        .find(|m| m.kind == MarkerKind::Power)
        .expect("pump plug marker");
    assert_eq!(pump.name, "Pump Plug");
    assert_eq!((pump.latitude, pump.longitude), (52.20, 5.20));
    assert_eq!(pump.status, "off");

    let bounds = map.bounds.expect("bounds around markers");
    assert_eq!(bounds.min_latitude, 52.11);
    assert_eq!(bounds.max_latitude, 52.20);
    assert_eq!(bounds.min_longitude, 5.05);
    assert_eq!(bounds.max_longitude, 5.20);
}

#[rocket::async_test]
async fn test_map_folder_filter_includes_subfolders() {
    let client = Client::untracked(test_rocket()).await.expect("valid rocket instance");
    let user = login_token(&client, "user@acme.com", "userpass").await;
    let north = folder_by_name(&client, &user, "North Field").await;

    let response = client
        .get(format!("/api/1/Map?folder_id={}", north.id))
        .header(user)
        .dispatch()
        .await;
    let map: MapData = response.into_json().await.unwrap();
    let mut names: Vec<&str> = map.markers.iter().map(|m| m.name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["Pump Plug", "Tractor Tracker"]);

    let globex_user = login_token(&client, "user@globex.com", "userpass").await;
    let response = client
        .get(format!("/api/1/Map?folder_id={}", north.id))
        .header(globex_user)
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Forbidden);
}
