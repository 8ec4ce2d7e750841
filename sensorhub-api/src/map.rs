//! Map display data: one marker per positioned device plus the bounding box.
//!
//! Sensors carry their own coordinates. Plugs have none and are drawn at the
//! position of their folder. Devices with no resolvable position are left
//! off the map.

use std::collections::{HashMap, HashSet};

use diesel::SqliteConnection;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::models::{Folder, PowerSensorWithStatus, Sensor};
use crate::orm::folder::{get_all_folders, get_folders_by_company};
use crate::orm::power_sensor::{get_all_power_sensors, get_power_sensors_by_company, with_status};
use crate::orm::sensor::{get_all_sensors, get_sensors_by_company};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum MarkerKind {
    Sensor,
    Power,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MapMarker {
    pub kind: MarkerKind,
    pub id: i32,
    pub name: String,
    pub imei: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Sensor status, or `on`/`off` for plugs.
    pub status: String,
    pub folder_id: Option<i32>,
    pub company_id: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub min_longitude: f64,
    pub max_latitude: f64,
    pub max_longitude: f64,
}

impl BoundingBox {
    fn around(markers: &[MapMarker]) -> Option<Self> {
        let first = markers.first()?;
        let start = BoundingBox {
            min_latitude: first.latitude,
            min_longitude: first.longitude,
            max_latitude: first.latitude,
            max_longitude: first.longitude,
        };
        Some(markers.iter().skip(1).fold(start, |b, m| BoundingBox {
            min_latitude: b.min_latitude.min(m.latitude),
            min_longitude: b.min_longitude.min(m.longitude),
            max_latitude: b.max_latitude.max(m.latitude),
            max_longitude: b.max_longitude.max(m.longitude),
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MapData {
    pub markers: Vec<MapMarker>,
    pub bounds: Option<BoundingBox>,
}

/// `root` and every folder nested below it.
pub fn folder_subtree(folders: &[Folder], root: i32) -> HashSet<i32> {
    let mut subtree = HashSet::from([root]);
    // Parents may be listed after their children, so sweep until stable.
    loop {
        let before = subtree.len();
        for folder in folders {
            if let Some(parent) = folder.parent_id {
                if subtree.contains(&parent) {
                    subtree.insert(folder.id);
                }
            }
        }
        if subtree.len() == before {
            return subtree;
        }
    }
}

/// Builds markers from already loaded rows. With `folder_filter`, only
/// devices filed in that folder or one of its subfolders are kept.
pub fn build_map(
    sensors: &[Sensor],
    plugs: &[PowerSensorWithStatus],
    folders: &[Folder],
    folder_filter: Option<i32>,
) -> MapData {
    let positions: HashMap<i32, (f64, f64)> = folders
        .iter()
        .filter_map(|f| Some((f.id, (f.latitude?, f.longitude?))))
        .collect();
    let scope = folder_filter.map(|root| folder_subtree(folders, root));
    let in_scope = |folder_id: Option<i32>| match (&scope, folder_id) {
        (None, _) => true,
        (Some(ids), Some(id)) => ids.contains(&id),
        (Some(_), None) => false,
    };

    let mut markers = Vec::new();
    for sensor in sensors.iter().filter(|s| in_scope(s.folder_id)) {
        if let (Some(latitude), Some(longitude)) = (sensor.latitude, sensor.longitude) {
            markers.push(MapMarker {
                kind: MarkerKind::Sensor,
                id: sensor.id,
                name: sensor.name.clone(),
                imei: sensor.imei.clone(),
                latitude,
                longitude,
                status: sensor.status.clone(),
                folder_id: sensor.folder_id,
                company_id: sensor.company_id,
            });
        }
    }
    for plug in plugs.iter().filter(|p| in_scope(p.sensor.folder_id)) {
        let Some(&(latitude, longitude)) = plug.sensor.folder_id.and_then(|id| positions.get(&id))
        else {
            continue;
        };
        markers.push(MapMarker {
            kind: MarkerKind::Power,
            id: plug.sensor.id,
            name: plug.sensor.name.clone(),
            imei: plug.sensor.imei.clone(),
            latitude,
            longitude,
            status: if plug.power_state { "on" } else { "off" }.to_string(),
            folder_id: plug.sensor.folder_id,
            company_id: plug.sensor.company_id,
        });
    }

    let bounds = BoundingBox::around(&markers);
    MapData { markers, bounds }
}

/// Loads the map for one company, or for every company when `company` is
/// `None`.
pub fn load_map(
    conn: &mut SqliteConnection,
    company: Option<i32>,
    folder_filter: Option<i32>,
) -> Result<MapData, diesel::result::Error> {
    let (sensors, plugs, folders) = match company {
        Some(id) => (
            get_sensors_by_company(conn, id)?,
            get_power_sensors_by_company(conn, id)?,
            get_folders_by_company(conn, id)?,
        ),
        None => (
            get_all_sensors(conn)?,
            get_all_power_sensors(conn)?,
            get_all_folders(conn)?,
        ),
    };
    let plugs = with_status(conn, plugs)?;
    Ok(build_map(&sensors, &plugs, &folders, folder_filter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FolderInput, PowerSensorInput, SensorInput};
    use crate::orm::company::insert_company;
    use crate::orm::folder::insert_folder;
    use crate::orm::power_sensor::{apply_power_state, insert_power_sensor};
    use crate::orm::sensor::insert_sensor;
    use crate::orm::testing::setup_test_db;

    fn folder(conn: &mut SqliteConnection, company_id: i32, name: &str, at: Option<(f64, f64)>, parent_id: Option<i32>) -> Folder {
        insert_folder(
            conn,
            FolderInput {
                name: name.to_string(),
                description: None,
                address: None,
                latitude: at.map(|p| p.0),
                longitude: at.map(|p| p.1),
                parent_id,
                company_id,
            },
        )
        .unwrap()
    }

    fn sensor(conn: &mut SqliteConnection, company_id: i32, imei: &str, at: Option<(f64, f64)>, folder_id: Option<i32>) -> Sensor {
        insert_sensor(
            conn,
            SensorInput {
                name: format!("S{}", &imei[9..]),
                imei: imei.to_string(),
                sensor_type: None,
                status: None,
                latitude: at.map(|p| p.0),
                longitude: at.map(|p| p.1),
                battery_level: None,
                folder_id,
                company_id,
            },
        )
        .unwrap()
    }

    #[test]
    fn plugs_use_folder_position_and_unpositioned_devices_are_skipped() {
        let mut conn = setup_test_db();
        let company = insert_company(&mut conn, "Map Co".to_string()).unwrap();
        let field = folder(&mut conn, company.id, "Field", Some((10.0, 20.0)), None);
        let shed = folder(&mut conn, company.id, "Shed", None, None);

        sensor(&mut conn, company.id, "356938035643809", Some((11.0, 19.0)), None);
        sensor(&mut conn, company.id, "490154203237518", None, Some(field.id));
        let plug = insert_power_sensor(
            &mut conn,
            PowerSensorInput {
                name: "Pump".to_string(),
                imei: "867206040000114".to_string(),
                location: None,
                folder_id: Some(field.id),
                company_id: company.id,
            },
        )
        .unwrap();
        insert_power_sensor(
            &mut conn,
            PowerSensorInput {
                name: "Lamp".to_string(),
                imei: "867206040000221".to_string(),
                location: None,
                folder_id: Some(shed.id),
                company_id: company.id,
            },
        )
        .unwrap();
        apply_power_state(&mut conn, plug.id, true, None).unwrap();

        let map = load_map(&mut conn, Some(company.id), None).unwrap();
        assert_eq!(map.markers.len(), 2);
        let pump = map.markers.iter().find(|m| m.kind == MarkerKind::Power).unwrap();
        assert_eq!((pump.latitude, pump.longitude), (10.0, 20.0));
        assert_eq!(pump.status, "on");
        assert_eq!(
            map.bounds,
            Some(BoundingBox {
                min_latitude: 10.0,
                min_longitude: 19.0,
                max_latitude: 11.0,
                max_longitude: 20.0,
            })
        );
    }

    #[test]
    fn folder_filter_includes_subfolders() {
        let mut conn = setup_test_db();
        let company = insert_company(&mut conn, "Map Co".to_string()).unwrap();
        let farm = folder(&mut conn, company.id, "Farm", Some((1.0, 1.0)), None);
        let barn = folder(&mut conn, company.id, "Barn", Some((2.0, 2.0)), Some(farm.id));
        let other = folder(&mut conn, company.id, "Other", Some((3.0, 3.0)), None);

        sensor(&mut conn, company.id, "356938035643809", Some((1.5, 1.5)), Some(barn.id));
        sensor(&mut conn, company.id, "490154203237518", Some((3.5, 3.5)), Some(other.id));
        sensor(&mut conn, company.id, "860914040012347", Some((4.5, 4.5)), None);

        let map = load_map(&mut conn, Some(company.id), Some(farm.id)).unwrap();
        assert_eq!(map.markers.len(), 1);
        assert_eq!(map.markers[0].folder_id, Some(barn.id));

        let all = load_map(&mut conn, Some(company.id), None).unwrap();
        assert_eq!(all.markers.len(), 3);
    }

    #[test]
    fn empty_map_has_no_bounds() {
        let map = build_map(&[], &[], &[], None);
        assert!(map.markers.is_empty());
        assert_eq!(map.bounds, None);
    }
}
