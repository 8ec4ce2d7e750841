use diesel::prelude::*;

use crate::models::{Folder, FolderInput, NewFolder};
use crate::orm::last_insert_id;

/// Partial update; `Some(None)` on a nullable field clears it.
#[derive(Debug, Default)]
pub struct FolderChanges {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub address: Option<Option<String>>,
    pub latitude: Option<Option<f64>>,
    pub longitude: Option<Option<f64>>,
    pub parent_id: Option<Option<i32>>,
}

#[derive(AsChangeset)]
#[diesel(table_name = crate::schema::sensor_folders)]
struct FolderChangeset {
    name: Option<String>,
    description: Option<Option<String>>,
    address: Option<Option<String>>,
    latitude: Option<Option<f64>>,
    longitude: Option<Option<f64>>,
    parent_id: Option<Option<i32>>,
    updated_at: chrono::NaiveDateTime,
}

pub fn insert_folder(
    conn: &mut SqliteConnection,
    input: FolderInput,
) -> Result<Folder, diesel::result::Error> {
    use crate::schema::sensor_folders::dsl::*;

    let new_folder = NewFolder {
        name: input.name,
        description: input.description,
        address: input.address,
        latitude: input.latitude,
        longitude: input.longitude,
        parent_id: input.parent_id,
        company_id: input.company_id,
    };

    diesel::insert_into(sensor_folders).values(&new_folder).execute(conn)?;
    let last_id = last_insert_id(conn)?;

    sensor_folders.filter(id.eq(last_id)).select(Folder::as_select()).first(conn)
}

pub fn get_folder_by_id(
    conn: &mut SqliteConnection,
    folder_id: i32,
) -> Result<Option<Folder>, diesel::result::Error> {
    use crate::schema::sensor_folders::dsl::*;
    sensor_folders
        .filter(id.eq(folder_id))
        .select(Folder::as_select())
        .first(conn)
        .optional()
}

pub fn get_folder_by_company_and_name(
    conn: &mut SqliteConnection,
    comp_id: i32,
    folder_name: &str,
) -> Result<Option<Folder>, diesel::result::Error> {
    use crate::schema::sensor_folders::dsl::*;
    sensor_folders
        .filter(company_id.eq(comp_id))
        .filter(name.eq(folder_name))
        .select(Folder::as_select())
        .first(conn)
        .optional()
}

pub fn get_folders_by_company(
    conn: &mut SqliteConnection,
    comp_id: i32,
) -> Result<Vec<Folder>, diesel::result::Error> {
    use crate::schema::sensor_folders::dsl::*;
    sensor_folders
        .filter(company_id.eq(comp_id))
        .order(id.asc())
        .select(Folder::as_select())
        .load(conn)
}

pub fn get_all_folders(conn: &mut SqliteConnection) -> Result<Vec<Folder>, diesel::result::Error> {
    use crate::schema::sensor_folders::dsl::*;
    sensor_folders.order(id.asc()).select(Folder::as_select()).load(conn)
}

/// Returns true when making `new_parent_id` the parent of `folder_id` would
/// close a loop, i.e. `folder_id` is `new_parent_id` or one of its ancestors.
pub fn would_create_cycle(
    conn: &mut SqliteConnection,
    folder_id: i32,
    new_parent_id: i32,
) -> Result<bool, diesel::result::Error> {
    let mut current = Some(new_parent_id);
    let mut hops = 0;
    while let Some(cursor) = current {
        if cursor == folder_id {
            return Ok(true);
        }
        // Existing data is acyclic, so the walk ends at a root; the hop limit
        // only guards against rows edited outside this service.
        hops += 1;
        if hops > 1024 {
            return Ok(true);
        }
        current = get_folder_by_id(conn, cursor)?.and_then(|f| f.parent_id);
    }
    Ok(false)
}

/// Applies a partial update. Returns Ok(None) when the folder does not exist.
pub fn update_folder(
    conn: &mut SqliteConnection,
    folder_id: i32,
    changes: FolderChanges,
) -> Result<Option<Folder>, diesel::result::Error> {
    use crate::schema::sensor_folders::dsl::*;

    let changeset = FolderChangeset {
        name: changes.name,
        description: changes.description,
        address: changes.address,
        latitude: changes.latitude,
        longitude: changes.longitude,
        parent_id: changes.parent_id,
        updated_at: chrono::Utc::now().naive_utc(),
    };

    let rows = diesel::update(sensor_folders.filter(id.eq(folder_id)))
        .set(&changeset)
        .execute(conn)?;
    if rows == 0 {
        return Ok(None);
    }
    get_folder_by_id(conn, folder_id)
}

/// Deletes a folder. Child folders move up to the deleted folder's parent;
/// sensors and plugs inside it become unfiled.
/// Returns Ok(true) if the folder existed.
pub fn delete_folder(
    conn: &mut SqliteConnection,
    folder_id: i32,
) -> Result<bool, diesel::result::Error> {
    use crate::schema::{power_sensors, sensor_folders, sensors};

    conn.transaction(|conn| {
        let folder = match get_folder_by_id(conn, folder_id)? {
            Some(f) => f,
            None => return Ok(false),
        };

        diesel::update(sensor_folders::table.filter(sensor_folders::parent_id.eq(folder_id)))
            .set(sensor_folders::parent_id.eq(folder.parent_id))
            .execute(conn)?;
        diesel::update(sensors::table.filter(sensors::folder_id.eq(folder_id)))
            .set(sensors::folder_id.eq(None::<i32>))
            .execute(conn)?;
        diesel::update(power_sensors::table.filter(power_sensors::folder_id.eq(folder_id)))
            .set(power_sensors::folder_id.eq(None::<i32>))
            .execute(conn)?;

        let rows = diesel::delete(sensor_folders::table.filter(sensor_folders::id.eq(folder_id)))
            .execute(conn)?;
        Ok(rows > 0)
    })
}
