use diesel::prelude::*;

use crate::models::{NewProduct, Product, ProductInput};
use crate::orm::last_insert_id;

#[derive(Debug, Default)]
pub struct ProductChanges {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub price_cents: Option<i32>,
    pub sku: Option<String>,
    pub active: Option<bool>,
}

#[derive(AsChangeset)]
#[diesel(table_name = crate::schema::products)]
struct ProductChangeset {
    name: Option<String>,
    description: Option<Option<String>>,
    price_cents: Option<i32>,
    sku: Option<String>,
    active: Option<bool>,
    updated_at: chrono::NaiveDateTime,
}

pub fn insert_product(
    conn: &mut SqliteConnection,
    input: ProductInput,
) -> Result<Product, diesel::result::Error> {
    use crate::schema::products::dsl::*;

    let new_product = NewProduct {
        name: input.name,
        description: input.description,
        price_cents: input.price_cents,
        sku: input.sku,
        active: input.active.unwrap_or(true),
    };
    diesel::insert_into(products).values(&new_product).execute(conn)?;
    let last_id = last_insert_id(conn)?;

    products.filter(id.eq(last_id)).select(Product::as_select()).first(conn)
}

pub fn get_product_by_id(
    conn: &mut SqliteConnection,
    product_id: i32,
) -> Result<Option<Product>, diesel::result::Error> {
    use crate::schema::products::dsl::*;
    products
        .filter(id.eq(product_id))
        .select(Product::as_select())
        .first(conn)
        .optional()
}

pub fn get_product_by_sku(
    conn: &mut SqliteConnection,
    product_sku: &str,
) -> Result<Option<Product>, diesel::result::Error> {
    use crate::schema::products::dsl::*;
    products
        .filter(sku.eq(product_sku))
        .select(Product::as_select())
        .first(conn)
        .optional()
}

/// Lists the catalog ordered by name; inactive products only when asked for.
pub fn list_products(
    conn: &mut SqliteConnection,
    include_inactive: bool,
) -> Result<Vec<Product>, diesel::result::Error> {
    use crate::schema::products::dsl::*;

    let mut query = products.order((name.asc(), id.asc())).select(Product::as_select()).into_boxed();
    if !include_inactive {
        query = query.filter(active.eq(true));
    }
    query.load(conn)
}

/// Applies a partial update. Returns Ok(None) when the product does not exist.
pub fn update_product(
    conn: &mut SqliteConnection,
    product_id: i32,
    changes: ProductChanges,
) -> Result<Option<Product>, diesel::result::Error> {
    use crate::schema::products::dsl::*;

    let changeset = ProductChangeset {
        name: changes.name,
        description: changes.description,
        price_cents: changes.price_cents,
        sku: changes.sku,
        active: changes.active,
        updated_at: chrono::Utc::now().naive_utc(),
    };

    let rows = diesel::update(products.filter(id.eq(product_id)))
        .set(&changeset)
        .execute(conn)?;
    if rows == 0 {
        return Ok(None);
    }
    get_product_by_id(conn, product_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orm::testing::setup_test_db;

    fn product(name: &str, sku: &str, price_cents: i32, active: Option<bool>) -> ProductInput {
        ProductInput {
            name: name.to_string(),
            description: None,
            price_cents,
            sku: sku.to_string(),
            active,
        }
    }

    #[test]
    fn test_insert_defaults_to_active() {
        let mut conn = setup_test_db();
        let p = insert_product(&mut conn, product("Tracker", "TRK-1", 4999, None)).unwrap();
        assert!(p.active);
        assert_eq!(p.price_cents, 4999);
        assert_eq!(get_product_by_sku(&mut conn, "TRK-1").unwrap().unwrap().id, p.id);
    }

    #[test]
    fn test_list_hides_inactive() {
        let mut conn = setup_test_db();
        insert_product(&mut conn, product("Beacon", "BCN-1", 500, Some(false))).unwrap();
        insert_product(&mut conn, product("Tracker", "TRK-1", 4999, None)).unwrap();

        let visible = list_products(&mut conn, false).unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].sku, "TRK-1");
        assert_eq!(list_products(&mut conn, true).unwrap().len(), 2);
    }

    #[test]
    fn test_update_and_negative_price() {
        let mut conn = setup_test_db();
        let p = insert_product(&mut conn, product("Tracker", "TRK-1", 4999, None)).unwrap();

        let updated = update_product(
            &mut conn,
            p.id,
            ProductChanges {
                price_cents: Some(3999),
                active: Some(false),
                ..Default::default()
            },
        )
        .unwrap()
        .expect("product exists");
        assert_eq!(updated.price_cents, 3999);
        assert!(!updated.active);

        let bad = update_product(
            &mut conn,
            p.id,
            ProductChanges {
                price_cents: Some(-1),
                ..Default::default()
            },
        );
        assert!(bad.is_err());
    }
}
