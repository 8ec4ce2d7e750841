use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use diesel::{Associations, Identifiable, Insertable, Queryable, Selectable};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::schema::purchases;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum PurchaseStatus {
    Pending,
    Completed,
    Cancelled,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Pending => "pending",
            PurchaseStatus::Completed => "completed",
            PurchaseStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PurchaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PurchaseStatus::Pending),
            "completed" => Ok(PurchaseStatus::Completed),
            "cancelled" => Ok(PurchaseStatus::Cancelled),
            other => Err(format!("unknown purchase status '{}'", other)),
        }
    }
}

#[derive(
    Queryable, Selectable, Identifiable, Associations, Debug, Clone, Serialize, Deserialize, TS,
)]
#[diesel(belongs_to(crate::models::company::Company))]
#[diesel(belongs_to(crate::models::product::Product))]
#[diesel(table_name = purchases)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export)]
pub struct Purchase {
    pub id: i32,
    pub company_id: i32,
    pub user_id: Option<i32>,
    pub product_id: i32,
    pub quantity: i32,
    pub unit_price_cents: i32,
    pub total_cents: i32,
    pub status: String,
    #[ts(type = "string")]
    pub created_at: NaiveDateTime,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = purchases)]
pub struct NewPurchase {
    pub company_id: i32,
    pub user_id: Option<i32>,
    pub product_id: i32,
    pub quantity: i32,
    pub unit_price_cents: i32,
    pub total_cents: i32,
    pub status: String,
}

/// One line of a checkout cart.
#[derive(Debug, Clone, Deserialize, Serialize, TS)]
#[ts(export)]
pub struct CartItem {
    pub product_id: i32,
    pub quantity: i32,
}
