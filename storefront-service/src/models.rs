use diesel::prelude::*;
use uuid::Uuid;
use chrono::{DateTime, Utc};
use shared::*;

/// Projection of `orders` returned by the eligibility query.
#[derive(Debug, Clone, Queryable)]
pub struct DbOrderRow {
    pub id: i32,
    pub order_number: String,
    pub status: String,
    pub shipped_at: Option<DateTime<Utc>>,
    pub customer_email: Option<String>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::auto_delivery_log)]
pub struct NewAutoDeliveryLog {
    pub order_id: i32,
    pub order_number: String,
    pub customer_email: Option<String>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::auto_delivery_errors)]
pub struct NewAutoDeliveryError {
    pub order_id: Option<i32>,
    pub order_number: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = crate::schema::addresses)]
#[diesel(treat_none_as_null = true)]
pub struct DbAddress {
    pub id: Uuid,
    pub user_id: Uuid,
    pub recipient_name: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub region: Option<String>,
    pub postal_code: String,
    pub country: String,
    pub phone: Option<String>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbOrderRow> for OrderRow {
    fn from(row: DbOrderRow) -> Self {
        Self {
            id: row.id,
            order_number: row.order_number,
            status: row.status,
            shipped_at: row.shipped_at,
            customer_email: row.customer_email,
        }
    }
}

impl From<AutoDeliveryLogEntry> for NewAutoDeliveryLog {
    fn from(entry: AutoDeliveryLogEntry) -> Self {
        Self {
            order_id: entry.order_id,
            order_number: entry.order_number,
            customer_email: entry.customer_email,
        }
    }
}

impl From<SweepError> for NewAutoDeliveryError {
    fn from(error: SweepError) -> Self {
        Self {
            order_id: error.order_id,
            order_number: error.order_number,
            message: error.message,
        }
    }
}

impl From<DbAddress> for Address {
    fn from(db: DbAddress) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            recipient_name: db.recipient_name,
            line1: db.line1,
            line2: db.line2,
            city: db.city,
            region: db.region,
            postal_code: db.postal_code,
            country: db.country,
            phone: db.phone,
            is_default: db.is_default,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

impl From<Address> for DbAddress {
    fn from(address: Address) -> Self {
        Self {
            id: address.id,
            user_id: address.user_id,
            recipient_name: address.recipient_name,
            line1: address.line1,
            line2: address.line2,
            city: address.city,
            region: address.region,
            postal_code: address.postal_code,
            country: address.country,
            phone: address.phone,
            is_default: address.is_default,
            created_at: address.created_at,
            updated_at: address.updated_at,
        }
    }
}

#[derive(Debug, QueryableByName)]
pub struct TablePresence {
    #[diesel(sql_type = diesel::sql_types::Bool)]
    pub present: bool,
}
