use anyhow::Result;
use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::{pooled_connection::bb8::Pool, AsyncConnection, AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;
use shared::*;
use crate::models::*;
use crate::schema::*;

type DbPool = Pool<AsyncPgConnection>;

/// Address book storage. Every operation is scoped to the owning user.
#[async_trait]
pub trait AddressStore: Send + Sync {
    async fn list(&self, user_id: Uuid) -> Result<Vec<Address>>;

    async fn get(&self, user_id: Uuid, id: Uuid) -> Result<Option<Address>>;

    /// The user's first address always becomes the default.
    async fn create(&self, user_id: Uuid, new: NewAddress) -> Result<Address>;

    async fn update(&self, user_id: Uuid, id: Uuid, changes: AddressChanges) -> Result<Option<Address>>;

    /// Returns false when the user has no such address.
    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool>;
}

pub struct PgAddressStore {
    pool: DbPool,
}

impl PgAddressStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Serializes address-book writes for one user until the transaction ends, so
/// concurrent first inserts cannot both claim the default slot.
async fn lock_address_book(conn: &mut AsyncPgConnection, user_id: Uuid) -> QueryResult<usize> {
    diesel::sql_query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind::<diesel::sql_types::Text, _>(user_id.to_string())
        .execute(conn)
        .await
}

async fn clear_default(conn: &mut AsyncPgConnection, user_id: Uuid, keep: Option<Uuid>) -> QueryResult<usize> {
    let others = addresses::table
        .filter(addresses::user_id.eq(user_id))
        .filter(addresses::is_default.eq(true))
        .filter(addresses::id.ne(keep.unwrap_or_else(Uuid::nil)));

    diesel::update(others)
        .set(addresses::is_default.eq(false))
        .execute(conn)
        .await
}

#[async_trait]
impl AddressStore for PgAddressStore {
    async fn list(&self, user_id: Uuid) -> Result<Vec<Address>> {
        let mut conn = self.pool.get().await?;

        let rows = addresses::table
            .filter(addresses::user_id.eq(user_id))
            .order((addresses::is_default.desc(), addresses::created_at.desc()))
            .load::<DbAddress>(&mut conn)
            .await?;

        Ok(rows.into_iter().map(Address::from).collect())
    }

    async fn get(&self, user_id: Uuid, id: Uuid) -> Result<Option<Address>> {
        let mut conn = self.pool.get().await?;

        let row = addresses::table
            .filter(addresses::id.eq(id))
            .filter(addresses::user_id.eq(user_id))
            .first::<DbAddress>(&mut conn)
            .await
            .optional()?;

        Ok(row.map(Address::from))
    }

    async fn create(&self, user_id: Uuid, new: NewAddress) -> Result<Address> {
        let mut conn = self.pool.get().await?;

        conn.transaction::<_, anyhow::Error, _>(|conn| {
            Box::pin(async move {
                lock_address_book(conn, user_id).await?;

                let existing: i64 = addresses::table
                    .filter(addresses::user_id.eq(user_id))
                    .count()
                    .get_result(conn)
                    .await?;

                let make_default = new.is_default || existing == 0;
                if make_default {
                    clear_default(conn, user_id, None).await?;
                }

                let row = DbAddress::from(Address::new(user_id, new, make_default));
                let saved = diesel::insert_into(addresses::table)
                    .values(&row)
                    .get_result::<DbAddress>(conn)
                    .await?;

                Ok(Address::from(saved))
            })
        }).await
    }

    async fn update(&self, user_id: Uuid, id: Uuid, changes: AddressChanges) -> Result<Option<Address>> {
        let mut conn = self.pool.get().await?;

        conn.transaction::<_, anyhow::Error, _>(|conn| {
            Box::pin(async move {
                lock_address_book(conn, user_id).await?;

                let current = addresses::table
                    .filter(addresses::id.eq(id))
                    .filter(addresses::user_id.eq(user_id))
                    .first::<DbAddress>(conn)
                    .await
                    .optional()?;

                let Some(current) = current else {
                    return Ok(None);
                };

                let make_default = changes.is_default == Some(true);
                let mut address = Address::from(current);
                changes.apply_to(&mut address);

                if make_default {
                    clear_default(conn, user_id, Some(id)).await?;
                }

                let saved = diesel::update(addresses::table.filter(addresses::id.eq(id)))
                    .set(&DbAddress::from(address))
                    .get_result::<DbAddress>(conn)
                    .await?;

                Ok(Some(Address::from(saved)))
            })
        }).await
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        let mut conn = self.pool.get().await?;

        let deleted = diesel::delete(
            addresses::table
                .filter(addresses::id.eq(id))
                .filter(addresses::user_id.eq(user_id)),
        )
        .execute(&mut conn)
        .await?;

        Ok(deleted > 0)
    }
}
