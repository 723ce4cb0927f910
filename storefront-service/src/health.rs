use std::time::Duration;
use anyhow::Result;
use async_trait::async_trait;
use diesel::sql_types::Text;
use diesel_async::{pooled_connection::bb8::Pool, AsyncPgConnection, RunQueryDsl};
use serde::Serialize;
use tokio::time;
use tracing::warn;
use url::Url;

type DbPool = Pool<AsyncPgConnection>;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub connected: bool,
    pub host: String,
    pub database: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthReport {
    pub fn up(host: String, database: String) -> Self {
        Self { status: "ok", connected: true, host, database, error: None }
    }

    pub fn down(host: String, database: String, error: String) -> Self {
        Self { status: "error", connected: false, host, database, error: Some(error) }
    }
}

#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self) -> HealthReport;
}

#[derive(diesel::QueryableByName)]
struct CurrentDatabase {
    #[diesel(sql_type = Text)]
    name: String,
}

/// Host and database name from a connection URL. Credentials are dropped.
pub fn connection_target(database_url: &str) -> (String, String) {
    match Url::parse(database_url) {
        Ok(url) => {
            let host = url.host_str().unwrap_or("localhost").to_string();
            let database = url.path().trim_start_matches('/').to_string();
            (host, database)
        }
        Err(_) => ("unknown".to_string(), "unknown".to_string()),
    }
}

pub struct PgHealthProbe {
    pool: DbPool,
    host: String,
    database: String,
}

impl PgHealthProbe {
    pub fn new(pool: DbPool, database_url: &str) -> Self {
        let (host, database) = connection_target(database_url);
        Self { pool, host, database }
    }

    async fn current_database(&self) -> Result<String> {
        let mut conn = self.pool.get().await?;
        let row = diesel::sql_query("SELECT current_database()::text AS name")
            .get_result::<CurrentDatabase>(&mut conn)
            .await?;
        Ok(row.name)
    }
}

#[async_trait]
impl HealthProbe for PgHealthProbe {
    async fn probe(&self) -> HealthReport {
        match time::timeout(PROBE_TIMEOUT, self.current_database()).await {
            Ok(Ok(database)) => HealthReport::up(self.host.clone(), database),
            Ok(Err(e)) => {
                warn!("Database health check failed: {}", e);
                HealthReport::down(self.host.clone(), self.database.clone(), e.to_string())
            }
            Err(_) => {
                warn!("Database health check timed out after {:?}", PROBE_TIMEOUT);
                HealthReport::down(
                    self.host.clone(),
                    self.database.clone(),
                    "timed out waiting for database".to_string(),
                )
            }
        }
    }
}
